//! Event-spec export: renders the catalog as TypeScript definitions so
//! client SDKs stay in lockstep with the wire format.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::Path;

use outpost_protocol::events::all_specs;
use outpost_protocol::{EventSpec, FieldKind};

/// Renders the whole catalog as one TypeScript module.
pub fn render_event_specs() -> String {
    let mut out = String::new();
    out.push_str("// Generated by `outpost export-events`. Do not edit.\n");
    out.push_str("// Frame layout: senderID (u32) ++ eventID (u32) ++ payload, big endian.\n\n");

    out.push_str("export enum EventID {\n");
    for spec in all_specs() {
        let _ = writeln!(out, "\t{} = {},", spec.name, spec.id);
    }
    out.push_str("}\n\n");

    for spec in all_specs() {
        let _ = writeln!(out, "/** {} */", spec.description);
        let _ = writeln!(out, "export interface {}Message {{", spec.name);
        for field in &spec.structure {
            let size = match field.kind {
                FieldKind::Str => "remainder".to_string(),
                _ => format!("{} bytes", field.byte_size),
            };
            let _ = writeln!(out, "\t/** offset {}, {} */", field.offset, size);
            let _ = writeln!(out, "\t{}: {};", field.name, field.kind.ts_type());
        }
        out.push_str("}\n\n");
        let _ = writeln!(out, "{}", render_senders(spec));
    }

    out
}

fn render_senders(spec: &EventSpec) -> String {
    let mut senders = Vec::new();
    if spec.permissions.guest {
        senders.push("\"guest\"");
    }
    if spec.permissions.owner {
        senders.push("\"owner\"");
    }
    if spec.permissions.server {
        senders.push("\"server\"");
    }
    format!(
        "export const {}Senders = [{}] as const;\n",
        spec.name,
        senders.join(", ")
    )
}

/// Writes the rendered module to `path`, creating parent directories.
pub fn export_event_specs(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, render_event_specs())
}
