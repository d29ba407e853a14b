//! Process configuration: CLI flags with environment fallbacks.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use outpost_protocol::WireEncoding;

/// The runtime profile, mostly steering log verbosity defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RuntimeMode {
    Dev,
    Prod,
}

/// Multiplayer session server for colony minigames.
#[derive(Debug, Parser)]
#[command(name = "outpost", version, about)]
pub struct Cli {
    /// Address the HTTP/websocket surface binds to.
    #[arg(long, env = "OUTPOST_BIND", default_value = "0.0.0.0:8080")]
    pub bind: String,

    /// Default wire encoding for lobbies that do not request one.
    #[arg(long, env = "OUTPOST_ENCODING", default_value = "binary")]
    pub encoding: WireEncoding,

    /// Runtime profile.
    #[arg(long, env = "OUTPOST_MODE", value_enum, default_value_t = RuntimeMode::Dev)]
    pub mode: RuntimeMode,

    /// Host of the main game backend.
    #[arg(long, env = "MAIN_BACKEND_HOST", default_value = "localhost")]
    pub backend_host: String,

    /// Port of the main game backend.
    #[arg(long, env = "MAIN_BACKEND_PORT", default_value_t = 5386)]
    pub backend_port: u16,

    #[command(subcommand)]
    pub tool: Option<Tool>,
}

/// Offline tooling; the process exits after running one.
#[derive(Debug, Subcommand)]
pub enum Tool {
    /// Renders the event catalog as TypeScript definitions for client SDKs.
    ExportEvents {
        /// Where to write the generated file.
        #[arg(long, default_value = "EventSpecifications.ts")]
        output: PathBuf,
    },
}
