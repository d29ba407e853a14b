//! The HTTP admission surface: lobby creation, snapshots, health, and the
//! websocket upgrade that turns a request into a lobby connection.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use outpost_backend::Backend;
use outpost_lobby::{JoinError, LobbyManager};
use outpost_protocol::payloads::DebugMessage;
use outpost_protocol::{
    encode_base16, serialize, ClientId, ColonyId, LobbyId, WireEncoding, SERVER_ID,
};
use outpost_transport::{Connection, Frame, WsConnection};
use serde::{Deserialize, Serialize};

type SharedManager<B> = Arc<LobbyManager<WsConnection, B>>;

/// Builds the admission router over a lobby manager.
pub fn router<B: Backend>(manager: SharedManager<B>) -> Router {
    Router::new()
        .route("/create-lobby", post(create_lobby::<B>))
        .route("/health", get(health::<B>))
        .route("/lobby/{id}", get(lobby_state::<B>))
        .route("/connect", get(connect::<B>))
        .with_state(manager)
}

// -- /create-lobby -----------------------------------------------------------

#[derive(Deserialize)]
struct CreateLobbyParams {
    #[serde(rename = "ownerID")]
    owner_id: u32,
    #[serde(rename = "colonyID")]
    colony_id: u32,
    encoding: Option<String>,
}

#[derive(Serialize)]
struct CreateLobbyResponse {
    id: u32,
}

async fn create_lobby<B: Backend>(
    State(manager): State<SharedManager<B>>,
    Query(params): Query<CreateLobbyParams>,
) -> Response {
    // Unknown or missing encodings fall back to the process default.
    let encoding = params
        .encoding
        .as_deref()
        .and_then(|raw| raw.parse::<WireEncoding>().ok());

    match manager
        .create_lobby(ClientId(params.owner_id), ColonyId(params.colony_id), encoding)
        .await
    {
        Ok(lobby) => Json(CreateLobbyResponse { id: lobby.id.0 }).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "lobby creation refused");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

// -- /health -----------------------------------------------------------------

#[derive(Serialize)]
struct HealthResponse {
    status: bool,
    #[serde(rename = "lobbyCount")]
    lobby_count: u32,
}

async fn health<B: Backend>(State(manager): State<SharedManager<B>>) -> Response {
    Json(HealthResponse {
        status: true,
        lobby_count: manager.lobby_count() as u32,
    })
    .into_response()
}

// -- /lobby/{id} -------------------------------------------------------------

#[derive(Serialize)]
struct ClientStateResponse {
    #[serde(rename = "lastKnownPosition")]
    last_known_position: u32,
    #[serde(rename = "msOfLastMessage")]
    ms_of_last_message: u64,
}

#[derive(Serialize)]
struct ClientResponse {
    id: u32,
    #[serde(rename = "IGN")]
    ign: String,
    #[serde(rename = "type")]
    role: String,
    state: ClientStateResponse,
}

#[derive(Serialize)]
struct LobbyStateResponse {
    #[serde(rename = "colonyID")]
    colony_id: u32,
    closing: bool,
    phase: u32,
    encoding: String,
    clients: Vec<ClientResponse>,
}

async fn lobby_state<B: Backend>(
    State(manager): State<SharedManager<B>>,
    Path(id): Path<u32>,
) -> Response {
    let Some(lobby) = manager.get(LobbyId(id)) else {
        return (StatusCode::NOT_FOUND, "lobby not found").into_response();
    };

    let clients = lobby
        .clients()
        .into_iter()
        .map(|client| ClientResponse {
            id: client.id.0,
            ign: client.ign.clone(),
            role: client.role.to_string(),
            state: ClientStateResponse {
                last_known_position: client.state.last_known_position(),
                ms_of_last_message: client.state.ms_of_last_message(),
            },
        })
        .collect();

    Json(LobbyStateResponse {
        colony_id: lobby.colony_id.0,
        closing: lobby.is_closing(),
        phase: lobby.phase().as_u32(),
        encoding: lobby.encoding.to_string(),
        clients,
    })
    .into_response()
}

// -- /connect ----------------------------------------------------------------

#[derive(Deserialize)]
struct ConnectParams {
    #[serde(rename = "lobbyID")]
    lobby_id: u32,
    #[serde(rename = "clientID")]
    client_id: u32,
    #[serde(rename = "IGN")]
    ign: String,
}

fn join_error_status(error: &JoinError) -> StatusCode {
    match error {
        JoinError::NotFound(_) => StatusCode::NOT_FOUND,
        JoinError::AlreadyInLobby(_, _) | JoinError::ReservedId(_) => StatusCode::CONFLICT,
        JoinError::Closing(_) => StatusCode::GONE,
    }
}

async fn connect<B: Backend>(
    State(manager): State<SharedManager<B>>,
    Query(params): Query<ConnectParams>,
    ws: WebSocketUpgrade,
) -> Response {
    if params.ign.is_empty() {
        return (StatusCode::BAD_REQUEST, "IGN not provided").into_response();
    }

    let lobby_id = LobbyId(params.lobby_id);
    let client_id = ClientId(params.client_id);
    if let Err(e) = manager.is_join_possible(lobby_id, client_id) {
        tracing::debug!(%lobby_id, %client_id, error = %e, "join refused");
        return (join_error_status(&e), e.to_string()).into_response();
    }

    let ign = params.ign;
    ws.on_upgrade(move |socket| async move {
        let conn = WsConnection::new(socket);

        // The admission decision raced the upgrade; re-check before
        // attaching. Failures can only be reported in-band now.
        if let Err(e) = manager.is_join_possible(lobby_id, client_id) {
            let mut frame = SERVER_ID.to_be_bytes().to_vec();
            frame.extend_from_slice(&serialize(&DebugMessage {
                code: 500,
                message: e.to_string(),
            }));
            let _ = conn.send(Frame::Text(encode_base16(&frame))).await;
            conn.close().await;
            return;
        }

        if let Err(e) = manager.join_lobby(lobby_id, client_id, ign, conn).await {
            tracing::warn!(%lobby_id, %client_id, error = %e, "join failed after upgrade");
        }
    })
}
