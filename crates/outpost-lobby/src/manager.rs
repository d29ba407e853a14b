//! The lobby manager: creates and looks up lobbies, enforces the
//! one-lobby-per-colony invariant, and drives graceful shutdown.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use outpost_backend::Backend;
use outpost_protocol::events::SERVER_CLOSING_EVENT;
use outpost_protocol::payloads::PlayerJoined;
use outpost_protocol::{serialize, ClientId, ColonyId, LobbyId, Role, WireEncoding, SERVER_ID};
use outpost_transport::Connection;
use tokio::sync::mpsc;

use crate::client::Client;
use crate::error::{JoinError, LobbyError};
use crate::lobby::Lobby;

/// Capacity of the close-registration channel.
const CLOSE_QUEUE_CAPACITY: usize = 16;

/// Manages every lobby in the process.
pub struct LobbyManager<C: Connection, B: Backend> {
    lobbies: DashMap<LobbyId, Arc<Lobby<C, B>>>,
    by_colony: DashMap<ColonyId, LobbyId>,
    next_lobby_id: AtomicU32,
    accepting: AtomicBool,
    /// Serializes lobby creation so two concurrent creates for one colony
    /// resolve to the same lobby.
    creation: tokio::sync::Mutex<()>,
    close_tx: mpsc::Sender<LobbyId>,
    default_encoding: WireEncoding,
    backend: Arc<B>,
}

impl<C: Connection, B: Backend> LobbyManager<C, B> {
    /// Creates the manager and starts its close-registration task.
    pub fn new(default_encoding: WireEncoding, backend: Arc<B>) -> Arc<Self> {
        let (close_tx, close_rx) = mpsc::channel(CLOSE_QUEUE_CAPACITY);
        let manager = Arc::new(Self {
            lobbies: DashMap::new(),
            by_colony: DashMap::new(),
            next_lobby_id: AtomicU32::new(0),
            accepting: AtomicBool::new(true),
            creation: tokio::sync::Mutex::new(()),
            close_tx,
            default_encoding,
            backend,
        });
        tokio::spawn(Self::run_close_registrations(Arc::clone(&manager), close_rx));
        manager
    }

    /// Consumes close registrations, unregistering each lobby.
    async fn run_close_registrations(manager: Arc<Self>, mut rx: mpsc::Receiver<LobbyId>) {
        while let Some(lobby_id) = rx.recv().await {
            manager.unregister(lobby_id);
        }
    }

    fn unregister(&self, lobby_id: LobbyId) {
        if let Some((_, lobby)) = self.lobbies.remove(&lobby_id) {
            self.by_colony
                .remove_if(&lobby.colony_id, |_, id| *id == lobby_id);
            tracing::info!(lobby = %lobby_id, colony = %lobby.colony_id, "lobby unregistered");
        }
    }

    /// Creates a lobby for a colony, or returns the colony's existing
    /// lobby. Lobby ids increase monotonically and are never reused.
    pub async fn create_lobby(
        &self,
        owner_id: ClientId,
        colony_id: ColonyId,
        requested_encoding: Option<WireEncoding>,
    ) -> Result<Arc<Lobby<C, B>>, LobbyError> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(LobbyError::ManagerClosed);
        }

        let _guard = self.creation.lock().await;

        if let Some(existing_id) = self.by_colony.get(&colony_id).map(|e| *e.value()) {
            if let Some(existing) = self.lobbies.get(&existing_id).map(|e| Arc::clone(e.value())) {
                if !existing.is_closing() {
                    return Ok(existing);
                }
                // A closing lobby that has not been unregistered yet does
                // not block the colony from getting a fresh one.
                self.by_colony.remove(&colony_id);
            }
        }

        let id = LobbyId(self.next_lobby_id.fetch_add(1, Ordering::SeqCst));
        let encoding = requested_encoding.unwrap_or(self.default_encoding);
        let lobby = Lobby::spawn(
            id,
            owner_id,
            colony_id,
            encoding,
            self.close_tx.clone(),
            Arc::clone(&self.backend),
        );
        self.lobbies.insert(id, Arc::clone(&lobby));
        self.by_colony.insert(colony_id, id);
        tracing::info!(lobby = %id, %colony_id, %owner_id, %encoding, "lobby created");
        Ok(lobby)
    }

    pub fn get(&self, lobby_id: LobbyId) -> Option<Arc<Lobby<C, B>>> {
        self.lobbies.get(&lobby_id).map(|e| Arc::clone(e.value()))
    }

    pub fn lobby_count(&self) -> usize {
        self.lobbies.len()
    }

    /// Pre-checks a join without touching the lobby.
    pub fn is_join_possible(&self, lobby_id: LobbyId, client_id: ClientId) -> Result<(), JoinError> {
        if client_id == SERVER_ID {
            return Err(JoinError::ReservedId(client_id));
        }
        let lobby = self.get(lobby_id).ok_or(JoinError::NotFound(lobby_id))?;
        if lobby.is_closing() {
            return Err(JoinError::Closing(lobby_id));
        }
        if lobby.contains_client(client_id) {
            return Err(JoinError::AlreadyInLobby(client_id, lobby_id));
        }
        Ok(())
    }

    /// Attaches a client to a lobby and starts its reader task.
    ///
    /// The join notice goes out before the joiner is added to the client
    /// map, so they never receive their own join event.
    pub async fn join_lobby(
        &self,
        lobby_id: LobbyId,
        client_id: ClientId,
        ign: String,
        conn: C,
    ) -> Result<(), JoinError> {
        self.is_join_possible(lobby_id, client_id)?;
        let lobby = self.get(lobby_id).ok_or(JoinError::NotFound(lobby_id))?;

        let role = if client_id == lobby.owner_id {
            Role::Owner
        } else {
            Role::Guest
        };
        let client = Arc::new(Client::new(client_id, ign, role, lobby.encoding, conn));

        let notice = serialize(&PlayerJoined {
            id: client.id,
            ign: client.ign.clone(),
        });
        lobby.broadcast(SERVER_ID, notice).await;

        lobby.insert_client(Arc::clone(&client));
        tracing::info!(lobby = %lobby_id, client = %client, "client joined");

        tokio::spawn(Arc::clone(&lobby).run_client(client));
        Ok(())
    }

    /// Stops accepting lobbies and closes every existing one: each lobby
    /// gets ServerClosing followed by its LobbyClosing.
    pub async fn shutdown(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        let lobbies: Vec<Arc<Lobby<C, B>>> =
            self.lobbies.iter().map(|e| Arc::clone(e.value())).collect();
        tracing::info!(count = lobbies.len(), "shutting down all lobbies");

        for lobby in lobbies {
            lobby.broadcast_server_event(&SERVER_CLOSING_EVENT).await;
            lobby.close().await;
        }
    }
}
