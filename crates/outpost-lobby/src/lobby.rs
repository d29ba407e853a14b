//! The lobby: owns its clients, fans out broadcasts, and drives the
//! minigame orchestration state machine.
//!
//! Task model per lobby: one reader task per connected client and one
//! post-processor task. Readers validate and replicate messages, then
//! enqueue them on a bounded channel; the post-processor is the single
//! consumer and the only task that performs compound activity-tracker
//! transitions. That channel is the linearization point for phase changes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use outpost_backend::Backend;
use outpost_protocol::events::{
    self, DIFFICULTY_CONFIRMED_EVENT, LOBBY_CLOSING_EVENT, MINIGAME_SEQUENCE_RESET_EVENT,
    PLAYERS_DECLARE_INTENT_EVENT, PLAYER_ABORTING_MINIGAME_EVENT, PLAYER_JOIN_ACTIVITY_EVENT,
    PLAYER_LEFT_EVENT, PLAYER_LOAD_COMPLETE_EVENT, PLAYER_LOAD_FAILURE_EVENT, PLAYER_READY_EVENT,
};
use outpost_protocol::payloads::{DifficultyConfirmed, PlayerLeft, PlayerLoadFailure, UntimelyAbort};
use outpost_protocol::{
    catalog, decode_base16, deserialize, extract_header, serialize, ClientId, ColonyId, EventSpec,
    HandlerKind, LobbyId, ProtocolError, WireEncoding, SERVER_ID,
};
use outpost_transport::{Connection, Frame};
use tokio::sync::mpsc;

use crate::client::{encode_frame, with_sender, Client};
use crate::error::LobbyError;
use crate::minigame::{self, MinigameHandle};
use crate::tracker::{ActivityTracker, LobbyPhase};

/// Capacity of the post-process channel. Readers back-pressure against it
/// rather than dropping entries.
const POST_PROCESS_CAPACITY: usize = 1024;

/// A validated message handed from a reader task to the post-processor.
pub struct PostProcessEntry<C> {
    pub(crate) client: Arc<Client<C>>,
    pub(crate) spec: &'static EventSpec,
    pub(crate) remainder: Vec<u8>,
}

/// A lobby groups one owner and their guests around a colony.
pub struct Lobby<C: Connection, B: Backend> {
    pub id: LobbyId,
    pub owner_id: ClientId,
    pub colony_id: ColonyId,
    pub encoding: WireEncoding,
    clients: DashMap<ClientId, Arc<Client<C>>>,
    closing: AtomicBool,
    tracker: ActivityTracker,
    minigame: tokio::sync::Mutex<Option<MinigameHandle<C>>>,
    post_tx: mpsc::Sender<PostProcessEntry<C>>,
    close_tx: mpsc::Sender<LobbyId>,
    backend: Arc<B>,
}

impl<C: Connection, B: Backend> Lobby<C, B> {
    /// Constructs the lobby and starts its post-processor task.
    pub(crate) fn spawn(
        id: LobbyId,
        owner_id: ClientId,
        colony_id: ColonyId,
        encoding: WireEncoding,
        close_tx: mpsc::Sender<LobbyId>,
        backend: Arc<B>,
    ) -> Arc<Self> {
        let (post_tx, post_rx) = mpsc::channel(POST_PROCESS_CAPACITY);
        let lobby = Arc::new(Self {
            id,
            owner_id,
            colony_id,
            encoding,
            clients: DashMap::new(),
            closing: AtomicBool::new(false),
            tracker: ActivityTracker::new(),
            minigame: tokio::sync::Mutex::new(None),
            post_tx,
            close_tx,
            backend,
        });
        tokio::spawn(Self::run_post_processor(Arc::clone(&lobby), post_rx));
        lobby
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    pub fn phase(&self) -> LobbyPhase {
        self.tracker.phase()
    }

    pub fn tracker(&self) -> &ActivityTracker {
        &self.tracker
    }

    pub(crate) fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn contains_client(&self, id: ClientId) -> bool {
        self.clients.contains_key(&id)
    }

    /// Snapshot of the connected clients.
    pub fn clients(&self) -> Vec<Arc<Client<C>>> {
        self.clients.iter().map(|e| Arc::clone(e.value())).collect()
    }

    pub(crate) fn insert_client(&self, client: Arc<Client<C>>) {
        self.clients.insert(client.id, client);
    }

    /// Sends `[senderId][message]` to every client except the sender,
    /// encoded per the lobby encoding. Returns the clients whose writes
    /// failed; they are not torn down here.
    pub async fn broadcast(&self, sender: ClientId, message: Vec<u8>) -> Vec<ClientId> {
        let frame = encode_frame(self.encoding, with_sender(sender, message));
        let recipients: Vec<Arc<Client<C>>> = self
            .clients
            .iter()
            .filter(|entry| *entry.key() != sender)
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut unresponsive = Vec::new();
        for client in recipients {
            if let Err(e) = client.conn().send(frame.clone()).await {
                tracing::warn!(
                    lobby = %self.id,
                    client = %client.id,
                    error = %e,
                    "broadcast write failed"
                );
                unresponsive.push(client.id);
            }
        }
        unresponsive
    }

    /// Broadcasts a server-originated event with no payload.
    pub(crate) async fn broadcast_server_event(&self, spec: &EventSpec) {
        self.broadcast(SERVER_ID, spec.id_bytes.to_vec()).await;
    }

    // -- Reader task ---------------------------------------------------------

    /// Reads frames from one client until the transport closes, then runs
    /// the role-appropriate disconnect.
    pub(crate) async fn run_client(self: Arc<Self>, client: Arc<Client<C>>) {
        tracing::info!(lobby = %self.id, client = %client, "reader task started");

        loop {
            let frame = match client.conn().recv().await {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    tracing::info!(lobby = %self.id, client = %client.id, "connection closed");
                    break;
                }
                Err(e) => {
                    tracing::info!(lobby = %self.id, client = %client.id, error = %e, "read failed");
                    break;
                }
            };

            let raw = match frame {
                Frame::Binary(data) => data,
                Frame::Text(text) => match decode_base16(&text) {
                    Ok(data) => data,
                    Err(e) => {
                        if client.send_debug(400, &e.to_string()).await.is_err() {
                            break;
                        }
                        continue;
                    }
                },
            };

            let (sender, spec, remainder) = match extract_header(catalog(), &raw) {
                Ok(parts) => parts,
                Err(e) => {
                    if client.send_debug(400, &e.to_string()).await.is_err() {
                        break;
                    }
                    continue;
                }
            };

            // The acting client is the one named in the header, not
            // necessarily the one owning this connection. Identity is
            // trusted from the join handshake.
            let Some(acting) = self.clients.get(&sender).map(|e| Arc::clone(e.value())) else {
                tracing::warn!(lobby = %self.id, %sender, "message from id not in lobby");
                continue;
            };

            if !spec.permissions.allows(acting.role) {
                let err = ProtocolError::UnauthorizedSender {
                    event: spec.name,
                    role: acting.role,
                };
                tracing::warn!(lobby = %self.id, client = %acting.id, error = %err, "rejected");
                if client.send_debug(401, &err.to_string()).await.is_err() {
                    break;
                }
                continue;
            }

            if let Err(e) = self.dispatch(&acting, spec, remainder).await {
                tracing::warn!(lobby = %self.id, event = spec.name, error = %e, "handler failed");
            }

            acting.state.update(spec, remainder);

            let entry = PostProcessEntry {
                client: Arc::clone(&acting),
                spec,
                remainder: remainder.to_vec(),
            };
            if self.post_tx.send(entry).await.is_err() {
                // Post-processor gone: the lobby is tearing down.
                break;
            }
        }

        self.handle_disconnect(&client).await;
    }

    /// Invokes the spec's handler role.
    async fn dispatch(
        &self,
        acting: &Arc<Client<C>>,
        spec: &'static EventSpec,
        remainder: &[u8],
    ) -> Result<(), LobbyError> {
        match spec.handler {
            HandlerKind::Ignore => Ok(()),
            HandlerKind::Debug => {
                tracing::debug!(
                    lobby = %self.id,
                    client = %acting.id,
                    payload = %String::from_utf8_lossy(remainder),
                    "debug event received"
                );
                Ok(())
            }
            HandlerKind::Replicate => {
                let mut message = spec.id_bytes.to_vec();
                message.extend_from_slice(remainder);
                let unresponsive = self.broadcast(acting.id, message).await;
                if unresponsive.is_empty() {
                    Ok(())
                } else {
                    Err(LobbyError::UnresponsiveClients(unresponsive))
                }
            }
        }
    }

    // -- Disconnect and close ------------------------------------------------

    /// Removes the client and notifies the rest of the lobby. Owner
    /// disconnect is fatal to the lobby.
    async fn handle_disconnect(self: &Arc<Self>, client: &Arc<Client<C>>) {
        let Some((_, removed)) = self.clients.remove(&client.id) else {
            // Already gone: the lobby close path cleared the map.
            return;
        };
        removed.conn().close().await;

        let message = serialize(&PlayerLeft {
            id: removed.id,
            ign: removed.ign.clone(),
        });
        self.broadcast(SERVER_ID, message).await;

        // Let the orchestration see the departure as an opt-out.
        let entry = PostProcessEntry {
            client: Arc::clone(&removed),
            spec: std::sync::LazyLock::force(&PLAYER_LEFT_EVENT),
            remainder: Vec::new(),
        };
        let _ = self.post_tx.send(entry).await;

        if removed.id == self.owner_id {
            tracing::info!(lobby = %self.id, "owner disconnected, closing lobby");
            self.close().await;
        }
    }

    /// Closes the lobby: marks it closing, sends the terminal broadcast,
    /// shuts every transport and registers for unregistration. Idempotent.
    pub(crate) async fn close(self: &Arc<Self>) {
        if self.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(lobby = %self.id, colony = %self.colony_id, "lobby closing");

        self.broadcast_server_event(&LOBBY_CLOSING_EVENT).await;

        // Stop the minigame actor, if any: dropping the handle closes its
        // channel and the loop winds down on its own.
        *self.minigame.lock().await = None;

        let clients = self.clients();
        self.clients.clear();
        for client in clients {
            client.conn().close().await;
        }

        if let Err(e) = self
            .backend
            .close_colony(self.colony_id, self.owner_id)
            .await
        {
            tracing::warn!(lobby = %self.id, error = %e, "colony close report failed");
        }

        let _ = self.close_tx.send(self.id).await;
    }

    // -- Post-processing -----------------------------------------------------

    async fn run_post_processor(lobby: Arc<Self>, mut rx: mpsc::Receiver<PostProcessEntry<C>>) {
        tracing::debug!(lobby = %lobby.id, "post-processor started");
        while let Some(entry) = rx.recv().await {
            lobby.post_process(entry).await;
        }
        tracing::debug!(lobby = %lobby.id, "post-processor stopped");
    }

    /// Advances the activity tracker and/or forwards to the minigame
    /// controller. Runs on the single post-processor task.
    async fn post_process(self: &Arc<Self>, entry: PostProcessEntry<C>) {
        let spec_id = entry.spec.id;

        // A sequence reset applies in any phase except mid-minigame.
        if spec_id == MINIGAME_SEQUENCE_RESET_EVENT.id {
            if self.tracker.phase() == LobbyPhase::InMinigame {
                let _ = entry
                    .client
                    .send_debug(400, "cannot reset an ongoing minigame")
                    .await;
            } else {
                self.tracker.release_lock();
            }
            return;
        }

        match self.tracker.phase() {
            LobbyPhase::RoamingColony => {
                if spec_id == DIFFICULTY_CONFIRMED_EVENT.id {
                    self.on_difficulty_confirmed(&entry).await;
                }
            }

            LobbyPhase::AwaitingParticipants => {
                if spec_id == PLAYER_JOIN_ACTIVITY_EVENT.id {
                    self.tracker.add_participant(entry.client.id);
                } else if spec_id == PLAYER_ABORTING_MINIGAME_EVENT.id
                    || spec_id == PLAYER_LEFT_EVENT.id
                {
                    self.tracker.remove_participant(entry.client.id);
                    if entry.client.id == self.owner_id {
                        // The owner bailing cancels the whole sequence.
                        self.broadcast_server_event(&MINIGAME_SEQUENCE_RESET_EVENT).await;
                        self.tracker.release_lock();
                        return;
                    }
                }
                if self.tracker.advance_if_participants_accounted() {
                    self.broadcast_server_event(&PLAYERS_DECLARE_INTENT_EVENT).await;
                }
            }

            LobbyPhase::PlayersDeclareIntent => {
                if spec_id == PLAYER_READY_EVENT.id {
                    self.tracker.mark_ready(entry.client.id);
                }
                if self.tracker.advance_if_all_ready() {
                    self.broadcast_server_event(&events::LOAD_MINIGAME_EVENT).await;
                }
            }

            LobbyPhase::LoadingMinigame => {
                if spec_id == PLAYER_LOAD_FAILURE_EVENT.id {
                    let reason = deserialize::<PlayerLoadFailure>(&entry.remainder, true)
                        .map(|p| p.reason)
                        .unwrap_or_default();
                    self.abort_untimely(entry.client.id, reason).await;
                    return;
                }
                if spec_id == PLAYER_LOAD_COMPLETE_EVENT.id {
                    self.tracker.mark_load_complete(entry.client.id);
                }
                if self.tracker.all_load_complete() {
                    self.start_minigame().await;
                }
            }

            LobbyPhase::InMinigame => {
                if !self.tracker.is_opted_in(entry.client.id) {
                    return;
                }
                let client = Arc::clone(&entry.client);
                let guard = self.minigame.lock().await;
                if let Some(handle) = guard.as_ref() {
                    if let Err(e) = handle.forward(entry) {
                        drop(guard);
                        let _ = client.send_debug(500, &e.to_string()).await;
                    }
                }
            }
        }
    }

    async fn on_difficulty_confirmed(self: &Arc<Self>, entry: &PostProcessEntry<C>) {
        let difficulty = match deserialize::<DifficultyConfirmed>(&entry.remainder, true) {
            Ok(difficulty) => difficulty,
            Err(e) => {
                let _ = entry.client.send_debug(400, &e.to_string()).await;
                return;
            }
        };

        let accepted = self.tracker.set_difficulty(difficulty)
            && self.tracker.lock_in(self.client_count() as u32);
        if accepted {
            tracing::info!(lobby = %self.id, "difficulty locked in, awaiting participants");
        } else {
            let _ = entry
                .client
                .send_debug(400, "difficulty could not be locked in")
                .await;
        }
    }

    /// Broadcasts an untimely abort and resets the orchestration.
    async fn abort_untimely(self: &Arc<Self>, source: ClientId, reason: String) {
        tracing::info!(lobby = %self.id, %source, reason = %reason, "minigame aborted untimely");
        let message = serialize(&UntimelyAbort {
            source_id: source,
            reason,
        });
        self.broadcast(SERVER_ID, message).await;
        self.tracker.release_lock();
    }

    /// All participants have loaded: instantiate the controller for the
    /// confirmed minigame, run its rising edge, and commit the phase.
    async fn start_minigame(self: &Arc<Self>) {
        let Some(difficulty) = self.tracker.confirmed_difficulty() else {
            // Locked-in implies a confirmed difficulty; losing it means
            // the sequence was reset underneath us.
            self.abort_untimely(SERVER_ID, "no confirmed difficulty".into()).await;
            return;
        };

        match minigame::instantiate(Arc::clone(self), &difficulty).await {
            Ok(handle) => {
                *self.minigame.lock().await = Some(handle);
                self.tracker.enter_minigame();
                tracing::info!(
                    lobby = %self.id,
                    minigame = difficulty.minigame_id,
                    difficulty = difficulty.difficulty_id,
                    "minigame running"
                );
            }
            Err(e) => {
                self.abort_untimely(SERVER_ID, e.to_string()).await;
            }
        }
    }

    /// Called by a controller when its loop ends: releases the tracker
    /// and drops the handle so the lobby is ready for the next session.
    pub(crate) async fn end_minigame(&self) {
        self.tracker.release_lock();
        *self.minigame.lock().await = None;
    }
}
