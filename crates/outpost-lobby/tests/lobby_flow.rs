//! End-to-end lobby scenarios over the in-memory transport.

use std::sync::Arc;
use std::time::Duration;

use outpost_backend::FixedBackend;
use outpost_lobby::{JoinError, LobbyManager, LobbyPhase};
use outpost_protocol::payloads::{
    DifficultyConfirmed, DifficultySelect, PlayerJoinActivity, PlayerJoined, PlayerLoadComplete,
    PlayerLoadFailure, PlayerMove, PlayerReady, UntimelyAbort,
};
use outpost_protocol::{
    catalog, decode_base16, deserialize, extract_header, serialize, ClientId, ColonyId, EventPayload,
    LobbyId, MessageId, WireEncoding, SERVER_ID,
};
use outpost_transport::{Frame, MemoryConnection, RemoteEnd};

type Manager = LobbyManager<MemoryConnection, FixedBackend>;

fn asteroid_settings() -> serde_json::Value {
    serde_json::json!({
        "minTimeTillImpactS": 100.0,
        "maxTimeTillImpactS": 200.0,
        "charCodeLength": 2,
        "asteroidsPerSecondAtStart": 0.001,
        "asteroidsPerSecondAt80Percent": 0.001,
        "colonyHealth": 10,
        "asteroidMaxHealth": 3,
        "stunDurationS": 1.0,
        "friendlyFirePenaltyS": 2.0,
        "friendlyFirePenaltyMultiplier": 2.0,
        "timeBetweenShotsS": 1.5,
        "survivalTimeS": 600.0,
        "spawnRateCoopModifier": 0.1
    })
}

fn manager_with_backend() -> (Arc<Manager>, Arc<FixedBackend>) {
    let backend = Arc::new(FixedBackend::new(asteroid_settings()));
    (LobbyManager::new(WireEncoding::Binary, Arc::clone(&backend)), backend)
}

async fn join(manager: &Manager, lobby: LobbyId, id: u32, ign: &str) -> RemoteEnd {
    let (conn, remote) = MemoryConnection::pair();
    manager
        .join_lobby(lobby, ClientId(id), ign.to_string(), conn)
        .await
        .expect("join should succeed");
    remote
}

/// Builds the client-side frame for a payload: `[sender][event id][fields]`.
fn client_frame<P: EventPayload>(sender: u32, payload: &P) -> Frame {
    let mut raw = sender.to_be_bytes().to_vec();
    raw.extend_from_slice(&serialize(payload));
    Frame::Binary(raw)
}

async fn recv_raw(remote: &mut RemoteEnd) -> Vec<u8> {
    let frame = tokio::time::timeout(Duration::from_secs(2), remote.recv())
        .await
        .expect("timed out waiting for a frame")
        .expect("connection closed while waiting for a frame");
    match frame {
        Frame::Binary(data) => data,
        Frame::Text(text) => decode_base16(&text).expect("text frame should be base16"),
    }
}

/// Receives frames until one carries the wanted event id.
async fn expect_event(remote: &mut RemoteEnd, event_id: MessageId) -> (ClientId, Vec<u8>) {
    for _ in 0..32 {
        let raw = recv_raw(remote).await;
        let (sender, spec, remainder) = extract_header(catalog(), &raw).expect("valid frame");
        if spec.id == event_id {
            return (sender, remainder.to_vec());
        }
    }
    panic!("event {event_id} never arrived");
}

/// Polls a condition driven by background tasks.
async fn wait_until<F: Fn() -> bool>(what: &str, cond: F) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

// ============================================================================
// Join and echo (S1)
// ============================================================================

#[tokio::test]
async fn test_guest_move_replicates_to_owner_byte_exact() {
    let (manager, _) = manager_with_backend();
    let lobby = manager
        .create_lobby(ClientId(1), ColonyId(7), None)
        .await
        .unwrap();

    let mut owner = join(&manager, lobby.id, 1, "Owner").await;
    let guest = join(&manager, lobby.id, 2, "Guest").await;

    // The owner sees the guest join; the guest never sees their own join.
    let (sender, remainder) = expect_event(&mut owner, 11).await;
    assert_eq!(sender, SERVER_ID);
    let joined: PlayerJoined = deserialize(&remainder, true).unwrap();
    assert_eq!(joined.id, ClientId(2));
    assert_eq!(joined.ign, "Guest");

    guest
        .send(client_frame(2, &PlayerMove { player_id: ClientId(2), colony_location_id: 4 }))
        .unwrap();

    let raw = recv_raw(&mut owner).await;
    assert_eq!(
        raw,
        vec![0, 0, 0, 2, 0, 0, 0x03, 0xEA, 0, 0, 0, 2, 0, 0, 0, 4],
        "replicated frame must be byte-exact"
    );

    wait_until("guest position tracked", || {
        lobby
            .clients()
            .iter()
            .find(|c| c.id == ClientId(2))
            .is_some_and(|c| c.state.last_known_position() == 4)
    })
    .await;
}

// ============================================================================
// Wrong sender rejected (S2)
// ============================================================================

#[tokio::test]
async fn test_guest_sending_owner_only_event_gets_debug_401() {
    let (manager, _) = manager_with_backend();
    let lobby = manager
        .create_lobby(ClientId(1), ColonyId(7), None)
        .await
        .unwrap();

    let mut owner = join(&manager, lobby.id, 1, "Owner").await;
    let mut guest = join(&manager, lobby.id, 2, "Guest").await;
    expect_event(&mut owner, 11).await;

    guest
        .send(client_frame(
            2,
            &DifficultySelect {
                colony_location_id: 5,
                minigame_id: 1,
                difficulty_id: 2,
                difficulty_name: "Easy".into(),
            },
        ))
        .unwrap();

    // The offender hears a 401; nothing is replicated.
    let (sender, remainder) = expect_event(&mut guest, 1).await;
    assert_eq!(sender, SERVER_ID);
    let debug: outpost_protocol::payloads::DebugMessage = deserialize(&remainder, true).unwrap();
    assert_eq!(debug.code, 401);

    assert_eq!(lobby.phase(), LobbyPhase::RoamingColony);

    // The next frame the owner sees is a legitimate move, not the
    // rejected difficulty select.
    guest
        .send(client_frame(2, &PlayerMove { player_id: ClientId(2), colony_location_id: 9 }))
        .unwrap();
    let raw = recv_raw(&mut owner).await;
    let (_, spec, _) = extract_header(catalog(), &raw).unwrap();
    assert_eq!(spec.id, 1002);
}

// ============================================================================
// Full phase advancement (S3)
// ============================================================================

#[tokio::test]
async fn test_three_clients_walk_all_phases_into_minigame() {
    let (manager, _) = manager_with_backend();
    let lobby = manager
        .create_lobby(ClientId(1), ColonyId(7), None)
        .await
        .unwrap();

    let mut owner = join(&manager, lobby.id, 1, "Owner").await;
    let guest = join(&manager, lobby.id, 2, "Guest").await;
    let third = join(&manager, lobby.id, 3, "Third").await;

    owner
        .send(client_frame(
            1,
            &DifficultyConfirmed {
                colony_location_id: 5,
                minigame_id: 1,
                difficulty_id: 2,
                difficulty_name: "Easy".into(),
            },
        ))
        .unwrap();

    wait_until("lock-in", || {
        lobby.tracker().is_locked_in() && lobby.phase() == LobbyPhase::AwaitingParticipants
    })
    .await;

    for (remote, id, ign) in [(&owner, 1u32, "Owner"), (&guest, 2, "Guest"), (&third, 3, "Third")] {
        remote
            .send(client_frame(
                id,
                &PlayerJoinActivity { id: ClientId(id), ign: ign.into() },
            ))
            .unwrap();
    }

    // All accounted for: the server announces the readiness phase.
    expect_event(&mut owner, 2002).await;
    assert_eq!(lobby.phase(), LobbyPhase::PlayersDeclareIntent);

    for (remote, id, ign) in [(&owner, 1u32, "Owner"), (&guest, 2, "Guest"), (&third, 3, "Third")] {
        remote
            .send(client_frame(id, &PlayerReady { id: ClientId(id), ign: ign.into() }))
            .unwrap();
    }

    expect_event(&mut owner, 2010).await;
    assert_eq!(lobby.phase(), LobbyPhase::LoadingMinigame);

    for (remote, id, ign) in [(&owner, 1u32, "Owner"), (&guest, 2, "Guest"), (&third, 3, "Third")] {
        remote
            .send(client_frame(
                id,
                &PlayerLoadComplete { id: ClientId(id), ign: ign.into() },
            ))
            .unwrap();
    }

    // Rising edge: one assignment per participant, then the start gun.
    let mut assigned = Vec::new();
    for _ in 0..3 {
        let (sender, remainder) = expect_event(&mut owner, 3001).await;
        assert_eq!(sender, SERVER_ID);
        let data: outpost_protocol::payloads::AssignPlayerData =
            deserialize(&remainder, true).unwrap();
        assert_eq!(data.char_code.chars().count(), 2);
        assigned.push(data.id);
    }
    assigned.sort();
    assert_eq!(assigned, vec![ClientId(1), ClientId(2), ClientId(3)]);

    expect_event(&mut owner, 2005).await;
    wait_until("in-minigame phase", || lobby.phase() == LobbyPhase::InMinigame).await;
}

// ============================================================================
// Untimely abort during load (S4)
// ============================================================================

#[tokio::test]
async fn test_load_failure_aborts_and_resets_sequence() {
    let (manager, _) = manager_with_backend();
    let lobby = manager
        .create_lobby(ClientId(1), ColonyId(7), None)
        .await
        .unwrap();

    let mut owner = join(&manager, lobby.id, 1, "Owner").await;
    let guest = join(&manager, lobby.id, 2, "Guest").await;

    owner
        .send(client_frame(
            1,
            &DifficultyConfirmed {
                colony_location_id: 5,
                minigame_id: 1,
                difficulty_id: 2,
                difficulty_name: "Easy".into(),
            },
        ))
        .unwrap();
    wait_until("lock-in", || lobby.phase() == LobbyPhase::AwaitingParticipants).await;

    owner
        .send(client_frame(1, &PlayerJoinActivity { id: ClientId(1), ign: "Owner".into() }))
        .unwrap();
    guest
        .send(client_frame(2, &PlayerJoinActivity { id: ClientId(2), ign: "Guest".into() }))
        .unwrap();
    expect_event(&mut owner, 2002).await;

    owner
        .send(client_frame(1, &PlayerReady { id: ClientId(1), ign: "Owner".into() }))
        .unwrap();
    guest
        .send(client_frame(2, &PlayerReady { id: ClientId(2), ign: "Guest".into() }))
        .unwrap();
    expect_event(&mut owner, 2010).await;

    guest
        .send(client_frame(2, &PlayerLoadFailure { reason: "X".into() }))
        .unwrap();

    let (sender, remainder) = expect_event(&mut owner, 2008).await;
    assert_eq!(sender, SERVER_ID);
    let abort: UntimelyAbort = deserialize(&remainder, true).unwrap();
    assert_eq!(abort.source_id, ClientId(2));
    assert_eq!(abort.reason, "X");

    wait_until("sequence reset", || {
        !lobby.tracker().is_locked_in() && lobby.phase() == LobbyPhase::RoamingColony
    })
    .await;
}

// ============================================================================
// Owner disconnect closes the lobby (S5)
// ============================================================================

#[tokio::test]
async fn test_owner_disconnect_closes_lobby_and_frees_colony() {
    let (manager, backend) = manager_with_backend();
    let first = manager
        .create_lobby(ClientId(1), ColonyId(7), None)
        .await
        .unwrap();

    let owner = join(&manager, first.id, 1, "Owner").await;
    let mut guest = join(&manager, first.id, 2, "Guest").await;

    // The owner's transport dies.
    drop(owner);

    expect_event(&mut guest, 12).await; // PlayerLeft
    expect_event(&mut guest, 13).await; // LobbyClosing
    assert!(first.is_closing());

    // The guest's transport is shut down with the lobby: the stream
    // drains and ends.
    tokio::time::timeout(Duration::from_secs(2), async {
        while guest.recv().await.is_some() {}
    })
    .await
    .expect("guest connection should close");

    // The colony closure went out to the main backend.
    wait_until("colony close reported", || {
        backend.closed_colonies() == vec![(ColonyId(7), ClientId(1))]
    })
    .await;

    // The colony is free again: a new create gets a fresh lobby id.
    let second = manager
        .create_lobby(ClientId(1), ColonyId(7), None)
        .await
        .unwrap();
    assert_ne!(second.id, first.id);
}

// ============================================================================
// Manager invariants
// ============================================================================

#[tokio::test]
async fn test_create_lobby_is_one_per_colony() {
    let (manager, _) = manager_with_backend();
    let a = manager.create_lobby(ClientId(1), ColonyId(7), None).await.unwrap();
    let b = manager.create_lobby(ClientId(1), ColonyId(7), None).await.unwrap();
    assert_eq!(a.id, b.id);

    let other = manager.create_lobby(ClientId(9), ColonyId(8), None).await.unwrap();
    assert_ne!(other.id, a.id);
}

#[tokio::test]
async fn test_concurrent_creates_for_one_colony_share_a_lobby() {
    let (manager, _) = manager_with_backend();
    let m1 = Arc::clone(&manager);
    let m2 = Arc::clone(&manager);
    let (a, b) = tokio::join!(
        tokio::spawn(async move { m1.create_lobby(ClientId(1), ColonyId(7), None).await.unwrap().id }),
        tokio::spawn(async move { m2.create_lobby(ClientId(1), ColonyId(7), None).await.unwrap().id }),
    );
    assert_eq!(a.unwrap(), b.unwrap());
}

#[tokio::test]
async fn test_join_prechecks_cover_all_failure_modes() {
    let (manager, _) = manager_with_backend();
    let lobby = manager.create_lobby(ClientId(1), ColonyId(7), None).await.unwrap();
    let _owner = join(&manager, lobby.id, 1, "Owner").await;

    assert!(matches!(
        manager.is_join_possible(LobbyId(999), ClientId(5)),
        Err(JoinError::NotFound(_))
    ));
    assert!(matches!(
        manager.is_join_possible(lobby.id, ClientId(1)),
        Err(JoinError::AlreadyInLobby(_, _))
    ));
    assert!(matches!(
        manager.is_join_possible(lobby.id, SERVER_ID),
        Err(JoinError::ReservedId(_))
    ));
    assert!(manager.is_join_possible(lobby.id, ClientId(5)).is_ok());
}

#[tokio::test]
async fn test_shutdown_sends_server_closing_then_lobby_closing() {
    let (manager, _) = manager_with_backend();
    let lobby = manager.create_lobby(ClientId(1), ColonyId(7), None).await.unwrap();
    let mut owner = join(&manager, lobby.id, 1, "Owner").await;

    manager.shutdown().await;

    expect_event(&mut owner, 2).await; // ServerClosing
    expect_event(&mut owner, 13).await; // LobbyClosing

    assert!(matches!(
        manager.create_lobby(ClientId(1), ColonyId(8), None).await,
        Err(outpost_lobby::LobbyError::ManagerClosed)
    ));
}

// ============================================================================
// Base16 lobbies
// ============================================================================

#[tokio::test]
async fn test_base16_lobby_replicates_as_hex_text() {
    let (manager, _) = manager_with_backend();
    let lobby = manager
        .create_lobby(ClientId(1), ColonyId(7), Some(WireEncoding::Base16))
        .await
        .unwrap();

    let mut owner = join(&manager, lobby.id, 1, "Owner").await;
    let guest = join(&manager, lobby.id, 2, "Guest").await;
    expect_event(&mut owner, 11).await;

    // Clients on a text transport send hex frames.
    let mut raw = 2u32.to_be_bytes().to_vec();
    raw.extend_from_slice(&serialize(&PlayerMove {
        player_id: ClientId(2),
        colony_location_id: 4,
    }));
    guest
        .send(Frame::Text(outpost_protocol::encode_base16(&raw)))
        .unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(2), owner.recv())
        .await
        .unwrap()
        .unwrap();
    match frame {
        Frame::Text(text) => {
            let decoded = decode_base16(&text).unwrap();
            let (sender, spec, _) = extract_header(catalog(), &decoded).unwrap();
            assert_eq!(sender, ClientId(2));
            assert_eq!(spec.id, 1002);
        }
        Frame::Binary(_) => panic!("base16 lobby must emit text frames"),
    }
}

#[tokio::test]
async fn test_malformed_hex_frame_gets_debug_400() {
    let (manager, _) = manager_with_backend();
    let lobby = manager
        .create_lobby(ClientId(1), ColonyId(7), Some(WireEncoding::Base16))
        .await
        .unwrap();
    let mut guest = join(&manager, lobby.id, 2, "Guest").await;

    guest.send(Frame::Text("not-hex!".into())).unwrap();

    let (sender, remainder) = expect_event(&mut guest, 1).await;
    assert_eq!(sender, SERVER_ID);
    let debug: outpost_protocol::payloads::DebugMessage = deserialize(&remainder, true).unwrap();
    assert_eq!(debug.code, 400);
}
