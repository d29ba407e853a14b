//! The minigame orchestration state machine.
//!
//! One tracker per lobby, alive for the lobby's lifetime and reset between
//! minigame sessions. Compound transitions are only ever performed by the
//! lobby's post-processor task (single writer); API queries read the
//! atomics directly.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use dashmap::{DashMap, DashSet};
use outpost_protocol::payloads::DifficultyConfirmed;
use outpost_protocol::ClientId;

/// Where a lobby stands in the minigame orchestration sequence.
///
/// Advances strictly forward until a reset returns it to
/// `RoamingColony`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u32)]
pub enum LobbyPhase {
    /// Players are walking around the colony. Difficulty selection is
    /// replicated but nothing is tracked until a confirmation arrives.
    RoamingColony = 0,
    /// Difficulty confirmed; every lobby member must now opt in or out.
    AwaitingParticipants = 1,
    /// All members accounted for; participants declare readiness.
    PlayersDeclareIntent = 2,
    /// All participants ready; awaiting load-complete from each.
    LoadingMinigame = 3,
    /// The minigame controller is live.
    InMinigame = 4,
}

impl LobbyPhase {
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    fn from_u32(raw: u32) -> Self {
        match raw {
            1 => Self::AwaitingParticipants,
            2 => Self::PlayersDeclareIntent,
            3 => Self::LoadingMinigame,
            4 => Self::InMinigame,
            _ => Self::RoamingColony,
        }
    }
}

/// Tracks participants, readiness and load state across the orchestration
/// phases.
#[derive(Debug, Default)]
pub struct ActivityTracker {
    confirmed_difficulty: Mutex<Option<DifficultyConfirmed>>,
    locked_in: AtomicBool,
    phase: AtomicU32,

    opt_in: DashSet<ClientId>,
    opt_out: DashSet<ClientId>,
    participants_accounted: AtomicU32,
    participants_expected: AtomicU32,

    ready_accounted: AtomicU32,
    ready_expected: AtomicU32,
    ready_by_player: DashMap<ClientId, bool>,

    load_accounted: AtomicU32,
    load_expected: AtomicU32,
    load_by_player: DashMap<ClientId, bool>,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> LobbyPhase {
        LobbyPhase::from_u32(self.phase.load(Ordering::SeqCst))
    }

    pub fn is_locked_in(&self) -> bool {
        self.locked_in.load(Ordering::SeqCst)
    }

    /// The difficulty the tracker is locked onto, if any.
    pub fn confirmed_difficulty(&self) -> Option<DifficultyConfirmed> {
        self.confirmed_difficulty
            .lock()
            .expect("difficulty lock poisoned")
            .clone()
    }

    /// Stores the confirmed difficulty. Refused once locked in.
    pub fn set_difficulty(&self, difficulty: DifficultyConfirmed) -> bool {
        if self.is_locked_in() {
            return false;
        }
        *self
            .confirmed_difficulty
            .lock()
            .expect("difficulty lock poisoned") = Some(difficulty);
        true
    }

    /// Locks the activity and moves to `AwaitingParticipants`, recording
    /// how many clients must opt in or out. Refused while no difficulty
    /// has been confirmed.
    pub fn lock_in(&self, client_count: u32) -> bool {
        if self.confirmed_difficulty().is_none() {
            return false;
        }
        self.locked_in.store(true, Ordering::SeqCst);
        self.phase
            .store(LobbyPhase::AwaitingParticipants.as_u32(), Ordering::SeqCst);
        self.participants_expected.store(client_count, Ordering::SeqCst);
        true
    }

    /// Registers an opt-in. Refused while not locked in.
    pub fn add_participant(&self, client: ClientId) -> bool {
        if !self.is_locked_in() {
            return false;
        }
        self.opt_out.remove(&client);
        self.opt_in.insert(client);
        self.participants_accounted.fetch_add(1, Ordering::SeqCst);
        true
    }

    /// Registers an opt-out. Refused while not locked in.
    pub fn remove_participant(&self, client: ClientId) -> bool {
        if !self.is_locked_in() {
            return false;
        }
        self.opt_in.remove(&client);
        self.opt_out.insert(client);
        self.participants_accounted.fetch_add(1, Ordering::SeqCst);
        true
    }

    /// Moves to `PlayersDeclareIntent` once every expected client has
    /// opted in or out, seeding the readiness set from the opt-ins.
    /// Returns whether the phase advanced.
    pub fn advance_if_participants_accounted(&self) -> bool {
        let accounted = self.participants_accounted.load(Ordering::SeqCst);
        if accounted < self.participants_expected.load(Ordering::SeqCst) {
            return false;
        }
        self.phase
            .store(LobbyPhase::PlayersDeclareIntent.as_u32(), Ordering::SeqCst);

        let mut participant_count = 0u32;
        for id in self.opt_in.iter() {
            self.ready_by_player.insert(*id, false);
            participant_count += 1;
        }
        self.ready_expected.store(participant_count, Ordering::SeqCst);
        self.ready_accounted.store(0, Ordering::SeqCst);
        tracing::debug!("entering players-declare-intent phase");
        true
    }

    /// Marks a participant ready. Idempotent: a client counts at most
    /// once, and clients outside the seeded readiness set never count.
    pub fn mark_ready(&self, client: ClientId) {
        if let Some(mut entry) = self.ready_by_player.get_mut(&client) {
            if !*entry {
                *entry = true;
                self.ready_accounted.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    /// Moves to `LoadingMinigame` once every participant is ready,
    /// seeding the load-complete set. Returns whether the phase advanced.
    pub fn advance_if_all_ready(&self) -> bool {
        let accounted = self.ready_accounted.load(Ordering::SeqCst);
        if accounted < self.ready_expected.load(Ordering::SeqCst) {
            return false;
        }
        self.phase
            .store(LobbyPhase::LoadingMinigame.as_u32(), Ordering::SeqCst);

        let mut participant_count = 0u32;
        for id in self.opt_in.iter() {
            self.load_by_player.insert(*id, false);
            participant_count += 1;
        }
        self.load_expected.store(participant_count, Ordering::SeqCst);
        self.load_accounted.store(0, Ordering::SeqCst);
        tracing::debug!("entering loading-minigame phase");
        true
    }

    /// Marks a participant's scene load as complete. Same idempotence as
    /// readiness.
    pub fn mark_load_complete(&self, client: ClientId) {
        if let Some(mut entry) = self.load_by_player.get_mut(&client) {
            if !*entry {
                *entry = true;
                self.load_accounted.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    /// Whether every participant has finished loading. The caller then
    /// runs the minigame's rising edge before committing the phase with
    /// [`enter_minigame`](Self::enter_minigame).
    pub fn all_load_complete(&self) -> bool {
        self.load_accounted.load(Ordering::SeqCst) >= self.load_expected.load(Ordering::SeqCst)
    }

    /// Commits the transition into `InMinigame`.
    pub fn enter_minigame(&self) {
        self.phase
            .store(LobbyPhase::InMinigame.as_u32(), Ordering::SeqCst);
        tracing::debug!("entering in-minigame phase");
    }

    pub fn is_opted_in(&self, client: ClientId) -> bool {
        self.opt_in.contains(&client)
    }

    /// Snapshot of the opted-in participants.
    pub fn opt_in_ids(&self) -> Vec<ClientId> {
        self.opt_in.iter().map(|id| *id).collect()
    }

    /// Clears the lock and restores every tracked field. No-op when not
    /// locked in.
    pub fn release_lock(&self) {
        if !self.locked_in.swap(false, Ordering::SeqCst) {
            return;
        }
        self.reset();
    }

    /// Restores the initial value of every tracked field and the phase.
    pub fn reset(&self) {
        *self
            .confirmed_difficulty
            .lock()
            .expect("difficulty lock poisoned") = None;
        self.locked_in.store(false, Ordering::SeqCst);
        self.opt_in.clear();
        self.opt_out.clear();
        self.participants_accounted.store(0, Ordering::SeqCst);
        self.participants_expected.store(0, Ordering::SeqCst);
        self.ready_accounted.store(0, Ordering::SeqCst);
        self.ready_expected.store(0, Ordering::SeqCst);
        self.ready_by_player.clear();
        self.load_accounted.store(0, Ordering::SeqCst);
        self.load_expected.store(0, Ordering::SeqCst);
        self.load_by_player.clear();
        self.phase
            .store(LobbyPhase::RoamingColony.as_u32(), Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cid(id: u32) -> ClientId {
        ClientId(id)
    }

    fn difficulty() -> DifficultyConfirmed {
        DifficultyConfirmed {
            colony_location_id: 5,
            minigame_id: 1,
            difficulty_id: 2,
            difficulty_name: "Easy".into(),
        }
    }

    /// Walks a tracker to AwaitingParticipants with `count` expected.
    fn locked_tracker(count: u32) -> ActivityTracker {
        let tracker = ActivityTracker::new();
        assert!(tracker.set_difficulty(difficulty()));
        assert!(tracker.lock_in(count));
        tracker
    }

    #[test]
    fn test_initial_phase_is_roaming_colony() {
        let tracker = ActivityTracker::new();
        assert_eq!(tracker.phase(), LobbyPhase::RoamingColony);
        assert!(!tracker.is_locked_in());
        assert!(tracker.confirmed_difficulty().is_none());
    }

    #[test]
    fn test_lock_in_without_difficulty_refused() {
        let tracker = ActivityTracker::new();
        assert!(!tracker.lock_in(3));
        assert_eq!(tracker.phase(), LobbyPhase::RoamingColony);
    }

    #[test]
    fn test_lock_in_with_difficulty_enters_awaiting_participants() {
        let tracker = locked_tracker(3);
        assert!(tracker.is_locked_in());
        assert_eq!(tracker.phase(), LobbyPhase::AwaitingParticipants);
    }

    #[test]
    fn test_set_difficulty_refused_while_locked() {
        let tracker = locked_tracker(3);
        assert!(!tracker.set_difficulty(difficulty()));
    }

    #[test]
    fn test_participants_refused_before_lock_in() {
        let tracker = ActivityTracker::new();
        assert!(!tracker.add_participant(cid(1)));
        assert!(!tracker.remove_participant(cid(1)));
    }

    #[test]
    fn test_advance_waits_for_all_participants() {
        let tracker = locked_tracker(3);
        tracker.add_participant(cid(1));
        tracker.add_participant(cid(2));
        assert!(!tracker.advance_if_participants_accounted());
        tracker.remove_participant(cid(3));
        assert!(tracker.advance_if_participants_accounted());
        assert_eq!(tracker.phase(), LobbyPhase::PlayersDeclareIntent);
    }

    #[test]
    fn test_readiness_seeded_from_opt_in_only() {
        let tracker = locked_tracker(3);
        tracker.add_participant(cid(1));
        tracker.add_participant(cid(2));
        tracker.remove_participant(cid(3));
        tracker.advance_if_participants_accounted();

        // The opted-out client is not in the readiness set, so marking it
        // ready changes nothing.
        tracker.mark_ready(cid(3));
        assert!(!tracker.advance_if_all_ready());

        tracker.mark_ready(cid(1));
        tracker.mark_ready(cid(2));
        assert!(tracker.advance_if_all_ready());
        assert_eq!(tracker.phase(), LobbyPhase::LoadingMinigame);
    }

    #[test]
    fn test_repeated_ready_counts_once() {
        let tracker = locked_tracker(2);
        tracker.add_participant(cid(1));
        tracker.add_participant(cid(2));
        tracker.advance_if_participants_accounted();

        tracker.mark_ready(cid(1));
        tracker.mark_ready(cid(1));
        tracker.mark_ready(cid(1));
        assert!(!tracker.advance_if_all_ready());

        tracker.mark_ready(cid(2));
        assert!(tracker.advance_if_all_ready());
    }

    #[test]
    fn test_load_complete_counts_false_to_true_transitions() {
        let tracker = locked_tracker(2);
        tracker.add_participant(cid(1));
        tracker.add_participant(cid(2));
        tracker.advance_if_participants_accounted();
        tracker.mark_ready(cid(1));
        tracker.mark_ready(cid(2));
        tracker.advance_if_all_ready();

        assert!(!tracker.all_load_complete());
        tracker.mark_load_complete(cid(1));
        tracker.mark_load_complete(cid(1));
        assert!(!tracker.all_load_complete());
        tracker.mark_load_complete(cid(2));
        assert!(tracker.all_load_complete());

        tracker.enter_minigame();
        assert_eq!(tracker.phase(), LobbyPhase::InMinigame);
    }

    #[test]
    fn test_opt_in_and_opt_out_stay_disjoint() {
        let tracker = locked_tracker(2);
        tracker.add_participant(cid(1));
        tracker.remove_participant(cid(1));
        assert!(!tracker.is_opted_in(cid(1)));

        tracker.add_participant(cid(1));
        assert!(tracker.is_opted_in(cid(1)));
        assert!(tracker.opt_in_ids().contains(&cid(1)));
    }

    #[test]
    fn test_locked_in_implies_difficulty_until_reset() {
        let tracker = locked_tracker(1);
        assert!(tracker.confirmed_difficulty().is_some());
        tracker.release_lock();
        assert!(!tracker.is_locked_in());
        assert!(tracker.confirmed_difficulty().is_none());
    }

    #[test]
    fn test_release_lock_restores_initial_values() {
        let tracker = locked_tracker(2);
        tracker.add_participant(cid(1));
        tracker.remove_participant(cid(2));
        tracker.advance_if_participants_accounted();
        tracker.mark_ready(cid(1));

        tracker.release_lock();

        assert_eq!(tracker.phase(), LobbyPhase::RoamingColony);
        assert!(!tracker.is_locked_in());
        assert!(tracker.opt_in_ids().is_empty());
        assert!(!tracker.is_opted_in(cid(1)));

        // The tracker is reusable for the next session.
        assert!(tracker.set_difficulty(difficulty()));
        assert!(tracker.lock_in(1));
        assert_eq!(tracker.phase(), LobbyPhase::AwaitingParticipants);
    }

    #[test]
    fn test_release_lock_noop_when_not_locked() {
        let tracker = ActivityTracker::new();
        tracker.release_lock();
        assert_eq!(tracker.phase(), LobbyPhase::RoamingColony);
    }

    #[test]
    fn test_unrelated_marks_do_not_move_counters() {
        // Phase 4 of the testable properties: events outside a phase's
        // accepted set leave phase and counters alone.
        let tracker = locked_tracker(2);
        tracker.mark_ready(cid(1));
        tracker.mark_load_complete(cid(1));
        assert_eq!(tracker.phase(), LobbyPhase::AwaitingParticipants);
        assert!(!tracker.advance_if_participants_accounted());
    }
}
