//! The asteroids minigame: an authoritative typed-code defense simulation.
//!
//! The server spawns asteroids at an accelerating rate; players shoot them
//! by typing their char codes before impact. The colony loses HP per
//! impact; surviving the configured time wins.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use outpost_backend::Backend;
use outpost_protocol::events::PLAYER_SHOOT_EVENT;
use outpost_protocol::payloads::{
    AssignPlayerData, AsteroidImpact, AsteroidSpawn, DifficultyConfirmed, MinigameLost,
    MinigameWon, PlayerPenalty, PlayerShoot, PENALTY_TYPE_FRIENDLY_FIRE, PENALTY_TYPE_MISS,
};
use outpost_protocol::{deserialize, serialize, ClientId, SERVER_ID};
use outpost_transport::Connection;
use rand::Rng;
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::lobby::{Lobby, PostProcessEntry};
use crate::minigame::charcode::{self, CharCodePool};
use crate::minigame::{MinigameError, MinigameHandle};

pub const ASTEROIDS_MINIGAME_ID: u32 = 1;

/// Tick interval of the authoritative update loop.
const TICK: Duration = Duration::from_millis(100);

/// How many codes the pool holds before generating on demand.
const CODE_POOL_SIZE: u32 = 100;

/// Settings served by the main backend for one difficulty.
///
/// Deserialized from opaque JSON; any field the backend omits stays zero
/// and an overwriting blob replaces base values field-wise where non-zero.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AsteroidSettings {
    #[serde(rename = "minTimeTillImpactS")]
    pub min_time_till_impact_s: f32,
    #[serde(rename = "maxTimeTillImpactS")]
    pub max_time_till_impact_s: f32,
    #[serde(rename = "charCodeLength")]
    pub char_code_length: u32,
    #[serde(rename = "asteroidsPerSecondAtStart")]
    pub asteroids_per_second_at_start: f32,
    #[serde(rename = "asteroidsPerSecondAt80Percent")]
    pub asteroids_per_second_at_80_percent: f32,
    #[serde(rename = "colonyHealth")]
    pub colony_health: u32,
    #[serde(rename = "asteroidMaxHealth")]
    pub asteroid_max_health: u32,
    #[serde(rename = "stunDurationS")]
    pub stun_duration_s: f32,
    #[serde(rename = "friendlyFirePenaltyS")]
    pub friendly_fire_penalty_s: f32,
    #[serde(rename = "friendlyFirePenaltyMultiplier")]
    pub friendly_fire_penalty_multiplier: f32,
    #[serde(rename = "timeBetweenShotsS")]
    pub time_between_shots_s: f32,
    #[serde(rename = "survivalTimeS")]
    pub survival_time_s: f32,
    #[serde(rename = "spawnRateCoopModifier")]
    pub spawn_rate_coop_modifier: f32,
}

fn same_type_default<T: Default>(_sample: &T) -> T {
    T::default()
}

macro_rules! overwrite_nonzero {
    ($dst:expr, $src:expr, $($field:ident),+ $(,)?) => {
        $(
            if $src.$field != same_type_default(&$dst.$field) {
                $dst.$field = $src.$field.clone();
            }
        )+
    };
}

impl AsteroidSettings {
    /// Applies the difficulty's overwriting settings: only non-zero
    /// override fields replace base values.
    pub fn merge(&mut self, overrides: &AsteroidSettings) {
        overwrite_nonzero!(
            self,
            overrides,
            min_time_till_impact_s,
            max_time_till_impact_s,
            char_code_length,
            asteroids_per_second_at_start,
            asteroids_per_second_at_80_percent,
            colony_health,
            asteroid_max_health,
            stun_duration_s,
            friendly_fire_penalty_s,
            friendly_fire_penalty_multiplier,
            time_between_shots_s,
            survival_time_s,
            spawn_rate_coop_modifier,
        );
    }
}

/// An asteroid in flight.
struct ActiveAsteroid {
    data: AsteroidSpawn,
    spawned_at: Instant,
}

/// Controller state. Owned by the actor task once the loop starts, so
/// nothing here needs a lock.
struct Asteroids<C: Connection, B: Backend> {
    lobby: Arc<Lobby<C, B>>,
    settings: AsteroidSettings,
    difficulty: DifficultyConfirmed,
    codes: CharCodePool,
    colony_hp: i64,
    players: Vec<AssignPlayerData>,
    friendly_fire_counts: HashMap<ClientId, u32>,
    asteroids: HashMap<u32, ActiveAsteroid>,
    next_asteroid_id: u32,
    spawn_count: u32,
    started_at: Instant,
}

/// Fetches settings, builds the controller, runs its rising edge and
/// starts the update loop.
pub(crate) async fn launch<C: Connection, B: Backend>(
    lobby: Arc<Lobby<C, B>>,
    difficulty: &DifficultyConfirmed,
) -> Result<MinigameHandle<C>, MinigameError> {
    let raw = lobby
        .backend()
        .minigame_settings(ASTEROIDS_MINIGAME_ID, difficulty.difficulty_id)
        .await
        .map_err(|e| MinigameError::SettingsUnavailable(e.to_string()))?;

    let mut settings: AsteroidSettings = serde_json::from_value(raw.settings)
        .map_err(|e| MinigameError::SettingsUnavailable(e.to_string()))?;
    if let Some(overrides) = raw.overwriting_settings {
        let overrides: AsteroidSettings = serde_json::from_value(overrides)
            .map_err(|e| MinigameError::SettingsUnavailable(e.to_string()))?;
        settings.merge(&overrides);
    }

    let codes = CharCodePool::new(CODE_POOL_SIZE, settings.char_code_length, &charcode::ENGLISH)?;

    let mut game = Asteroids {
        colony_hp: settings.colony_health as i64,
        lobby,
        settings,
        difficulty: difficulty.clone(),
        codes,
        players: Vec::new(),
        friendly_fire_counts: HashMap::new(),
        asteroids: HashMap::new(),
        next_asteroid_id: 0,
        spawn_count: 0,
        started_at: Instant::now(),
    };

    game.rising_edge().await?;

    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(game.run(rx));
    Ok(MinigameHandle::new(tx))
}

/// Player grid: one row of four at y = 0.7, further rows shifted 0.1 up
/// for lobbies larger than four.
fn player_positions(count: usize) -> Vec<(f32, f32)> {
    const BASE: [(f32, f32); 4] = [(0.30, 0.7), (0.45, 0.7), (0.60, 0.7), (0.75, 0.7)];
    if count <= 4 {
        return BASE.to_vec();
    }
    let rows = count.div_ceil(BASE.len());
    let mut positions = Vec::with_capacity(rows * BASE.len());
    for row in 0..rows {
        for (x, y) in BASE {
            positions.push((x, y - row as f32 * 0.1));
        }
    }
    positions
}

impl<C: Connection, B: Backend> Asteroids<C, B> {
    /// Assigns every opted-in participant a grid position and a char
    /// code, announces the assignments, then declares the game begun.
    async fn rising_edge(&mut self) -> Result<(), MinigameError> {
        let participants = self.lobby.tracker().opt_in_ids();
        tracing::info!(
            lobby = %self.lobby.id,
            players = participants.len(),
            "asteroids rising edge"
        );

        let positions = player_positions(participants.len());
        let mut players = Vec::with_capacity(participants.len());
        for (index, id) in participants.iter().enumerate() {
            let (x, y) = positions[index];
            players.push(AssignPlayerData {
                id: *id,
                x,
                y,
                tank_type: 0,
                char_code: self.codes.next(),
            });
            self.friendly_fire_counts.insert(*id, 0);
        }

        for player in &players {
            self.lobby.broadcast(SERVER_ID, serialize(player)).await;
        }
        self.players = players;

        self.lobby
            .broadcast_server_event(&outpost_protocol::events::MINIGAME_BEGINS_EVENT)
            .await;
        Ok(())
    }

    /// The actor loop: a 100 ms authoritative tick interleaved with
    /// player messages. Exclusive ownership of the game state lives here.
    async fn run(mut self, mut rx: mpsc::Receiver<PostProcessEntry<C>>) {
        self.started_at = Instant::now();
        let mut ticker = tokio::time::interval(TICK);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !self.update().await {
                        break;
                    }
                }
                entry = rx.recv() => match entry {
                    Some(entry) => self.handle_entry(entry).await,
                    // Handle dropped: the lobby is closing.
                    None => break,
                }
            }
        }

        self.falling_edge();
        self.lobby.end_minigame().await;
    }

    /// One tick: end conditions, spawn-rate catch-up, impact evaluation.
    /// Returns false once the game is decided.
    async fn update(&mut self) -> bool {
        if self.colony_hp <= 0 {
            let message = serialize(&MinigameLost {
                colony_location_id: self.difficulty.colony_location_id,
                minigame_id: self.difficulty.minigame_id,
                difficulty_id: self.difficulty.difficulty_id,
                difficulty_name: self.difficulty.difficulty_name.clone(),
            });
            self.lobby.broadcast(SERVER_ID, message).await;
            tracing::info!(lobby = %self.lobby.id, "asteroids lost, colony destroyed");
            return false;
        }

        let elapsed_s = self.started_at.elapsed().as_secs_f32();
        if elapsed_s >= self.settings.survival_time_s {
            let message = serialize(&MinigameWon {
                colony_location_id: self.difficulty.colony_location_id,
                minigame_id: self.difficulty.minigame_id,
                difficulty_id: self.difficulty.difficulty_id,
                difficulty_name: self.difficulty.difficulty_name.clone(),
            });
            self.lobby.broadcast(SERVER_ID, message).await;
            tracing::info!(lobby = %self.lobby.id, "asteroids won, survival time reached");
            return false;
        }

        // Spawn rate climbs linearly from the start rate towards the
        // 80%-mark rate, scaled up per participating player.
        let progress = elapsed_s / self.settings.survival_time_s;
        let mut rate = self.settings.asteroids_per_second_at_start
            + (self.settings.asteroids_per_second_at_80_percent
                - self.settings.asteroids_per_second_at_start)
                * progress;
        rate *= 1.0 + self.settings.spawn_rate_coop_modifier * self.players.len() as f32;

        let expected_spawns = (elapsed_s * rate) as u32;
        if expected_spawns > self.spawn_count {
            self.spawn_asteroid().await;
        }

        self.evaluate_impacts().await;
        true
    }

    async fn spawn_asteroid(&mut self) {
        let (x, y, time_until_impact_ms, health) = {
            let mut rng = rand::rng();
            let x = rng.random::<f32>() * 0.9 + 0.1;
            let y = rng.random::<f32>() * 0.9 + 0.1;
            let impact_span =
                self.settings.max_time_till_impact_s - self.settings.min_time_till_impact_s;
            let time_until_impact_ms =
                (rng.random::<f32>() * impact_span + self.settings.min_time_till_impact_s)
                    * 1000.0;
            let health = (self.settings.asteroid_max_health as f64 * rng.random::<f64>())
                .ceil()
                .max(1.0) as u8;
            (x, y, time_until_impact_ms, health)
        };

        let id = self.next_asteroid_id;
        self.next_asteroid_id += 1;

        let data = AsteroidSpawn {
            id,
            x,
            y,
            health,
            time_until_impact: time_until_impact_ms as u32,
            asteroid_type: 0,
            char_code: self.codes.next(),
        };

        let message = serialize(&data);
        self.asteroids.insert(
            id,
            ActiveAsteroid {
                data,
                spawned_at: Instant::now(),
            },
        );
        self.spawn_count += 1;
        self.lobby.broadcast(SERVER_ID, message).await;
    }

    /// Applies damage for every asteroid whose flight time is up.
    async fn evaluate_impacts(&mut self) {
        let due: Vec<u32> = self
            .asteroids
            .iter()
            .filter(|(_, a)| {
                a.spawned_at.elapsed().as_millis() as u32 >= a.data.time_until_impact
            })
            .map(|(id, _)| *id)
            .collect();

        for id in due {
            let Some(asteroid) = self.asteroids.remove(&id) else {
                continue;
            };
            self.colony_hp -= asteroid.data.health as i64;
            self.codes.free(asteroid.data.char_code);

            let message = serialize(&AsteroidImpact {
                id,
                colony_hp_left: self.colony_hp.max(0) as u32,
            });
            self.lobby.broadcast(SERVER_ID, message).await;
        }
    }

    async fn handle_entry(&mut self, entry: PostProcessEntry<C>) {
        if entry.spec.id != PLAYER_SHOOT_EVENT.id {
            return;
        }
        match deserialize::<PlayerShoot>(&entry.remainder, true) {
            Ok(shot) => self.on_player_shot(shot).await,
            Err(e) => {
                let _ = entry
                    .client
                    .send_debug(500, &format!("invalid shoot payload: {e}"))
                    .await;
            }
        }
    }

    /// Resolves one shot: damage every asteroid carrying the code, issue
    /// a friendly-fire penalty per player carrying it, and a miss penalty
    /// when nothing was hit.
    async fn on_player_shot(&mut self, shot: PlayerShoot) {
        let mut something_was_hit = false;
        let mut destroyed = Vec::new();
        for (id, asteroid) in self.asteroids.iter_mut() {
            if asteroid.data.char_code == shot.char_code {
                something_was_hit = true;
                asteroid.data.health = asteroid.data.health.saturating_sub(1);
                if asteroid.data.health == 0 {
                    destroyed.push(*id);
                }
            }
        }
        for id in destroyed {
            if let Some(asteroid) = self.asteroids.remove(&id) {
                self.codes.free(asteroid.data.char_code);
            }
        }

        // Hit-stun on the struck ally is applied client side; the shooter
        // pays an escalating timeout.
        let struck: Vec<ClientId> = self
            .players
            .iter()
            .filter(|p| p.char_code == shot.char_code)
            .map(|p| p.id)
            .collect();
        for ally in struck {
            let count = self
                .friendly_fire_counts
                .entry(ally)
                .and_modify(|c| *c += 1)
                .or_insert(1);
            let timeout = self.settings.friendly_fire_penalty_s as f64
                * (self.settings.friendly_fire_penalty_multiplier as f64).powi(*count as i32);
            let message = serialize(&PlayerPenalty {
                player_id: shot.player_id,
                timeout_duration_s: timeout as f32,
                penalty_type: PENALTY_TYPE_FRIENDLY_FIRE.to_string(),
            });
            self.lobby.broadcast(SERVER_ID, message).await;
        }

        if !something_was_hit {
            let message = serialize(&PlayerPenalty {
                player_id: shot.player_id,
                timeout_duration_s: self.settings.time_between_shots_s,
                penalty_type: PENALTY_TYPE_MISS.to_string(),
            });
            self.lobby.broadcast(SERVER_ID, message).await;
        }
    }

    fn falling_edge(&self) {
        tracing::info!(lobby = %self.lobby.id, "asteroids falling edge");
    }
}
