//! Target game: a rules countdown, then a timed round of touching targets with
//! the wrist. Every hit asks for an open-palm hold that is saved as an
//! embedding before play resumes.

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::landmarks::{evaluate::DEFAULT_OPEN_PALM_THRESHOLD, is_palm_open, HandFrame};

use super::state::{
    ceil_secs, progress, CaptureMachine, CaptureMode, CaptureSnapshot, HoldBuffer, PhaseClock,
    SaveRequest,
};

pub const MOBILE_TARGET_RADIUS: f64 = 0.12;
pub const DESKTOP_TARGET_RADIUS: f64 = 0.07;

pub const STATUS_PRESS_START: &str = "Press start to play";
pub const STATUS_RULES: &str = "Touch the targets with your wrist, then hold an open palm";
pub const STATUS_SHOW_HAND: &str = "Show your hand to the camera";
pub const STATUS_HUNT: &str = "Move your wrist onto the target";
pub const STATUS_OPEN_PALM: &str = "Hit! Hold your palm open";
pub const STATUS_PALM_CLOSED: &str = "Open your palm wider";
pub const STATUS_RETRY: &str = "No hand detected, try again";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum GamePhase {
    Idle,
    Rules,
    Game,
    PostHit,
    Finished,
}

/// Source of uniform values in `[0, 1)` for target placement.
pub trait TargetSampler: Send {
    fn next_unit(&mut self) -> f64;
}

pub struct RandomSampler {
    rng: StdRng,
}

impl RandomSampler {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetSampler for RandomSampler {
    fn next_unit(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Target {
    pub x: f64,
    pub y: f64,
}

impl Target {
    fn sample(sampler: &mut dyn TargetSampler) -> Self {
        let x = sampler.next_unit();
        let y = sampler.next_unit();
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GameConfig {
    pub rules_ms: u64,
    pub game_ms: u64,
    pub hold_ms: u64,
    pub target_radius: f64,
    pub open_palm_threshold: f64,
    /// Countdown shown before the rules timer has a reading.
    pub rules_placeholder_secs: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            rules_ms: 10_000,
            game_ms: 60_000,
            hold_ms: 5_000,
            target_radius: DESKTOP_TARGET_RADIUS,
            open_palm_threshold: DEFAULT_OPEN_PALM_THRESHOLD,
            rules_placeholder_secs: 7,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub phase: GamePhase,
    pub progress: f64,
    pub status: String,
    pub phase_started_ms: u64,
    pub hold_frames: usize,
    pub score: u32,
    pub target: Target,
    pub rules_countdown_secs: u64,
    pub remaining_game_secs: u64,
}

pub struct GameSession {
    config: GameConfig,
    sampler: Box<dyn TargetSampler>,
    phase: GamePhase,
    clock: PhaseClock,
    game_clock: PhaseClock,
    buffer: HoldBuffer,
    progress: f64,
    status: String,
    score: u32,
    target: Target,
    rules_countdown_secs: u64,
    remaining_game_secs: u64,
}

impl GameSession {
    pub fn new(config: GameConfig, sampler: Box<dyn TargetSampler>, now_ms: u64) -> Self {
        Self {
            phase: GamePhase::Idle,
            clock: PhaseClock::new(now_ms),
            game_clock: PhaseClock::new(now_ms),
            buffer: HoldBuffer::new(),
            progress: 0.0,
            status: STATUS_PRESS_START.to_string(),
            score: 0,
            target: Target { x: 0.5, y: 0.5 },
            rules_countdown_secs: config.rules_placeholder_secs,
            remaining_game_secs: ceil_secs(config.game_ms),
            config,
            sampler,
        }
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn target(&self) -> Target {
        self.target
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn hold_frames(&self) -> usize {
        self.buffer.len()
    }

    pub fn phase_started_ms(&self) -> u64 {
        self.clock.started_at()
    }

    pub fn rules_countdown_secs(&self) -> u64 {
        self.rules_countdown_secs
    }

    pub fn remaining_game_secs(&self) -> u64 {
        self.remaining_game_secs
    }

    fn restart_hold(&mut self, now_ms: u64) {
        self.clock.reset(now_ms);
        self.buffer.clear();
        self.progress = 0.0;
    }

    fn enter_game(&mut self, now_ms: u64) {
        self.phase = GamePhase::Game;
        self.clock.reset(now_ms);
        self.game_clock.reset(now_ms);
        self.remaining_game_secs = ceil_secs(self.config.game_ms);
        self.target = Target::sample(self.sampler.as_mut());
        self.status = STATUS_HUNT.to_string();
    }

    fn resume_game(&mut self, now_ms: u64, status: &str) {
        self.phase = GamePhase::Game;
        self.restart_hold(now_ms);
        self.status = status.to_string();
    }

    fn tick_rules(&mut self, hand: Option<&HandFrame>, now_ms: u64) {
        if hand.is_none() {
            self.rules_countdown_secs = self.config.rules_placeholder_secs;
            self.status = STATUS_SHOW_HAND.to_string();
            return;
        }

        let elapsed = self.clock.elapsed(now_ms);
        let remaining = self.config.rules_ms.saturating_sub(elapsed);
        self.rules_countdown_secs = ceil_secs(remaining);
        self.status = STATUS_RULES.to_string();
        if elapsed >= self.config.rules_ms {
            self.enter_game(now_ms);
        }
    }

    fn tick_game(&mut self, hand: Option<&HandFrame>, now_ms: u64) {
        let game_elapsed = self.game_clock.elapsed(now_ms);
        self.remaining_game_secs = ceil_secs(self.config.game_ms.saturating_sub(game_elapsed));
        if game_elapsed > self.config.game_ms {
            self.phase = GamePhase::Finished;
            self.clock.reset(now_ms);
            self.status = format!("Time's up! Final score: {}", self.score);
            return;
        }

        let Some(hand) = hand else {
            self.status = STATUS_SHOW_HAND.to_string();
            return;
        };

        let distance = hand.wrist().planar_distance(self.target.x, self.target.y);
        if distance < self.config.target_radius {
            self.score += 1;
            self.target = Target::sample(self.sampler.as_mut());
            self.phase = GamePhase::PostHit;
            self.restart_hold(now_ms);
            self.status = STATUS_OPEN_PALM.to_string();
        } else {
            self.status = STATUS_HUNT.to_string();
        }
    }

    fn tick_post_hit(&mut self, hand: Option<&HandFrame>, now_ms: u64) -> Option<SaveRequest> {
        let hand = match hand {
            Some(hand) if is_palm_open(Some(hand), self.config.open_palm_threshold) => hand,
            _ => {
                self.restart_hold(now_ms);
                self.status = STATUS_PALM_CLOSED.to_string();
                return None;
            }
        };

        self.buffer.push(hand.clone());
        let elapsed = self.clock.elapsed(now_ms);
        self.progress = progress(elapsed, self.config.hold_ms);
        if elapsed < self.config.hold_ms {
            self.status = STATUS_OPEN_PALM.to_string();
            return None;
        }

        // The frame above is already buffered; an empty buffer only shows up
        // as a retry if that ordering ever changes.
        match self.buffer.take_embedding() {
            Ok(request) => {
                self.resume_game(now_ms, STATUS_HUNT);
                Some(request)
            }
            Err(_) => {
                self.resume_game(now_ms, STATUS_RETRY);
                None
            }
        }
    }
}

impl CaptureMachine for GameSession {
    fn mode(&self) -> CaptureMode {
        CaptureMode::Game
    }

    fn start(&mut self, now_ms: u64) {
        if self.phase != GamePhase::Idle {
            return;
        }
        self.phase = GamePhase::Rules;
        self.clock.reset(now_ms);
        self.rules_countdown_secs = self.config.rules_placeholder_secs;
        self.status = STATUS_RULES.to_string();
    }

    fn reset(&mut self, now_ms: u64) {
        self.phase = GamePhase::Idle;
        self.restart_hold(now_ms);
        self.game_clock.reset(now_ms);
        self.score = 0;
        self.rules_countdown_secs = self.config.rules_placeholder_secs;
        self.remaining_game_secs = ceil_secs(self.config.game_ms);
        self.status = STATUS_PRESS_START.to_string();
    }

    fn tick(
        &mut self,
        hand: Option<&HandFrame>,
        _frame_size: (u32, u32),
        now_ms: u64,
    ) -> Option<SaveRequest> {
        match self.phase {
            GamePhase::Idle | GamePhase::Finished => None,
            GamePhase::Rules => {
                self.tick_rules(hand, now_ms);
                None
            }
            GamePhase::Game => {
                self.tick_game(hand, now_ms);
                None
            }
            GamePhase::PostHit => self.tick_post_hit(hand, now_ms),
        }
    }

    fn snapshot(&self) -> CaptureSnapshot {
        CaptureSnapshot::Game(GameSnapshot {
            phase: self.phase,
            progress: self.progress,
            status: self.status.clone(),
            phase_started_ms: self.clock.started_at(),
            hold_frames: self.buffer.len(),
            score: self.score,
            target: self.target,
            rules_countdown_secs: self.rules_countdown_secs,
            remaining_game_secs: self.remaining_game_secs,
        })
    }

    fn set_status(&mut self, status: String) {
        self.status = status;
    }

    fn is_finished(&self) -> bool {
        self.phase == GamePhase::Finished
    }
}
