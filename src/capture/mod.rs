//! Capture state machines and the frame loop that drives them.

pub mod controller;
pub mod game;
pub mod guided;
mod loop_worker;
pub mod state;

pub use controller::CaptureController;
pub use game::{GameConfig, GameSession, RandomSampler, TargetSampler};
pub use guided::{GuidedCapture, GuidedConfig};
pub use loop_worker::{ControlCommand, LoopSettings, SessionSummary};
pub use state::{CaptureMachine, CaptureMode, CaptureSnapshot, SaveRequest};
