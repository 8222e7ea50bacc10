//! Pulsetrain Engine — hardware orchestration for trigger trains.
//!
//! Crate layout:
//! - [`driver`]  : the narrow output-hardware interface (traits)
//! - [`sim`]     : software-clocked simulation driver + test probe
//! - [`audio`]   : sound-card backend via cpal (feature `audio`)
//! - [`stop`]    : one-shot cooperative stop flag (flag + condvar)
//! - [`engine`]  : the generation state machine and safe shutdown
//! - [`session`] : spawn a run, poll status, collect the one outcome
//! - [`error`]   : hardware error taxonomy and terminal [`Outcome`]
//!
//! The engine deliberately keeps the hardware session on a single
//! thread for its whole life; the stop flag is the only datum shared
//! across the thread boundary, and the terminal outcome is emitted
//! strictly after the channel has been forced back to neutral.

#[cfg(feature = "audio")]
pub mod audio;
pub mod driver;
pub mod engine;
pub mod error;
pub mod session;
pub mod sim;
pub mod stop;

// Re-export some commonly used items to make downstream imports ergonomic.
pub use driver::{DriverError, OutputDriver, OutputSession, TimingMode, WaitStatus};
pub use engine::{EngineConfig, GenerationEngine};
pub use error::{EngineError, Outcome};
pub use session::{start, start_with_config, RunHandle, RunRecord};
pub use sim::{SimDriver, SimEvent, SimProbe};
pub use stop::StopToken;
