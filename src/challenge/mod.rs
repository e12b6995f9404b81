pub mod detectors;
pub mod monitor;

pub use detectors::{ChallengeDetector, ChallengeKind};
pub use monitor::{ChallengeFlags, ChallengeMonitor};
