pub mod classify;
pub mod recorder;

pub use recorder::{Recorder, RecorderConfig};
