pub mod action;
pub mod event;
pub mod requests;
pub mod responses;
pub mod script;
pub mod session;

pub use action::{Action, ActionKind, ElementHints, WireAction};
pub use event::{PageEvent, PageEventKind, TargetInfo};
pub use script::Script;
pub use session::{PlaybackState, RecordingState, RecordingStatus};
