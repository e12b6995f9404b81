//! Script playback: the action loop, challenge handling and automatic
//! verification-code entry.

mod otp_entry;
mod player;

pub use otp_entry::enter_code;
pub use player::{Player, PlayerConfig, PlaybackOutcome};
