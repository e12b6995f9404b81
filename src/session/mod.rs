//! Session bookkeeping shared by the recording and playback hosts.

mod registry;

pub use registry::SessionRegistry;
