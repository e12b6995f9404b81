pub mod resolver;
pub mod wait;

pub use resolver::{ResolveOptions, Resolver};
pub use wait::{poll_until, CancelSource, CancelToken, PollError, PollOptions};
