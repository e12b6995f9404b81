pub mod cdp;
pub mod dom;
pub mod driver;
pub mod inject;

pub use cdp::{CdpPage, LaunchOptions};
pub use dom::{NodeId, NodeSnapshot, Viewport};
pub use driver::{DynPage, MediaState, PageDriver, SelectorKind};
