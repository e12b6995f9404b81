pub mod health;
pub mod recording;
pub mod replay;
pub mod scripts;

use crate::browser::cdp::LaunchOptions;
use crate::browser::dom::Viewport;
use crate::config::Config;

/// Request overrides win; the config fills the gaps.
fn launch_options(
    config: &Config,
    url: &str,
    headless: Option<bool>,
    viewport: Option<Viewport>,
) -> LaunchOptions {
    let mut options = LaunchOptions::new(url, headless.unwrap_or(config.headless));
    if let Some(viewport) = viewport {
        options.viewport = viewport;
    }
    options
}
