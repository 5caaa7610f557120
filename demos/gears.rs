//! Windowed three-gear benchmark.
//!
//! Arrow keys rotate the view, `Z`/`Shift+Z` roll it, `A` toggles the
//! animation, `V` toggles the frame rate report, `I` prints context info and
//! `Escape` quits.
//!
//! ```text
//! GEARS_VERBOSE=1 cargo run --example gears
//! ```

use gears::{GearsApp, GearsConfig};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = GearsConfig::from_env().with_title("Gears");
    GearsApp::new(config)?.run()?;
    Ok(())
}
