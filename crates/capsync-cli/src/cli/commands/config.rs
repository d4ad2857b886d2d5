//! `capsync config` – show where the config lives and what it resolves to.

use anyhow::Result;
use capsync_core::config::CapsyncConfig;
use std::path::Path;

pub fn run_config(cfg: &CapsyncConfig, path: &Path) -> Result<()> {
    println!("# {}", path.display());
    print!("{}", cfg.to_toml()?);
    Ok(())
}
