//! Init command - create the storage directory for an ensemble root.

use std::path::Path;

use anyhow::{Context, Result};

use ensfs_core::{FsManager, ManagerConfig};

pub fn execute(root: &Path, config: &ManagerConfig) -> Result<()> {
    let manager = FsManager::open(root, config.clone())
        .with_context(|| format!("failed to initialize ensemble root {}", root.display()))?;
    println!("Initialized ensemble root at {}", manager.root().display());
    println!("Case storage: {}", manager.registry().storage_path().display());
    Ok(())
}
