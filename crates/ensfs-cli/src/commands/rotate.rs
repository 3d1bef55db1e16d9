//! Rotate command - mount cases, then force one eviction pass.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;

use ensfs_core::{FsManager, ManagerConfig};

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Cases to mount before rotating
    pub cases: Vec<String>,
}

pub fn execute(root: &Path, config: &ManagerConfig, args: &Args) -> Result<()> {
    let manager = FsManager::open(root, config.clone())
        .with_context(|| format!("failed to open ensemble root {}", root.display()))?;

    for name in &args.cases {
        manager
            .get_file_system(name)
            .with_context(|| format!("failed to mount case {name}"))?;
    }

    match manager.rotate()? {
        Some(name) => println!("Evicted {name}"),
        None => println!("Nothing to evict"),
    }
    println!("{} resident", manager.file_system_count());
    Ok(())
}
