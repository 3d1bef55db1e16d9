//! Create command - register cases without mounting them.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;

use ensfs_core::{FsManager, ManagerConfig};

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Case names to register
    #[arg(required = true)]
    pub cases: Vec<String>,
}

pub fn execute(root: &Path, config: &ManagerConfig, args: &Args) -> Result<()> {
    let manager = FsManager::open(root, config.clone())
        .with_context(|| format!("failed to open ensemble root {}", root.display()))?;
    for name in &args.cases {
        let path = manager.registry().register(name)?;
        println!("Registered case {name} at {}", path.display());
    }
    Ok(())
}
