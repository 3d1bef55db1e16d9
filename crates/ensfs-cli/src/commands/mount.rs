//! Mount command - mount cases through the bounded cache, in order, and
//! report how the resident set rotates.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;

use ensfs_core::{FsManager, ManagerConfig, MountMode, MountPolicy};

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Case names to mount, in order
    #[arg(required = true)]
    pub cases: Vec<String>,

    /// Mount read-only (no writer lock)
    #[arg(long)]
    pub read_only: bool,

    /// Register unknown cases instead of failing
    #[arg(long)]
    pub create: bool,
}

pub fn execute(root: &Path, mut config: ManagerConfig, args: &Args) -> Result<()> {
    if args.read_only {
        config.mount_mode = MountMode::ReadOnly;
    }
    if args.create {
        config.mount_policy = MountPolicy::CreateOnDemand;
    }

    let manager = FsManager::open(root, config)
        .with_context(|| format!("failed to open ensemble root {}", root.display()))?;

    for name in &args.cases {
        let fs = manager
            .get_file_system(name)
            .with_context(|| format!("failed to mount case {name}"))?;
        println!(
            "Mounted {name} ({}) -> resident: {}",
            match fs.mode() {
                MountMode::ReadWrite => "read-write",
                MountMode::ReadOnly => "read-only",
            },
            manager.mounted_cases().join(", "),
        );
    }

    let stats = manager.stats();
    println!(
        "{} resident ({} mounted, {} evicted, hit rate {:.0}%)",
        manager.file_system_count(),
        stats.mounts,
        stats.evictions,
        stats.hit_rate() * 100.0,
    );
    Ok(())
}
