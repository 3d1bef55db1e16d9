//! List command - show registered cases.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use comfy_table::{Table, presets::UTF8_FULL_CONDENSED};

use ensfs_core::{FsManager, ManagerConfig};

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn execute(root: &Path, config: &ManagerConfig, args: &Args) -> Result<()> {
    let manager = FsManager::open(root, config.clone())
        .with_context(|| format!("failed to open ensemble root {}", root.display()))?;
    let cases = manager.registry().list();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&cases)?);
        return Ok(());
    }

    if cases.is_empty() {
        println!("No cases registered under {}", root.display());
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec!["Case", "Storage"]);
    for name in &cases {
        table.add_row(vec![
            name.clone(),
            manager.registry().case_root(name).display().to_string(),
        ]);
    }
    println!("{table}");
    Ok(())
}
