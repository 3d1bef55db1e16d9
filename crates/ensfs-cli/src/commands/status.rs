//! Status command - show registry contents and cache configuration.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use comfy_table::{Table, presets::UTF8_FULL_CONDENSED};
use serde::Serialize;

use ensfs_core::{FsManager, ManagerConfig};

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// JSON output format for status command
#[derive(Serialize)]
struct StatusInfo {
    root: String,
    storage: String,
    capacity: usize,
    registered_cases: Vec<String>,
}

pub fn execute(root: &Path, config: &ManagerConfig, args: &Args) -> Result<()> {
    let manager = FsManager::open(root, config.clone())
        .with_context(|| format!("failed to open ensemble root {}", root.display()))?;
    let cases = manager.registry().list();

    if args.json {
        let info = StatusInfo {
            root: manager.root().display().to_string(),
            storage: manager.registry().storage_path().display().to_string(),
            capacity: manager.capacity(),
            registered_cases: cases,
        };
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec!["Property", "Value"]);
    table.add_row(vec!["Root".to_string(), manager.root().display().to_string()]);
    table.add_row(vec![
        "Storage".to_string(),
        manager.registry().storage_path().display().to_string(),
    ]);
    table.add_row(vec!["Capacity".to_string(), manager.capacity().to_string()]);
    table.add_row(vec!["Registered cases".to_string(), cases.len().to_string()]);
    table.add_row(vec!["Cases".to_string(), cases.join(", ")]);
    println!("{table}");
    Ok(())
}
