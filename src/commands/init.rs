use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::db::Database;

pub fn run(cwd: &Path) -> Result<()> {
    let cardflow_dir = cwd.join(".cardflow");

    if cardflow_dir.exists() {
        bail!("Already initialized: {} exists", cardflow_dir.display());
    }

    fs::create_dir(&cardflow_dir).context("Failed to create .cardflow directory")?;

    // Opening creates the schema
    Database::open(&cardflow_dir.join("cards.db")).context("Failed to initialize database")?;
    Config::default().save(&cardflow_dir)?;

    println!("Initialized cardflow in {}", cardflow_dir.display());
    println!("Next: 'cardflow meeting new \"<title>\"' and 'cardflow create <meeting> \"<summary>\"'.");
    Ok(())
}
