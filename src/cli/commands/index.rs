//! Dedup index commands.

use crate::canonical;
use crate::config::Config;
use crate::dedup::DedupIndex;
use crate::metadata::LoftyProbe;

/// Print the stored keys
pub fn cmd_index_show(config: &Config) -> anyhow::Result<()> {
    let path = config.log_path();
    let index = DedupIndex::load(&path);
    println!("{} keys in {:?}", index.len(), path);
    for key in index.sorted_keys() {
        println!("  {}", key);
    }
    Ok(())
}

/// Add verified files from the save directory and persist
pub fn cmd_index_seed(config: &Config) -> anyhow::Result<()> {
    config.validate()?;
    let root = &config.profile.save_dir;
    if !root.is_dir() {
        anyhow::bail!("save directory {:?} does not exist", root);
    }

    let path = config.log_path();
    let mut index = DedupIndex::load(&path);
    let added = index.seed_from_library(root, config.duration.bounds(), &LoftyProbe);
    index.flush(&path)?;
    println!("Added {} keys ({} total) to {:?}", added, index.len(), path);
    Ok(())
}

/// Print the canonical key for an artist and title
pub fn cmd_index_key(artist: &str, title: &str) -> anyhow::Result<()> {
    println!("{}", canonical::canonical_key(artist, title));
    Ok(())
}
