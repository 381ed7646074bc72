//! Save-directory cleanup command.

use tokio::runtime::Runtime;

use crate::backend::TagWriter;
use crate::canonical::normalize_remaster_title;
use crate::config::Config;
use crate::library::{self, ImportOutcome};
use crate::metadata::{LoftyProbe, LoftyTagWriter};
use crate::organizer;

/// Delete unusable files and optionally re-tag the rest
pub fn cmd_clean(rt: &Runtime, config: &Config, retag: bool) -> anyhow::Result<()> {
    config.validate()?;
    let root = &config.profile.save_dir;
    if !root.is_dir() {
        println!("Nothing to clean: {:?} does not exist", root);
        return Ok(());
    }

    let bounds = config.duration.bounds();
    println!("Cleaning {:?} (keeping {})...\n", root, bounds);
    let report = organizer::clean_folder(root, bounds, &LoftyProbe);

    for (path, seconds) in &report.removed {
        println!("REMOVED ({}s): {:?}", seconds, path);
    }
    for path in &report.failed {
        eprintln!("ERROR removing {:?}", path);
    }

    if retag {
        let library = library::from_config(&config.library);
        let (mut tagged, mut added) = (0, 0);
        rt.block_on(async {
            for path in &report.kept {
                let Some((artist, title)) = organizer::parse_artist_title(path, root) else {
                    tracing::debug!("Cannot derive artist/title from {:?}", path);
                    continue;
                };
                let title = normalize_remaster_title(&title);
                match LoftyTagWriter.write_tags(path, &config.profile.genre, &artist, &title) {
                    Ok(()) => tagged += 1,
                    Err(e) => eprintln!("ERROR tagging {:?}: {}", path, e),
                }
                if library::import_if_new(library.as_ref(), path, &artist, &title).await
                    == ImportOutcome::Added
                {
                    added += 1;
                }
            }
        });
        println!("\nRe-tagged {} files, {} added to library", tagged, added);
    }

    println!(
        "\nCompleted: {} kept, {} removed, {} errors",
        report.kept.len(),
        report.removed.len(),
        report.failed.len()
    );
    Ok(())
}
