//! The acquisition batch command.

use std::path::PathBuf;

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::runtime::Runtime;

use crate::acquisition::CancelToken;
use crate::backend::YtDlp;
use crate::catalog::{CatalogOptions, CatalogSearch, SpotifyCatalog, TrackFileCatalog};
use crate::config::Config;
use crate::dedup::DedupIndex;
use crate::library;
use crate::metadata::{LoftyProbe, LoftyTagWriter};
use crate::model::TrackReference;
use crate::pipeline::{Collaborators, Pipeline, Preview, TrackOutcome};

use super::preflight;

/// Options of the `fetch` command
#[derive(Debug, Clone, Default)]
pub struct FetchArgs {
    pub keyword: Option<String>,
    pub tracks: Option<PathBuf>,
    pub max_tracks: Option<usize>,
    pub dry_run: bool,
}

/// Fetch catalog references and acquire each one
pub fn cmd_fetch(rt: &Runtime, mut config: Config, args: FetchArgs) -> anyhow::Result<()> {
    let keyword = apply_overrides(&mut config, &args);

    rt.block_on(preflight(&config, args.tracks.is_none()))?;

    rt.block_on(run_fetch(config, args, keyword))
}

/// Apply command-line overrides to `config` and return the catalog keyword.
fn apply_overrides(config: &mut Config, args: &FetchArgs) -> String {
    if let Some(max) = args.max_tracks {
        config.profile.max_tracks = max;
    }
    args.keyword
        .clone()
        .unwrap_or_else(|| config.profile.keyword.clone())
}

async fn run_fetch(config: Config, args: FetchArgs, keyword: String) -> anyhow::Result<()> {
    let save_dir = config.profile.save_dir.clone();
    let bounds = config.duration.bounds();

    let mut index = DedupIndex::load(&config.log_path());
    if config.index.seed_from_library && save_dir.is_dir() {
        index.seed_from_library(&save_dir, bounds, &LoftyProbe);
    }
    println!("Index: {} tracks already downloaded", index.len());

    let options = CatalogOptions::from_config(&config);
    let catalog: Box<dyn CatalogSearch> = match &args.tracks {
        Some(path) => Box::new(TrackFileCatalog::new(path, options)),
        None => Box::new(SpotifyCatalog::new(&config.credentials, options)?),
    };
    let references = catalog.find_tracks(&keyword).await?;
    println!("Found {} tracks for {:?}", references.len(), keyword);
    if references.is_empty() {
        return Ok(());
    }

    let ytdlp = YtDlp::new(&config.download);
    let library = library::from_config(&config.library);
    let collaborators = Collaborators {
        search: &ytdlp,
        downloader: &ytdlp,
        probe: &LoftyProbe,
        tagger: &LoftyTagWriter,
        library: library.as_ref(),
    };

    let cancel = CancelToken::new();
    let watcher = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, finishing current step");
                cancel.cancel();
            }
        }
    });

    let mut pipeline = Pipeline::new(&config, index, collaborators, cancel)?;

    if args.dry_run {
        println!("\n[DRY RUN MODE - nothing will be downloaded]\n");
        for reference in &references {
            print_preview(reference, &pipeline.preview(reference).await);
        }
        watcher.abort();
        return Ok(());
    }

    std::fs::create_dir_all(&save_dir)
        .with_context(|| format!("creating save directory {:?}", save_dir))?;

    let pb = create_progress_bar(references.len() as u64);
    let report = pipeline
        .run_batch(&references, |reference, outcome| {
            pb.set_message(reference.to_string());
            if let TrackOutcome::Acquired { file, .. } = outcome {
                pb.println(format!("✓ {} -> {:?}", reference, file.path));
            }
            pb.inc(1);
        })
        .await;
    pb.finish_and_clear();
    watcher.abort();

    if let Err(e) = pipeline.flush() {
        tracing::warn!("Failed to persist index: {}", e);
    }

    println!();
    for error in report.errors() {
        println!("✗ {}", error);
    }
    let unprocessed: Vec<_> = report
        .results
        .iter()
        .filter(|r| r.outcome == TrackOutcome::Cancelled)
        .collect();
    if !unprocessed.is_empty() {
        println!("Not processed (cancelled):");
        for result in unprocessed {
            println!("  {}", result.reference);
        }
    }
    println!("Completed: {}", report);
    Ok(())
}

fn print_preview(reference: &TrackReference, preview: &Preview) {
    println!("{}", reference);
    for (i, query) in preview.queries.iter().enumerate() {
        println!("  query {}: {}", i + 1, query);
    }
    match &preview.query {
        Some(query) => {
            println!("  candidates for {:?}:", query);
            for ranked in &preview.ranked {
                println!(
                    "    {:>6.2}  {} [{}s] / {}",
                    ranked.score,
                    ranked.candidate.title,
                    ranked.candidate.duration_seconds,
                    ranked.candidate.channel
                );
            }
        }
        None => println!("  no acceptable candidates"),
    }
    println!();
}

fn create_progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg:40!} [{elapsed_precise}] [{bar:30.cyan/blue}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    pb
}
