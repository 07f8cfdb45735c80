mod config;
mod walk;

use std::env;
use std::path::PathBuf;

use chrono::Utc;
use common::relpath_from;
use config::{config_path_from_env, load_or_create_config, resolve_music_root, resolve_path};
use history::{batch_name, select_entries, write_entries, CatalogRun, VersionStore};
use metadata::{read_raw_tags, RawTagMapping};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use walk::audio_files;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = config_path_from_env();
    let (config, created) = load_or_create_config(&config_path)?;
    if created {
        info!("Created default config at {:?}", config_path);
    } else {
        info!("Loaded config from {:?}", config_path);
    }

    let music_root = env::args()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| resolve_music_root(&config_path, &config.music_root))
        .ok_or("music_root not configured and no path argument")?;
    let history_dir = resolve_path(&config_path, &config.history_dir);

    let store = VersionStore::load(&history_dir, config.corrupt_batch_policy)?;
    let stats = store.stats();
    info!(
        "History: {} tracks, {} versions in {} batches",
        stats.tracks, stats.snapshots, stats.batches
    );

    let files = audio_files(&music_root);
    info!("Found {} audio files under {:?}", files.len(), music_root);

    let batch = store.next_batch_name(&batch_name(Utc::now()));
    let mut run = CatalogRun::new(store, config.key_notation);
    for file in files {
        let source = relpath_from(&music_root, &file)
            .unwrap_or_else(|| file.to_string_lossy().to_string());
        let raw = match read_raw_tags(&file) {
            Ok(raw) => raw,
            Err(err) => {
                warn!("Failed to read tags for {:?}: {}", file, err);
                RawTagMapping::default()
            }
        };
        run.process(raw, Some(source.as_str()))?;
    }

    let (summary, entries) = run.finish(&batch)?;

    if let Some(output) = config.output_path.as_deref() {
        let selected = select_entries(&entries, config.min_stars);
        let output_path = resolve_path(&config_path, output);
        let written = write_entries(&output_path, &selected)?;
        println!(
            "Selected {} of {} new versions rated {}+ stars into {:?}",
            written,
            entries.len(),
            config.min_stars,
            output_path
        );
    }

    println!("{}", summary);
    Ok(())
}
