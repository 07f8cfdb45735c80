mod config;
mod walk;

use std::env;
use std::path::PathBuf;

use config::{config_path_from_env, load_or_create_config, resolve_music_root};
use metadata::{stamp_unique_id, IdStamp};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use walk::{audio_files, is_mpeg_file};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = config_path_from_env();
    let (config, _) = load_or_create_config(&config_path)?;
    let music_root = env::args()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| resolve_music_root(&config_path, &config.music_root))
        .ok_or("music_root not configured and no path argument")?;

    let files: Vec<PathBuf> = audio_files(&music_root)
        .into_iter()
        .filter(|path| is_mpeg_file(path))
        .collect();
    info!("Stamping ids into {} MP3 files under {:?}", files.len(), music_root);

    let (mut added, mut existing, mut skipped) = (0usize, 0usize, 0usize);
    for file in files {
        match stamp_unique_id(&file) {
            Ok(IdStamp::Added(id)) => {
                info!("Added {} to {:?}", id, file);
                added += 1;
            }
            Ok(IdStamp::Existing(id)) => {
                debug!("{:?} already has {}", file, id);
                existing += 1;
            }
            Ok(IdStamp::MissingArtistOrTitle) => {
                warn!("No artist or title in {:?}; left without an id", file);
                skipped += 1;
            }
            Err(err) => {
                warn!("Failed to stamp {:?}: {}", file, err);
                skipped += 1;
            }
        }
    }

    println!(
        "Added {} ids, {} already present, {} skipped",
        added, existing, skipped
    );
    Ok(())
}
