use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Audio files under `root`, sorted by path.
pub fn audio_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
    {
        let path = entry.path();
        if entry.file_type().is_file() && is_audio_file(path) {
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    files
}

pub fn is_audio_file(path: &Path) -> bool {
    let ext = match path.extension() {
        Some(ext) => ext.to_string_lossy().to_ascii_lowercase(),
        None => return false,
    };
    matches!(ext.as_str(), "mp3" | "flac")
}

/// Files that can carry a UFID frame.
pub fn is_mpeg_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("mp3"))
        .unwrap_or(false)
}
