use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::path::Path;

mod lenient;

/// Prefix of identifiers derived from artist and title when a file carries
/// no embedded unique-file id.
pub const FINGERPRINT_PREFIX: &str = "esp-";

/// The normalized, comparable form of one track's metadata at one point in
/// time. Absent fields are `None` and are omitted when serialized, so an
/// absent value never round-trips as an empty string. Stored rows may carry
/// numbers where text is expected (`"bpm": 125`); those read back as their
/// text form so they compare equal to freshly normalized values.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanonicalRecord {
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub additional_artists: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub original_artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub remixer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub album: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub original_album: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub genre: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub publisher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub file_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub release_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub recording_date: Option<String>,
    /// Camelot notation, e.g. `8A`.
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub starting_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub bpm: Option<String>,
    /// `m:ss`
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub user_comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub user_comment_2: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        alias = "cover_art_md5",
        deserialize_with = "lenient::text"
    )]
    pub cover_art_digest: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        alias = "stars",
        deserialize_with = "lenient::count"
    )]
    pub rating_stars: Option<u8>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        alias = "search",
        deserialize_with = "lenient::text"
    )]
    pub search_key: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        alias = "rev",
        deserialize_with = "lenient::count"
    )]
    pub revision: Option<u32>,
}

impl CanonicalRecord {
    /// Every present field as `(name, stringified value)`, in declaration
    /// order.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let text = [
            ("id", &self.id),
            ("title", &self.title),
            ("artist", &self.artist),
            ("additional_artists", &self.additional_artists),
            ("original_artist", &self.original_artist),
            ("remixer", &self.remixer),
            ("album", &self.album),
            ("original_album", &self.original_album),
            ("genre", &self.genre),
            ("label", &self.label),
            ("publisher", &self.publisher),
            ("file_type", &self.file_type),
            ("release_date", &self.release_date),
            ("recording_date", &self.recording_date),
            ("starting_key", &self.starting_key),
            ("bpm", &self.bpm),
            ("duration", &self.duration),
            ("user_comment", &self.user_comment),
            ("user_comment_2", &self.user_comment_2),
            ("cover_art_digest", &self.cover_art_digest),
        ];

        let mut out: Vec<(&'static str, String)> = text
            .into_iter()
            .filter_map(|(name, value)| value.as_ref().map(|v| (name, v.clone())))
            .collect();
        if let Some(stars) = self.rating_stars {
            out.push(("rating_stars", stars.to_string()));
        }
        if let Some(search_key) = &self.search_key {
            out.push(("search_key", search_key.clone()));
        }
        if let Some(revision) = self.revision {
            out.push(("revision", revision.to_string()));
        }
        out
    }

    pub fn with_revision(mut self, revision: u32) -> Self {
        self.revision = Some(revision);
        self
    }
}

/// A stored version of a track: the record as persisted plus its effective
/// revision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistorySnapshot {
    pub revision: u32,
    pub record: CanonicalRecord,
}

/// A record accepted by a catalog run, decorated for renderers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CatalogEntry {
    #[serde(flatten)]
    pub record: CanonicalRecord,
    pub rating_display: String,
    pub key_bpm: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Identifier for a track without an embedded id, derived from artist and
/// title: the first eight hex digits of SHA-1 over `artist|title`, the same
/// value stamped into UFID frames.
pub fn fingerprint_id(artist: &str, title: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(artist.as_bytes());
    hasher.update(b"|");
    hasher.update(title.as_bytes());
    let hash = hex::encode(hasher.finalize());
    format!("{}{}", FINGERPRINT_PREFIX, &hash[..8])
}

/// Hex content hash of binary cover art.
pub fn content_digest(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

pub fn rating_display(stars: u8) -> String {
    "★".repeat(usize::from(stars))
}

pub fn relpath_from(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    Some(path_to_slash_string(rel))
}

fn path_to_slash_string(path: &Path) -> String {
    let parts: Vec<String> = path
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    parts.join("/")
}
