use std::collections::BTreeMap;
use std::fmt;

use common::{content_digest, fingerprint_id, CanonicalRecord};
use tracing::{debug, warn};

pub mod keys;
mod tags;

pub use keys::KeyNotation;
pub use tags::{read_raw_tags, stamp_unique_id, IdStamp, MetadataError};

/// Popularimeter ratings are 0..=255; every 51 is one star.
const RATING_PER_STAR: u32 = 51;
const MAX_STARS: u32 = 5;
const MAX_RATING: u32 = 255;

const VARIOUS_ARTISTS: &str = "Various Artists";

/// Frames that are known not to carry catalog fields. Matched as
/// substrings so `APIC:Cover` and `PRIV:...` variants are covered.
const SKIP_FRAMES: &[&str] = &[
    "APIC",
    "PRIV",
    "TENC",
    "TSSE",
    "UFID",
    "WOAF",
    "WPUB",
    "TRCK",
    "POPM",
    "GEOB",
    "WCOM",
    "RVA2",
    "TPOS",
    "TCMP",
    "TCOM",
    "TXXX:ALBUM ARTIST",
    "TXXX:SERATO_PLAYCOUNT",
    "TXXX:TRACK_URL",
    "TXXX:LABEL_URL",
    "TXXX:FILEOWNER",
    "TXXX:BPM",
    "TXXX:YEAR",
    "TXXX:FILETYPE",
    "TXXX:INITIAL_KEY",
    "TXXX:RELEASE_TIME",
    "TXXX:RECORDING_DATE",
    "TXXX:ORGANIZATION",
];

const SEARCH_STRIP_CHARS: &[char] = &['(', ')', ',', '-', '&', '!', '\'', '\u{2019}'];
const SEARCH_STOP_WORDS: &[&str] = &["mix", "of", "a", "feat.", "i", "the"];

/// Tag data as handed over by a tag reader: frame id to text values, plus
/// the binary and numeric frames that are not text.
#[derive(Debug, Default, Clone)]
pub struct RawTagMapping {
    pub frames: BTreeMap<String, Vec<String>>,
    pub cover_art: Option<Vec<u8>>,
    pub rating: Option<u32>,
    pub duration_secs: Option<u64>,
}

impl RawTagMapping {
    pub fn insert(&mut self, frame: impl Into<String>, value: impl Into<String>) {
        self.frames
            .entry(frame.into())
            .or_default()
            .push(value.into());
    }

    pub fn with_frame(mut self, frame: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(frame, value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Degradation {
    MissingTitle,
    MissingArtist,
    MissingId,
    RatingOutOfRange(u32),
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Degradation::MissingTitle => write!(f, "missing title"),
            Degradation::MissingArtist => write!(f, "missing artist"),
            Degradation::MissingId => write!(f, "no identifier and nothing to derive one from"),
            Degradation::RatingOutOfRange(value) => write!(f, "rating {} out of range", value),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NormalizeReport {
    pub unextracted: Vec<String>,
    pub degradations: Vec<Degradation>,
}

impl NormalizeReport {
    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }
}

pub fn normalize(raw: RawTagMapping) -> CanonicalRecord {
    normalize_with_report(raw).0
}

pub fn normalize_with_report(raw: RawTagMapping) -> (CanonicalRecord, NormalizeReport) {
    let RawTagMapping {
        frames,
        cover_art,
        rating,
        duration_secs,
    } = raw;

    let mut reader = FrameReader { frames };
    let ufid = reader.take(&["UFID"]);
    let recording_code = reader.take(&["TSRC", "TXXX:ISRC"]);
    let mut draft = Draft {
        id: ufid.or(recording_code),
        title: reader.take(&["TIT2"]),
        artist: reader.take(&["TPE1", "TXXX:ALBUM ARTIST"]),
        additional_artists: reader.take(&["TPE2"]),
        original_artist: reader.take(&["TOPE"]),
        remixer: reader.take(&["TPE4", "TXXX:TraktorRemixer"]),
        album: reader.take(&["TALB"]),
        original_album: reader.take(&["TOAL"]),
        genre: reader.take(&["TCON"]),
        label: reader.take(&["TIT1", "TXXX:LABEL"]),
        publisher: reader.take(&["TPUB", "TXXX:ORGANIZATION"]),
        file_type: reader.take(&["TFLT", "TXXX:FILETYPE"]),
        release_year: reader.take(&["TDRL", "TXXX:YEAR"]),
        release_date: reader.take(&["TDOR", "TXXX:RELEASE_TIME"]),
        recording_date: reader.take(&["TDRC", "TXXX:RECORDING_DATE"]),
        starting_key: reader.take(&["TKEY", "TXXX:INITIAL_KEY"]),
        user_comment: reader.take(&["COMM::eng", "TXXX:COMMENT"]),
        user_comment_2: reader.take(&["COMM:ID3v1 Comment:eng"]),
        bpm: reader.take(&["TBPM", "TXXX:BPM"]),
    };

    let mut report = NormalizeReport {
        unextracted: reader.unextracted(),
        degradations: Vec::new(),
    };
    for frame in &report.unextracted {
        debug!("unextracted tag: '{}'", frame);
    }

    draft.drop_duplicates();
    draft.resolve_dates();
    if draft.label.is_none() {
        draft.label = draft.publisher.take();
    }
    draft.additional_artists = draft
        .additional_artists
        .take()
        .and_then(|value| split_additional_artists(&value, draft.artist.as_deref()));
    draft.starting_key = draft.starting_key.take().map(|key| keys::to_camelot(&key));

    if draft.id.is_none() {
        if let (Some(artist), Some(title)) = (&draft.artist, &draft.title) {
            draft.id = Some(fingerprint_id(artist, title));
        }
    }

    let rating = rating.unwrap_or(0);
    if rating > MAX_RATING {
        report.degradations.push(Degradation::RatingOutOfRange(rating));
    }
    let stars = (rating / RATING_PER_STAR).min(MAX_STARS) as u8;

    if draft.title.is_none() {
        report.degradations.push(Degradation::MissingTitle);
    }
    if draft.artist.is_none() {
        report.degradations.push(Degradation::MissingArtist);
    }
    if draft.id.is_none() {
        report.degradations.push(Degradation::MissingId);
    }
    for degradation in &report.degradations {
        warn!(
            "Degraded record {}: {}",
            draft.id.as_deref().unwrap_or("<no id>"),
            degradation
        );
    }

    let search_key = search_key(draft.title.as_deref(), draft.artist.as_deref());
    let record = CanonicalRecord {
        id: draft.id,
        title: draft.title,
        artist: draft.artist,
        additional_artists: draft.additional_artists,
        original_artist: draft.original_artist,
        remixer: draft.remixer,
        album: draft.album,
        original_album: draft.original_album,
        genre: draft.genre,
        label: draft.label,
        publisher: draft.publisher,
        file_type: draft.file_type,
        release_date: draft.release_date,
        recording_date: draft.recording_date,
        starting_key: draft.starting_key,
        bpm: draft.bpm,
        duration: duration_secs.and_then(format_duration),
        user_comment: draft.user_comment,
        user_comment_2: draft.user_comment_2,
        cover_art_digest: cover_art.as_deref().map(content_digest),
        rating_stars: Some(stars),
        search_key,
        revision: None,
    };

    (record, report)
}

/// Lowercased title and artist with punctuation and stop-words removed.
pub fn search_key(title: Option<&str>, artist: Option<&str>) -> Option<String> {
    if title.is_none() && artist.is_none() {
        return None;
    }
    let mut text = format!("{} {}", title.unwrap_or(""), artist.unwrap_or("")).to_lowercase();
    text.retain(|ch| !SEARCH_STRIP_CHARS.contains(&ch));

    let words: Vec<&str> = text
        .split_whitespace()
        .filter(|word| !SEARCH_STOP_WORDS.contains(word))
        .collect();
    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

struct FrameReader {
    frames: BTreeMap<String, Vec<String>>,
}

impl FrameReader {
    /// First non-empty value among `candidates`. Every candidate frame is
    /// consumed, including the fallbacks that lost.
    fn take(&mut self, candidates: &[&str]) -> Option<String> {
        let mut found = None;
        for key in candidates {
            if let Some(values) = self.frames.remove(*key) {
                if found.is_none() {
                    found = first_text(&values);
                }
            }
        }
        found
    }

    fn unextracted(&self) -> Vec<String> {
        self.frames
            .keys()
            .filter(|key| !SKIP_FRAMES.iter().any(|skip| key.contains(skip)))
            .cloned()
            .collect()
    }
}

fn first_text(values: &[String]) -> Option<String> {
    let value = values.first()?.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

struct Draft {
    id: Option<String>,
    title: Option<String>,
    artist: Option<String>,
    additional_artists: Option<String>,
    original_artist: Option<String>,
    remixer: Option<String>,
    album: Option<String>,
    original_album: Option<String>,
    genre: Option<String>,
    label: Option<String>,
    publisher: Option<String>,
    file_type: Option<String>,
    release_year: Option<String>,
    release_date: Option<String>,
    recording_date: Option<String>,
    starting_key: Option<String>,
    user_comment: Option<String>,
    user_comment_2: Option<String>,
    bpm: Option<String>,
}

impl Draft {
    fn drop_duplicates(&mut self) {
        if same(&self.original_album, &self.album) {
            self.original_album = None;
        }
        if contained_in(&self.original_artist, &self.artist) {
            self.original_artist = None;
        }
        if same(&self.additional_artists, &self.artist)
            || self.additional_artists.as_deref() == Some(VARIOUS_ARTISTS)
        {
            self.additional_artists = None;
        }
        if same(&self.publisher, &self.label) {
            self.publisher = None;
        }
        if same(&self.recording_date, &self.release_date) {
            self.recording_date = None;
        }
        if same(&self.release_year, &self.release_date) {
            self.release_year = None;
        }
        if same(&self.user_comment_2, &self.user_comment) {
            self.user_comment_2 = None;
        }
        if contained_in(&self.remixer, &self.title) {
            self.remixer = None;
        }
    }

    fn resolve_dates(&mut self) {
        if self
            .recording_date
            .as_ref()
            .is_some_and(|date| date.chars().count() == 4)
        {
            self.release_year = self.recording_date.take();
        }
        if self.release_date.is_none() {
            self.release_date = self.release_year.take();
        } else {
            self.release_year = None;
        }
    }
}

fn same(one: &Option<String>, two: &Option<String>) -> bool {
    matches!((one, two), (Some(a), Some(b)) if a == b)
}

fn contained_in(needle: &Option<String>, haystack: &Option<String>) -> bool {
    matches!((needle, haystack), (Some(n), Some(h)) if h.contains(n.as_str()))
}

fn split_additional_artists(value: &str, artist: Option<&str>) -> Option<String> {
    let artist = artist.unwrap_or("");
    let normalized = value.replace('&', ",").replace("feat.", ",");
    let kept: Vec<&str> = normalized
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty() && !artist.contains(entry))
        .collect();
    if kept.is_empty() {
        None
    } else {
        Some(kept.join(", "))
    }
}

fn format_duration(secs: u64) -> Option<String> {
    if secs == 0 {
        return None;
    }
    Some(format!("{}:{:02}", secs / 60, secs % 60))
}
