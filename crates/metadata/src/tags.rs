use std::borrow::Cow;
use std::fmt;
use std::fs::File;
use std::path::Path;

use common::fingerprint_id;
use lofty::config::{ParseOptions, WriteOptions};
use lofty::error::LoftyError;
use lofty::id3::v2::{Frame, FrameId, Id3v2Tag, UniqueFileIdentifierFrame};
use lofty::mpeg::MpegFile;
use lofty::picture::{Picture, PictureType};
use lofty::prelude::{AudioFile, ItemKey, TagExt, TaggedFileExt};
use lofty::tag::{ItemValue, Tag};

use crate::RawTagMapping;

const ARTIST_FRAME: FrameId<'static> = FrameId::Valid(Cow::Borrowed("TPE1"));
const TITLE_FRAME: FrameId<'static> = FrameId::Valid(Cow::Borrowed("TIT2"));

#[derive(Debug)]
pub enum MetadataError {
    Io(std::io::Error),
    Lofty(LoftyError),
}

impl fmt::Display for MetadataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataError::Io(err) => write!(f, "io error: {}", err),
            MetadataError::Lofty(err) => write!(f, "tag error: {}", err),
        }
    }
}

impl std::error::Error for MetadataError {}

impl From<std::io::Error> for MetadataError {
    fn from(err: std::io::Error) -> Self {
        MetadataError::Io(err)
    }
}

impl From<LoftyError> for MetadataError {
    fn from(err: LoftyError) -> Self {
        MetadataError::Lofty(err)
    }
}

/// Outcome of giving a file a unique-file id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IdStamp {
    /// The file already carried this id.
    Existing(String),
    /// This id was written.
    Added(String),
    /// Nothing to derive an id from.
    MissingArtistOrTitle,
}

/// Reads a file's tags into a [`RawTagMapping`].
///
/// MP3 files are read frame by frame from their ID3v2 tag, so the UFID
/// owner and every frame the normalizer does not use come through under
/// their own frame ids. Other formats go through lofty's generic tag.
pub fn read_raw_tags(path: &Path) -> Result<RawTagMapping, MetadataError> {
    let mut raw = if is_mpeg(path) {
        read_mpeg(path)?
    } else {
        read_generic(path)?
    };

    if !raw.frames.contains_key("TFLT") && !raw.frames.contains_key("TXXX:FILETYPE") {
        if let Some(ext) = path.extension() {
            raw.insert("TFLT", ext.to_string_lossy().to_uppercase());
        }
    }
    Ok(raw)
}

/// Writes an `esp-` UFID derived from artist and title into an MP3 that
/// has none. Files that already carry one are left untouched.
pub fn stamp_unique_id(path: &Path) -> Result<IdStamp, MetadataError> {
    let mpeg = {
        let mut file = File::open(path)?;
        MpegFile::read_from(&mut file, ParseOptions::new())?
    };
    let mut tag = match mpeg.id3v2() {
        Some(tag) => tag.clone(),
        None => return Ok(IdStamp::MissingArtistOrTitle),
    };

    let stamp = stamp_tag(&mut tag);
    if let IdStamp::Added(_) = stamp {
        tag.save_to_path(path, WriteOptions::default())?;
    }
    Ok(stamp)
}

fn stamp_tag(tag: &mut Id3v2Tag) -> IdStamp {
    if let Some(id) = unique_id(tag) {
        return IdStamp::Existing(id);
    }

    let artist = first_text(tag, &ARTIST_FRAME);
    let title = first_text(tag, &TITLE_FRAME);
    let id = match (artist, title) {
        (Some(artist), Some(title)) => fingerprint_id(&artist, &title),
        _ => return IdStamp::MissingArtistOrTitle,
    };

    tag.insert(Frame::UniqueFileIdentifier(UniqueFileIdentifierFrame::new(
        id.clone(),
        Vec::new(),
    )));
    IdStamp::Added(id)
}

fn unique_id(tag: &Id3v2Tag) -> Option<String> {
    tag.into_iter().find_map(|frame| match frame {
        Frame::UniqueFileIdentifier(ufid) if !ufid.owner.trim().is_empty() => {
            Some(ufid.owner.trim().to_string())
        }
        _ => None,
    })
}

fn first_text(tag: &Id3v2Tag, id: &FrameId<'_>) -> Option<String> {
    let value = tag.get_texts(id)?.next()?.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn is_mpeg(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("mp3"))
        .unwrap_or(false)
}

fn read_mpeg(path: &Path) -> Result<RawTagMapping, MetadataError> {
    let mpeg = {
        let mut file = File::open(path)?;
        MpegFile::read_from(&mut file, ParseOptions::new())?
    };
    let mut raw = match mpeg.id3v2() {
        Some(tag) => id3v2_frames(tag),
        None => return read_generic(path),
    };
    raw.duration_secs = nonzero_secs(mpeg.properties().duration().as_secs());
    Ok(raw)
}

/// Every ID3v2 frame keyed the way taggers print them: `TXXX:<desc>`,
/// `COMM:<desc>:<lang>`, `PRIV:<owner>` and so on. Frames without text are
/// still listed, with an empty value.
fn id3v2_frames(tag: &Id3v2Tag) -> RawTagMapping {
    let mut raw = RawTagMapping::default();
    let mut pictures = Vec::new();

    for frame in tag {
        match frame {
            Frame::Text(text) => {
                for value in text.value.split('\0') {
                    raw.insert(frame.id_str(), value);
                }
            }
            Frame::UserText(text) => {
                raw.insert(format!("TXXX:{}", text.description), text.content.as_str());
            }
            Frame::Comment(comment) => {
                let lang = String::from_utf8_lossy(&comment.language);
                raw.insert(
                    format!("COMM:{}:{}", comment.description, lang),
                    comment.content.as_str(),
                );
            }
            Frame::Timestamp(stamp) => raw.insert(frame.id_str(), stamp.timestamp.to_string()),
            Frame::UniqueFileIdentifier(ufid) => raw.insert("UFID", ufid.owner.trim()),
            Frame::Popularimeter(popm) => {
                if raw.rating.is_none() {
                    raw.rating = Some(u32::from(popm.rating));
                }
                raw.insert(format!("POPM:{}", popm.email), popm.rating.to_string());
            }
            Frame::Picture(apic) => {
                pictures.push(&apic.picture);
                raw.insert(frame.id_str(), "");
            }
            Frame::Private(private) => raw.insert(format!("PRIV:{}", private.owner), ""),
            Frame::UserUrl(url) => {
                raw.insert(format!("WXXX:{}", url.description), url.content.as_str());
            }
            other => raw.insert(other.id_str(), ""),
        }
    }

    raw.cover_art = pick_picture(&pictures).map(|picture| picture.data().to_vec());
    raw
}

/// Generic tag items and the ID3v2 frame ids the normalizer expects them
/// under.
fn item_frames() -> [(ItemKey, &'static str); 18] {
    [
        (ItemKey::TrackTitle, "TIT2"),
        (ItemKey::TrackArtist, "TPE1"),
        (ItemKey::AlbumArtist, "TPE2"),
        (ItemKey::OriginalArtist, "TOPE"),
        (ItemKey::Remixer, "TPE4"),
        (ItemKey::AlbumTitle, "TALB"),
        (ItemKey::OriginalAlbumTitle, "TOAL"),
        (ItemKey::Genre, "TCON"),
        (ItemKey::ContentGroup, "TIT1"),
        (ItemKey::Publisher, "TPUB"),
        (ItemKey::ReleaseDate, "TDRL"),
        (ItemKey::OriginalReleaseDate, "TDOR"),
        (ItemKey::RecordingDate, "TDRC"),
        (ItemKey::Year, "TXXX:YEAR"),
        (ItemKey::InitialKey, "TKEY"),
        (ItemKey::Comment, "COMM::eng"),
        (ItemKey::Bpm, "TBPM"),
        (ItemKey::Isrc, "TSRC"),
    ]
}

fn read_generic(path: &Path) -> Result<RawTagMapping, MetadataError> {
    let tagged_file = lofty::read_from_path(path)?;

    let mut raw = match tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
        Some(tag) => generic_items(tag),
        None => RawTagMapping::default(),
    };
    raw.duration_secs = nonzero_secs(tagged_file.properties().duration().as_secs());
    Ok(raw)
}

/// Mapped items under their frame ids; anything else under the key the
/// format itself uses, so it shows up as unextracted.
fn generic_items(tag: &Tag) -> RawTagMapping {
    let mut raw = RawTagMapping::default();
    let mapped = item_frames();

    for (key, frame) in &mapped {
        for value in tag.get_strings(key) {
            raw.insert(*frame, value);
        }
    }
    for item in tag.items() {
        let key = item.key();
        if *key == ItemKey::Popularimeter || mapped.iter().any(|(known, _)| known == key) {
            continue;
        }
        let name = match key {
            ItemKey::Unknown(name) => name.as_str(),
            other => match other.map_key(tag.tag_type(), false) {
                Some(name) => name,
                None => continue,
            },
        };
        match item.value() {
            ItemValue::Text(text) | ItemValue::Locator(text) => raw.insert(name, text.as_str()),
            _ => raw.insert(name, ""),
        }
    }

    raw.rating = popularimeter_rating(tag);
    let pictures: Vec<&Picture> = tag.pictures().iter().collect();
    raw.cover_art = pick_picture(&pictures).map(|picture| picture.data().to_vec());
    raw
}

fn popularimeter_rating(tag: &Tag) -> Option<u32> {
    match tag.get(&ItemKey::Popularimeter)?.value() {
        // email, NUL, rating byte, play counter
        ItemValue::Binary(bytes) => {
            let start = bytes.iter().position(|b| *b == 0)? + 1;
            bytes.get(start).map(|rating| u32::from(*rating))
        }
        ItemValue::Text(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn pick_picture<'a>(pictures: &[&'a Picture]) -> Option<&'a Picture> {
    for picture in pictures {
        if picture.pic_type() == PictureType::CoverFront {
            return Some(picture);
        }
    }
    pictures.first().copied()
}

fn nonzero_secs(secs: u64) -> Option<u64> {
    if secs > 0 {
        Some(secs)
    } else {
        None
    }
}
