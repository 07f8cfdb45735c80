//! Musical key notation tables.
//!
//! Stored records always carry Camelot Wheel notation. Long-form names
//! (`Amin`, `C#maj`) and Open Key values (`8d`, `3m`) are mapped back to
//! Camelot; anything unknown passes through untouched.

use serde::{Deserialize, Serialize};

const LONG_TO_CAMELOT: &[(&str, &str)] = &[
    ("Cmaj", "8B"),
    ("Cmin", "5A"),
    ("C#maj", "3B"),
    ("C#min", "12A"),
    ("Dbmaj", "3B"),
    ("Dbmin", "12A"),
    ("Dmaj", "10B"),
    ("Dmin", "7A"),
    ("D#maj", "5B"),
    ("D#min", "2A"),
    ("Ebmaj", "5B"),
    ("Ebmin", "2A"),
    ("Emaj", "12B"),
    ("Emin", "9A"),
    ("Fmaj", "7B"),
    ("Fmin", "4A"),
    ("F#maj", "2B"),
    ("F#min", "11A"),
    ("Gbmaj", "2B"),
    ("Gbmin", "11A"),
    ("Gmaj", "9B"),
    ("Gmin", "6A"),
    ("G#maj", "4B"),
    ("G#min", "1A"),
    ("Abmaj", "4B"),
    ("Abmin", "1A"),
    ("Amaj", "11B"),
    ("Amin", "8A"),
    ("A#maj", "6B"),
    ("A#min", "3A"),
    ("Bbmaj", "6B"),
    ("Bbmin", "3A"),
    ("Bmaj", "1B"),
    ("Bmin", "10A"),
    ("Cbmaj", "1B"),
    ("Cbmin", "10A"),
];

const CAMELOT_TO_OPEN: &[(&str, &str)] = &[
    ("1A", "6m"),
    ("2A", "7m"),
    ("3A", "8m"),
    ("4A", "9m"),
    ("5A", "10m"),
    ("6A", "11m"),
    ("7A", "12m"),
    ("8A", "1m"),
    ("9A", "2m"),
    ("10A", "3m"),
    ("11A", "4m"),
    ("12A", "5m"),
    ("1B", "6d"),
    ("2B", "7d"),
    ("3B", "8d"),
    ("4B", "9d"),
    ("5B", "10d"),
    ("6B", "11d"),
    ("7B", "12d"),
    ("8B", "1d"),
    ("9B", "2d"),
    ("10B", "3d"),
    ("11B", "4d"),
    ("12B", "5d"),
];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyNotation {
    #[default]
    Camelot,
    OpenKey,
}

impl KeyNotation {
    /// Renders a stored Camelot key in this notation.
    pub fn render(self, camelot: &str) -> String {
        match self {
            KeyNotation::Camelot => camelot.to_string(),
            KeyNotation::OpenKey => camelot_to_open_key(camelot).to_string(),
        }
    }
}

pub fn long_to_camelot(key: &str) -> &str {
    lookup(LONG_TO_CAMELOT, key).unwrap_or(key)
}

pub fn camelot_to_open_key(key: &str) -> &str {
    lookup(CAMELOT_TO_OPEN, key).unwrap_or(key)
}

pub fn open_key_to_camelot(key: &str) -> &str {
    CAMELOT_TO_OPEN
        .iter()
        .find(|(_, open)| *open == key)
        .map(|(camelot, _)| *camelot)
        .unwrap_or(key)
}

/// Canonical storage form of a key tag.
pub fn to_camelot(key: &str) -> String {
    open_key_to_camelot(long_to_camelot(key)).to_string()
}

fn lookup(table: &'static [(&'static str, &'static str)], key: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(from, _)| *from == key)
        .map(|(_, to)| *to)
}

#[cfg(test)]
mod tests {
    use super::{camelot_to_open_key, long_to_camelot, to_camelot, KeyNotation, CAMELOT_TO_OPEN};

    #[test]
    fn long_form_maps_to_camelot() {
        assert_eq!(long_to_camelot("Amin"), "8A");
        assert_eq!(long_to_camelot("C#maj"), "3B");
        assert_eq!(long_to_camelot("Ebmin"), "2A");
        assert_eq!(long_to_camelot("Hmaj"), "Hmaj");
    }

    #[test]
    fn open_key_input_is_stored_as_camelot() {
        assert_eq!(to_camelot("1m"), "8A");
        assert_eq!(to_camelot("9d"), "4B");
        assert_eq!(to_camelot("G#maj"), "4B");
        assert_eq!(to_camelot("4B"), "4B");
        assert_eq!(to_camelot("unknown"), "unknown");
    }

    #[test]
    fn open_key_table_round_trips() {
        for (camelot, open) in CAMELOT_TO_OPEN {
            assert_eq!(camelot_to_open_key(camelot), *open);
            assert_eq!(to_camelot(open), *camelot);
        }
    }

    #[test]
    fn notation_renders_stored_key() {
        assert_eq!(KeyNotation::Camelot.render("8A"), "8A");
        assert_eq!(KeyNotation::OpenKey.render("8A"), "1m");
        assert_eq!(KeyNotation::OpenKey.render("??"), "??");
    }
}
