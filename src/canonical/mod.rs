//! Canonical keys for (artist, title) pairs.
//!
//! Two references that differ only in formatting (case, diacritics, a
//! featured artist, a "(Remastered 2016)" qualifier) map to the same
//! [`CanonicalKey`], so the dedup index can treat them as the same work.
//!
//! The steps, in order:
//! 1. fold case and diacritics (NFKD, combining marks dropped)
//! 2. artist: keep the segment before the first collaboration marker
//! 3. title: drop bracketed qualifiers, featured-artist suffixes and
//!    known version suffixes ("- Radio Edit", "- 2011 Remaster", ...)
//! 4. strip every non-alphanumeric character

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::model::TrackReference;

/// Collaboration markers that end the primary artist.
static COLLABORATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s*(?:\b(?:feat|ft)\b\.?|\bfeaturing\b|\bwith\b|&|,|\s+x\s+|\s+vs\.?\s+)\s*")
        .expect("collaboration pattern is valid")
});

/// `(...)` and `[...]` qualifiers.
static BRACKETED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*[\(\[][^\)\]]*[\)\]]").expect("bracket pattern is valid"));

/// "Song feat. Someone" style suffixes.
static FEATURING_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s+(?:feat\.?|ft\.|featuring)\s+.*$").expect("featuring pattern is valid")
});

/// Closed set of dash-separated version suffixes.
static VERSION_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\s*-\s*(?:single version|radio edit|clean|explicit|remaster(?:ed)?(?:\s+\d{4})?|\d{4}\s+(?:digital\s+)?remaster(?:ed)?|edit|version|mono|stereo)\b.*$",
    )
    .expect("version suffix pattern is valid")
});

/// "- 2011 Remaster" / "- Remastered 2011" at the end of a display title.
static REMASTER_COMMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\s*-\s*(?:(?P<y1>\d{4})\s*(?P<l1>remaster(?:ed)?(?: version)?)|(?P<l2>remaster(?:ed)?(?: version)?)\s*(?P<y2>\d{4})?)\s*$",
    )
    .expect("remaster pattern is valid")
});

/// Normalized identity of a musical work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalKey(String);

impl CanonicalKey {
    /// Key for a track reference.
    pub fn of(reference: &TrackReference) -> Self {
        canonical_key(&reference.artist, &reference.title)
    }

    /// Wrap an already-canonical string (e.g. read back from the log).
    pub fn from_canonical(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the canonical key for an (artist, title) pair.
///
/// Pure and deterministic. Empty input yields an empty key.
pub fn canonical_key(artist: &str, title: &str) -> CanonicalKey {
    CanonicalKey(format!("{}{}", canonical_artist(artist), canonical_title(title)))
}

/// Primary artist, folded and stripped to alphanumerics.
pub fn canonical_artist(artist: &str) -> String {
    let folded = fold(artist);
    let primary = COLLABORATION.splitn(&folded, 2).next().unwrap_or_default();
    let key = alphanumeric(primary);
    // A name that starts with a marker ("With Confidence") keeps its full text
    if key.is_empty() {
        alphanumeric(&folded)
    } else {
        key
    }
}

/// Title without qualifiers, folded and stripped to alphanumerics.
pub fn canonical_title(title: &str) -> String {
    let folded = fold(title);
    let key = alphanumeric(&strip_qualifiers(&folded));
    if key.is_empty() {
        alphanumeric(&folded)
    } else {
        key
    }
}

/// Remove bracketed qualifiers, featured-artist and version suffixes.
///
/// Expects folded (lower-case) input; the result still contains spaces and
/// punctuation.
pub fn strip_qualifiers(title: &str) -> String {
    let without_brackets = BRACKETED.replace_all(title, "");
    let without_featuring = FEATURING_SUFFIX.replace(&without_brackets, "");
    VERSION_SUFFIX
        .replace(&without_featuring, "")
        .trim()
        .to_string()
}

/// Lower-case, diacritic-free, alphanumeric-only form of arbitrary text.
pub fn normalize(text: &str) -> String {
    alphanumeric(&fold(text))
}

/// Rewrite "Song - 2011 Remaster" into "Song (Remastered 2011)".
///
/// Titles that already carry a parenthesised remaster note are returned as-is.
pub fn normalize_remaster_title(title: &str) -> String {
    if title.contains('(') && title.to_lowercase().contains("remaster") {
        return title.to_string();
    }
    let Some(caps) = REMASTER_COMMENT.captures(title) else {
        return title.to_string();
    };

    let year = caps.name("y1").or_else(|| caps.name("y2")).map(|m| m.as_str());
    let base = REMASTER_COMMENT.replace(title, "");
    let base = base.trim_end();
    match year {
        Some(year) => format!("{} (Remastered {})", base, year),
        None => format!("{} (Remastered)", base),
    }
}

fn fold(text: &str) -> String {
    text.nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

fn alphanumeric(text: &str) -> String {
    text.chars().filter(|c| c.is_alphanumeric()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_featured_artist_and_remaster_collapse() {
        let a = canonical_key("Drake feat. Rihanna", "Take Care (Remastered 2016)");
        let b = canonical_key("Drake", "Take Care");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "draketakecare");
    }

    #[test]
    fn test_fleetwood_mac_key() {
        assert_eq!(
            canonical_key("Fleetwood Mac", "Dreams").as_str(),
            "fleetwoodmacdreams"
        );
        assert_eq!(
            canonical_key("Fleetwood Mac", "Dreams - 2004 Remaster").as_str(),
            "fleetwoodmacdreams"
        );
    }

    #[test]
    fn test_collaboration_markers() {
        assert_eq!(canonical_artist("Calvin Harris & Dua Lipa"), "calvinharris");
        assert_eq!(canonical_artist("Sia, Sean Paul"), "sia");
        assert_eq!(canonical_artist("Drake with Future"), "drake");
        assert_eq!(canonical_artist("Marshmello x Bastille"), "marshmello");
        assert_eq!(canonical_artist("Post Malone ft. Swae Lee"), "postmalone");
    }

    #[test]
    fn test_marker_words_inside_names_do_not_split() {
        assert_eq!(canonical_artist("Bill Withers"), "billwithers");
        assert_eq!(canonical_artist("Xzibit"), "xzibit");
        assert_eq!(canonical_artist("With Confidence"), "withconfidence");
    }

    #[test]
    fn test_diacritics_and_case_fold() {
        assert_eq!(canonical_artist("Beyoncé"), "beyonce");
        assert_eq!(canonical_artist("MÖTLEY CRÜE"), "motleycrue");
        assert_eq!(canonical_title("Señorita"), "senorita");
    }

    #[test]
    fn test_version_suffixes() {
        assert_eq!(canonical_title("Levitating - Radio Edit"), "levitating");
        assert_eq!(canonical_title("Hey Ya! - Single Version"), "heyya");
        assert_eq!(canonical_title("Wonderwall - Remastered"), "wonderwall");
        assert_eq!(canonical_title("Go Your Own Way - Remaster 2004"), "goyourownway");
        assert_eq!(canonical_title("Sweet Home [Live]"), "sweethome");
        assert_eq!(canonical_title("Stay feat. Justin Bieber"), "stay");
    }

    #[test]
    fn test_title_that_is_only_a_qualifier_keeps_text() {
        assert_eq!(canonical_title("(Intro)"), "intro");
    }

    #[test]
    fn test_empty_input_yields_empty_key() {
        assert!(canonical_key("", "").is_empty());
    }

    #[test]
    fn test_normalize_remaster_title() {
        assert_eq!(
            normalize_remaster_title("Dreams - 2004 Remaster"),
            "Dreams (Remastered 2004)"
        );
        assert_eq!(
            normalize_remaster_title("Let It Be - Remastered 2009"),
            "Let It Be (Remastered 2009)"
        );
        assert_eq!(
            normalize_remaster_title("Song (2011 Remaster)"),
            "Song (2011 Remaster)"
        );
        assert_eq!(normalize_remaster_title("Plain Title"), "Plain Title");
    }

    #[test]
    fn test_key_of_reference() {
        let reference = TrackReference::new("Fleetwood Mac", "Dreams");
        assert_eq!(CanonicalKey::of(&reference).to_string(), "fleetwoodmacdreams");
    }
}
