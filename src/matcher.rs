//! Rule matching: decide whether an asset qualifies for a rule.
//!
//! Three matcher shapes, held in one tagged union:
//!
//! 1. [`Matcher::Glob`] — shell glob tested against the asset path;
//! 2. [`Matcher::MediaQuery`] — size predicate like `(min-width: 1000px)`
//!    evaluated against the decoded dimensions;
//! 3. [`Matcher::Predicate`] — a custom `(path, size, asset) -> bool` fn.
//!
//! [`Matcher::All`] combines a list with logical AND. An absent matcher
//! selects everything.
//!
//! Strings are disambiguated by a structural heuristic: anything containing
//! a `(feature: value)` group is treated as a media query, everything else
//! as a glob. A pathological path that literally contains `(width: 100px)`
//! is indistinguishable from a size predicate; this is a known limitation.

use crate::asset::ImageAsset;
use crate::format::is_supported_type;
use crate::transcode::Transcoder;
use regex::Regex;
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, LazyLock};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("invalid source: not a realized in-memory asset")]
    InvalidInput,
}

/// Pixel dimensions handed to predicates and media queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

/// A custom matcher function.
pub type PredicateFn = Arc<dyn Fn(&Path, Size, &ImageAsset) -> bool + Send + Sync>;

/// Selection criteria for a rule. See the [module docs](self).
#[derive(Clone)]
pub enum Matcher {
    Glob(String),
    MediaQuery(String),
    Predicate(PredicateFn),
    /// Satisfied only if every entry matches.
    All(Vec<Matcher>),
}

static MEDIA_QUERY_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(\s*[^\s:)]+\s*(?::\s*[^)]+)?\s*\)").expect("valid regex")
});

static CONDITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(\s*([a-zA-Z-]+)\s*:\s*([0-9]*\.?[0-9]+)\s*(?:px)?\s*\)").expect("valid regex")
});

impl Matcher {
    /// Build a matcher from a pattern string, using the structural
    /// media-query heuristic for disambiguation.
    pub fn from_pattern(pattern: &str) -> Self {
        if MEDIA_QUERY_SHAPE.is_match(pattern) {
            Matcher::MediaQuery(pattern.to_string())
        } else {
            Matcher::Glob(pattern.to_string())
        }
    }

    /// Wrap a custom function as a matcher.
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&Path, Size, &ImageAsset) -> bool + Send + Sync + 'static,
    {
        Matcher::Predicate(Arc::new(f))
    }

    fn evaluate(&self, path: &Path, size: Size, asset: &ImageAsset) -> bool {
        match self {
            Matcher::Glob(pattern) => glob::Pattern::new(pattern)
                .map(|p| p.matches_path(path))
                .unwrap_or(false),
            Matcher::MediaQuery(query) => match_media_query(query, size),
            Matcher::Predicate(f) => f(path, size, asset),
            Matcher::All(list) => list.iter().all(|m| m.evaluate(path, size, asset)),
        }
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Glob(p) => f.debug_tuple("Glob").field(p).finish(),
            Matcher::MediaQuery(q) => f.debug_tuple("MediaQuery").field(q).finish(),
            Matcher::Predicate(_) => f.write_str("Predicate(..)"),
            Matcher::All(list) => f.debug_tuple("All").field(list).finish(),
        }
    }
}

impl<'de> Deserialize<'de> for Matcher {
    /// Rule files hold matchers as a pattern string or a list of pattern
    /// strings (AND). Predicates are code-only.
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            One(String),
            Many(Vec<String>),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::One(s) => Matcher::from_pattern(&s),
            Raw::Many(list) => {
                Matcher::All(list.iter().map(|s| Matcher::from_pattern(s)).collect())
            }
        })
    }
}

/// Evaluate a size media query.
///
/// Comma-separated clauses are alternatives (OR); parenthesized conditions
/// within a clause all have to hold (AND, whether or not they are joined
/// with a literal `and`). Supported features: `width`/`height` with
/// optional `min-`/`max-` prefixes, values in pixels. Anything
/// unrecognized makes its clause fail — unknown never matches.
fn match_media_query(query: &str, size: Size) -> bool {
    query.split(',').any(|clause| match_clause(clause, size))
}

fn match_clause(clause: &str, size: Size) -> bool {
    let groups = MEDIA_QUERY_SHAPE.find_iter(clause).count();
    let conditions: Vec<_> = CONDITION.captures_iter(clause).collect();

    // Every paren group must be a condition we can evaluate.
    if groups == 0 || conditions.len() != groups {
        return false;
    }

    conditions.iter().all(|caps| {
        let feature = caps[1].to_ascii_lowercase();
        let value: f64 = match caps[2].parse() {
            Ok(v) => v,
            Err(_) => return false,
        };
        match feature.as_str() {
            "width" => size.width as f64 == value,
            "min-width" => size.width as f64 >= value,
            "max-width" => size.width as f64 <= value,
            "height" => size.height as f64 == value,
            "min-height" => size.height as f64 >= value,
            "max-height" => size.height as f64 <= value,
            _ => false,
        }
    })
}

/// Decide whether `asset` satisfies `matcher`.
///
/// Metadata is attached on demand (media queries and predicates need
/// dimensions). The asset must be a realized buffer — anything else is an
/// invalid-input error, not a non-match. An unsupported extension, or
/// metadata that could not be read, resolves to `false`.
pub fn matches(
    asset: &mut ImageAsset,
    matcher: Option<&Matcher>,
    transcoder: &dyn Transcoder,
) -> Result<bool, MatchError> {
    if !asset.is_buffer() {
        return Err(MatchError::InvalidInput);
    }

    asset.attach_metadata(transcoder, false);

    let supported = asset
        .extension_token()
        .is_some_and(|ext| is_supported_type(&ext));
    if !supported {
        return Ok(false);
    }

    let Some(matcher) = matcher else {
        return Ok(true);
    };

    let Some(meta) = asset.metadata else {
        return Ok(false);
    };
    let size = Size {
        width: meta.width,
        height: meta.height,
    };

    let path = asset.path.clone();
    Ok(matcher.evaluate(&path, size, asset))
}
