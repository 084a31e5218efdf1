//! In-memory image assets and their lazily-attached metadata.
//!
//! An [`ImageAsset`] is a named byte buffer. Metadata (dimensions, decoded
//! format, origin multiplier) is attached on first inspection via the
//! transcoder and then cached — it is only recomputed when explicitly
//! forced, which the generator does for every derived asset because its
//! dimensions changed.
//!
//! Assets arrive from an external file source (the CLI, a build pipeline)
//! and ownership of every emitted derived asset passes to whoever consumes
//! the generator's output sequence.

use crate::format::Format;
use crate::transcode::Transcoder;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Asset payload. Only `Buffer` assets can be matched or generated from;
/// the other two are placeholders produced by streaming file sources.
#[derive(Debug, Clone)]
pub enum Contents {
    Buffer(Arc<Vec<u8>>),
    Empty,
    Stream,
}

/// Decoded image properties plus engine bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metadata {
    pub width: u32,
    pub height: u32,
    pub format: Format,
    /// Scale factor used to derive this asset from its origin. Absent for
    /// origin assets and for fixed-width derivations.
    pub origin_multiplier: Option<f64>,
}

/// A named in-memory image file.
#[derive(Debug, Clone)]
pub struct ImageAsset {
    pub path: PathBuf,
    pub contents: Contents,
    pub metadata: Option<Metadata>,
    /// Filename postfix identifying this variant, once one was computed.
    pub postfix: Option<String>,
}

impl ImageAsset {
    /// Create an asset from bytes already in memory.
    pub fn from_bytes(path: impl Into<PathBuf>, bytes: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            contents: Contents::Buffer(Arc::new(bytes)),
            metadata: None,
            postfix: None,
        }
    }

    /// Read an asset from disk.
    pub fn read(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let bytes = std::fs::read(&path)?;
        Ok(Self::from_bytes(path, bytes))
    }

    /// Whether this is a fully-realized in-memory asset.
    pub fn is_buffer(&self) -> bool {
        matches!(self.contents, Contents::Buffer(_))
    }

    /// Shared handle to the contents, if realized.
    pub fn bytes(&self) -> Option<&Arc<Vec<u8>>> {
        match &self.contents {
            Contents::Buffer(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Lowercased extension token, without the dot.
    pub fn extension_token(&self) -> Option<String> {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }

    /// Filename stem (no extension).
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_string()
    }

    /// Replace the extension to match `format`.
    pub fn set_format(&mut self, format: Format) {
        self.path.set_extension(format.extension());
    }

    /// Record `postfix` on the asset and append it to the filename stem.
    pub fn append_postfix(&mut self, postfix: &str) {
        if !postfix.is_empty() {
            let stem = self.stem();
            let new_name = match self.extension_token() {
                Some(ext) => format!("{stem}{postfix}.{ext}"),
                None => format!("{stem}{postfix}"),
            };
            self.path.set_file_name(new_name);
        }
        self.postfix = Some(postfix.to_string());
    }

    /// Clone the non-content fields (path, metadata, postfix) for a derived
    /// asset. Contents are left empty until generation fills them in.
    pub fn clone_without_contents(&self) -> Self {
        Self {
            path: self.path.clone(),
            contents: Contents::Empty,
            metadata: self.metadata,
            postfix: self.postfix.clone(),
        }
    }

    /// Attach metadata by asking the transcoder to read the buffer.
    ///
    /// Cached: a second call is a no-op unless `force` is set. An existing
    /// `origin_multiplier` survives a forced refresh. Unreadable bytes leave
    /// the asset's metadata as it was — callers downstream treat an absent
    /// width as "unknown" and prune conservatively instead of failing.
    pub fn attach_metadata(&mut self, transcoder: &dyn Transcoder, force: bool) {
        if !force && self.metadata.is_some() {
            return;
        }

        let Some(bytes) = self.bytes() else {
            return;
        };

        let Ok(info) = transcoder.read_metadata(bytes) else {
            return;
        };

        let origin_multiplier = self.metadata.and_then(|m| m.origin_multiplier);
        self.metadata = Some(Metadata {
            width: info.width,
            height: info.height,
            format: info.format,
            origin_multiplier,
        });

        if self.path.as_os_str().is_empty() {
            self.path = PathBuf::from("file");
        }
        if self.path.extension().is_none() {
            self.set_format(info.format);
        }
    }

    /// Path as a display-friendly string, for matching and output.
    pub fn path_str(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

/// Placeholder assets, for callers modelling streaming sources.
impl ImageAsset {
    pub fn placeholder(path: impl Into<PathBuf>, contents: Contents) -> Self {
        Self {
            path: path.into(),
            contents,
            metadata: None,
            postfix: None,
        }
    }
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_string()
}
