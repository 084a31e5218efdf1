//! The transcoder boundary: decode/resize/encode as an external capability.
//!
//! The engine itself never touches pixels. Everything pixel-shaped goes
//! through the [`Transcoder`] trait: reading metadata from a byte buffer and
//! producing a re-encoded (and possibly resized) byte buffer. The production
//! implementation is [`RasterTranscoder`](crate::raster::RasterTranscoder),
//! built on the `image` crate.
//!
//! Resize direction is policy, not capability: the planner decides whether a
//! target width is legal (scaling-up rules), the transcoder just executes.

use crate::config::ProcessingConfig;
use crate::format::Format;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("failed to decode source bytes: {0}")]
    Decode(String),
    #[error("failed to encode to {format}: {reason}")]
    Encode { format: Format, reason: String },
    #[error("cannot read image metadata: {0}")]
    Metadata(String),
    #[error("transcoder cannot produce \"{0}\" output")]
    UnsupportedOutput(Format),
}

/// Decoded image properties, read from a byte buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub format: Format,
}

/// An external image transcoder.
///
/// Implementations must be `Send + Sync`: work items run concurrently on a
/// shared transcoder reference.
pub trait Transcoder: Send + Sync {
    /// Read `{width, height, format}` from an encoded image buffer.
    fn read_metadata(&self, bytes: &[u8]) -> Result<ImageInfo, TranscodeError>;

    /// Re-encode `bytes` to `format`, resizing to `target_width` pixels
    /// (aspect ratio preserved) when given. `target_width == None` means
    /// "convert only, keep dimensions".
    fn transcode(
        &self,
        bytes: &[u8],
        format: Format,
        target_width: Option<u32>,
        processing: &ProcessingConfig,
    ) -> Result<Vec<u8>, TranscodeError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Fake image buffers for tests: `mock:<fmt>:<width>:<height>`.
    ///
    /// The [`MockTranscoder`] round-trips these, so generator tests can
    /// assert on emitted dimensions without encoding real pixels.
    pub fn mock_bytes(format: Format, width: u32, height: u32) -> Vec<u8> {
        format!("mock:{}:{}:{}", format.extension(), width, height).into_bytes()
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        ReadMetadata,
        Transcode { format: Format, target_width: Option<u32> },
    }

    /// Transcoder over the `mock:` byte protocol, recording every call.
    ///
    /// Uses a Mutex (not RefCell) so it is Sync and can be shared by the
    /// executor's worker tasks.
    #[derive(Default)]
    pub struct MockTranscoder {
        pub operations: Mutex<Vec<RecordedOp>>,
    }

    impl MockTranscoder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }

        fn parse(bytes: &[u8]) -> Result<ImageInfo, TranscodeError> {
            let text = std::str::from_utf8(bytes)
                .map_err(|_| TranscodeError::Metadata("not mock bytes".into()))?;
            let mut parts = text.split(':');
            let (tag, fmt, w, h) = (parts.next(), parts.next(), parts.next(), parts.next());
            match (tag, fmt, w, h) {
                (Some("mock"), Some(fmt), Some(w), Some(h)) => {
                    let format = Format::from_token(fmt)
                        .ok_or_else(|| TranscodeError::Metadata(format!("bad format {fmt}")))?;
                    let width = w
                        .parse()
                        .map_err(|_| TranscodeError::Metadata("bad width".into()))?;
                    let height = h
                        .parse()
                        .map_err(|_| TranscodeError::Metadata("bad height".into()))?;
                    Ok(ImageInfo { width, height, format })
                }
                _ => Err(TranscodeError::Metadata("not mock bytes".into())),
            }
        }
    }

    impl Transcoder for MockTranscoder {
        fn read_metadata(&self, bytes: &[u8]) -> Result<ImageInfo, TranscodeError> {
            self.operations.lock().unwrap().push(RecordedOp::ReadMetadata);
            Self::parse(bytes)
        }

        fn transcode(
            &self,
            bytes: &[u8],
            format: Format,
            target_width: Option<u32>,
            _processing: &ProcessingConfig,
        ) -> Result<Vec<u8>, TranscodeError> {
            self.operations
                .lock()
                .unwrap()
                .push(RecordedOp::Transcode { format, target_width });

            let info = Self::parse(bytes)?;
            let (w, h) = match target_width {
                Some(tw) if tw < info.width => {
                    let ratio = tw as f64 / info.width as f64;
                    (tw, (info.height as f64 * ratio).round().max(1.0) as u32)
                }
                _ => (info.width, info.height),
            };
            Ok(mock_bytes(format, w, h))
        }
    }

    #[test]
    fn mock_bytes_round_trip() {
        let transcoder = MockTranscoder::new();
        let bytes = mock_bytes(Format::Jpg, 3120, 4160);

        let info = transcoder.read_metadata(&bytes).unwrap();
        assert_eq!(info.width, 3120);
        assert_eq!(info.height, 4160);
        assert_eq!(info.format, Format::Jpg);
    }

    #[test]
    fn mock_transcode_resizes_and_converts() {
        let transcoder = MockTranscoder::new();
        let bytes = mock_bytes(Format::Jpg, 1000, 500);

        let out = transcoder
            .transcode(&bytes, Format::Webp, Some(100), &ProcessingConfig::default())
            .unwrap();
        let info = transcoder.read_metadata(&out).unwrap();
        assert_eq!(info.width, 100);
        assert_eq!(info.height, 50);
        assert_eq!(info.format, Format::Webp);

        let ops = transcoder.get_operations();
        assert!(matches!(
            ops[0],
            RecordedOp::Transcode { format: Format::Webp, target_width: Some(100) }
        ));
    }

    #[test]
    fn mock_rejects_real_bytes() {
        let transcoder = MockTranscoder::new();
        assert!(matches!(
            transcoder.read_metadata(b"\x89PNG\r\n"),
            Err(TranscodeError::Metadata(_))
        ));
    }
}
