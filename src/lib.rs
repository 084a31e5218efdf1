//! # srcset-gen
//!
//! Generate responsive image variant sets — the files behind an HTML
//! `srcset` attribute — from source images. One source plus a set of
//! formats and widths in, an ordered sequence of resized, converted,
//! optimized and renamed variants out.
//!
//! ```no_run
//! use srcset_gen::{GenerateConfig, GeneratorConfig, ImageAsset, SrcsetGenerator};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let generator = SrcsetGenerator::new(GeneratorConfig::default());
//! let mut source = ImageAsset::read("photos/photo.jpg")?;
//!
//! let config = GenerateConfig {
//!     format: vec!["webp".into(), "jpg".into()],
//!     width: vec![1.0, 1280.0, 320.0],
//!     ..GenerateConfig::default()
//! };
//!
//! for variant in generator.generate(&mut source, &config)? {
//!     let variant = variant?;
//!     std::fs::write(&variant.path, &**variant.bytes().unwrap())?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture: Plan, Then Execute
//!
//! Each `generate` call runs in two phases:
//!
//! ```text
//! 1. Plan      formats × widths  →  ordered work items   (pure, no I/O)
//! 2. Execute   work items        →  derived assets       (concurrent, ordered)
//! ```
//!
//! Planning is a pure function over the rule and the source's metadata, so
//! every pruning and short-circuit decision is unit-testable without
//! touching pixels. Execution runs the planned items on the rayon pool
//! under a bounded concurrency ceiling while the consumer sees results in
//! declared order regardless of completion order.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`generate`] | The generator facade — plans a call, runs it, hands back the variant stream |
//! | [`plan`] | Pure expansion of formats × widths into work items: defaults, pruning, pass-throughs |
//! | [`executor`] | Bounded-concurrency ordered execution on the rayon pool |
//! | [`matcher`] | Source selection: glob patterns, media queries, predicates |
//! | [`asset`] | In-memory image assets with lazily-attached, cached metadata |
//! | [`format`] | The format registry and its short-circuit classes (vector, animated) |
//! | [`transcode`] | The [`transcode::Transcoder`] seam: metadata reading plus resize/convert |
//! | [`raster`] | Built-in transcoder on the `image` crate (pure Rust, no system deps) |
//! | [`optimize`] | Per-format post-encode plugin chains |
//! | [`config`] | Instance defaults, per-call overlays, TOML rule files |
//!
//! # Design Decisions
//!
//! ## Widths Are Multipliers Or Pixels
//!
//! A width `<= 1` is a scale factor of the source width (`0.5` → half
//! size, rounded up); a width `> 1` is an absolute pixel target. This
//! keeps one rule usable across sources of different sizes while still
//! allowing exact breakpoint widths.
//!
//! ## Vector And Animated Sources Short-Circuit
//!
//! SVG and GIF sources are never resized or converted — rasterizing
//! vectors or resampling animation frames produces artifacts no one wants
//! by default. They collapse to a single optimize-only emission and keep
//! their name.
//!
//! ## Pure-Rust Imaging
//!
//! The built-in [`raster`] transcoder uses the `image` crate (Lanczos3
//! resampling, rav1e AVIF encoding) and `avif-parse` for AVIF
//! identification. No ImageMagick, no FFmpeg, no system dependencies; the
//! [`transcode::Transcoder`] trait is the seam for anyone who wants to
//! bring their own codec stack.

pub mod asset;
pub mod config;
pub mod executor;
pub mod format;
pub mod generate;
pub mod matcher;
pub mod optimize;
pub mod plan;
pub mod raster;
pub mod transcode;

pub use asset::{Contents, ImageAsset, Metadata};
pub use config::{
    ConfigError, GenerateConfig, GeneratorConfig, Postfix, PostfixFormatter, ProcessingConfig,
    Quality, Rule, load_rules,
};
pub use format::Format;
pub use generate::{GenerateError, SrcsetGenerator, VariantStream};
pub use matcher::{MatchError, Matcher, PredicateFn, Size};
pub use optimize::{BasicOptimizer, OptimizationConfig, OptimizeError, OptimizePlugin, Optimizer};
pub use raster::RasterTranscoder;
pub use transcode::{ImageInfo, TranscodeError, Transcoder};
