//! The variant generator: ties matching, planning and execution together.
//!
//! [`SrcsetGenerator`] holds instance defaults plus the two external
//! collaborators (a [`Transcoder`] and an [`Optimizer`]), and
//! [`SrcsetGenerator::generate`] produces a lazy, ordered sequence of
//! derived assets for one source. Each call plans its work items, then runs
//! them through the ordered executor; the returned [`VariantStream`] is
//! finite and not restartable — a spent stream yields nothing further.
//!
//! Per work item: transcode (skipped for pass-throughs), optimize (unless
//! `skip_optimization`), force-refresh metadata, compute and apply the
//! postfix. Pass-throughs still get a metadata refresh so the emitted
//! asset's bookkeeping (`origin_multiplier` included) reflects its actual
//! contents.

use crate::asset::{Contents, ImageAsset};
use crate::config::{self, GenerateConfig, GeneratorConfig, ResolvedConfig};
use crate::executor::{self, OrderedResults, execute_ordered};
use crate::format::Format;
use crate::matcher::{self, MatchError, Matcher};
use crate::optimize::{BasicOptimizer, OptimizeError, Optimizer};
use crate::plan::{PlannedVariant, WorkItem, plan};
use crate::raster::RasterTranscoder;
use crate::transcode::{TranscodeError, Transcoder};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("invalid source: not a realized in-memory asset")]
    InvalidInput,
    #[error("\"{0}\" is not supported")]
    UnsupportedFormat(String),
    #[error("transcode failed: {0}")]
    Transcode(#[from] TranscodeError),
    #[error("optimization failed: {0}")]
    Optimize(#[from] OptimizeError),
}

/// Generates responsive variant sets from source images.
pub struct SrcsetGenerator {
    config: GeneratorConfig,
    transcoder: Arc<dyn Transcoder>,
    optimizer: Arc<dyn Optimizer>,
}

impl SrcsetGenerator {
    /// Generator with the built-in collaborators: the `image`-crate
    /// transcoder and the plugin-chain optimizer.
    pub fn new(config: GeneratorConfig) -> Self {
        Self::with_collaborators(
            config,
            Arc::new(RasterTranscoder::new()),
            Arc::new(BasicOptimizer::new()),
        )
    }

    /// Generator with caller-supplied collaborators.
    pub fn with_collaborators(
        config: GeneratorConfig,
        transcoder: Arc<dyn Transcoder>,
        optimizer: Arc<dyn Optimizer>,
    ) -> Self {
        Self {
            config,
            transcoder,
            optimizer,
        }
    }

    /// Decide whether `asset` satisfies `matcher`, attaching metadata on
    /// demand through this generator's transcoder.
    pub fn matches(
        &self,
        asset: &mut ImageAsset,
        matcher: Option<&Matcher>,
    ) -> Result<bool, MatchError> {
        matcher::matches(asset, matcher, self.transcoder.as_ref())
    }

    /// Create the variant set for one source image.
    ///
    /// Fails immediately when the source is not a realized buffer or its
    /// own format is unsupported. An unsupported *requested* format fails
    /// lazily, when the stream reaches that work item. The source is only
    /// mutated to attach its metadata; ownership stays with the caller.
    pub fn generate(
        &self,
        source: &mut ImageAsset,
        overrides: &GenerateConfig,
    ) -> Result<VariantStream, GenerateError> {
        let Some(bytes) = source.bytes().cloned() else {
            return Err(GenerateError::InvalidInput);
        };

        source.attach_metadata(self.transcoder.as_ref(), false);

        let token = source.extension_token().unwrap_or_default();
        let Some(source_format) = Format::from_token(&token) else {
            return Err(GenerateError::UnsupportedFormat(token));
        };

        let config = config::resolve(&self.config, overrides);
        let origin_width = source.metadata.map(|m| m.width);
        let items = plan(
            &config.formats,
            &config.widths,
            source_format,
            origin_width,
            config.scaling_up,
        );

        let concurrency = config
            .concurrency
            .unwrap_or_else(executor::default_concurrency);

        let mut template = source.clone_without_contents();
        template.postfix = None;

        let ctx = Arc::new(JobContext {
            bytes,
            template,
            config,
            transcoder: Arc::clone(&self.transcoder),
            optimizer: Arc::clone(&self.optimizer),
        });
        let handler: Handler = Box::new(move |item| ctx.run(item));

        Ok(VariantStream {
            inner: execute_ordered(items, concurrency, handler),
        })
    }
}

impl Default for SrcsetGenerator {
    fn default() -> Self {
        Self::new(GeneratorConfig::default())
    }
}

type Handler = Box<dyn Fn(WorkItem) -> Result<Vec<ImageAsset>, GenerateError> + Send + Sync>;

/// Lazy, ordered sequence of derived assets from one `generate` call.
pub struct VariantStream {
    inner: OrderedResults<WorkItem, ImageAsset, GenerateError, Handler>,
}

impl Iterator for VariantStream {
    type Item = Result<ImageAsset, GenerateError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

/// Everything a work item needs, shared read-only across the pool.
struct JobContext {
    bytes: Arc<Vec<u8>>,
    template: ImageAsset,
    config: ResolvedConfig,
    transcoder: Arc<dyn Transcoder>,
    optimizer: Arc<dyn Optimizer>,
}

impl JobContext {
    fn run(&self, item: WorkItem) -> Result<Vec<ImageAsset>, GenerateError> {
        match item {
            WorkItem::Unsupported(token) => Err(GenerateError::UnsupportedFormat(token)),
            WorkItem::Variant(variant) => self.run_variant(&variant),
        }
    }

    fn run_variant(&self, item: &PlannedVariant) -> Result<Vec<ImageAsset>, GenerateError> {
        let config = &self.config;
        let mut target = self.template.clone();

        if item.optimize_only {
            if config.skip_optimization {
                target.contents = Contents::Buffer(Arc::clone(&self.bytes));
                return Ok(vec![target]);
            }
            let optimized =
                self.optimizer
                    .optimize(&self.bytes, item.format, &config.optimization)?;
            target.contents = Contents::Buffer(Arc::new(optimized));
            target.attach_metadata(self.transcoder.as_ref(), true);
            return Ok(vec![target]);
        }

        target.set_format(item.format);
        let postfix = config
            .postfix
            .resolve(item.postfix_width, item.width_param, item.format);
        target.append_postfix(&postfix);

        let produced = if item.passthrough {
            Arc::clone(&self.bytes)
        } else {
            Arc::new(self.transcoder.transcode(
                &self.bytes,
                item.format,
                item.resize_to,
                &config.processing,
            )?)
        };

        let final_bytes = if config.skip_optimization {
            produced
        } else {
            Arc::new(
                self.optimizer
                    .optimize(&produced, item.format, &config.optimization)?,
            )
        };

        target.contents = Contents::Buffer(final_bytes);
        // Dimensions changed (or may have): refresh unconditionally.
        target.attach_metadata(self.transcoder.as_ref(), true);
        if let Some(meta) = target.metadata.as_mut() {
            meta.origin_multiplier = item.multiplier;
        }

        Ok(vec![target])
    }
}
