//! The optimizer boundary: lossy/lossless post-compression as plugins.
//!
//! Optimization is format-keyed: an [`OptimizationConfig`] holds an ordered
//! list of plugins per format, and [`BasicOptimizer`] runs them in sequence
//! over the encoded bytes. A format with zero configured plugins passes
//! through unchanged. The optimizer interface guarantees output is never
//! larger than input — a plugin chain that grows the buffer is discarded in
//! favor of the original bytes.

use crate::format::Format;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OptimizeError {
    #[error("optimizer plugin failed: {0}")]
    Plugin(String),
}

/// A single compression pass over encoded image bytes.
pub type OptimizePlugin = Arc<dyn Fn(&[u8]) -> Result<Vec<u8>, OptimizeError> + Send + Sync>;

/// Ordered plugin lists, one per supported format.
#[derive(Clone, Default)]
pub struct OptimizationConfig {
    pub svg: Vec<OptimizePlugin>,
    pub gif: Vec<OptimizePlugin>,
    pub png: Vec<OptimizePlugin>,
    pub jpg: Vec<OptimizePlugin>,
    pub webp: Vec<OptimizePlugin>,
    pub avif: Vec<OptimizePlugin>,
}

impl OptimizationConfig {
    pub fn plugins_for(&self, format: Format) -> &[OptimizePlugin] {
        match format {
            Format::Svg => &self.svg,
            Format::Gif => &self.gif,
            Format::Png => &self.png,
            Format::Jpg => &self.jpg,
            Format::Webp => &self.webp,
            Format::Avif => &self.avif,
        }
    }

    /// Append a plugin to a format's chain.
    pub fn push(&mut self, format: Format, plugin: OptimizePlugin) {
        match format {
            Format::Svg => self.svg.push(plugin),
            Format::Gif => self.gif.push(plugin),
            Format::Png => self.png.push(plugin),
            Format::Jpg => self.jpg.push(plugin),
            Format::Webp => self.webp.push(plugin),
            Format::Avif => self.avif.push(plugin),
        }
    }
}

impl fmt::Debug for OptimizationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptimizationConfig")
            .field("svg", &self.svg.len())
            .field("gif", &self.gif.len())
            .field("png", &self.png.len())
            .field("jpg", &self.jpg.len())
            .field("webp", &self.webp.len())
            .field("avif", &self.avif.len())
            .finish()
    }
}

/// An external image optimizer.
pub trait Optimizer: Send + Sync {
    /// Compress `bytes`. Must never return a buffer larger than the input;
    /// with no work to do the input passes through unchanged.
    fn optimize(
        &self,
        bytes: &[u8],
        format: Format,
        config: &OptimizationConfig,
    ) -> Result<Vec<u8>, OptimizeError>;
}

/// Runs the configured plugin chain for the format.
#[derive(Debug, Default)]
pub struct BasicOptimizer;

impl BasicOptimizer {
    pub fn new() -> Self {
        Self
    }
}

impl Optimizer for BasicOptimizer {
    fn optimize(
        &self,
        bytes: &[u8],
        format: Format,
        config: &OptimizationConfig,
    ) -> Result<Vec<u8>, OptimizeError> {
        let mut current = bytes.to_vec();
        for plugin in config.plugins_for(format) {
            current = plugin(&current)?;
        }

        // Never grow the buffer.
        if current.len() > bytes.len() {
            return Ok(bytes.to_vec());
        }
        Ok(current)
    }
}
