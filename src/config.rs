//! Layered generation configuration.
//!
//! Two levels: [`GeneratorConfig`] holds instance defaults, and a per-call
//! [`GenerateConfig`] overlays them. The overlay is an explicit
//! field-by-field merge ([`resolve`]) — a `Some` override wins, everything
//! else falls back to the instance value. Defaults are constructed fresh by
//! the `Default` impls, so two generator instances never share mutable
//! state.
//!
//! Declarative rule files are TOML with repeated `[[rule]]` tables:
//!
//! ```toml
//! [[rule]]
//! match = "**/*.jpg"
//! format = ["webp", "jpg"]
//! width = [1, 1280, 320]
//! skip_optimization = false
//!
//! [[rule]]
//! match = "(min-width: 1000px)"
//! width = [0.5]
//! postfix = "@half"
//! ```

use crate::format::Format;
use crate::matcher::Matcher;
use crate::optimize::{OptimizationConfig, OptimizePlugin};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse rule file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Quality setting for lossy image encoding (1-100). Clamped on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "u32")]
pub struct Quality(u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl From<u32> for Quality {
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(100)
    }
}

/// JPEG encoding parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct JpegParams {
    pub quality: Quality,
}

/// WebP encoding parameters. The built-in transcoder encodes losslessly and
/// ignores `quality`; custom transcoders may honor it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct WebpParams {
    pub quality: Quality,
}

/// PNG encoding parameters. PNG is lossless; nothing to tune yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct PngParams {}

/// AVIF encoding parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AvifParams {
    pub quality: Quality,
    /// Encoder speed, 1 (slow, small) to 10 (fast, large).
    pub speed: u8,
}

impl Default for AvifParams {
    fn default() -> Self {
        Self {
            quality: Quality::new(80),
            speed: 6,
        }
    }
}

/// Per-format encoding parameters handed to the transcoder.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub jpg: JpegParams,
    pub webp: WebpParams,
    pub png: PngParams,
    pub avif: AvifParams,
}

/// Per-call processing overrides: a `Some` replaces that format's params.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct ProcessingOverrides {
    pub jpg: Option<JpegParams>,
    pub webp: Option<WebpParams>,
    pub png: Option<PngParams>,
    pub avif: Option<AvifParams>,
}

/// Per-call optimization overrides: a `Some` replaces that format's plugin
/// chain. Plugins are code, so these never come from rule files.
#[derive(Clone, Default)]
pub struct OptimizationOverrides {
    pub svg: Option<Vec<OptimizePlugin>>,
    pub gif: Option<Vec<OptimizePlugin>>,
    pub png: Option<Vec<OptimizePlugin>>,
    pub jpg: Option<Vec<OptimizePlugin>>,
    pub webp: Option<Vec<OptimizePlugin>>,
    pub avif: Option<Vec<OptimizePlugin>>,
}

impl fmt::Debug for OptimizationOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn len(v: &Option<Vec<OptimizePlugin>>) -> String {
            v.as_ref().map_or("default".into(), |p| p.len().to_string())
        }
        f.debug_struct("OptimizationOverrides")
            .field("svg", &len(&self.svg))
            .field("gif", &len(&self.gif))
            .field("png", &len(&self.png))
            .field("jpg", &len(&self.jpg))
            .field("webp", &len(&self.webp))
            .field("avif", &len(&self.avif))
            .finish()
    }
}

/// A formatter producing the filename postfix for a variant, given
/// `(target_width, width_param_as_given, format)`.
pub type PostfixFormatter = Arc<dyn Fn(u32, f64, Format) -> String + Send + Sync>;

/// Postfix rule: a literal string used as-is, or a formatter function.
#[derive(Clone)]
pub enum Postfix {
    Literal(String),
    Formatter(PostfixFormatter),
}

impl Postfix {
    /// Compute the postfix for one variant.
    pub fn resolve(&self, target_width: u32, width_param: f64, format: Format) -> String {
        match self {
            Postfix::Literal(s) => s.clone(),
            Postfix::Formatter(f) => f(target_width, width_param, format),
        }
    }
}

impl Default for Postfix {
    /// Empty for the origin scale (`width == 1`), else `@{width}w`.
    fn default() -> Self {
        Postfix::Formatter(Arc::new(|target_width, width_param, _format| {
            if width_param == 1.0 {
                String::new()
            } else {
                format!("@{target_width}w")
            }
        }))
    }
}

impl fmt::Debug for Postfix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Postfix::Literal(s) => f.debug_tuple("Literal").field(s).finish(),
            Postfix::Formatter(_) => f.write_str("Formatter(..)"),
        }
    }
}

impl<'de> Deserialize<'de> for Postfix {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(Postfix::Literal(String::deserialize(deserializer)?))
    }
}

/// Instance-level defaults for a generator.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub processing: ProcessingConfig,
    #[serde(skip)]
    pub optimization: OptimizationConfig,
    pub postfix: Postfix,
    pub skip_optimization: bool,
    /// Allow variants wider than their source. Enabled by default.
    pub scaling_up: bool,
    /// Work-item concurrency ceiling. `None` means available parallelism.
    pub concurrency: Option<usize>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            processing: ProcessingConfig::default(),
            optimization: OptimizationConfig::default(),
            postfix: Postfix::default(),
            skip_optimization: false,
            scaling_up: true,
            concurrency: None,
        }
    }
}

/// Per-call configuration for one `generate` invocation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GenerateConfig {
    /// Output format tokens. Empty means "source format".
    pub format: Vec<String>,
    /// Output widths. A value `<= 1` is a scale multiplier, `> 1` an
    /// absolute pixel width. Empty means `[1]`.
    pub width: Vec<f64>,
    pub postfix: Option<Postfix>,
    pub processing: ProcessingOverrides,
    #[serde(skip)]
    pub optimization: OptimizationOverrides,
    pub skip_optimization: Option<bool>,
    pub scaling_up: Option<bool>,
    pub concurrency: Option<usize>,
}

/// Effective configuration after overlaying a call config on the defaults.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub formats: Vec<String>,
    pub widths: Vec<f64>,
    pub postfix: Postfix,
    pub processing: ProcessingConfig,
    pub optimization: OptimizationConfig,
    pub skip_optimization: bool,
    pub scaling_up: bool,
    pub concurrency: Option<usize>,
}

/// Overlay `call` onto `defaults`, field by field. `Some` wins; absent
/// fields keep the instance value. Both inputs are read-only — the result
/// owns deep copies, so later calls cannot leak state into each other.
pub fn resolve(defaults: &GeneratorConfig, call: &GenerateConfig) -> ResolvedConfig {
    let processing = ProcessingConfig {
        jpg: call.processing.jpg.unwrap_or(defaults.processing.jpg),
        webp: call.processing.webp.unwrap_or(defaults.processing.webp),
        png: call.processing.png.unwrap_or(defaults.processing.png),
        avif: call.processing.avif.unwrap_or(defaults.processing.avif),
    };
    let optimization = OptimizationConfig {
        svg: call
            .optimization
            .svg
            .clone()
            .unwrap_or_else(|| defaults.optimization.svg.clone()),
        gif: call
            .optimization
            .gif
            .clone()
            .unwrap_or_else(|| defaults.optimization.gif.clone()),
        png: call
            .optimization
            .png
            .clone()
            .unwrap_or_else(|| defaults.optimization.png.clone()),
        jpg: call
            .optimization
            .jpg
            .clone()
            .unwrap_or_else(|| defaults.optimization.jpg.clone()),
        webp: call
            .optimization
            .webp
            .clone()
            .unwrap_or_else(|| defaults.optimization.webp.clone()),
        avif: call
            .optimization
            .avif
            .clone()
            .unwrap_or_else(|| defaults.optimization.avif.clone()),
    };

    ResolvedConfig {
        formats: call.format.clone(),
        widths: call.width.clone(),
        postfix: call.postfix.clone().unwrap_or_else(|| defaults.postfix.clone()),
        processing,
        optimization,
        skip_optimization: call.skip_optimization.unwrap_or(defaults.skip_optimization),
        scaling_up: call.scaling_up.unwrap_or(defaults.scaling_up),
        concurrency: call.concurrency.or(defaults.concurrency),
    }
}

/// A declarative selection + generation rule.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Rule {
    /// Selection criteria. Absent selects everything.
    #[serde(rename = "match")]
    pub match_spec: Option<Matcher>,
    #[serde(flatten)]
    pub config: GenerateConfig,
}

#[derive(Debug, Default, Deserialize)]
struct RuleFile {
    #[serde(default)]
    rule: Vec<Rule>,
}

/// Load `[[rule]]` tables from a TOML file.
pub fn load_rules(path: &Path) -> Result<Vec<Rule>, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    let file: RuleFile = toml::from_str(&text)?;
    Ok(file.rule)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_clamps_to_valid_range() {
        assert_eq!(Quality::new(0).value(), 1);
        assert_eq!(Quality::new(50).value(), 50);
        assert_eq!(Quality::new(150).value(), 100);
    }

    #[test]
    fn resolve_prefers_call_overrides() {
        let defaults = GeneratorConfig {
            skip_optimization: false,
            scaling_up: true,
            ..GeneratorConfig::default()
        };
        let call = GenerateConfig {
            skip_optimization: Some(true),
            scaling_up: Some(false),
            processing: ProcessingOverrides {
                jpg: Some(JpegParams { quality: Quality::new(70) }),
                ..ProcessingOverrides::default()
            },
            ..GenerateConfig::default()
        };

        let resolved = resolve(&defaults, &call);
        assert!(resolved.skip_optimization);
        assert!(!resolved.scaling_up);
        assert_eq!(resolved.processing.jpg.quality.value(), 70);
        // Untouched formats keep the instance defaults.
        assert_eq!(resolved.processing.webp, defaults.processing.webp);
    }

    #[test]
    fn resolve_keeps_defaults_when_call_is_empty() {
        let defaults = GeneratorConfig::default();
        let resolved = resolve(&defaults, &GenerateConfig::default());

        assert!(!resolved.skip_optimization);
        assert!(resolved.scaling_up);
        assert!(resolved.formats.is_empty());
        assert!(resolved.widths.is_empty());
    }

    #[test]
    fn resolve_does_not_mutate_defaults() {
        let defaults = GeneratorConfig::default();
        let call = GenerateConfig {
            skip_optimization: Some(true),
            ..GenerateConfig::default()
        };

        let _ = resolve(&defaults, &call);
        assert!(!defaults.skip_optimization);
    }

    #[test]
    fn default_postfix_formatter() {
        let postfix = Postfix::default();
        assert_eq!(postfix.resolve(3120, 1.0, Format::Jpg), "");
        assert_eq!(postfix.resolve(1280, 1280.0, Format::Jpg), "@1280w");
        assert_eq!(postfix.resolve(1040, 0.33, Format::Webp), "@1040w");
    }

    #[test]
    fn rule_file_parses() {
        let text = r#"
            [[rule]]
            match = "**/*.jpg"
            format = ["webp", "jpg"]
            width = [1.0, 1280.0, 320.0]
            skip_optimization = true

            [[rule]]
            match = ["images/**", "(min-width: 1000px)"]
            postfix = "@custom"
            scaling_up = false

            [[rule]]
            width = [0.5]

            [rule.processing.jpg]
            quality = 80
        "#;
        let file: RuleFile = toml::from_str(text).unwrap();
        assert_eq!(file.rule.len(), 3);

        let first = &file.rule[0];
        assert_eq!(first.config.format, vec!["webp", "jpg"]);
        assert_eq!(first.config.width, vec![1.0, 1280.0, 320.0]);
        assert_eq!(first.config.skip_optimization, Some(true));
        assert!(first.match_spec.is_some());

        let second = &file.rule[1];
        assert!(matches!(second.config.postfix, Some(Postfix::Literal(ref s)) if s == "@custom"));
        assert_eq!(second.config.scaling_up, Some(false));

        let third = &file.rule[2];
        assert!(third.match_spec.is_none());
        assert_eq!(
            third.config.processing.jpg.map(|p| p.quality.value()),
            Some(80)
        );
    }
}
