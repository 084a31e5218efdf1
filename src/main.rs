use clap::Parser;
use serde::Serialize;
use srcset_gen::{
    GenerateConfig, GeneratorConfig, ImageAsset, Matcher, Postfix, Rule, SrcsetGenerator,
    load_rules,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "srcset-gen")]
#[command(about = "Generate responsive image variant sets")]
#[command(long_about = "\
Generate responsive image variant sets

Expands each source image into the formats × widths you ask for, writes
the variants next to each other in the destination directory, and names
them with a width postfix (photo.jpg → photo@1280w.webp).

Widths at or below 1 are scale factors of the source width (0.5 = half
size); widths above 1 are absolute pixel targets. SVG and GIF sources are
optimized but never resized or converted.

Rule files let different sources get different treatment:

  [[rule]]
  match = \"photos/**/*.jpg\"
  format = [\"webp\", \"jpg\"]
  width = [1, 1280, 320]

  [[rule]]
  match = \"(min-width: 2000px)\"
  width = [0.5]

A source is processed by every rule it matches; a rule without a match
pattern applies to everything.")]
#[command(version)]
struct Cli {
    /// Source images: paths or glob patterns
    #[arg(required = true)]
    sources: Vec<String>,

    /// Output widths (repeatable); <= 1 is a scale factor
    #[arg(short, long)]
    width: Vec<f64>,

    /// Output formats (repeatable): jpg, png, webp, avif, gif, svg
    #[arg(short, long)]
    format: Vec<String>,

    /// Only process sources matching this glob or media query (repeatable)
    #[arg(short = 'm', long = "match")]
    matches: Vec<String>,

    /// TOML rule file; replaces the --width/--format/--match flags
    #[arg(long, value_name = "FILE", conflicts_with_all = ["width", "format", "matches"])]
    rules: Option<PathBuf>,

    /// Destination directory
    #[arg(short, long, default_value = ".")]
    dest: PathBuf,

    /// Literal filename postfix instead of the default @{width}w
    #[arg(long)]
    postfix: Option<String>,

    /// Write variants without running optimization plugins
    #[arg(long)]
    skip_optimization: bool,

    /// Drop variants that would be wider than their source
    #[arg(long)]
    no_scaling_up: bool,

    /// Concurrent work items (default: available parallelism)
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Write a JSON manifest of emitted variants
    #[arg(long, value_name = "FILE")]
    manifest: Option<PathBuf>,

    /// Print every emitted variant
    #[arg(short, long)]
    verbose: bool,
}

/// One emitted variant, as recorded in the manifest.
#[derive(Serialize)]
struct ManifestEntry {
    source: String,
    path: String,
    width: Option<u32>,
    height: Option<u32>,
    format: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(n) = cli.concurrency {
        // Ignore the error: a pool may already exist in embedded use.
        let _ = rayon::ThreadPoolBuilder::new().num_threads(n).build_global();
    }

    let sources = expand_sources(&cli.sources)?;
    if sources.is_empty() {
        return Err("no source images matched".into());
    }

    let rules = match &cli.rules {
        Some(path) => load_rules(path)?,
        None => vec![rule_from_flags(&cli)],
    };

    let generator = SrcsetGenerator::new(GeneratorConfig {
        skip_optimization: cli.skip_optimization,
        scaling_up: !cli.no_scaling_up,
        concurrency: cli.concurrency,
        postfix: cli
            .postfix
            .clone()
            .map(Postfix::Literal)
            .unwrap_or_default(),
        ..GeneratorConfig::default()
    });

    std::fs::create_dir_all(&cli.dest)?;

    let mut manifest = Vec::new();
    let mut claimed: HashMap<std::ffi::OsString, String> = HashMap::new();
    let mut emitted = 0usize;
    let mut skipped = 0usize;

    for path in &sources {
        let mut source = ImageAsset::read(path)?;
        let source_str = source.path_str();
        let mut matched_any = false;

        for rule in &rules {
            if !generator.matches(&mut source, rule.match_spec.as_ref())? {
                continue;
            }
            matched_any = true;

            for variant in generator.generate(&mut source, &rule.config)? {
                let variant = variant?;
                let name = file_name(&variant.path);
                claim_output(&mut claimed, &name, &source_str)?;
                let out_path = cli.dest.join(&name);
                if let Some(bytes) = variant.bytes() {
                    std::fs::write(&out_path, bytes.as_slice())?;
                }
                emitted += 1;

                if cli.verbose {
                    match variant.metadata {
                        Some(m) => println!(
                            "  {} ({}x{})",
                            out_path.display(),
                            m.width,
                            m.height
                        ),
                        None => println!("  {}", out_path.display()),
                    }
                }
                manifest.push(ManifestEntry {
                    source: source_str.clone(),
                    path: out_path.to_string_lossy().into_owned(),
                    width: variant.metadata.map(|m| m.width),
                    height: variant.metadata.map(|m| m.height),
                    format: variant.metadata.map(|m| m.format.to_string()),
                });
            }
        }

        if !matched_any {
            skipped += 1;
            if cli.verbose {
                println!("  {source_str} (no matching rule)");
            }
        }
    }

    if let Some(path) = &cli.manifest {
        std::fs::write(path, serde_json::to_string_pretty(&manifest)?)?;
    }

    println!(
        "{} variant{} from {} source{} ({} skipped)",
        emitted,
        plural(emitted),
        sources.len(),
        plural(sources.len()),
        skipped
    );

    Ok(())
}

/// Build the single implicit rule the command-line flags describe.
fn rule_from_flags(cli: &Cli) -> Rule {
    let match_spec = match cli.matches.len() {
        0 => None,
        1 => Some(Matcher::from_pattern(&cli.matches[0])),
        _ => Some(Matcher::All(
            cli.matches.iter().map(|p| Matcher::from_pattern(p)).collect(),
        )),
    };

    Rule {
        match_spec,
        config: GenerateConfig {
            format: cli.format.clone(),
            width: cli.width.clone(),
            ..GenerateConfig::default()
        },
    }
}

/// Expand the source arguments: glob patterns fan out, plain paths pass
/// through untouched so a missing file still errors loudly later.
fn expand_sources(args: &[String]) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    let mut out = Vec::new();
    for arg in args {
        if arg.contains(['*', '?', '[']) {
            for entry in glob::glob(arg)? {
                let path = entry?;
                if path.is_file() {
                    out.push(path);
                }
            }
        } else {
            out.push(PathBuf::from(arg));
        }
    }
    out.sort();
    out.dedup();
    Ok(out)
}

fn file_name(path: &Path) -> std::ffi::OsString {
    path.file_name().map(|n| n.to_os_string()).unwrap_or_default()
}

/// Claim an output file name for a source. The destination directory is
/// flat, so sources in different directories can resolve to the same
/// variant name; that is an error, not a silent overwrite. A source may
/// re-claim its own names (several rules can emit the same variant).
fn claim_output(
    claimed: &mut HashMap<std::ffi::OsString, String>,
    name: &std::ffi::OsStr,
    source: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    match claimed.get(name) {
        Some(owner) if owner != source => Err(format!(
            "output name collision: {} produced by both {owner} and {source}",
            Path::new(name).display()
        )
        .into()),
        Some(_) => Ok(()),
        None => {
            claimed.insert(name.to_os_string(), source.to_string());
            Ok(())
        }
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "" } else { "s" }
}
