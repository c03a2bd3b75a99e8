use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use regex::Regex;
use resnap_core::{
    aligned_dimensions, resolve_size, ResolutionTier, SizePolicy, SizeRequest, TierChoice,
    BUCKET_CATALOG,
};
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(name = "resnap", version, about = "Safe output sizes for pixel-budgeted image editing models")]
struct Cli {
    #[command(subcommand)]
    command: TopLevelCommand,
}

#[derive(Subcommand, Debug)]
enum TopLevelCommand {
    Fit(FitArgs),
    Buckets(BucketsArgs),
}

#[derive(Args, Debug)]
struct FitArgs {
    /// Image file, directory, or regex matched against file names.
    #[arg(long, short = 'i')]
    input: Option<String>,
    /// Root directory for regex input matching (defaults to current directory).
    #[arg(long, short = 'r')]
    input_root: Option<PathBuf>,
    /// Recurse when scanning directories / regex matches.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    recursive: bool,
    /// If set, abort the whole run on the first input error.
    #[arg(long, default_value_t = false, action = clap::ArgAction::SetTrue)]
    strict: bool,
    /// Explicit input width; use together with --height instead of --input.
    #[arg(long, short = 'W')]
    width: Option<u32>,
    /// Explicit input height; use together with --width instead of --input.
    #[arg(long, short = 'H')]
    height: Option<u32>,
    #[arg(long, short = 't', default_value = "auto")]
    tier: String,
    #[arg(long, default_value_t = 0.10)]
    tolerance: f64,
    #[arg(long, default_value_t = 2_000_000)]
    min_2k_pixels: u32,
    #[arg(long, default_value_t = 8_000_000)]
    min_4k_pixels: u32,
}

#[derive(Args, Debug)]
struct BucketsArgs {
    #[arg(long, short = 't', default_value = "1k")]
    tier: String,
    #[arg(long, default_value_t = 0.10)]
    tolerance: f64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        TopLevelCommand::Fit(args) => run_fit(&args),
        TopLevelCommand::Buckets(args) => run_buckets(&args),
    }
}

fn run_fit(args: &FitArgs) -> Result<()> {
    let tier = parse_tier_choice(&args.tier)?;
    let policy = SizePolicy {
        pixel_tolerance: args.tolerance,
        min_2k_input_pixels: args.min_2k_pixels,
        min_4k_input_pixels: args.min_4k_pixels,
    };

    let mut results = Vec::new();
    match (args.width, args.height, args.input.as_ref()) {
        (Some(width), Some(height), None) => {
            let request = SizeRequest { width, height, tier };
            let size = resolve_size(&request, &policy)?;
            results.push(fit_entry(None, width, height, &size));
        }
        (None, None, Some(_)) => {
            let inputs = resolve_fit_inputs(args)?;
            if inputs.is_empty() {
                return Err(anyhow!("no input images matched"));
            }
            let bulk_mode = inputs.len() > 1;
            for input_path in inputs {
                let (width, height) = match image::image_dimensions(&input_path) {
                    Ok(dimensions) => dimensions,
                    Err(err) => {
                        if bulk_mode && !args.strict {
                            results.push(serde_json::json!({
                                "input": input_path,
                                "error": format!("failed to read dimensions: {}", err),
                            }));
                            continue;
                        }
                        return Err(anyhow!(
                            "failed to read dimensions of {}: {}",
                            input_path.display(),
                            err
                        ));
                    }
                };
                let request = SizeRequest { width, height, tier };
                let size = match resolve_size(&request, &policy) {
                    Ok(size) => size,
                    Err(err) => {
                        if bulk_mode && !args.strict {
                            results.push(serde_json::json!({
                                "input": input_path,
                                "error": err.to_string(),
                            }));
                            continue;
                        }
                        return Err(anyhow!("{}: {}", input_path.display(), err));
                    }
                };
                results.push(fit_entry(Some(&input_path), width, height, &size));
            }
        }
        _ => {
            return Err(anyhow!(
                "pass either --width and --height, or --input (not both)"
            ));
        }
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({ "results": results }))?
    );
    Ok(())
}

fn fit_entry(
    input: Option<&Path>,
    width: u32,
    height: u32,
    size: &resnap_core::SafeSize,
) -> serde_json::Value {
    serde_json::json!({
        "input": input,
        "inputWidth": width,
        "inputHeight": height,
        "tier": size.tier.label(),
        "bucket": size.bucket.to_string(),
        "width": size.width,
        "height": size.height,
        "megapixels": size.megapixels(),
        "summary": size.to_string(),
    })
}

fn run_buckets(args: &BucketsArgs) -> Result<()> {
    let tier = parse_tier(&args.tier)?;
    let buckets: Vec<serde_json::Value> = BUCKET_CATALOG
        .iter()
        .map(|bucket| {
            let (width, height) = aligned_dimensions(*bucket, tier, args.tolerance);
            serde_json::json!({
                "bucket": bucket.to_string(),
                "ratioW": bucket.ratio_w,
                "ratioH": bucket.ratio_h,
                "width": width,
                "height": height,
                "megapixels": f64::from(width) * f64::from(height) / 1_000_000.0,
            })
        })
        .collect();
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "tier": tier.label(),
            "pixelBudget": tier.pixel_budget(),
            "buckets": buckets,
        }))?
    );
    Ok(())
}

fn resolve_fit_inputs(args: &FitArgs) -> Result<Vec<PathBuf>> {
    let spec = args
        .input
        .as_ref()
        .ok_or_else(|| anyhow!("--input is required"))?;
    let candidate = PathBuf::from(spec);
    if candidate.is_dir() {
        return collect_images(&candidate, args.recursive, |_| true);
    }
    if candidate.exists() {
        return Ok(vec![candidate]);
    }
    // Not a path on disk: a regex matched against file names under input_root.
    let pattern = Regex::new(spec).map_err(|err| anyhow!("invalid regex '{}': {}", spec, err))?;
    let root = match args.input_root.clone() {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    collect_images(&root, args.recursive, |name| pattern.is_match(name))
}

/// Walks `root` for supported image files whose name passes `keep`,
/// sorted for a stable output order.
fn collect_images<F>(root: &Path, recursive: bool, keep: F) -> Result<Vec<PathBuf>>
where
    F: Fn(&str) -> bool,
{
    let depth = if recursive { usize::MAX } else { 1 };
    let mut images: Vec<PathBuf> = WalkDir::new(root)
        .max_depth(depth)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            has_image_extension(path)
                && match path.file_name().and_then(|name| name.to_str()) {
                    Some(name) => keep(name),
                    None => false,
                }
        })
        .collect();
    images.sort();
    Ok(images)
}

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}

fn parse_tier_choice(value: &str) -> Result<TierChoice> {
    match value.to_ascii_lowercase().as_str() {
        "auto" => Ok(TierChoice::Auto),
        "1k" => Ok(TierChoice::OneK),
        "2k" => Ok(TierChoice::TwoK),
        "4k" => Ok(TierChoice::FourK),
        other => Err(anyhow!(
            "unknown tier '{}'; expected one of: auto, 1k, 2k, 4k",
            other
        )),
    }
}

fn parse_tier(value: &str) -> Result<ResolutionTier> {
    match value.to_ascii_lowercase().as_str() {
        "1k" => Ok(ResolutionTier::OneK),
        "2k" => Ok(ResolutionTier::TwoK),
        "4k" => Ok(ResolutionTier::FourK),
        other => Err(anyhow!(
            "unknown tier '{}'; expected one of: 1k, 2k, 4k",
            other
        )),
    }
}
