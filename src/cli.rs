// ============================================================================
// LayerFX CLI — headless layer compositing via command-line arguments
// ============================================================================
//
// Usage examples:
//   layerfx -i photo.png --rotate 90 -o rotated.png
//   layerfx -i base.png overlay.png --mirror-x --levels 0.6 -o out.jpg --quality 85
//   layerfx -i photo.png --mask vignette.png -o masked.png
//   layerfx -i photo.png --select "10,10 200,10 200,120 10,120" -o crop.png
//   layerfx -i card.png --text "Hello\nWorld" --font "DejaVu Sans" --font-size 48 -o card_text.png
//
// Every input becomes a bitmap layer (first input at the bottom).  Effects,
// filters and the mask apply to the top layer.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use kurbo::Point;

use crate::compositor::DocumentCompositor;
use crate::document::{Document, Effects, Filters, Layer, Mask, TextDescriptor};
use crate::io::{encode_image, load_image, write_bytes, SnapshotFormat};
use crate::pipeline::LayerEffectPipeline;
use crate::settings::EngineSettings;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// LayerFX headless layer compositor.
#[derive(Parser, Debug)]
#[command(
    name = "layerfx",
    about = "LayerFX headless layer compositor",
    long_about = "Stack images as layers, apply rotation, mirroring, masks, levels and\n\
                  contrast to the top layer, then export a full-resolution snapshot or\n\
                  the pixels inside a selection polygon.\n\n\
                  Example:\n  \
                  layerfx -i photo.png --rotate 90 --mirror-x -o out.png\n  \
                  layerfx -i photo.png --select \"0,0 50,0 0,50\" -o triangle.png"
)]
pub struct CliArgs {
    /// Input image(s), bottom layer first.  Glob patterns accepted
    /// (e.g. "layers/*.png"); matches are stacked in name order.
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Output file.  Defaults to "<first input stem>_fx.<ext>" next to the input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format: png, jpeg, bmp.  Inferred from --output when omitted.
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// JPEG quality (0–100).  Defaults to the configured quality.
    #[arg(short, long, value_name = "0-100")]
    pub quality: Option<u8>,

    /// Rotation of the top layer in degrees.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub rotate: f64,

    /// Mirror the top layer horizontally.
    #[arg(long)]
    pub mirror_x: bool,

    /// Mirror the top layer vertically.
    #[arg(long)]
    pub mirror_y: bool,

    /// Levels (raw value, 0 = off).
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub levels: f64,

    /// Contrast in -1..1 (0 = off).
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub contrast: f64,

    /// Mask image applied to the top layer (alpha channel is used).
    #[arg(long, value_name = "FILE")]
    pub mask: Option<PathBuf>,

    /// Mask offset within the top layer.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub mask_x: f64,

    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub mask_y: f64,

    /// Add a text layer on top with this content ("\n" starts a new line).
    #[arg(long)]
    pub text: Option<String>,

    /// Font family for --text.
    #[arg(long, default_value = "Arial")]
    pub font: String,

    #[arg(long, default_value_t = 32.0)]
    pub font_size: f32,

    /// CSS colour for --text (#rgb, #rrggbb, #rrggbbaa or a basic name).
    #[arg(long, default_value = "#000000")]
    pub color: String,

    /// Explicit line height for --text.
    #[arg(long)]
    pub line_height: Option<f32>,

    /// Fixed per-character advance for --text (0 = natural kerning).
    #[arg(long, default_value_t = 0.0)]
    pub spacing: f32,

    /// Export only the top layer inside this polygon: "x,y x,y x,y …"
    /// in document coordinates.
    #[arg(long, value_name = "POINTS")]
    pub select: Option<String>,

    /// Device pixel ratio for compositing.  Defaults to the configured ratio.
    #[arg(long)]
    pub pixel_ratio: Option<f64>,

    /// Print per-step timing information.
    #[arg(short, long)]
    pub verbose: bool,
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run the CLI and return an OS exit code.
/// `0` = output written, `1` = failure.
pub fn run(args: CliArgs) -> ExitCode {
    let start = Instant::now();
    match pollster::block_on(run_async(&args)) {
        Ok(path) => {
            if args.verbose {
                println!(
                    "→ {} ({:.0}ms)",
                    path.display(),
                    start.elapsed().as_secs_f64() * 1000.0
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {}", e);
            log_err!("CLI run failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_async(args: &CliArgs) -> Result<PathBuf, String> {
    let mut settings = EngineSettings::load();
    if let Some(ratio) = args.pixel_ratio {
        settings.pixel_ratio = ratio;
    }
    let quality = args.quality.unwrap_or(settings.default_quality);
    let format = parse_format(args.format.as_deref(), args.output.as_deref());

    let inputs = resolve_inputs(&args.input);
    let first = inputs
        .first()
        .ok_or_else(|| "no input files matched the given pattern(s)".to_string())?;
    let output = build_output_path(first, args.output.as_deref(), format)
        .ok_or_else(|| format!("cannot determine output path for '{}'", first.display()))?;

    // -- Step 1: Load layers ---------------------------------------------
    let mut document = build_document(&inputs, args)?;

    // -- Step 2: Effects on the top layer --------------------------------
    let mask = match &args.mask {
        Some(path) => {
            let bitmap = load_image(path).map_err(|e| format!("mask load failed: {}", e))?;
            Some(Mask { bitmap, x: args.mask_x, y: args.mask_y })
        }
        None => None,
    };
    let selection = args.select.as_deref().map(parse_selection).transpose()?;

    let top = document
        .active_layer_mut()
        .ok_or_else(|| "document has no layers".to_string())?;
    top.set_effects(Effects {
        rotation: args.rotate.to_radians(),
        mirror_x: args.mirror_x,
        mirror_y: args.mirror_y,
    });
    top.set_filters(Filters { levels: args.levels, contrast: args.contrast });
    if mask.is_some() {
        top.set_mask(mask);
    }
    if let Some(points) = selection.clone() {
        top.set_selection(points);
    }

    // -- Step 3: Composite + encode --------------------------------------
    let mut pipeline = LayerEffectPipeline::new(&settings);
    let compositor = DocumentCompositor::new(&settings);
    let bytes = if selection.is_some() {
        let image = compositor
            .extract_selection(&mut document, &mut pipeline)
            .await
            .ok_or_else(|| "selection has no area".to_string())?;
        encode_image(&image, format, quality).map_err(|e| format!("encode failed: {}", e))?
    } else {
        compositor
            .create_snapshot(&mut document, &mut pipeline, format, quality)
            .await
            .map_err(|e| format!("snapshot failed: {}", e))?
    };

    write_bytes(&output, &bytes).map_err(|e| format!("save failed: {}", e))?;
    log_info!("CLI wrote {} ({} bytes)", output.display(), bytes.len());
    Ok(output)
}

/// One bitmap layer per input, plus the optional text layer on top.  The
/// document takes the size of the first input.
fn build_document(inputs: &[PathBuf], args: &CliArgs) -> Result<Document, String> {
    let mut document: Option<Document> = None;
    for path in inputs {
        let image = load_image(path).map_err(|e| format!("load of '{}' failed: {}", path.display(), e))?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Layer".to_string());
        let doc = document.get_or_insert_with(|| Document::new(name.clone(), image.width(), image.height()));
        doc.add_layer(Layer::new_bitmap(name, image));
    }
    let mut document = document.ok_or_else(|| "no input images".to_string())?;

    if let Some(value) = &args.text {
        let text = TextDescriptor {
            value: value.replace("\\n", "\n"),
            font: args.font.clone(),
            size: args.font_size,
            color: args.color.clone(),
            line_height: args.line_height,
            spacing: args.spacing,
        };
        let (w, h) = (document.width, document.height);
        document.add_layer(Layer::new_text("Text", w, h, text));
    }
    Ok(document)
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// Parse `"x,y x,y …"` into document-space points.
pub fn parse_selection(s: &str) -> Result<Vec<Point>, String> {
    s.split_whitespace()
        .map(|pair| {
            let (x, y) = pair
                .split_once(',')
                .ok_or_else(|| format!("bad selection point '{}', expected x,y", pair))?;
            let x: f64 = x.trim().parse().map_err(|_| format!("bad x in '{}'", pair))?;
            let y: f64 = y.trim().parse().map_err(|_| format!("bad y in '{}'", pair))?;
            Ok(Point::new(x, y))
        })
        .collect()
}

/// Choose the [`SnapshotFormat`] from the `--format` string or infer it from
/// the output file extension.  Defaults to PNG when neither is known.
fn parse_format(format_arg: Option<&str>, output: Option<&Path>) -> SnapshotFormat {
    if let Some(f) = format_arg {
        return SnapshotFormat::from_extension(f).unwrap_or_default();
    }
    output.and_then(SnapshotFormat::from_path).unwrap_or_default()
}

/// Explicit `--output`, otherwise `<stem>_fx.<ext>` beside the first input.
fn build_output_path(input: &Path, output: Option<&Path>, format: SnapshotFormat) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }
    let stem = input.file_stem()?.to_string_lossy().into_owned();
    let parent = input.parent().unwrap_or(Path::new("."));
    Some(parent.join(format!("{}_fx.{}", stem, format.extension())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_points_parse() {
        let pts = parse_selection(" 1,2  3.5,-4 ").unwrap();
        assert_eq!(pts, vec![Point::new(1.0, 2.0), Point::new(3.5, -4.0)]);
        assert!(parse_selection("1;2").is_err());
        assert!(parse_selection("1,x").is_err());
    }

    #[test]
    fn format_prefers_flag_then_extension() {
        assert_eq!(parse_format(Some("jpeg"), Some(Path::new("a.png"))), SnapshotFormat::Jpeg);
        assert_eq!(parse_format(None, Some(Path::new("a.BMP"))), SnapshotFormat::Bmp);
        assert_eq!(parse_format(None, None), SnapshotFormat::Png);
    }

    #[test]
    fn default_output_sits_beside_input() {
        let p = build_output_path(Path::new("shots/cat.png"), None, SnapshotFormat::Jpeg).unwrap();
        assert_eq!(p, Path::new("shots/cat_fx.jpg"));
    }

    #[test]
    fn unmatched_patterns_resolve_to_nothing() {
        assert!(resolve_inputs(&["/definitely/not/here/*.png".to_string()]).is_empty());
    }

    #[test]
    fn args_parse_with_negative_rotation() {
        let args = CliArgs::try_parse_from([
            "layerfx", "-i", "a.png", "b.png", "--rotate", "-90", "--mirror-x", "--select", "0,0 4,0 0,4",
        ])
        .unwrap();
        assert_eq!(args.input.len(), 2);
        assert_eq!(args.rotate, -90.0);
        assert!(args.mirror_x && !args.mirror_y);
        assert_eq!(parse_selection(args.select.as_deref().unwrap()).unwrap().len(), 3);
    }
}
