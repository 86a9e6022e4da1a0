//! press – command-line design renderer.
//!
//! Usage:
//!   press <scene.json> [output] [--format preview|png|pdf] [--dpi 300]
//!         [--width-mm N --height-mm N] [--width PX --height PX]
//!         [--media-root DIR] [--title "Card"]
//!   press --demo business_card card.pdf
//!
//! If `output` is omitted the file is written next to the input with the
//! same stem and the format's extension (e.g. `card.json` → `card.pdf`).
//! Without a physical size the canvas is assumed to be authored at the
//! design DPI and its trim size is derived from that.

use std::{env, fs, path::PathBuf, process};

use press_forge::pipeline::{
    DesignRenderer, OutputFormat, RenderConfig, DEFAULT_PREVIEW_HEIGHT, DEFAULT_PREVIEW_WIDTH,
};
use press_forge::{templates, units};

const DEFAULT_DPI: f32 = 300.0;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    let mut input_path: Option<PathBuf> = None;
    let mut demo: Option<String> = None;
    let mut output_path: Option<PathBuf> = None;
    let mut format: Option<OutputFormat> = None;
    let mut dpi = DEFAULT_DPI;
    let mut size_mm: (Option<f32>, Option<f32>) = (None, None);
    let mut size_px: (Option<u32>, Option<u32>) = (None, None);
    let mut media_root: Option<PathBuf> = None;
    let mut title: Option<String> = None;
    let mut positional = 0usize;

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--demo" => demo = Some(value(&mut iter, arg, &args[0])),
            "--format" | "-f" => {
                format = match value(&mut iter, arg, &args[0]).as_str() {
                    "preview" | "jpeg" | "jpg" => Some(OutputFormat::Jpeg),
                    "png" => Some(OutputFormat::Png),
                    "pdf" => Some(OutputFormat::Pdf),
                    other => fail(&format!("unknown format '{other}'"), &args[0]),
                }
            }
            "--dpi" => dpi = number(&mut iter, arg, &args[0]),
            "--width-mm" => size_mm.0 = Some(number(&mut iter, arg, &args[0])),
            "--height-mm" => size_mm.1 = Some(number(&mut iter, arg, &args[0])),
            "--width" => size_px.0 = Some(number(&mut iter, arg, &args[0])),
            "--height" => size_px.1 = Some(number(&mut iter, arg, &args[0])),
            "--media-root" => media_root = Some(PathBuf::from(value(&mut iter, arg, &args[0]))),
            "--title" | "-t" => title = Some(value(&mut iter, arg, &args[0])),
            "--help" | "-h" => {
                print_usage(&args[0]);
                process::exit(0);
            }
            other if other.starts_with('-') => fail(&format!("Unknown flag: {other}"), &args[0]),
            path => {
                if positional == 0 && demo.is_none() {
                    input_path = Some(PathBuf::from(path));
                } else if output_path.is_none() {
                    output_path = Some(PathBuf::from(path));
                } else {
                    fail(&format!("Unexpected argument: {path}"), &args[0]);
                }
                positional += 1;
            }
        }
    }

    let (json, stem) = match (&demo, &input_path) {
        (Some(name), _) => match templates::by_name(name) {
            Some(json) => (json.to_string(), name.clone()),
            None => fail(
                &format!("unknown demo '{name}' (try: {})", templates::TEMPLATE_NAMES.join(", ")),
                &args[0],
            ),
        },
        (None, Some(path)) => match fs::read_to_string(path) {
            Ok(s) => {
                let stem = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("design")
                    .to_string();
                (s, stem)
            }
            Err(e) => {
                eprintln!("Error reading '{}': {e}", path.display());
                process::exit(1);
            }
        },
        (None, None) => fail("no input file specified.", &args[0]),
    };

    let format = format
        .or_else(|| output_path.as_ref().and_then(|p| format_from_extension(p)))
        .unwrap_or(OutputFormat::Pdf);

    let output = output_path.unwrap_or_else(|| {
        let base = input_path.clone().unwrap_or_else(|| PathBuf::from(&stem));
        base.with_extension(format.extension())
    });

    let mut config = RenderConfig::from_env().with_title(title.unwrap_or_else(|| stem.clone()));
    if let Some(root) = media_root {
        config = config.with_media_root(root);
    }
    let renderer = DesignRenderer::new(config);

    let canvas = match renderer.parse(&json) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    // Physical size: explicit, or the canvas at the design DPI.
    let design_dpi = renderer.config().design_dpi;
    let width_mm = size_mm.0.unwrap_or_else(|| units::px_to_mm(canvas.width, design_dpi));
    let height_mm = size_mm.1.unwrap_or_else(|| units::px_to_mm(canvas.height, design_dpi));

    let result = match format {
        OutputFormat::Jpeg => renderer.render_preview(
            &canvas,
            size_px.0.unwrap_or(DEFAULT_PREVIEW_WIDTH),
            size_px.1.unwrap_or(DEFAULT_PREVIEW_HEIGHT),
        ),
        OutputFormat::Png => match size_px {
            (Some(w), Some(h)) => renderer.export_png(&canvas, w, h, dpi),
            _ => renderer.export_png_mm(&canvas, width_mm, height_mm, dpi),
        },
        OutputFormat::Pdf => renderer.export_pdf(&canvas, width_mm, height_mm, dpi),
    };

    match result {
        Ok(out) => {
            // Create output directory if necessary.
            if let Some(parent) = output.parent() {
                if !parent.as_os_str().is_empty() {
                    if let Err(e) = fs::create_dir_all(parent) {
                        eprintln!("Error creating output directory: {e}");
                        process::exit(1);
                    }
                }
            }
            if let Err(e) = fs::write(&output, &out.bytes) {
                eprintln!("Error writing '{}': {e}", output.display());
                process::exit(1);
            }
            eprintln!(
                "Wrote '{}' ({}, {} bytes, {}x{} px)",
                output.display(),
                out.content_type(),
                out.bytes.len(),
                out.width_px,
                out.height_px
            );
        }
        Err(e) => {
            eprintln!("Error rendering design: {e}");
            process::exit(1);
        }
    }
}

fn format_from_extension(path: &std::path::Path) -> Option<OutputFormat> {
    match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => Some(OutputFormat::Jpeg),
        "png" => Some(OutputFormat::Png),
        "pdf" => Some(OutputFormat::Pdf),
        _ => None,
    }
}

fn value<'a>(iter: &mut impl Iterator<Item = &'a String>, flag: &str, prog: &str) -> String {
    match iter.next() {
        Some(v) => v.clone(),
        None => fail(&format!("{flag} needs a value"), prog),
    }
}

fn number<'a, T: std::str::FromStr>(iter: &mut impl Iterator<Item = &'a String>, flag: &str, prog: &str) -> T {
    let raw = value(iter, flag, prog);
    match raw.parse() {
        Ok(v) => v,
        Err(_) => fail(&format!("{flag} expects a number, got '{raw}'"), prog),
    }
}

fn fail(msg: &str, prog: &str) -> ! {
    eprintln!("Error: {msg}");
    print_usage(prog);
    process::exit(1);
}

fn print_usage(prog: &str) {
    eprintln!("press – design renderer (press-forge)");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  {prog} <scene.json> [output] [--format preview|png|pdf] [--dpi N]");
    eprintln!("  {prog} --demo <name> [output] ...");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <scene.json>   Scene document saved by the editor");
    eprintln!("  [output]       Output path  (default: same stem as input, format extension)");
    eprintln!();
    eprintln!("Flags:");
    eprintln!("  --format, -f   preview (JPEG), png or pdf (default: from output extension, else pdf)");
    eprintln!("  --dpi          Print resolution (default: 300)");
    eprintln!("  --width-mm     Trim width in mm  (default: canvas width at design DPI)");
    eprintln!("  --height-mm    Trim height in mm (default: canvas height at design DPI)");
    eprintln!("  --width        Pixel width for preview/png (default preview: 400)");
    eprintln!("  --height       Pixel height for preview/png (default preview: 300)");
    eprintln!("  --media-root   Directory relative image paths resolve against");
    eprintln!("  --title, -t    Document title in PDF metadata (default: input filename stem)");
    eprintln!("  --demo         Render a built-in template: {}", templates::TEMPLATE_NAMES.join(", "));
    eprintln!("  --help         Print this message");
}
