//! Transcribe a scanned image with the ONNX engine.
//!
//! # Prerequisites
//!
//! Place PaddleOCR-style models under a model root, one directory per
//! language set (or directly under the root):
//! - `det.onnx` - Text detection model
//! - `rec.onnx` - Text recognition model
//! - `dict.txt` - Character dictionary
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=debug cargo run --features onnx --example transcribe -- \
//!     --image scan.jpg \
//!     --models models \
//!     --langs es,en \
//!     --mode handwriting
//! ```

use std::env;
use std::sync::Arc;

use scanline_ocr::{EngineRegistry, LanguageSet, Mode, OnnxEngine, Pipeline, PipelineConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    let mut image_path = None;
    let mut model_root = "models".to_string();
    let mut languages = LanguageSet::default();
    let mut mode = Mode::Print;
    let mut line_segmentation = true;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--image" => {
                image_path = Some(args.get(i + 1).cloned().ok_or("Missing --image value")?);
                i += 2;
            },
            "--models" => {
                model_root = args.get(i + 1).cloned().ok_or("Missing --models value")?;
                i += 2;
            },
            "--langs" => {
                languages = LanguageSet::parse(args.get(i + 1).ok_or("Missing --langs value")?);
                i += 2;
            },
            "--mode" => {
                mode = Mode::parse(args.get(i + 1).ok_or("Missing --mode value")?);
                i += 2;
            },
            "--no-lines" => {
                line_segmentation = false;
                i += 1;
            },
            "--help" | "-h" => {
                print_usage(&args[0]);
                return Ok(());
            },
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage(&args[0]);
                std::process::exit(1);
            },
        }
    }

    let image_path = image_path.ok_or("Missing required --image argument")?;

    let registry = Arc::new(EngineRegistry::new(OnnxEngine::factory(model_root)));
    // Model loading overlaps with reading the input
    let warmup = registry.spawn_warmup(languages.clone());

    let bytes = std::fs::read(&image_path)?;
    let config = PipelineConfig::builder()
        .languages(languages)
        .mode(mode)
        .line_segmentation(line_segmentation)
        .build();

    let _ = warmup.join();

    let pipeline = Pipeline::new(registry);
    let text = pipeline.process(&bytes, &config)?;

    if text.is_empty() {
        println!("(no text found)");
    } else {
        println!("{}", text);
    }

    Ok(())
}

fn print_usage(program: &str) {
    eprintln!("Usage: {} --image <path> [options]", program);
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --image <path>    Input image (PNG, JPEG, WebP, TIFF, BMP)");
    eprintln!("  --models <dir>    Model root directory (default: models)");
    eprintln!("  --langs <list>    Comma-separated language codes (default: en,es)");
    eprintln!("  --mode <mode>     print or handwriting (default: print)");
    eprintln!("  --no-lines        Disable per-line fallback decoding");
    eprintln!("  --help, -h        Show this help message");
}
