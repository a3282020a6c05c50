use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use modelscan::config::Config;
use modelscan::fallback::{self, ItemDirs};
use modelscan::memory::{ProcessMemoryProbe, TrackingAllocator};
use modelscan::ocr::{pin_single_thread, TesseractEngine};
use modelscan::pipeline::artifacts::create_run_dir;
use modelscan::pipeline::{RunOutcome, ScanController};

#[global_allocator]
static GLOBAL: TrackingAllocator = TrackingAllocator;

#[derive(Parser)]
#[command(name = "modelscan")]
#[command(about = "Scan a folder of product photos for a labeled model number")]
struct Args {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// OCR the images in a folder until a model number turns up
    Scan {
        /// Image folder (default: SCAN_INPUT_DIR or ./input)
        #[arg(long)]
        input: Option<PathBuf>,
        /// Where run directories are created (default: SCAN_OUTPUT_DIR or ./output)
        #[arg(long)]
        output: Option<PathBuf>,
        /// Tesseract language data directory (default: OCR_MODEL_DIR or ./tessdata)
        #[arg(long)]
        model_dir: Option<PathBuf>,
        /// Known-correct model number, used only for scoring
        #[arg(long)]
        expect: Option<String>,
    },
    /// Print the first model number recorded in a finished run directory
    Result { run_dir: PathBuf },
    /// Allocate the next item_NN work directory under a work root
    Item { work_root: PathBuf },
    /// Print the effective configuration
    Info,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    dotenvy::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "modelscan=info".into());
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let mut config = Config::from_env();

    match args.command {
        Command::Scan {
            input,
            output,
            model_dir,
            expect,
        } => {
            if let Some(input) = input {
                config.scan.input_dir = input;
            }
            if let Some(output) = output {
                config.scan.output_root = output;
            }
            if let Some(model_dir) = model_dir {
                config.ocr.model_dir = model_dir;
            }
            run_scan(&config, expect.as_deref())
        }
        Command::Result { run_dir } => {
            match fallback::first_token(&run_dir)? {
                Some(token) => println!("{token}"),
                None => println!("NA"),
            }
            Ok(())
        }
        Command::Item { work_root } => {
            let item = ItemDirs::allocate(&work_root)?;
            println!("[ITEM] {}", item.root.display());
            println!("[INPUT] {}", item.input.display());
            println!("[OUTPUT] {}", item.output.display());
            Ok(())
        }
        Command::Info => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn run_scan(config: &Config, expected: Option<&str>) -> anyhow::Result<()> {
    let input_dir = &config.scan.input_dir;
    if !input_dir.is_dir() {
        tracing::error!("Input directory does not exist: {}", input_dir.display());
        anyhow::bail!("input directory does not exist: {}", input_dir.display());
    }

    pin_single_thread();

    let run_dir = create_run_dir(&config.scan.output_root, chrono::Local::now())
        .with_context(|| {
            format!(
                "failed to create run directory under {}",
                config.scan.output_root.display()
            )
        })?;

    tracing::info!(
        "Initializing Tesseract ({}) from {}...",
        config.ocr.languages,
        config.ocr.model_dir.display()
    );
    let engine = TesseractEngine::new(&config.ocr);
    let mut controller = ScanController::new(
        config.pipeline.clone(),
        Box::new(engine),
        Box::new(ProcessMemoryProbe::new()),
    )?;

    let report = controller.run(input_dir, &run_dir, expected)?;

    match report.token() {
        Some(token) => println!("model = {token}"),
        None => println!("model = NA"),
    }

    println!("\n{}", report.summary_line());
    if let RunOutcome::NoImages = report.outcome {
        return Ok(());
    }
    let artifacts = &report.artifacts;
    println!("[OUTPUT] merged_ocr.txt -> {}", artifacts.merged.display());
    println!("[OUTPUT] images_ocr.csv -> {}", artifacts.csv.display());
    println!("[OUTPUT] models_found.txt -> {}", artifacts.result.display());
    println!("[OUTPUT] score.log -> {}", artifacts.score.display());
    if !report.failed.is_empty() {
        println!("[OUTPUT] failed_slices.txt -> {}", artifacts.failed.display());
    }

    Ok(())
}
