use clap::{Parser, Subcommand};
use rayon::prelude::*;
use rust_qr_live::config::ConfigPatch;
use rust_qr_live::mrz::parse_mrz;
use rust_qr_live::tools::{
    bench_limit_from_env, dataset_iter, dataset_root_from_env, frame_sequence, load_frame,
    smoke_from_env,
};
use rust_qr_live::worker::{Worker, WorkerHandle};
use rust_qr_live::{ScanResult, scan_image};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "qrlive", version, about = "Adaptive QR scanning tools")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decode a single image with the region scan
    Scan {
        #[arg(long)]
        image: PathBuf,
    },
    /// Decode every image under a directory in parallel
    ScanDir {
        #[arg(long)]
        root: Option<PathBuf>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        smoke: bool,
    },
    /// Replay a directory of frames through a live scanning session
    Replay {
        #[arg(long)]
        dir: PathBuf,
        #[arg(long, default_value_t = 30)]
        fps: u32,
        /// Merge this many frames (off when absent)
        #[arg(long)]
        merge: Option<usize>,
        #[arg(long)]
        safari: bool,
        /// Resolution scale in (0, 1]
        #[arg(long, default_value_t = 1.0)]
        scale: f32,
    },
    /// Parse MRZ text from a file
    Mrz {
        #[arg(long)]
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Scan { image } => scan_cmd(&image),
        Command::ScanDir { root, limit, smoke } => scan_dir_cmd(root, limit, smoke),
        Command::Replay {
            dir,
            fps,
            merge,
            safari,
            scale,
        } => replay_cmd(&dir, fps, merge, safari, scale),
        Command::Mrz { file } => mrz_cmd(&file),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "command failed");
            ExitCode::FAILURE
        }
    }
}

fn scan_cmd(image: &Path) -> ScanResult<()> {
    let frame = load_frame(image)?;
    let start = Instant::now();
    let results = scan_image(&frame);
    println!(
        "Image: {} ({}x{})",
        image.display(),
        frame.width(),
        frame.height()
    );
    println!(
        "Found {} QR codes in {:.1} ms",
        results.len(),
        start.elapsed().as_secs_f64() * 1000.0
    );
    for (i, r) in results.iter().enumerate() {
        println!("  QR {}: version={} content={}", i, r.version, r.data);
    }
    Ok(())
}

fn scan_dir_cmd(root: Option<PathBuf>, limit: Option<usize>, smoke: bool) -> ScanResult<()> {
    let root = root.unwrap_or_else(dataset_root_from_env);
    let limit = limit.or_else(bench_limit_from_env);
    let smoke = smoke || smoke_from_env();
    let images: Vec<PathBuf> = dataset_iter(&root, limit, smoke).collect();
    info!(root = %root.display(), images = images.len(), "scanning dataset");

    let start = Instant::now();
    let outcomes: Vec<(PathBuf, Option<usize>)> = images
        .into_par_iter()
        .map(|path| {
            let found = load_frame(&path).ok().map(|f| scan_image(&f).len());
            (path, found)
        })
        .collect();

    let mut decoded = 0usize;
    let mut failed = 0usize;
    for (path, found) in &outcomes {
        match found {
            Some(n) => {
                if *n > 0 {
                    decoded += 1;
                }
                println!("{}: {}", path.display(), n);
            }
            None => {
                failed += 1;
                println!("{}: unreadable", path.display());
            }
        }
    }
    let total = outcomes.len();
    let rate = if total == 0 {
        0.0
    } else {
        decoded as f64 / total as f64 * 100.0
    };
    println!(
        "Decoded {decoded}/{total} ({rate:.1}%), {failed} unreadable, {:.1} s",
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

fn replay_cmd(
    dir: &Path,
    fps: u32,
    merge: Option<usize>,
    safari: bool,
    scale: f32,
) -> ScanResult<()> {
    let paths = frame_sequence(dir)?;
    let Some(first) = paths.first() else {
        println!("No frames in {}", dir.display());
        return Ok(());
    };
    let first_frame = load_frame(first)?;

    let handle = WorkerHandle::spawn(Worker::rqrr())?;
    handle.init(None)?;
    let patch = ConfigPatch {
        target_fps: Some(fps),
        enable_frame_merging: Some(merge.is_some()),
        frame_merge_count: merge,
        optimize_for_safari: Some(safari),
        resolution_scale: Some(scale),
        ..Default::default()
    };
    handle.update_config(patch, Some(first_frame.dimensions()))?;

    for path in &paths {
        let frame = load_frame(path)?;
        let outcome = handle.process_frame(frame)?;
        let payloads: Vec<&str> = outcome.results.iter().map(|r| r.data.as_str()).collect();
        println!(
            "{}: stage={} {:.1} ms preprocessed={} skipped={:?} {:?}",
            path.display(),
            outcome.stage_used,
            outcome.elapsed_ms,
            outcome.preprocessed,
            outcome.skipped_stages,
            payloads
        );
    }

    let stats = handle.stats()?;
    println!(
        "Stage 1 hits {}/{} ({:.1}%), streak {}, avg frame {:.1} ms",
        stats.stage1_success_count,
        stats.stage1_total_count,
        stats.success_rate * 100.0,
        stats.consecutive_stage1_success,
        stats.average_frame_time
    );
    handle.terminate()
}

fn mrz_cmd(file: &Path) -> ScanResult<()> {
    let text = std::fs::read_to_string(file)?;
    let mrz = parse_mrz(&text)?;
    println!("{}", serde_json::to_string_pretty(&mrz)?);
    Ok(())
}
