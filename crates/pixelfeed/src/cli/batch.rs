//! The `pixelfeed batch` command: assemble fixed-size batches on the calling
//! thread.

use clap::Args;
use pixelfeed_core::{Batch, Config, PixelFeed};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

use super::{create_progress_bar, ensure_exists, LoaderArgs};

/// Arguments for the `batch` command.
#[derive(Args, Debug)]
pub struct BatchArgs {
    /// Image file or directory to load
    pub input: PathBuf,

    /// Samples per batch (the last batch may be shorter)
    #[arg(short, long, default_value = "32")]
    pub size: usize,

    /// Skip one-hot label matrices
    #[arg(long)]
    pub no_one_hot: bool,

    #[command(flatten)]
    pub loader: LoaderArgs,
}

/// Summary line for one assembled batch.
#[derive(Debug, Serialize)]
pub struct BatchRecord {
    pub index: usize,
    pub features: Vec<usize>,
    pub labels: Option<Vec<usize>>,
    pub mean: f32,
    /// Samples per label column, present with one-hot labels
    pub label_counts: Option<Vec<u32>>,
}

impl BatchRecord {
    fn from_batch(index: usize, batch: &Batch) -> Self {
        Self {
            index,
            features: batch.features.shape().to_vec(),
            labels: batch.labels.as_ref().map(|l| l.shape().to_vec()),
            mean: batch.features.mean().unwrap_or(0.0),
            label_counts: batch
                .labels
                .as_ref()
                .map(|l| l.columns().into_iter().map(|c| c.sum() as u32).collect()),
        }
    }
}

/// Execute the batch command.
pub async fn execute(args: BatchArgs, mut config: Config) -> anyhow::Result<()> {
    ensure_exists(&args.input)?;
    if args.size == 0 {
        anyhow::bail!("--size must be at least 1");
    }
    args.loader.apply(&mut config);

    let feed = PixelFeed::new(config);
    let split = feed.discover(&args.input);
    if split.is_empty() {
        tracing::warn!("No supported images found in {}", args.input.display());
        return Ok(());
    }

    let builder = feed.batch_builder(&split).with_labels(!args.no_one_hot);
    let chunks: Vec<_> = split.locations().chunks(args.size).collect();
    let pb = create_progress_bar(split.len() as u64)?;
    let start = Instant::now();

    let mut stdout = std::io::stdout().lock();
    for (index, chunk) in chunks.iter().enumerate() {
        let batch = builder.build(chunk).map_err(|e| {
            pb.abandon();
            anyhow::anyhow!(e)
        })?;
        serde_json::to_writer(&mut stdout, &BatchRecord::from_batch(index, &batch))?;
        writeln!(stdout)?;
        pb.set_message(format!("batch {}/{}", index + 1, chunks.len()));
        pb.inc(chunk.len() as u64);
    }
    stdout.flush()?;
    pb.finish_and_clear();

    tracing::info!(
        "Built {} batches from {} samples in {:.2}s",
        chunks.len(),
        split.len(),
        start.elapsed().as_secs_f64()
    );
    Ok(())
}
