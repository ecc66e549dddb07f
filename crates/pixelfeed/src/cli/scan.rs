//! The `pixelfeed scan` command: stream every sample through the prefetch
//! worker.

use clap::Args;
use pixelfeed_core::{Config, LocationSplit, PixelFeed, Sample};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

use super::{create_progress_bar, ensure_exists, LoaderArgs, OutputFormat};

/// Arguments for the `scan` command.
#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Image file or directory to scan
    pub input: PathBuf,

    /// Output file (stdout when omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "jsonl")]
    pub format: OutputFormat,

    /// Stop after this many samples
    #[arg(long)]
    pub limit: Option<usize>,

    /// Walk the locations this many times, resetting the worker between passes
    #[arg(long, default_value = "1")]
    pub epochs: usize,

    #[command(flatten)]
    pub loader: LoaderArgs,
}

/// Summary line for one loaded sample.
#[derive(Debug, Serialize)]
pub struct SampleRecord {
    pub path: PathBuf,
    pub label: Option<usize>,
    pub label_name: Option<String>,
    pub shape: Vec<usize>,
    pub mean: f32,
    pub min: f32,
    pub max: f32,
}

impl SampleRecord {
    fn from_sample(sample: &Sample, label_name: Option<&str>) -> Self {
        let (min, max) = sample
            .tensor
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        Self {
            path: sample.path.clone(),
            label: sample.label,
            label_name: label_name.map(str::to_string),
            shape: sample.tensor.shape().to_vec(),
            mean: sample.tensor.mean().unwrap_or(0.0),
            min: if sample.tensor.is_empty() { 0.0 } else { min },
            max: if sample.tensor.is_empty() { 0.0 } else { max },
        }
    }
}

/// Execute the scan command.
pub async fn execute(args: ScanArgs, mut config: Config) -> anyhow::Result<()> {
    ensure_exists(&args.input)?;
    args.loader.apply(&mut config);

    let feed = PixelFeed::new(config);
    let split = feed.discover(&args.input);
    if split.is_empty() {
        tracing::warn!("No supported images found in {}", args.input.display());
        return Ok(());
    }

    let records = scan(&feed, &split, &args).await?;

    let mut writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(std::io::stdout().lock())),
    };
    write_records(&mut writer, &records, args.format)?;
    writer.flush()?;

    if let Some(path) = &args.output {
        tracing::info!("Wrote {} records to {}", records.len(), path.display());
    }
    Ok(())
}

async fn scan(
    feed: &PixelFeed,
    split: &LocationSplit,
    args: &ScanArgs,
) -> anyhow::Result<Vec<SampleRecord>> {
    let epochs = args.epochs.max(1);
    let per_epoch = args.limit.unwrap_or(split.len()).min(split.len());
    let pb = create_progress_bar((per_epoch * epochs) as u64)?;

    let mut prefetch = feed.prefetch(split)?;
    let mut records = Vec::new();
    let start = Instant::now();

    for epoch in 0..epochs {
        if epoch > 0 {
            prefetch.reset(split.source())?;
        }
        let mut seen = 0usize;
        while seen < per_epoch && prefetch.has_next() {
            let Some(sample) = prefetch.next().await? else {
                continue;
            };
            let label_name = sample
                .label
                .and_then(|i| prefetch.pipeline().labels().and_then(|set| set.get(i)));
            let record = SampleRecord::from_sample(&sample, label_name);
            pb.set_message(
                sample
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            );
            pb.inc(1);
            records.push(record);
            seen += 1;
        }
        tracing::debug!(epoch, samples = seen, "Epoch complete");
    }

    prefetch.shutdown();
    prefetch.join();
    pb.finish_and_clear();

    let elapsed = start.elapsed();
    let rate = records.len() as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
    tracing::info!(
        "Loaded {} samples in {:.2}s ({:.1} samples/sec)",
        records.len(),
        elapsed.as_secs_f64(),
        rate
    );
    Ok(records)
}

fn write_records(
    writer: &mut dyn Write,
    records: &[SampleRecord],
    format: OutputFormat,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *writer, records)?;
            writeln!(writer)?;
        }
        OutputFormat::Jsonl => {
            for record in records {
                serde_json::to_writer(&mut *writer, record)?;
                writeln!(writer)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str) -> SampleRecord {
        SampleRecord {
            path: path.into(),
            label: Some(0),
            label_name: Some("cat".into()),
            shape: vec![1, 1, 2, 2],
            mean: 0.5,
            min: 0.0,
            max: 1.0,
        }
    }

    #[test]
    fn test_jsonl_one_line_per_record() {
        let mut out = Vec::new();
        write_records(&mut out, &[record("a.png"), record("b.png")], OutputFormat::Jsonl).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["label_name"], "cat");
        assert_eq!(first["shape"], serde_json::json!([1, 1, 2, 2]));
    }

    #[test]
    fn test_json_array() {
        let mut out = Vec::new();
        write_records(&mut out, &[record("a.png")], OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 1);
    }
}
