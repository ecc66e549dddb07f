//! End-to-end tests for the prefetch scheduler over real files.

use image::{GrayImage, Luma};
use pixelfeed_core::config::{PipelineConfig, TransformStep};
use pixelfeed_core::pipeline::SchedulerState;
use pixelfeed_core::{
    Config, LocationSource, LocationSplit, PixelFeed, PrefetchError, PrefetchScheduler,
    RecordPipeline, Sample,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn write_gray(path: &Path, w: u32, h: u32, value: u8) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    GrayImage::from_pixel(w, h, Luma([value])).save(path).unwrap();
}

/// `count` 4x4 images whose pixel value is their position.
fn numbered_fixtures(dir: &Path, count: usize) -> Vec<PathBuf> {
    (0..count)
        .map(|i| {
            let path = dir.join(format!("img_{i:02}.png"));
            write_gray(&path, 4, 4, i as u8);
            path
        })
        .collect()
}

fn scheduler(config: &Config, buffer_size: usize) -> PrefetchScheduler {
    let pipeline = PipelineConfig {
        buffer_size,
        poll_timeout_ms: 2_000,
    };
    PrefetchScheduler::new(Arc::new(RecordPipeline::new(config)), &pipeline)
}

fn small_config() -> Config {
    let mut config = Config::default();
    config.loader.height = 4;
    config.loader.width = 4;
    config.labels.enabled = false;
    config
}

async fn drain(scheduler: &mut PrefetchScheduler) -> Result<Vec<Sample>, PrefetchError> {
    let mut samples = Vec::new();
    while scheduler.has_next() {
        if let Some(sample) = scheduler.next().await? {
            samples.push(sample);
        }
    }
    Ok(samples)
}

#[tokio::test]
async fn yields_every_location_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let paths = numbered_fixtures(dir.path(), 12);

    // A queue smaller than the input forces the worker to block on a full
    // channel at least once.
    let mut scheduler = scheduler(&small_config(), 2);
    scheduler.start(LocationSource::new(paths.clone())).unwrap();
    let samples = drain(&mut scheduler).await.unwrap();

    assert_eq!(samples.len(), paths.len());
    for (i, (sample, path)) in samples.iter().zip(&paths).enumerate() {
        assert_eq!(&sample.path, path);
        assert_eq!(sample.tensor.shape(), &[1, 1, 4, 4]);
        assert!(sample.tensor.iter().all(|&v| v == i as f32));
    }
    assert!(!scheduler.has_next());
    assert!(scheduler.next().await.unwrap().is_none());
    scheduler.join();
}

#[tokio::test]
async fn reset_replays_the_same_order() {
    let dir = tempfile::tempdir().unwrap();
    let split = LocationSplit::new(numbered_fixtures(dir.path(), 6));

    let mut scheduler = scheduler(&small_config(), 3);
    scheduler.start(split.source()).unwrap();
    let first: Vec<_> = drain(&mut scheduler)
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.path)
        .collect();

    scheduler.reset(split.source()).unwrap();
    let second: Vec<_> = drain(&mut scheduler)
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.path)
        .collect();

    assert_eq!(first, split.locations());
    assert_eq!(first, second);
    scheduler.join();
}

#[tokio::test]
async fn reset_mid_stream_drops_old_samples() {
    let dir = tempfile::tempdir().unwrap();
    let split = LocationSplit::new(numbered_fixtures(dir.path(), 8));

    let mut scheduler = scheduler(&small_config(), 4);
    scheduler.start(split.source()).unwrap();
    let first = scheduler.next().await.unwrap().unwrap();
    assert_eq!(first.path, split.locations()[0]);

    scheduler.reset(split.source()).unwrap();
    let replay: Vec<_> = drain(&mut scheduler)
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.path)
        .collect();
    assert_eq!(replay, split.locations());
    scheduler.join();
}

#[tokio::test]
async fn worker_failure_is_reported_then_reset_recovers() {
    let dir = tempfile::tempdir().unwrap();
    let good = numbered_fixtures(dir.path(), 2);
    let broken = dir.path().join("broken.png");
    std::fs::write(&broken, b"not an image").unwrap();

    let mut scheduler = scheduler(&small_config(), 4);
    scheduler
        .start(LocationSource::new(vec![
            good[0].clone(),
            broken.clone(),
            good[1].clone(),
        ]))
        .unwrap();

    let first = scheduler.next().await.unwrap().unwrap();
    assert_eq!(first.path, good[0]);

    let mut failure = None;
    while scheduler.has_next() {
        match scheduler.next().await {
            Ok(_) => {}
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }
    match failure {
        Some(PrefetchError::WorkerFailed(e)) => assert_eq!(e.path, broken),
        other => panic!("expected worker failure, got {other:?}"),
    }
    assert!(!scheduler.has_next());

    scheduler.reset(LocationSource::new(good.clone())).unwrap();
    let recovered: Vec<_> = drain(&mut scheduler)
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.path)
        .collect();
    assert_eq!(recovered, good);
    scheduler.join();
}

#[tokio::test]
async fn directories_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let paths = numbered_fixtures(dir.path(), 2);
    let nested = dir.path().join("nested");
    std::fs::create_dir_all(&nested).unwrap();

    let mut scheduler = scheduler(&small_config(), 4);
    scheduler
        .start(LocationSource::new(vec![
            paths[0].clone(),
            nested,
            paths[1].clone(),
        ]))
        .unwrap();
    let samples: Vec<_> = drain(&mut scheduler)
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.path)
        .collect();
    assert_eq!(samples, paths);
    scheduler.join();
}

#[tokio::test]
async fn mixed_sizes_normalize_to_one_shape() {
    let dir = tempfile::tempdir().unwrap();
    let square = dir.path().join("a.png");
    let wide = dir.path().join("b.png");
    let tall = dir.path().join("c.png");
    write_gray(&square, 4, 4, 50);
    write_gray(&wide, 8, 4, 60);
    write_gray(&tall, 4, 8, 70);

    let mut scheduler = scheduler(&small_config(), 4);
    scheduler
        .start(LocationSource::new(vec![square, wide, tall]))
        .unwrap();
    let samples = drain(&mut scheduler).await.unwrap();

    assert_eq!(samples.len(), 3);
    for (sample, value) in samples.iter().zip([50.0f32, 60.0, 70.0]) {
        assert_eq!(sample.tensor.shape(), &[1, 1, 4, 4]);
        assert!(sample.tensor.iter().all(|&v| v == value));
    }
    scheduler.join();
}

#[tokio::test]
async fn shutdown_leaves_queued_samples_readable() {
    let dir = tempfile::tempdir().unwrap();
    let paths = numbered_fixtures(dir.path(), 3);

    let mut scheduler = scheduler(&small_config(), 8);
    scheduler.start(LocationSource::new(paths.clone())).unwrap();
    let first = scheduler.next().await.unwrap().unwrap();
    assert_eq!(first.path, paths[0]);

    scheduler.shutdown();
    assert!(matches!(
        scheduler.state(),
        SchedulerState::Draining | SchedulerState::Stopped
    ));
    while scheduler.has_next() {
        if scheduler.next().await.unwrap().is_none() {
            break;
        }
    }
    assert!(scheduler.next().await.unwrap().is_none());
    assert_eq!(scheduler.state(), SchedulerState::Stopped);
    assert!(matches!(
        scheduler.start(LocationSource::empty()),
        Err(PrefetchError::ShutDown)
    ));
    scheduler.join();
}

#[tokio::test]
async fn labels_come_from_parent_directories() {
    let dir = tempfile::tempdir().unwrap();
    let dog = dir.path().join("dog/1.png");
    let cat = dir.path().join("cat/1.png");
    write_gray(&dog, 4, 4, 1);
    write_gray(&cat, 4, 4, 2);

    let mut config = small_config();
    config.labels.enabled = true;
    let feed = PixelFeed::new(config);
    let split = feed.discover(dir.path());

    let mut prefetch = feed.prefetch(&split).unwrap();
    let labels = prefetch.pipeline().labels().unwrap().labels().to_vec();
    assert_eq!(labels, ["cat", "dog"]);

    let samples = drain(&mut prefetch).await.unwrap();
    let by_label: Vec<_> = samples.iter().map(|s| (s.path.clone(), s.label)).collect();
    assert_eq!(by_label, vec![(cat, Some(0)), (dog, Some(1))]);
    prefetch.join();
}

#[tokio::test]
async fn end_of_stream_does_not_wait_for_the_poll_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let paths = numbered_fixtures(dir.path(), 1);
    let pipeline = PipelineConfig {
        buffer_size: 1,
        poll_timeout_ms: 30_000,
    };
    let mut scheduler =
        PrefetchScheduler::new(Arc::new(RecordPipeline::new(&small_config())), &pipeline);

    let started = Instant::now();
    scheduler.start(LocationSource::new(paths.clone())).unwrap();
    for _ in 0..20 {
        let samples = drain(&mut scheduler).await.unwrap();
        assert_eq!(samples.len(), 1);
        assert!(!scheduler.has_next());
        scheduler.reset(LocationSource::new(paths.clone())).unwrap();
    }
    assert!(started.elapsed() < Duration::from_secs(10));
    scheduler.join();
}

#[tokio::test]
async fn failure_is_always_delivered_before_exhaustion() {
    let dir = tempfile::tempdir().unwrap();
    let broken = dir.path().join("broken.png");
    std::fs::write(&broken, b"not an image").unwrap();
    let pipeline = PipelineConfig {
        buffer_size: 2,
        poll_timeout_ms: 30_000,
    };
    let mut scheduler =
        PrefetchScheduler::new(Arc::new(RecordPipeline::new(&small_config())), &pipeline);

    scheduler
        .start(LocationSource::new(vec![broken.clone()]))
        .unwrap();
    for round in 0..20 {
        let mut failed = false;
        while scheduler.has_next() {
            if let Err(PrefetchError::WorkerFailed(e)) = scheduler.next().await {
                assert_eq!(e.path, broken);
                failed = true;
                break;
            }
        }
        assert!(failed, "round {round} ended without the failure");
        assert!(!scheduler.has_next());
        scheduler
            .reset(LocationSource::new(vec![broken.clone()]))
            .unwrap();
    }
    scheduler.join();
}

#[tokio::test]
async fn replaced_workers_release_their_random_state() {
    let dir = tempfile::tempdir().unwrap();
    let good = numbered_fixtures(dir.path(), 1);
    let broken = dir.path().join("broken.png");
    std::fs::write(&broken, b"not an image").unwrap();

    let mut config = small_config();
    config.transform.seed = Some(3);
    config.transform.steps = vec![TransformStep::RandomFlip];
    let pipeline = Arc::new(RecordPipeline::new(&config));
    let mut scheduler = PrefetchScheduler::new(
        Arc::clone(&pipeline),
        &PipelineConfig {
            buffer_size: 4,
            poll_timeout_ms: 2_000,
        },
    );

    for _ in 0..3 {
        scheduler
            .reset(LocationSource::new(vec![good[0].clone(), broken.clone()]))
            .unwrap();
        let mut failed = false;
        while scheduler.has_next() {
            if scheduler.next().await.is_err() {
                failed = true;
                break;
            }
        }
        assert!(failed);
        assert!(pipeline.transforms().rng_count() <= 1);
    }
    scheduler.join();
    assert_eq!(pipeline.transforms().rng_count(), 0);
}
