//! propagate - fill every frame of a frame archive from sparse keyframes
//!
//! Loads a zip of `0.jpg, 1.jpg, ...`, applies a keyframe file, and writes the
//! propagated annotations as JSON: either one frame (`--frame N`) or the
//! whole clip.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use keyframe_tracker::export::ObjectEntry;
use keyframe_tracker::{
    AnnotationTracker, ArchiveFrameSource, FrameSource, FrameSourceManager, FrameWithObjects,
    ImageCrateDecoder, KeyframeFile, TrackerConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Zip archive of frames named 0<ext>, 1<ext>, ...
    #[arg(long)]
    archive: PathBuf,
    /// Keyframe file (JSON).
    #[arg(long)]
    keyframes: PathBuf,
    /// Only report this frame instead of the whole clip.
    #[arg(long)]
    frame: Option<u64>,
    /// Config file (JSON or TOML). Falls back to KEYFRAME_TRACKER_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Output path. Defaults to stdout.
    #[arg(long)]
    output: Option<PathBuf>,
    /// Abort propagation after this many seconds.
    #[arg(long, env = "KEYFRAME_TRACKER_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,
}

#[derive(Serialize)]
struct FrameReport {
    frame_number: u64,
    width: u32,
    height: u32,
    objects: Vec<ObjectEntry>,
}

impl From<&FrameWithObjects> for FrameReport {
    fn from(frame: &FrameWithObjects) -> Self {
        Self {
            frame_number: frame.frame_number,
            width: frame.image.width(),
            height: frame.image.height(),
            objects: frame
                .objects
                .iter()
                .map(|tracked| {
                    let annotated = &tracked.annotated_frame;
                    ObjectEntry {
                        object_id: tracked.object_id,
                        bbox: annotated.bbox,
                        visible: annotated.is_visible(),
                        ground_truth: annotated.is_ground_truth,
                        stationary: annotated.is_stationary(),
                        stationary_count: annotated.stationary_count,
                    }
                })
                .collect(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cfg = match &args.config {
        Some(path) => TrackerConfig::load_from(path)?,
        None => TrackerConfig::load()?,
    };

    stage("open archive");
    let archive = ArchiveFrameSource::open(&args.archive, cfg.archive())
        .with_context(|| format!("failed to open archive {}", args.archive.display()))?;
    if archive.total_frames() == 0 {
        return Err(anyhow!(
            "archive {} has no frame named 0{}",
            args.archive.display(),
            cfg.image_extension
        ));
    }

    let sources = Arc::new(FrameSourceManager::new());
    let tracker = AnnotationTracker::new(
        Arc::clone(&sources),
        Arc::new(ImageCrateDecoder),
        cfg.image_cache_frames,
    )?;
    // Installing a source resets the tracker, so keyframes go in afterwards.
    sources.set(Arc::new(archive))?;

    stage("apply keyframes");
    let keyframes = KeyframeFile::load(&args.keyframes)?;
    keyframes.apply(&tracker)?;

    stage("propagate");
    let work = async {
        let json = match args.frame {
            Some(frame_number) => {
                let frame = tracker.get_frame_with_objects(frame_number).await?;
                serde_json::to_string_pretty(&FrameReport::from(&frame))?
            }
            None => tracker.propagate_all().await?.to_json_pretty()?,
        };
        Ok::<String, anyhow::Error>(json)
    };
    let json = match args.timeout_secs {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), work)
            .await
            .map_err(|_| {
                anyhow!(
                    "propagation timed out after {}s (last completed frame {:?})",
                    secs,
                    tracker.last_frame().ok().flatten()
                )
            })??,
        None => work.await?,
    };

    match &args.output {
        Some(path) => {
            std::fs::write(path, json.as_bytes())
                .with_context(|| format!("failed to write {}", path.display()))?;
            log::info!("wrote annotations to {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn stage(msg: &str) {
    eprintln!("propagate: {}", msg);
}
