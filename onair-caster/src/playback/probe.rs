//! Duration probing
//!
//! A probe estimates how long a file plays. The estimate sets the pacing rate
//! and arms the safety deadline of a file source; it is never the end signal.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Estimates the playback duration of a local audio file
pub trait DurationProbe: Send + Sync {
    fn estimate(&self, path: &Path) -> Option<Duration>;
}

/// Never has an estimate; file sources then use the fallback bitrate and no deadline
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProbe;

impl DurationProbe for NoProbe {
    fn estimate(&self, _path: &Path) -> Option<Duration> {
        None
    }
}

/// Reads frame count and time base from the container headers
#[derive(Debug, Clone, Copy, Default)]
pub struct SymphoniaProbe;

impl DurationProbe for SymphoniaProbe {
    fn estimate(&self, path: &Path) -> Option<Duration> {
        let file = File::open(path).ok()?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        // Create hint from file extension
        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| debug!("Probe failed for {}: {}", path.display(), e))
            .ok()?;

        let track = probed.format.default_track()?;
        let params = &track.codec_params;
        let n_frames = params.n_frames?;

        let duration = match params.time_base {
            Some(time_base) => {
                let time = time_base.calc_time(n_frames);
                Duration::from_secs(time.seconds).checked_add(Duration::from_secs_f64(time.frac))?
            }
            None => {
                let rate = params.sample_rate.filter(|r| *r > 0)?;
                Duration::try_from_secs_f64(n_frames as f64 / rate as f64).ok()?
            }
        };
        Some(duration)
    }
}

/// Run a probe on the blocking pool
pub async fn estimate_duration(probe: Arc<dyn DurationProbe>, path: PathBuf) -> Option<Duration> {
    match tokio::task::spawn_blocking(move || probe.estimate(&path)).await {
        Ok(estimate) => estimate,
        Err(e) => {
            warn!("Duration probe task failed: {}", e);
            None
        }
    }
}
