//! Duration recovery for containers that do not declare one
//!
//! Live-muxed WebM is written without a duration header. The prober finds
//! the real length by bisecting over seek targets and watching where the
//! player actually lands.

use crate::config::ProbeConfig;
use crate::processing::media::MediaPlayer;

pub struct DurationProber {
    config: ProbeConfig,
}

impl DurationProber {
    pub fn new(config: ProbeConfig) -> Self {
        Self { config }
    }

    /// Declared duration when usable, otherwise a probed one
    pub async fn resolve(&self, player: &mut dyn MediaPlayer) -> f64 {
        let declared = player.declared_duration();
        if declared.is_finite() && declared > 0.0 {
            return declared;
        }

        tracing::info!("Declared duration is {}, probing", declared);
        self.probe(player).await
    }

    /// Bisect over seek targets in `[0, ceiling]`.
    ///
    /// Always returns: the search is bounded by a wall-clock timeout and the
    /// best position reached so far is kept. The player is left at 0.
    pub async fn probe(&self, player: &mut dyn MediaPlayer) -> f64 {
        let mut last_valid = 0.0;

        let search = bisect(player, &self.config, &mut last_valid);
        let finished = tokio::time::timeout(self.config.timeout(), search).await;
        if finished.is_err() {
            tracing::warn!(
                "Duration probe timed out after {:?}, using {:.2}s",
                self.config.timeout(),
                last_valid
            );
        }

        match tokio::time::timeout(self.config.restore_timeout(), player.seek(0.0)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::warn!("Failed to restore playback position: {}", e),
            Err(_) => tracing::warn!("Timed out restoring playback position"),
        }

        let duration = if last_valid > 0.0 {
            last_valid
        } else {
            self.config.fallback_secs
        };
        tracing::info!("Probed duration: {:.2}s", duration);
        duration
    }
}

async fn bisect(player: &mut dyn MediaPlayer, config: &ProbeConfig, last_valid: &mut f64) {
    let mut low = 0.0;
    let mut high = config.ceiling_secs;

    while high - low >= config.resolution_secs {
        let mid = (low + high) / 2.0;
        match player.seek(mid).await {
            Ok(reached) if reached > *last_valid => {
                *last_valid = reached;
                low = reached;
            }
            Ok(_) => high = mid,
            Err(e) => {
                tracing::debug!("Seek to {:.2}s failed: {}", mid, e);
                high = mid;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::geometry::Resolution;
    use crate::recorder::channel::{CapturedFrame, RecordingResult};
    use async_trait::async_trait;

    /// Seeks clamp to the real length
    struct ClampingPlayer {
        declared: f64,
        real: f64,
        position: f64,
    }

    #[async_trait]
    impl MediaPlayer for ClampingPlayer {
        fn declared_duration(&self) -> f64 {
            self.declared
        }

        fn native_size(&self) -> Resolution {
            Resolution::new(16, 16)
        }

        fn position(&self) -> f64 {
            self.position
        }

        async fn seek(&mut self, seconds: f64) -> RecordingResult<f64> {
            self.position = seconds.min(self.real);
            Ok(self.position)
        }

        async fn next_frame(&mut self) -> RecordingResult<Option<CapturedFrame>> {
            Ok(None)
        }

        async fn close(&mut self) {}
    }

    #[tokio::test]
    async fn test_declared_duration_wins() {
        let mut player = ClampingPlayer { declared: 12.5, real: 99.0, position: 0.0 };
        let prober = DurationProber::new(ProbeConfig::default());
        assert_eq!(prober.resolve(&mut player).await, 12.5);
    }

    #[tokio::test]
    async fn test_nan_duration_is_probed() {
        let mut player = ClampingPlayer { declared: f64::NAN, real: 42.0, position: 0.0 };
        let prober = DurationProber::new(ProbeConfig::default());
        let duration = prober.resolve(&mut player).await;
        assert!((duration - 42.0).abs() <= 0.5, "got {}", duration);
        assert_eq!(player.position(), 0.0);
    }
}
