use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoopStatsSnapshot {
    pub fps: f32,
    pub sps: f32,
    pub frame_time_ms: f32,
    pub polls_ok: u32,
    pub polls_failed: u32,
}

/// Rolling frame/step/poll counters, flushed to a snapshot once per
/// reporting interval.
#[derive(Debug)]
pub struct LoopStatsAccumulator {
    interval_start: Instant,
    interval: Duration,
    frames: u32,
    steps: u32,
    frame_time_sum: Duration,
    polls_ok: u32,
    polls_failed: u32,
}

impl LoopStatsAccumulator {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval_start: Instant::now(),
            interval,
            frames: 0,
            steps: 0,
            frame_time_sum: Duration::ZERO,
            polls_ok: 0,
            polls_failed: 0,
        }
    }

    pub fn record_frame(&mut self, frame_dt: Duration) {
        self.frames = self.frames.saturating_add(1);
        self.frame_time_sum = self.frame_time_sum.saturating_add(frame_dt);
    }

    pub fn record_steps(&mut self, steps: u32) {
        self.steps = self.steps.saturating_add(steps);
    }

    pub fn record_poll(&mut self, ok: bool) {
        if ok {
            self.polls_ok = self.polls_ok.saturating_add(1);
        } else {
            self.polls_failed = self.polls_failed.saturating_add(1);
        }
    }

    pub fn maybe_snapshot(&mut self, now: Instant) -> Option<LoopStatsSnapshot> {
        let elapsed = now.saturating_duration_since(self.interval_start);
        if elapsed < self.interval {
            return None;
        }

        let elapsed_seconds = elapsed.as_secs_f32().max(f32::EPSILON);
        let frame_time_ms = if self.frames == 0 {
            0.0
        } else {
            (self.frame_time_sum.as_secs_f32() / self.frames as f32) * 1000.0
        };

        let snapshot = LoopStatsSnapshot {
            fps: self.frames as f32 / elapsed_seconds,
            sps: self.steps as f32 / elapsed_seconds,
            frame_time_ms,
            polls_ok: self.polls_ok,
            polls_failed: self.polls_failed,
        };

        self.interval_start = now;
        self.frames = 0;
        self.steps = 0;
        self.frame_time_sum = Duration::ZERO;
        self.polls_ok = 0;
        self.polls_failed = 0;

        Some(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_computes_rates_over_the_interval() {
        let mut stats = LoopStatsAccumulator::new(Duration::from_secs(1));
        let base = Instant::now();

        stats.record_frame(Duration::from_millis(16));
        stats.record_frame(Duration::from_millis(16));
        stats.record_steps(4);
        stats.record_poll(true);
        stats.record_poll(false);

        let snapshot = stats
            .maybe_snapshot(base + Duration::from_secs(1))
            .expect("snapshot");

        assert!((snapshot.fps - 2.0).abs() < 0.05);
        assert!((snapshot.sps - 4.0).abs() < 0.05);
        assert!((snapshot.frame_time_ms - 16.0).abs() < 0.001);
        assert_eq!(snapshot.polls_ok, 1);
        assert_eq!(snapshot.polls_failed, 1);
    }

    #[test]
    fn snapshot_not_emitted_before_interval() {
        let mut stats = LoopStatsAccumulator::new(Duration::from_secs(1));
        let base = Instant::now();
        stats.record_frame(Duration::from_millis(16));

        assert!(stats
            .maybe_snapshot(base + Duration::from_millis(400))
            .is_none());
    }

    #[test]
    fn counters_reset_after_a_snapshot() {
        let mut stats = LoopStatsAccumulator::new(Duration::from_secs(1));
        let base = Instant::now();
        stats.record_frame(Duration::from_millis(10));
        stats.record_steps(6);
        stats.record_poll(false);

        stats
            .maybe_snapshot(base + Duration::from_secs(1))
            .expect("first snapshot");
        let second = stats
            .maybe_snapshot(base + Duration::from_secs(2))
            .expect("second snapshot");

        assert_eq!(second.sps, 0.0);
        assert_eq!(second.frame_time_ms, 0.0);
        assert_eq!(second.polls_failed, 0);
    }
}
