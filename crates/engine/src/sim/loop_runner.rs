use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct StepConfig {
    pub target_sps: u32,
    pub max_frame_delta: Duration,
    pub max_steps_per_frame: u32,
}

impl Default for StepConfig {
    fn default() -> Self {
        Self {
            target_sps: 60,
            max_frame_delta: Duration::from_millis(250),
            max_steps_per_frame: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepPlan {
    pub steps_to_run: u32,
    pub remaining_accumulator: Duration,
    pub dropped_backlog: Duration,
}

impl StepPlan {
    fn idle(remaining_accumulator: Duration) -> Self {
        Self {
            steps_to_run: 0,
            remaining_accumulator,
            dropped_backlog: Duration::ZERO,
        }
    }
}

/// Drains whole fixed steps from the accumulator, bounded by the step cap.
/// Any backlog beyond the cap is dropped so a long stall cannot trigger a
/// runaway catch-up burst.
pub fn plan_steps(mut accumulator: Duration, fixed_dt: Duration, max_steps: u32) -> StepPlan {
    let mut steps_to_run = 0u32;

    while accumulator >= fixed_dt && steps_to_run < max_steps {
        accumulator = accumulator.saturating_sub(fixed_dt);
        steps_to_run = steps_to_run.saturating_add(1);
    }

    if accumulator >= fixed_dt {
        StepPlan {
            steps_to_run,
            remaining_accumulator: Duration::ZERO,
            dropped_backlog: accumulator,
        }
    } else {
        StepPlan {
            steps_to_run,
            remaining_accumulator: accumulator,
            dropped_backlog: Duration::ZERO,
        }
    }
}

fn clamp_frame_delta(frame_dt: Duration, max_frame_delta: Duration) -> Duration {
    frame_dt.min(max_frame_delta)
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

/// Fixed-timestep driver. The host hands it one instant per frame callback;
/// the caller runs `update(fixed_dt)` exactly `steps_to_run` times and
/// renders exactly once per frame, however many steps ran.
#[derive(Debug)]
pub struct FixedStepLoop {
    fixed_dt: Duration,
    max_frame_delta: Duration,
    max_steps_per_frame: u32,
    accumulator: Duration,
    last_frame: Option<Instant>,
    running: bool,
}

impl FixedStepLoop {
    pub fn new(config: StepConfig) -> Self {
        let target_sps = config.target_sps.max(1);
        Self {
            fixed_dt: Duration::from_secs_f64(1.0 / f64::from(target_sps)),
            max_frame_delta: normalize_non_zero_duration(
                config.max_frame_delta,
                Duration::from_millis(250),
            ),
            max_steps_per_frame: config.max_steps_per_frame.max(1),
            accumulator: Duration::ZERO,
            last_frame: None,
            running: false,
        }
    }

    pub fn fixed_dt(&self) -> Duration {
        self.fixed_dt
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Idempotent. Clears stale frame state so the first frame after a
    /// restart does not see the entire stopped interval as one giant delta.
    pub fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;
        self.last_frame = None;
        self.accumulator = Duration::ZERO;
    }

    /// Idempotent. The host is responsible for cancelling its pending frame
    /// callback; any frame delivered anyway plans zero steps.
    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn frame(&mut self, now: Instant) -> StepPlan {
        if !self.running {
            return StepPlan::idle(self.accumulator);
        }

        let raw_frame_dt = match self.last_frame {
            Some(previous) => now.saturating_duration_since(previous),
            None => Duration::ZERO,
        };
        self.last_frame = Some(now);

        let clamped = clamp_frame_delta(raw_frame_dt, self.max_frame_delta);
        self.accumulator = self.accumulator.saturating_add(clamped);

        let plan = plan_steps(self.accumulator, self.fixed_dt, self.max_steps_per_frame);
        self.accumulator = plan.remaining_accumulator;
        plan
    }
}
