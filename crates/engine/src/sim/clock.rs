use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;

/// Simulation clock fed exclusively by fixed-timestep updates. Gameplay
/// cooldowns read this clock, never the wall clock, so tests can advance
/// time deterministically.
#[derive(Debug, Default)]
pub struct SimClock {
    elapsed: Duration,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&mut self, step: Duration) {
        self.elapsed = self.elapsed.saturating_add(step);
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn now_ms(&self) -> u64 {
        self.elapsed.as_millis() as u64
    }
}

pub type ScheduledTask<C> = Box<dyn FnOnce(&mut C)>;

struct Entry<C> {
    fire_at_ms: u64,
    seq: u64,
    task: ScheduledTask<C>,
}

impl<C> PartialEq for Entry<C> {
    fn eq(&self, other: &Self) -> bool {
        self.fire_at_ms == other.fire_at_ms && self.seq == other.seq
    }
}

impl<C> Eq for Entry<C> {}

impl<C> PartialOrd for Entry<C> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<C> Ord for Entry<C> {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the earliest (fire_at, seq)
        // pops first.
        other
            .fire_at_ms
            .cmp(&self.fire_at_ms)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Priority queue of simulation-time callbacks, advanced only from the
/// fixed-timestep update. The owner drains due tasks with [`take_due`] and
/// runs them against `&mut C`; tasks scheduled while draining fire on a
/// later drain.
///
/// [`take_due`]: Scheduler::take_due
pub struct Scheduler<C> {
    queue: BinaryHeap<Entry<C>>,
    next_seq: u64,
}

impl<C> Default for Scheduler<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Scheduler<C> {
    pub fn new() -> Self {
        Self {
            queue: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    pub fn schedule_at(&mut self, fire_at_ms: u64, task: impl FnOnce(&mut C) + 'static) {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.saturating_add(1);
        self.queue.push(Entry {
            fire_at_ms,
            seq,
            task: Box::new(task),
        });
    }

    pub fn schedule_in(&mut self, now_ms: u64, delay_ms: u64, task: impl FnOnce(&mut C) + 'static) {
        self.schedule_at(now_ms.saturating_add(delay_ms), task);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Pops every task with `fire_at_ms <= now_ms`, ordered by
    /// (fire time, insertion order).
    pub fn take_due(&mut self, now_ms: u64) -> Vec<ScheduledTask<C>> {
        let mut due = Vec::new();
        while let Some(entry) = self.queue.peek() {
            if entry.fire_at_ms > now_ms {
                break;
            }
            if let Some(entry) = self.queue.pop() {
                due.push(entry.task);
            }
        }
        due
    }
}
