// frontend/src/reconnect.rs

use crate::config::ReconnectConfig;
use std::time::Duration;

pub type RetryTask = Box<dyn FnOnce() + Send + 'static>;

/// A scheduled retry that can still be called off.
pub trait TimerHandle: Send {
    fn cancel(self: Box<Self>);
}

/// Runs a task once after a delay. The task must never run inside `schedule`.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay: Duration, task: RetryTask) -> Box<dyn TimerHandle>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Scheduled { attempt: u32, delay: Duration },
    Exhausted { attempts: u32 },
}

/// Exponential backoff with a cap and an attempt ceiling. Owns the pending
/// retry timer so cancelling is a direct operation.
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt: u32,
    pending: Option<Box<dyn TimerHandle>>,
}

impl ReconnectPolicy {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempt: 0,
            pending: None,
        }
    }

    pub fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    /// min(base * 2^attempt, max)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.config
            .base_delay
            .saturating_mul(factor)
            .min(self.config.max_delay)
    }

    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Schedule the next attempt, replacing any pending one.
    pub fn schedule(&mut self, scheduler: &dyn Scheduler, task: RetryTask) -> RetryDecision {
        self.cancel();

        if self.attempt >= self.config.max_attempts {
            return RetryDecision::Exhausted {
                attempts: self.attempt,
            };
        }

        let attempt = self.attempt;
        let delay = self.delay_for(attempt);
        self.attempt += 1;
        self.pending = Some(scheduler.schedule(delay, task));
        RetryDecision::Scheduled { attempt, delay }
    }

    /// Returns true if a pending retry was called off.
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    /// The pending timer ran; it no longer needs cancelling.
    pub(crate) fn fired(&mut self) {
        self.pending = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ManualScheduler;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn policy(base_ms: u64, max_ms: u64, attempts: u32) -> ReconnectPolicy {
        ReconnectPolicy::new(ReconnectConfig {
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(max_ms),
            max_attempts: attempts,
        })
    }

    #[test]
    fn delays_double_until_capped() {
        let p = policy(1_000, 30_000, 10);
        let got: Vec<u64> = (0..8).map(|n| p.delay_for(n).as_millis() as u64).collect();
        assert_eq!(got, vec![1_000, 2_000, 4_000, 8_000, 16_000, 30_000, 30_000, 30_000]);
        assert_eq!(p.delay_for(40), Duration::from_millis(30_000));
    }

    #[test]
    fn schedule_walks_the_sequence_and_resets() {
        let sched = ManualScheduler::new();
        let mut p = policy(100, 1_000, 10);

        for expected in [100, 200, 400] {
            match p.schedule(&*sched, Box::new(|| {})) {
                RetryDecision::Scheduled { delay, .. } => {
                    assert_eq!(delay, Duration::from_millis(expected))
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(p.attempts(), 3);

        p.reset();
        assert_eq!(
            p.schedule(&*sched, Box::new(|| {})),
            RetryDecision::Scheduled {
                attempt: 0,
                delay: Duration::from_millis(100)
            }
        );
    }

    #[test]
    fn stops_at_the_ceiling() {
        let sched = ManualScheduler::new();
        let mut p = policy(10, 100, 2);
        assert!(matches!(p.schedule(&*sched, Box::new(|| {})), RetryDecision::Scheduled { .. }));
        assert!(matches!(p.schedule(&*sched, Box::new(|| {})), RetryDecision::Scheduled { .. }));
        assert_eq!(
            p.schedule(&*sched, Box::new(|| {})),
            RetryDecision::Exhausted { attempts: 2 }
        );
        assert!(!p.is_pending());
        assert_eq!(sched.scheduled(), 2);
    }

    #[test]
    fn cancel_prevents_the_task_from_running() {
        let sched = ManualScheduler::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let mut p = policy(10, 100, 5);

        let r = runs.clone();
        p.schedule(
            &*sched,
            Box::new(move || {
                r.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert!(p.cancel());
        assert!(!p.cancel());
        assert!(!sched.fire_next());
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
