//! Deferred one-shot job scheduler.
//!
//! Orders are scheduled for a future instant; at that instant the vendor
//! must be notified. This module provides the timer side of that contract:
//!
//! - [`Scheduler::schedule`] registers *or replaces* a one-shot job keyed
//!   by job id. Replacing supersedes the earlier timer: the old deadline
//!   will never fire.
//! - Deadlines already in the past fire immediately. Startup recovery
//!   re-schedules every persisted `scheduled` order, so a restart never
//!   silently drops a due order.
//! - Firing invokes the injected [`JobHandler`] exactly once per live
//!   registration and then discards the job. Handler failures are the
//!   handler's problem; the worker never crashes or blocks on them.
//!
//! # Time
//!
//! The worker computes delays as `fire_at - clock.now()` against the
//! injected [`Clock`], clamped to zero, and sleeps on the tokio timer.
//! Under `#[tokio::test(start_paused = true)]` with a manual clock this
//! makes every timing test deterministic.
//!
//! # Model
//!
//! Single worker task owning a binary heap of deadlines; no public cancel
//! operation (orders are not cancelable once scheduled).

use chrono::{DateTime, Utc};
use mealflow_core::environment::Clock;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Handles a fired job.
///
/// Implementations must swallow their own failures: the worker treats
/// `run` as infallible and fire-and-forget.
pub trait JobHandler<P>: Send + Sync {
    /// Invoked once when a live job's deadline is reached.
    fn run(&self, job_id: String, payload: P) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

enum Command<P> {
    Schedule {
        job_id: String,
        fire_at: DateTime<Utc>,
        payload: P,
    },
}

/// Handle used to register jobs with the worker.
///
/// Cheap to clone; all clones feed the same worker.
pub struct Scheduler<P> {
    tx: mpsc::UnboundedSender<Command<P>>,
}

impl<P> Clone for Scheduler<P> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<P: Send + 'static> Scheduler<P> {
    /// Creates a scheduler handle and its worker.
    ///
    /// The worker does nothing until [`SchedulerWorker::run`] is awaited
    /// (normally inside `tokio::spawn`).
    #[must_use]
    pub fn new(handler: Arc<dyn JobHandler<P>>, clock: Arc<dyn Clock>) -> (Self, SchedulerWorker<P>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, SchedulerWorker { rx, handler, clock })
    }

    /// Registers or replaces the one-shot job `job_id`.
    ///
    /// Idempotent per job id: a second call with the same id supersedes
    /// the first, and the superseded deadline will not fire. Instants in
    /// the past fire immediately.
    pub fn schedule(&self, job_id: impl Into<String>, fire_at: DateTime<Utc>, payload: P) {
        let job_id = job_id.into();
        if self
            .tx
            .send(Command::Schedule { job_id: job_id.clone(), fire_at, payload })
            .is_err()
        {
            // Worker gone; only happens during shutdown.
            warn!(job_id, "scheduler worker is not running, job dropped");
        }
    }
}

struct Registration<P> {
    generation: u64,
    fire_at: DateTime<Utc>,
    payload: P,
}

/// The timer worker behind a [`Scheduler`] handle.
pub struct SchedulerWorker<P> {
    rx: mpsc::UnboundedReceiver<Command<P>>,
    handler: Arc<dyn JobHandler<P>>,
    clock: Arc<dyn Clock>,
}

impl<P: Send + 'static> SchedulerWorker<P> {
    /// Runs the timer loop until every [`Scheduler`] handle is dropped.
    pub async fn run(mut self) {
        info!("deferred job scheduler started");

        // Heap orders by deadline; ties broken by insertion sequence so
        // equal deadlines fire in registration order.
        let mut heap: BinaryHeap<Reverse<(DateTime<Utc>, u64, String)>> = BinaryHeap::new();
        let mut live: HashMap<String, Registration<P>> = HashMap::new();
        let mut seq: u64 = 0;

        loop {
            // Fire everything that is due before sleeping again.
            while let Some(Reverse((fire_at, generation, _))) = heap.peek() {
                if *fire_at > self.clock.now() {
                    break;
                }
                let (generation, fire_at) = (*generation, *fire_at);
                let Some(Reverse((_, _, job_id))) = heap.pop() else {
                    break;
                };
                let superseded = live
                    .get(&job_id)
                    .is_none_or(|reg| reg.generation != generation);
                if superseded {
                    debug!(job_id, "skipping superseded timer");
                    continue;
                }
                if let Some(reg) = live.remove(&job_id) {
                    debug!(job_id, %fire_at, "firing deferred job");
                    self.handler.run(job_id, reg.payload).await;
                }
            }

            let sleep_for = heap.peek().map(|Reverse((fire_at, _, _))| {
                (*fire_at - self.clock.now()).to_std().unwrap_or_default()
            });

            let sleep = async {
                match sleep_for {
                    Some(d) => tokio::time::sleep(d).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                cmd = self.rx.recv() => {
                    let Some(cmd) = cmd else {
                        info!("scheduler handles dropped, worker stopping");
                        return;
                    };
                    Self::apply(cmd, &mut heap, &mut live, &mut seq);
                    // Drain the rest of the batch so a replacement queued
                    // together with its original is seen before firing.
                    while let Ok(cmd) = self.rx.try_recv() {
                        Self::apply(cmd, &mut heap, &mut live, &mut seq);
                    }
                },
                () = sleep => {},
            }
        }
    }

    fn apply(
        cmd: Command<P>,
        heap: &mut BinaryHeap<Reverse<(DateTime<Utc>, u64, String)>>,
        live: &mut HashMap<String, Registration<P>>,
        seq: &mut u64,
    ) {
        let Command::Schedule { job_id, fire_at, payload } = cmd;
        *seq += 1;
        let replaced = live
            .insert(job_id.clone(), Registration { generation: *seq, fire_at, payload })
            .is_some();
        if replaced {
            debug!(job_id, "replacing scheduled job");
        }
        heap.push(Reverse((fire_at, *seq, job_id)));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can unwrap
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use std::sync::Mutex;

    struct RecordingHandler {
        fired: Mutex<Vec<String>>,
    }

    impl RecordingHandler {
        fn new() -> Arc<Self> {
            Arc::new(Self { fired: Mutex::new(Vec::new()) })
        }

        fn fired(&self) -> Vec<String> {
            self.fired.lock().unwrap().clone()
        }
    }

    impl JobHandler<String> for RecordingHandler {
        fn run(&self, job_id: String, payload: String) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
            Box::pin(async move {
                assert_eq!(job_id, payload);
                self.fired.lock().unwrap().push(job_id);
            })
        }
    }

    struct StoppedClock(DateTime<Utc>);

    impl Clock for StoppedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn base_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[tokio::test(start_paused = true)]
    async fn past_deadlines_fire_immediately() {
        let handler = RecordingHandler::new();
        let clock = Arc::new(StoppedClock(base_time()));
        let (scheduler, worker) = Scheduler::new(handler.clone(), clock);
        let task = tokio::spawn(worker.run());

        scheduler.schedule("A1", base_time() - TimeDelta::hours(2), "A1".to_string());
        scheduler.schedule("B2", base_time() - TimeDelta::minutes(1), "B2".to_string());
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        assert_eq!(handler.fired(), vec!["A1".to_string(), "B2".to_string()]);
        drop(scheduler);
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn replacing_a_job_supersedes_the_earlier_timer() {
        let handler = RecordingHandler::new();
        let clock = Arc::new(StoppedClock(base_time()));
        let (scheduler, worker) = Scheduler::new(handler.clone(), clock);
        let task = tokio::spawn(worker.run());

        // First registration is due, but the replacement (also due) must be
        // the only one that fires.
        scheduler.schedule("A1", base_time() - TimeDelta::hours(1), "A1".to_string());
        scheduler.schedule("A1", base_time() - TimeDelta::minutes(5), "A1".to_string());
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        assert_eq!(handler.fired(), vec!["A1".to_string()]);
        drop(scheduler);
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn future_deadline_waits_for_the_timer() {
        let handler = RecordingHandler::new();
        // The stopped clock never moves, so the worker keeps re-arming a
        // ~1h sleep; the job stays pending no matter how long we wait.
        let clock = Arc::new(StoppedClock(base_time()));
        let (scheduler, worker) = Scheduler::new(handler.clone(), clock);
        let _task = tokio::spawn(worker.run());

        scheduler.schedule("A1", base_time() + TimeDelta::hours(1), "A1".to_string());
        tokio::time::sleep(std::time::Duration::from_secs(10)).await;
        assert!(handler.fired().is_empty());
    }
}
