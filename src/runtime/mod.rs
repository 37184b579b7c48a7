//! Cooperative polling runtime.
//!
//! Each stage of the pipeline is a [`PollCycle`] driven by its own
//! [`PollLoop`] on a fixed interval. A cycle that overruns delays the next
//! tick instead of overlapping it, and shutdown is observed only between
//! cycles so no cycle is cancelled halfway through a store update.

mod cycles;

pub use cycles::{ClarifyCycle, CommitCycle, DripCycle, HighlightCycle, IntakeCycle, RefreshCycle};

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Boxed error returned by a failed cycle.
pub type CycleError = Box<dyn std::error::Error + Send + Sync>;

/// One unit of periodic work.
#[async_trait]
pub trait PollCycle: Send {
    /// Component name used in logs.
    fn name(&self) -> &'static str;

    /// Runs one cycle. Errors are logged by the loop, which keeps polling.
    async fn run(&mut self) -> Result<(), CycleError>;
}

/// Drives one [`PollCycle`] until shutdown.
pub struct PollLoop<P> {
    cycle: P,
    interval: Duration,
}

impl<P: PollCycle> PollLoop<P> {
    /// Creates a loop running `cycle` every `interval`.
    ///
    /// A zero interval is raised to one millisecond.
    #[must_use]
    pub fn new(cycle: P, interval: Duration) -> Self {
        Self {
            cycle,
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    /// Runs cycles until `shutdown` turns `true` or its sender is dropped.
    /// The first cycle starts immediately.
    ///
    /// Returns the number of cycles run.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> u64 {
        let name = self.cycle.name();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cycles = 0_u64;
        tracing::info!(component = name, interval = ?self.interval, "poll loop started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }

            if let Err(err) = self.cycle.run().await {
                tracing::error!(component = name, error = %err, "poll cycle failed");
            }
            cycles += 1;
        }

        tracing::info!(component = name, cycles, "poll loop stopped");
        cycles
    }
}

/// Cycles run by one loop before it stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopSummary {
    /// Component name.
    pub name: &'static str,
    /// Cycles run, `None` when the loop task panicked.
    pub cycles: Option<u64>,
}

/// Set of running loops sharing one shutdown signal.
pub struct Pipeline {
    shutdown: watch::Sender<bool>,
    loops: Vec<(&'static str, JoinHandle<u64>)>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    /// Creates a pipeline with no loops.
    #[must_use]
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shutdown,
            loops: Vec::new(),
        }
    }

    /// Spawns `poll` on the current tokio runtime.
    pub fn spawn<P>(&mut self, poll: PollLoop<P>)
    where
        P: PollCycle + 'static,
    {
        let name = poll.cycle.name();
        let handle = tokio::spawn(poll.run(self.shutdown.subscribe()));
        self.loops.push((name, handle));
    }

    /// Returns the number of spawned loops.
    #[must_use]
    pub fn len(&self) -> usize {
        self.loops.len()
    }

    /// Returns `true` when no loop was spawned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    /// Signals every loop to stop and waits for in-flight cycles to finish.
    pub async fn shutdown(self) -> Vec<LoopSummary> {
        self.shutdown.send_replace(true);
        let mut summaries = Vec::with_capacity(self.loops.len());
        for (name, handle) in self.loops {
            let cycles = match handle.await {
                Ok(cycles) => Some(cycles),
                Err(err) => {
                    tracing::error!(component = name, error = %err, "poll loop task failed");
                    None
                }
            };
            summaries.push(LoopSummary { name, cycles });
        }
        summaries
    }
}
