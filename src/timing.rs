//! Phase-boundary timestamps for one distribution run.

use std::fmt;
use std::time::{Duration, Instant};

/// The four points of a run that get timestamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    /// Immediately before planning. Coordinator only.
    RunStart,
    /// After the plan broadcast returned on this member.
    PlanBroadcast,
    /// After this member transformed its local slice.
    ComputeComplete,
    /// After the closing barrier. Coordinator only.
    RunEnd,
}

/// Timestamps collected by one member over a run.
///
/// Each member owns its record; only the coordinator's record holds all four
/// checkpoints and can be summarized.
#[derive(Debug, Clone, Default)]
pub struct TimingRecord {
    run_start: Option<Instant>,
    plan_broadcast: Option<Instant>,
    compute_complete: Option<Instant>,
    run_end: Option<Instant>,
}

impl TimingRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `checkpoint` as now.
    pub fn mark(&mut self, checkpoint: Checkpoint) -> Instant {
        let now = Instant::now();
        self.set(checkpoint, now);
        now
    }

    /// Record `checkpoint` at a given instant.
    pub fn set(&mut self, checkpoint: Checkpoint, at: Instant) {
        let slot = match checkpoint {
            Checkpoint::RunStart => &mut self.run_start,
            Checkpoint::PlanBroadcast => &mut self.plan_broadcast,
            Checkpoint::ComputeComplete => &mut self.compute_complete,
            Checkpoint::RunEnd => &mut self.run_end,
        };
        *slot = Some(at);
    }

    pub fn get(&self, checkpoint: Checkpoint) -> Option<Instant> {
        match checkpoint {
            Checkpoint::RunStart => self.run_start,
            Checkpoint::PlanBroadcast => self.plan_broadcast,
            Checkpoint::ComputeComplete => self.compute_complete,
            Checkpoint::RunEnd => self.run_end,
        }
    }

    /// Time this member spent transforming rows, if both ends were recorded.
    pub fn compute_time(&self) -> Option<Duration> {
        Some(self.compute_complete?.saturating_duration_since(self.plan_broadcast?))
    }

    /// Derive the phase durations. `None` unless all four checkpoints exist.
    pub fn summary(&self) -> Option<TimingSummary> {
        let start = self.run_start?;
        let broadcast = self.plan_broadcast?;
        let computed = self.compute_complete?;
        let end = self.run_end?;

        let broadcast_phase = broadcast.saturating_duration_since(start);
        let gather_phase = end.saturating_duration_since(computed);
        Some(TimingSummary {
            total: end.saturating_duration_since(start),
            broadcast_phase,
            gather_phase,
            overhead: broadcast_phase + gather_phase,
        })
    }
}

/// Durations the coordinator reports at the end of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingSummary {
    /// Run start to run end.
    pub total: Duration,
    /// Run start to plan broadcast complete.
    pub broadcast_phase: Duration,
    /// Compute complete to run end.
    pub gather_phase: Duration,
    /// `broadcast_phase + gather_phase`.
    pub overhead: Duration,
}

impl fmt::Display for TimingSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "total time = {:.6}s", self.total.as_secs_f64())?;
        writeln!(f, "broadcast phase = {:.6}s", self.broadcast_phase.as_secs_f64())?;
        writeln!(f, "gather phase = {:.6}s", self.gather_phase.as_secs_f64())?;
        write!(f, "communication overhead = {:.6}s", self.overhead.as_secs_f64())
    }
}
