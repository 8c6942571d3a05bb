//! Group roles and the distribution run they step through together.
//!
//! Every member runs the same linear sequence, announce, distribute,
//! compute, collect, synchronize, through [`run_member`]. What a step means
//! for a given member is decided by its role: the [`Coordinator`] owns the
//! matrix and is the source and destination of every collective, a
//! [`Worker`] only ever holds its own slice.

use crate::error::{GroupError, Phase, Result};
use crate::matrix::{Matrix, MatrixSource};
use crate::plan::DistributionPlan;
use crate::timing::{Checkpoint, TimingRecord, TimingSummary};
use crate::transform::{apply_rows, RowTransform};
use crate::world::World;
use crate::Element;
use log::{debug, info};

/// Rank that plans, scatters and gathers.
pub const COORDINATOR_RANK: i32 = 0;

/// Knobs shared by both roles.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Transform the rows of a slice concurrently.
    pub parallel_rows: bool,
}

/// The steps every group member takes part in.
pub trait GroupMember {
    fn world(&self) -> &World;

    fn transform(&self) -> &dyn RowTransform;

    fn options(&self) -> RunOptions;

    /// End up holding the group's plan. Called first, by every member.
    fn receive_plan(&mut self, timing: &mut TimingRecord) -> Result<DistributionPlan>;

    /// End up holding this member's slice of the matrix.
    fn receive_slice(&mut self, plan: &DistributionPlan) -> Result<Vec<Element>>;

    /// Transform every row of the local slice in place. The slice must be
    /// exactly this member's share of the plan.
    fn compute(&self, slice: &mut [Element], plan: &DistributionPlan) -> Result<()> {
        let world = self.world();
        let expected = plan.count(world.rank() as usize);
        if slice.len() != expected {
            return Err(GroupError::BufferSizeMismatch {
                expected,
                actual: slice.len(),
            });
        }
        info!(
            "Rank {}/{} on {} working on {} rows",
            world.rank(),
            world.size(),
            world.processor_name(),
            plan.row_count(world.rank() as usize)
        );
        apply_rows(slice, plan.cols(), self.transform(), self.options().parallel_rows);
        Ok(())
    }

    /// Hand the transformed slice back to the coordinator.
    fn send_slice(&mut self, slice: Vec<Element>, plan: &DistributionPlan) -> Result<()>;
}

/// Drive one member through a whole run.
///
/// Returns the member's timing record with the plan-broadcast and
/// compute-complete checkpoints set; the coordinator's record also carries
/// the run start.
pub fn run_member<M: GroupMember + ?Sized>(member: &mut M) -> Result<TimingRecord> {
    let mut timing = TimingRecord::new();

    let plan = member.receive_plan(&mut timing)?;
    timing.mark(Checkpoint::PlanBroadcast);
    debug!("Rank {} holds plan {:?}", member.world().rank(), plan.counts());

    let mut slice = member
        .receive_slice(&plan)
        .map_err(|e| e.during(Phase::Distribute))?;

    member
        .compute(&mut slice, &plan)
        .map_err(|e| e.during(Phase::Compute))?;
    timing.mark(Checkpoint::ComputeComplete);

    member
        .send_slice(slice, &plan)
        .map_err(|e| e.during(Phase::Collect))?;

    member
        .world()
        .barrier()
        .map_err(|e| e.during(Phase::Synchronize))?;

    Ok(timing)
}

/// What the coordinator ends a successful run with.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// The fully transformed matrix.
    pub matrix: Matrix,
    pub plan: DistributionPlan,
    pub timing: TimingSummary,
}

/// Rank 0: loads the matrix, plans, and is root of every collective.
pub struct Coordinator<'w, T> {
    world: &'w World,
    matrix: Matrix,
    transform: T,
    options: RunOptions,
    plan: Option<DistributionPlan>,
}

impl<'w, T: RowTransform> Coordinator<'w, T> {
    pub fn new(world: &'w World, matrix: Matrix, transform: T) -> Result<Self> {
        if world.rank() != COORDINATOR_RANK {
            return Err(GroupError::ConfigError(format!(
                "rank {} cannot coordinate, only rank {} can",
                world.rank(),
                COORDINATOR_RANK
            )));
        }
        Ok(Self {
            world,
            matrix,
            transform,
            options: RunOptions::default(),
            plan: None,
        })
    }

    /// Build a coordinator around a matrix read from `source`.
    ///
    /// No collective call is made here, so a failure leaves the rest of the
    /// group waiting on the plan broadcast; abort the group on error.
    pub fn load_matrix<S: MatrixSource + ?Sized>(
        world: &'w World,
        source: &S,
        rows: usize,
        cols: usize,
        transform: T,
    ) -> Result<Self> {
        let matrix = source
            .load(rows, cols)
            .map_err(|e| e.during(Phase::Load))?;
        info!("Loaded {}x{} matrix", rows, cols);
        Self::new(world, matrix, transform)
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn matrix(&self) -> &Matrix {
        &self.matrix
    }

    /// Run every step, then report. The returned matrix holds the result.
    pub fn run(mut self) -> Result<RunReport> {
        let mut timing = run_member(&mut self)?;
        timing.mark(Checkpoint::RunEnd);

        let summary = self.report_timing(&timing)?;
        let plan = self
            .plan
            .take()
            .ok_or_else(|| GroupError::PlanError("run finished without a plan".into()))?;
        Ok(RunReport {
            matrix: self.matrix,
            plan,
            timing: summary,
        })
    }

    /// Derive and log the phase durations of a finished run.
    pub fn report_timing(&self, timing: &TimingRecord) -> Result<TimingSummary> {
        let summary = timing.summary().ok_or_else(|| {
            GroupError::ConfigError("timing record is missing checkpoints".into())
                .during(Phase::Report)
        })?;
        info!(
            "Run finished in {:?} (broadcast {:?}, gather {:?}, overhead {:?})",
            summary.total, summary.broadcast_phase, summary.gather_phase, summary.overhead
        );
        Ok(summary)
    }
}

impl<'w, T: RowTransform> GroupMember for Coordinator<'w, T> {
    fn world(&self) -> &World {
        self.world
    }

    fn transform(&self) -> &dyn RowTransform {
        &self.transform
    }

    fn options(&self) -> RunOptions {
        self.options
    }

    fn receive_plan(&mut self, timing: &mut TimingRecord) -> Result<DistributionPlan> {
        timing.mark(Checkpoint::RunStart);
        let plan = DistributionPlan::new(
            self.matrix.rows(),
            self.matrix.cols(),
            self.world.size() as usize,
        )
        .map_err(|e| e.during(Phase::Plan))?;

        let plan = self
            .world
            .broadcast_from(Some(&plan), COORDINATOR_RANK)
            .map_err(|e| e.during(Phase::Announce))?;
        self.plan = Some(plan.clone());
        Ok(plan)
    }

    fn receive_slice(&mut self, plan: &DistributionPlan) -> Result<Vec<Element>> {
        self.world
            .scatterv(Some(self.matrix.as_slice()), plan, COORDINATOR_RANK)
    }

    fn send_slice(&mut self, slice: Vec<Element>, plan: &DistributionPlan) -> Result<()> {
        self.world.gatherv(
            &slice,
            Some(self.matrix.as_mut_slice()),
            plan,
            COORDINATOR_RANK,
        )
    }
}

/// Any rank but 0: receives a slice, transforms it, sends it back.
pub struct Worker<'w, T> {
    world: &'w World,
    transform: T,
    options: RunOptions,
}

impl<'w, T: RowTransform> Worker<'w, T> {
    pub fn new(world: &'w World, transform: T) -> Result<Self> {
        if world.rank() == COORDINATOR_RANK {
            return Err(GroupError::ConfigError(format!(
                "rank {} is the coordinator and cannot work as a plain member",
                COORDINATOR_RANK
            )));
        }
        Ok(Self {
            world,
            transform,
            options: RunOptions::default(),
        })
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Take part in every step. The record's timestamps are this member's own.
    pub fn run(mut self) -> Result<TimingRecord> {
        let timing = run_member(&mut self)?;
        if let Some(elapsed) = timing.compute_time() {
            debug!("Rank {} computed its slice in {:?}", self.world.rank(), elapsed);
        }
        Ok(timing)
    }
}

impl<'w, T: RowTransform> GroupMember for Worker<'w, T> {
    fn world(&self) -> &World {
        self.world
    }

    fn transform(&self) -> &dyn RowTransform {
        &self.transform
    }

    fn options(&self) -> RunOptions {
        self.options
    }

    fn receive_plan(&mut self, _timing: &mut TimingRecord) -> Result<DistributionPlan> {
        self.world
            .broadcast_from::<DistributionPlan>(None, COORDINATOR_RANK)
            .map_err(|e| e.during(Phase::Announce))
    }

    fn receive_slice(&mut self, plan: &DistributionPlan) -> Result<Vec<Element>> {
        self.world.scatterv(None, plan, COORDINATOR_RANK)
    }

    fn send_slice(&mut self, slice: Vec<Element>, plan: &DistributionPlan) -> Result<()> {
        self.world.gatherv(&slice, None, plan, COORDINATOR_RANK)
    }
}
