//! Partition a matrix across a process group, transform it row by row, and
//! gather the result back at the coordinator.
//!
//! The group runs on a small MPI-like runtime over single-machine shared
//! memory. One member, rank 0, holds the matrix; every run walks the same
//! pipeline on every member:
//!
//! 1. **Plan**: rank 0 splits the rows into contiguous, whole-row slices,
//!    lowest ranks taking the leftover rows.
//! 2. **Announce**: the plan is broadcast to every member.
//! 3. **Distribute**: the matrix is scattered slice by slice.
//! 4. **Compute**: each member applies a [`RowTransform`] to its rows.
//! 5. **Collect**: slices are gathered back into rank 0's matrix.
//! 6. **Synchronize**: a barrier closes the timed region.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use rowscatter::{Coordinator, GroupConfig, ReverseRow, TextFileSource, Worker, World};
//!
//! let world = World::init(&GroupConfig::new(4)).unwrap();
//!
//! if world.is_coordinator() {
//!     let source = TextFileSource::new("matrix.txt");
//!     let report = Coordinator::load_matrix(&world, &source, 100, 10, ReverseRow)
//!         .and_then(|coordinator| coordinator.run())
//!         .unwrap();
//!     println!("{}", report.timing);
//! } else {
//!     Worker::new(&world, ReverseRow).unwrap().run().unwrap();
//! }
//!
//! world.destruct();
//! ```
//!
//! # Architecture
//!
//! The runtime uses POSIX shared memory (`/dev/shm` on Linux). Each ordered
//! pair of processes gets a dedicated mailbox slot; the collectives are built
//! from blocking sends and receives through those slots. [`World::local`]
//! builds the same group on threads of one process.
//!
//! # Error Handling
//!
//! All operations return a `Result` with [`GroupError`]. Failures are fatal
//! for the run: [`World::abort`] releases every member blocked in a
//! collective instead of leaving it waiting forever.

pub mod error;
pub mod matrix;
pub mod member;
pub mod plan;
pub mod timing;
pub mod transform;
pub mod world;

/// Scalar type stored in the matrix.
pub type Element = i32;

pub use error::{GroupError, Phase, Result};
pub use matrix::{Matrix, MatrixSource, TextFileSource};
pub use member::{
    run_member, Coordinator, GroupMember, RunOptions, RunReport, Worker, COORDINATOR_RANK,
};
pub use plan::DistributionPlan;
pub use timing::{Checkpoint, TimingRecord, TimingSummary};
pub use transform::{apply_rows, reverse_row, ReverseRow, RowTransform};
pub use world::{GroupConfig, World, DEFAULT_SLOT_CAPACITY, MAX_GROUP_SIZE};
