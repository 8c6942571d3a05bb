//! Process group runtime and collective transport over shared memory.
//!
//! A group is one memory segment: a [`SharedState`] block followed by one
//! mailbox slot per ordered `(source, destination)` pair. A slot holds a
//! single in-flight frame; the sender blocks until the receiver acknowledges
//! it, so every send is a rendezvous. Messages larger than a slot are split
//! into frames.
//!
//! The segment is either a named POSIX shared-memory mapping shared by
//! separate processes ([`World::init`]) or a heap allocation shared by
//! threads of one process ([`World::local`]). Both run the same protocol.

use crate::error::{GroupError, Result};
use crate::matrix::alloc_zeroed;
use crate::plan::DistributionPlan;
use backtrace::Backtrace;
use bytemuck::Pod;
use log::{debug, error, info, warn};
use serde::{de::DeserializeOwned, Serialize};
use shared_memory::{Shmem, ShmemConf};
use std::alloc::{alloc_zeroed as heap_alloc_zeroed, dealloc, Layout};
use std::mem::{align_of, size_of};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;

/// Upper bound on the number of members in a group.
pub const MAX_GROUP_SIZE: usize = 32;
/// Payload bytes per mailbox slot unless configured otherwise.
pub const DEFAULT_SLOT_CAPACITY: usize = 1024 * 1024;

const HEADER_SIZE: usize = size_of::<MessageHeader>();
const SPAWNED_ENV: &str = "ROWSCATTER_SPAWNED";
const SEGMENT_ENV: &str = "ROWSCATTER_SEGMENT";
const SPIN_LIMIT: u32 = 1 << 12;

// Negative tags are reserved for collectives.
const BARRIER_ARRIVE_TAG: i32 = -1;
const BARRIER_COMPLETE_TAG: i32 = -2;
const BROADCAST_TAG: i32 = -3;
const SCATTER_TAG: i32 = -4;
const GATHER_TAG: i32 = -5;

#[repr(C)]
struct MessageHeader {
    valid: AtomicBool,
    received: AtomicBool,
    tag: AtomicI32,
    source: AtomicI32,
    /// Bytes in the current frame.
    size: AtomicUsize,
    /// Bytes still to come after the current frame.
    remaining: AtomicUsize,
}

#[repr(C)]
struct SharedState {
    size: AtomicUsize,
    slot_capacity: AtomicUsize,
    initialized: AtomicBool,
    aborted: AtomicBool,
    abort_rank: AtomicI32,
    process_ids: [AtomicUsize; MAX_GROUP_SIZE],
    init_flags: [AtomicBool; MAX_GROUP_SIZE],
    cleanup_ready: [AtomicBool; MAX_GROUP_SIZE],
}

/// Settings for launching a group.
#[derive(Debug, Clone)]
pub struct GroupConfig {
    /// Number of members, including the coordinator.
    pub size: i32,
    /// Payload bytes per mailbox slot. Larger messages are framed.
    pub slot_capacity: usize,
    /// Link file for the shared-memory segment. Defaults to a per-launch
    /// path under the system temp directory.
    pub segment_path: Option<PathBuf>,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            size: 1,
            slot_capacity: DEFAULT_SLOT_CAPACITY,
            segment_path: None,
        }
    }
}

impl GroupConfig {
    pub fn new(size: i32) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }

    pub fn with_slot_capacity(mut self, slot_capacity: usize) -> Self {
        self.slot_capacity = slot_capacity;
        self
    }

    pub fn with_segment_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.segment_path = Some(path.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.size <= 0 {
            return Err(GroupError::ConfigError("Size must be positive".into()));
        }
        if self.size as usize > MAX_GROUP_SIZE {
            return Err(GroupError::ConfigError(format!(
                "Size {} exceeds the maximum of {}",
                self.size, MAX_GROUP_SIZE
            )));
        }
        if self.slot_capacity == 0 {
            return Err(GroupError::ConfigError("Slot capacity must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SegmentLayout {
    state_size: usize,
    slot_stride: usize,
    slot_capacity: usize,
    total: usize,
}

impl SegmentLayout {
    fn new(size: usize, slot_capacity: usize) -> Result<Self> {
        let align = segment_align();
        let overflow = || GroupError::ConfigError("Segment size overflows".into());
        let state_size = align_up(size_of::<SharedState>(), align);
        let slot_stride = align_up(
            HEADER_SIZE.checked_add(slot_capacity).ok_or_else(overflow)?,
            align,
        );
        let total = slot_stride
            .checked_mul(size * size)
            .and_then(|slots| slots.checked_add(state_size))
            .ok_or_else(overflow)?;
        Ok(Self {
            state_size,
            slot_stride,
            slot_capacity,
            total,
        })
    }

    fn slot_offset(&self, size: usize, src: usize, dst: usize) -> usize {
        self.state_size + (src * size + dst) * self.slot_stride
    }
}

fn segment_align() -> usize {
    align_of::<MessageHeader>().max(align_of::<SharedState>())
}

fn align_up(n: usize, align: usize) -> usize {
    (n + align - 1) / align * align
}

struct HeapRegion {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl HeapRegion {
    fn zeroed(len: usize) -> Result<Self> {
        let layout = Layout::from_size_align(len.max(1), segment_align())
            .map_err(|e| GroupError::ResourceError(e.to_string()))?;
        let ptr = unsafe { heap_alloc_zeroed(layout) };
        NonNull::new(ptr)
            .map(|ptr| Self { ptr, layout })
            .ok_or_else(|| {
                GroupError::ResourceError(format!("cannot allocate {} byte segment", len))
            })
    }
}

impl Drop for HeapRegion {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

enum Backing {
    Shared(Shmem),
    Heap(HeapRegion),
}

struct Segment {
    backing: Backing,
}

// All cross-member access to the segment goes through the atomics in the
// state block and slot headers; payload bytes are only touched by the side
// that currently owns the slot.
unsafe impl Send for Segment {}
unsafe impl Sync for Segment {}

impl Segment {
    fn base(&self) -> *mut u8 {
        match &self.backing {
            Backing::Shared(shmem) => shmem.as_ptr(),
            Backing::Heap(region) => region.ptr.as_ptr(),
        }
    }

    fn len(&self) -> usize {
        match &self.backing {
            Backing::Shared(shmem) => shmem.len(),
            Backing::Heap(region) => region.layout.size(),
        }
    }

    fn describe(&self) -> String {
        match &self.backing {
            Backing::Shared(shmem) => format!("shmem {:?}", shmem.get_flink_path()),
            Backing::Heap(region) => format!("heap segment of {} bytes", region.layout.size()),
        }
    }

    fn state(&self) -> &SharedState {
        unsafe { &*(self.base() as *const SharedState) }
    }

    fn header(&self, offset: usize) -> &MessageHeader {
        unsafe { &*(self.base().add(offset) as *const MessageHeader) }
    }

    fn payload(&self, offset: usize) -> *mut u8 {
        unsafe { self.base().add(offset + HEADER_SIZE) }
    }

    /// Reset the state block and every slot header. Must run before any
    /// other member can see the segment.
    fn initialize(&self, layout: &SegmentLayout, size: usize) {
        unsafe {
            std::ptr::write_bytes(self.base(), 0, layout.state_size);
            for src in 0..size {
                for dst in 0..size {
                    let offset = layout.slot_offset(size, src, dst);
                    std::ptr::write_bytes(self.base().add(offset), 0, HEADER_SIZE);
                }
            }
        }
        let state = self.state();
        state.size.store(size, Ordering::SeqCst);
        state.slot_capacity.store(layout.slot_capacity, Ordering::SeqCst);
        state.aborted.store(false, Ordering::SeqCst);
        state.abort_rank.store(-1, Ordering::SeqCst);
        for i in 0..size {
            state.process_ids[i].store(0, Ordering::SeqCst);
            state.init_flags[i].store(false, Ordering::SeqCst);
            state.cleanup_ready[i].store(false, Ordering::SeqCst);
        }
        for src in 0..size {
            for dst in 0..size {
                let header = self.header(layout.slot_offset(size, src, dst));
                header.source.store(-1, Ordering::SeqCst);
            }
        }
        state.initialized.store(true, Ordering::SeqCst);
    }
}

fn default_segment_path() -> PathBuf {
    std::env::temp_dir().join(format!("rowscatter_{}", std::process::id()))
}

fn host_identity() -> String {
    gethostname::gethostname().to_string_lossy().into_owned()
}

/// One member's handle on a process group.
///
/// `World` gives the member its rank and the group size, point-to-point
/// messaging, and the collectives the distribution pipeline is built from:
/// [`broadcast`](World::broadcast), [`scatterv`](World::scatterv),
/// [`gatherv`](World::gatherv) and [`barrier`](World::barrier). Every call
/// blocks until its part of the operation is complete, and every call returns
/// [`GroupError::Aborted`] once any member has called [`abort`](World::abort).
///
/// # Examples
///
/// ```rust,no_run
/// use rowscatter::{GroupConfig, World};
///
/// let world = World::init(&GroupConfig::new(4)).unwrap();
///
/// let data = if world.rank() == 0 { vec![1, 2, 3] } else { vec![] };
/// let result = world.broadcast(&data, 0).unwrap();
/// assert_eq!(result, vec![1, 2, 3]);
///
/// world.destruct();
/// ```
pub struct World {
    rank: i32,
    size: i32,
    segment: Arc<Segment>,
    layout: SegmentLayout,
    children: Vec<Child>,
    processor_name: String,
}

impl World {
    /// Launch a group of `config.size` processes and join it.
    ///
    /// The calling process becomes rank 0: it creates the shared segment and
    /// re-executes its own binary, with the same arguments, once for every
    /// other rank. Those processes reach this same call, notice they were
    /// spawned, and attach to the existing segment instead. Returns once
    /// every rank has registered.
    pub fn init(config: &GroupConfig) -> Result<Self> {
        config.validate()?;

        if std::env::var_os(SPAWNED_ENV).is_some() {
            return Self::init_spawned(config);
        }

        let size = config.size as usize;
        debug!("Initializing group with {} processes", size);

        let layout = SegmentLayout::new(size, config.slot_capacity)?;
        let path = config.segment_path.clone().unwrap_or_else(default_segment_path);

        debug!("Creating shared memory of size {}", layout.total);
        let shmem = ShmemConf::new()
            .size(layout.total)
            .flink(&path)
            .create()
            .map_err(|e| GroupError::SharedMemoryError(e.to_string()))?;

        let segment = Arc::new(Segment {
            backing: Backing::Shared(shmem),
        });
        debug!("Using {}", segment.describe());

        segment.initialize(&layout, size);
        let state = segment.state();
        state.process_ids[0].store(std::process::id() as usize, Ordering::SeqCst);
        state.init_flags[0].store(true, Ordering::SeqCst);

        let mut world = World {
            rank: 0,
            size: config.size,
            segment,
            layout,
            children: Vec::with_capacity(size - 1),
            processor_name: host_identity(),
        };

        let exe = std::env::current_exe().map_err(|e| GroupError::ProcessError(e.to_string()))?;
        for _ in 1..size {
            let spawned = Command::new(&exe)
                .args(std::env::args_os().skip(1))
                .env(SPAWNED_ENV, "1")
                .env(SEGMENT_ENV, &path)
                .stdin(Stdio::null())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .spawn();
            match spawned {
                Ok(child) => world.children.push(child),
                Err(e) => {
                    let err = GroupError::ProcessError(e.to_string());
                    world.abort(&err);
                    world.destruct();
                    return Err(err);
                }
            }
        }

        debug!("Parent process initialized as rank 0");
        if let Err(e) = world.wait_for_children() {
            world.destruct();
            return Err(e);
        }
        Ok(world)
    }

    /// Attach to a segment created by a launching process.
    fn init_spawned(config: &GroupConfig) -> Result<Self> {
        debug!("Spawned process initializing");

        let path = std::env::var_os(SEGMENT_ENV)
            .map(PathBuf::from)
            .ok_or_else(|| GroupError::InitError("Spawned without a segment path".into()))?;

        let shmem = ShmemConf::new()
            .flink(&path)
            .open()
            .map_err(|e| GroupError::SharedMemoryError(e.to_string()))?;
        let segment = Arc::new(Segment {
            backing: Backing::Shared(shmem),
        });

        let (size, layout, rank) = {
            let state = segment.state();
            if !state.initialized.load(Ordering::SeqCst) {
                return Err(GroupError::InitError("Segment was never initialized".into()));
            }
            let size = state.size.load(Ordering::SeqCst);
            if size != config.size as usize {
                return Err(GroupError::InitError(format!(
                    "Launcher started {} processes, this process expects {}",
                    size, config.size
                )));
            }
            let layout = SegmentLayout::new(size, state.slot_capacity.load(Ordering::SeqCst))?;
            if segment.len() < layout.total {
                return Err(GroupError::SharedMemoryError(format!(
                    "Segment is {} bytes, layout needs {}",
                    segment.len(),
                    layout.total
                )));
            }

            // Claim the first free rank by swapping our pid into its slot.
            let pid = std::process::id() as usize;
            let rank = (1..size)
                .find(|&i| {
                    state.process_ids[i]
                        .compare_exchange(0, pid, Ordering::SeqCst, Ordering::SeqCst)
                        .is_ok()
                })
                .ok_or_else(|| {
                    GroupError::InitError(format!("No available ranks for process {}", pid))
                })?;
            debug!("Process {} initialized as rank {}", pid, rank);
            state.init_flags[rank].store(true, Ordering::SeqCst);
            (size, layout, rank)
        };

        let world = World {
            rank: rank as i32,
            size: size as i32,
            segment,
            layout,
            children: Vec::new(),
            processor_name: host_identity(),
        };
        world.wait_for_registration()?;
        Ok(world)
    }

    /// Build a whole group inside this process, one `World` per rank.
    ///
    /// The members share a heap segment and are meant to be driven from
    /// separate threads; element `i` of the result is rank `i`.
    pub fn local(config: &GroupConfig) -> Result<Vec<World>> {
        config.validate()?;
        let size = config.size as usize;
        let layout = SegmentLayout::new(size, config.slot_capacity)?;
        let segment = Arc::new(Segment {
            backing: Backing::Heap(HeapRegion::zeroed(layout.total)?),
        });
        debug!("Using {}", segment.describe());

        segment.initialize(&layout, size);
        let state = segment.state();
        let pid = std::process::id() as usize;
        for rank in 0..size {
            state.process_ids[rank].store(pid, Ordering::SeqCst);
            state.init_flags[rank].store(true, Ordering::SeqCst);
        }

        let processor_name = host_identity();
        Ok((0..size)
            .map(|rank| World {
                rank: rank as i32,
                size: config.size,
                segment: Arc::clone(&segment),
                layout,
                children: Vec::new(),
                processor_name: processor_name.clone(),
            })
            .collect())
    }

    /// The rank of this member, in `0..size()`.
    pub fn rank(&self) -> i32 {
        self.rank
    }

    /// The number of members in the group. Fixed for the group's lifetime.
    pub fn size(&self) -> i32 {
        self.size
    }

    /// Whether this member is rank 0.
    pub fn is_coordinator(&self) -> bool {
        self.rank == 0
    }

    /// Host name of the machine this member runs on.
    pub fn processor_name(&self) -> &str {
        &self.processor_name
    }

    /// Payload bytes per mailbox slot.
    pub fn slot_capacity(&self) -> usize {
        self.layout.slot_capacity
    }

    /// Whether any member has aborted the group.
    pub fn is_aborted(&self) -> bool {
        self.segment.state().aborted.load(Ordering::SeqCst)
    }

    /// Abort the whole group.
    ///
    /// Every member blocked in, or later entering, a group operation gets
    /// [`GroupError::Aborted`] naming the first member that aborted. Errors
    /// that are themselves the result of an abort are not re-raised.
    pub fn abort(&self, reason: &GroupError) {
        if let GroupError::Aborted { .. } = reason.root_cause() {
            return;
        }
        let state = self.segment.state();
        let _ = state
            .abort_rank
            .compare_exchange(-1, self.rank, Ordering::SeqCst, Ordering::SeqCst);
        state.aborted.store(true, Ordering::SeqCst);
        error!("Rank {} aborting group: {}", self.rank, reason);
        debug!("Abort backtrace:\n{:?}", Backtrace::new());
    }

    fn wait_until(&self, mut ready: impl FnMut() -> bool) -> Result<()> {
        let state = self.segment.state();
        let mut spins = 0u32;
        loop {
            if state.aborted.load(Ordering::SeqCst) {
                return Err(GroupError::Aborted {
                    by_rank: state.abort_rank.load(Ordering::SeqCst),
                });
            }
            if ready() {
                break;
            }
            if spins < SPIN_LIMIT {
                spins += 1;
                std::hint::spin_loop();
            } else {
                std::thread::yield_now();
            }
        }
        Ok(())
    }

    fn wait_for_registration(&self) -> Result<()> {
        let state = self.segment.state();
        let size = self.size as usize;
        self.wait_until(|| (0..size).all(|i| state.init_flags[i].load(Ordering::SeqCst)))?;
        info!(
            "Rank {}/{} on {} joined the group",
            self.rank, self.size, self.processor_name
        );
        Ok(())
    }

    /// Registration wait for the launcher: also fails if a spawned process
    /// exits before it has joined.
    fn wait_for_children(&mut self) -> Result<()> {
        let size = self.size as usize;
        loop {
            let registered = {
                let state = self.segment.state();
                (0..size).all(|i| state.init_flags[i].load(Ordering::SeqCst))
            };
            if registered {
                return self.wait_for_registration();
            }
            let exited = self.children.iter_mut().find_map(|child| match child.try_wait() {
                Ok(Some(status)) => Some(format!(
                    "Process {} exited with {} before joining the group",
                    child.id(),
                    status
                )),
                _ => None,
            });
            if let Some(reason) = exited {
                let err = GroupError::ProcessError(reason);
                self.abort(&err);
                return Err(err);
            }
            std::thread::yield_now();
        }
    }

    fn check_rank(&self, rank: i32) -> Result<usize> {
        if rank < 0 || rank >= self.size {
            return Err(GroupError::InvalidRank(rank));
        }
        Ok(rank as usize)
    }

    fn check_plan(&self, plan: &DistributionPlan) -> Result<()> {
        if plan.group_size() != self.size as usize {
            return Err(GroupError::PlanError(format!(
                "plan covers {} members, group has {}",
                plan.group_size(),
                self.size
            )));
        }
        Ok(())
    }

    fn slot(&self, src: usize, dst: usize) -> (&MessageHeader, *mut u8) {
        let offset = self.layout.slot_offset(self.size as usize, src, dst);
        (self.segment.header(offset), self.segment.payload(offset))
    }

    /// Send raw bytes, one slot-sized frame at a time. Returns once the
    /// receiver has taken the last frame.
    fn send_bytes(&self, bytes: &[u8], dest: i32, tag: i32) -> Result<()> {
        let dest_idx = self.check_rank(dest)?;
        if dest == self.rank {
            return Err(GroupError::CommunicationError(format!(
                "Rank {} cannot send to itself",
                self.rank
            )));
        }

        debug!(
            "Rank {} sending {} bytes to rank {} with tag {}",
            self.rank,
            bytes.len(),
            dest,
            tag
        );

        let (header, payload) = self.slot(self.rank as usize, dest_idx);
        let capacity = self.layout.slot_capacity;
        let mut sent = 0;
        loop {
            let frame = capacity.min(bytes.len() - sent);

            // Wait for slot to be free
            self.wait_until(|| !header.valid.load(Ordering::SeqCst))?;

            header.tag.store(tag, Ordering::SeqCst);
            header.source.store(self.rank, Ordering::SeqCst);
            header.size.store(frame, Ordering::SeqCst);
            header.remaining.store(bytes.len() - sent - frame, Ordering::SeqCst);
            header.received.store(false, Ordering::SeqCst);
            unsafe {
                std::ptr::copy_nonoverlapping(bytes.as_ptr().add(sent), payload, frame);
            }
            header.valid.store(true, Ordering::SeqCst);

            self.wait_until(|| header.received.load(Ordering::SeqCst))?;

            sent += frame;
            if sent == bytes.len() {
                break;
            }
        }

        debug!("Rank {} completed send to rank {}", self.rank, dest);
        Ok(())
    }

    /// Receive one framed message, handing each frame and the byte count
    /// still to follow it to `sink`.
    fn recv_frames(
        &self,
        source: i32,
        tag: i32,
        mut sink: impl FnMut(&[u8], usize) -> Result<()>,
    ) -> Result<()> {
        let source_idx = self.check_rank(source)?;
        debug!("Rank {} receiving from rank {} with tag {}", self.rank, source, tag);

        let (header, payload) = self.slot(source_idx, self.rank as usize);
        loop {
            self.wait_until(|| header.valid.load(Ordering::SeqCst))?;

            let found_tag = header.tag.load(Ordering::SeqCst);
            let found_source = header.source.load(Ordering::SeqCst);
            if found_tag != tag || found_source != source {
                return Err(GroupError::CommunicationError(format!(
                    "Rank {} expected tag {} from rank {}, found tag {} from rank {}",
                    self.rank, tag, source, found_tag, found_source
                )));
            }
            let size = header.size.load(Ordering::SeqCst);
            if size > self.layout.slot_capacity {
                return Err(GroupError::CommunicationError(format!(
                    "Frame of {} bytes exceeds slot capacity {}",
                    size, self.layout.slot_capacity
                )));
            }
            let remaining = header.remaining.load(Ordering::SeqCst);

            let outcome = {
                let frame = unsafe { std::slice::from_raw_parts(payload as *const u8, size) };
                sink(frame, remaining)
            };

            // Acknowledge receipt and mark slot as free
            header.received.store(true, Ordering::SeqCst);
            header.valid.store(false, Ordering::SeqCst);

            outcome?;
            if remaining == 0 {
                break;
            }
        }

        debug!("Rank {} completed receive from rank {}", self.rank, source);
        Ok(())
    }

    fn recv_bytes(&self, source: i32, tag: i32) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.recv_frames(source, tag, |frame, remaining| {
            bytes
                .try_reserve(frame.len() + remaining)
                .map_err(|e| GroupError::ResourceError(e.to_string()))?;
            bytes.extend_from_slice(frame);
            Ok(())
        })?;
        Ok(bytes)
    }

    /// Receive a raw element buffer straight into `dest`, which must match
    /// the incoming length exactly.
    fn recv_into<T: Pod>(&self, source: i32, tag: i32, dest: &mut [T]) -> Result<()> {
        let expected = dest.len();
        let dest_bytes: &mut [u8] = bytemuck::cast_slice_mut(dest);
        let mut filled = 0;
        self.recv_frames(source, tag, |frame, remaining| {
            let end = filled + frame.len();
            if end + remaining != dest_bytes.len() {
                return Err(GroupError::BufferSizeMismatch {
                    expected,
                    actual: (end + remaining) / size_of::<T>().max(1),
                });
            }
            dest_bytes[filled..end].copy_from_slice(frame);
            filled = end;
            Ok(())
        })
    }

    /// Send data to a specific rank (blocking until received).
    ///
    /// # Arguments
    ///
    /// * `data` - The data to send (must implement Serialize)
    /// * `dest` - The rank of the destination process
    /// * `tag` - A non-negative message identifier; the receiver must ask for
    ///   the same tag
    pub fn send<T: Serialize>(&self, data: &T, dest: i32, tag: i32) -> Result<()> {
        check_user_tag(tag)?;
        let serialized =
            bincode::serialize(data).map_err(|e| GroupError::SerializationError(e.to_string()))?;
        self.send_bytes(&serialized, dest, tag)
    }

    /// Receive data from a specific rank.
    ///
    /// Blocks until a message arrives from `source`. A message with a
    /// different tag is a protocol error.
    pub fn recv<T: DeserializeOwned>(&self, source: i32, tag: i32) -> Result<T> {
        check_user_tag(tag)?;
        let bytes = self.recv_bytes(source, tag)?;
        bincode::deserialize(&bytes).map_err(|e| GroupError::SerializationError(e.to_string()))
    }

    /// Broadcast data from root rank to all other ranks.
    ///
    /// The root's `data` is returned on every rank; what the other ranks pass
    /// is ignored.
    ///
    /// ```rust,no_run
    /// use rowscatter::{GroupConfig, World};
    ///
    /// let world = World::init(&GroupConfig::new(4)).unwrap();
    /// let data = if world.rank() == 0 { vec![1, 2, 3] } else { vec![] };
    /// assert_eq!(world.broadcast(&data, 0).unwrap(), vec![1, 2, 3]);
    /// world.destruct();
    /// ```
    pub fn broadcast<T: Serialize + DeserializeOwned + Clone>(
        &self,
        data: &T,
        root: i32,
    ) -> Result<T> {
        self.broadcast_from(Some(data), root)
    }

    /// Broadcast for values only the root holds. The root must pass `Some`.
    pub fn broadcast_from<T: Serialize + DeserializeOwned + Clone>(
        &self,
        data: Option<&T>,
        root: i32,
    ) -> Result<T> {
        self.check_rank(root)?;
        debug!("Rank {} entering broadcast", self.rank);

        let result = if self.rank == root {
            let data = data.ok_or_else(|| {
                GroupError::InitError("Root must provide data for broadcast".into())
            })?;
            let serialized = bincode::serialize(data)
                .map_err(|e| GroupError::SerializationError(e.to_string()))?;
            for rank in 0..self.size {
                if rank != root {
                    self.send_bytes(&serialized, rank, BROADCAST_TAG)?;
                }
            }
            data.clone()
        } else {
            let bytes = self.recv_bytes(root, BROADCAST_TAG)?;
            bincode::deserialize(&bytes).map_err(|e| GroupError::SerializationError(e.to_string()))?
        };

        debug!("Rank {} completed broadcast", self.rank);
        Ok(result)
    }

    /// Scatter variable-length pieces of a buffer held by `root`.
    ///
    /// Every rank `i` gets `data[plan.range(i)]` in a freshly allocated
    /// buffer of `plan.count(i)` elements. Only the root passes `data`, and
    /// its length must be `plan.total_elements()`. Ranks with an empty range
    /// exchange no message.
    ///
    /// ```rust,no_run
    /// use rowscatter::{DistributionPlan, GroupConfig, World};
    ///
    /// let world = World::init(&GroupConfig::new(2)).unwrap();
    /// let plan = DistributionPlan::new(4, 3, 2).unwrap();
    /// let matrix: Vec<i32> = (1..=12).collect();
    /// let data = if world.rank() == 0 { Some(&matrix[..]) } else { None };
    /// let local = world.scatterv(data, &plan, 0).unwrap();
    /// assert_eq!(local.len(), 6);
    /// world.destruct();
    /// ```
    pub fn scatterv<T: Pod>(
        &self,
        data: Option<&[T]>,
        plan: &DistributionPlan,
        root: i32,
    ) -> Result<Vec<T>> {
        let root_idx = self.check_rank(root)?;
        self.check_plan(plan)?;
        let rank = self.rank as usize;

        debug!("Rank {} entering scatter", self.rank);

        let local = if self.rank == root {
            let data = data.ok_or_else(|| {
                GroupError::InitError("Root must provide data for scatter".into())
            })?;
            if data.len() != plan.total_elements() {
                return Err(GroupError::BufferSizeMismatch {
                    expected: plan.total_elements(),
                    actual: data.len(),
                });
            }

            for (peer, range) in plan.ranges() {
                if peer == root_idx || range.is_empty() {
                    continue;
                }
                debug!("Root sending {} elements to rank {}", range.len(), peer);
                self.send_bytes(bytemuck::cast_slice(&data[range]), peer as i32, SCATTER_TAG)?;
            }

            let own = &data[plan.range(rank)];
            let mut local = alloc_zeroed::<T>(own.len())?;
            local.copy_from_slice(own);
            local
        } else {
            let mut local = alloc_zeroed::<T>(plan.count(rank))?;
            if !local.is_empty() {
                self.recv_into(root, SCATTER_TAG, &mut local)?;
            }
            local
        };

        debug!("Rank {} completed scatter", self.rank);
        Ok(local)
    }

    /// Gather variable-length pieces back into a buffer at `root`.
    ///
    /// Inverse of [`scatterv`](World::scatterv): rank `i`'s `local`, of
    /// `plan.count(i)` elements, lands at `recv[plan.range(i)]`. Only the root
    /// passes `recv`, sized `plan.total_elements()`.
    pub fn gatherv<T: Pod>(
        &self,
        local: &[T],
        recv: Option<&mut [T]>,
        plan: &DistributionPlan,
        root: i32,
    ) -> Result<()> {
        let root_idx = self.check_rank(root)?;
        self.check_plan(plan)?;
        let rank = self.rank as usize;

        debug!("Rank {} entering gather", self.rank);

        if local.len() != plan.count(rank) {
            return Err(GroupError::BufferSizeMismatch {
                expected: plan.count(rank),
                actual: local.len(),
            });
        }

        if self.rank == root {
            let full = recv.ok_or_else(|| {
                GroupError::InitError("Root must provide a buffer for gather".into())
            })?;
            if full.len() != plan.total_elements() {
                return Err(GroupError::BufferSizeMismatch {
                    expected: plan.total_elements(),
                    actual: full.len(),
                });
            }

            full[plan.range(rank)].copy_from_slice(local);
            for (peer, range) in plan.ranges() {
                if peer == root_idx || range.is_empty() {
                    continue;
                }
                debug!("Root receiving {} elements from rank {}", range.len(), peer);
                self.recv_into(peer as i32, GATHER_TAG, &mut full[range])?;
            }
        } else if !local.is_empty() {
            debug!("Rank {} sending to root", self.rank);
            self.send_bytes(bytemuck::cast_slice(local), root, GATHER_TAG)?;
        }

        debug!("Rank {} completed gather", self.rank);
        Ok(())
    }

    /// Block until every member of the group has entered the barrier.
    pub fn barrier(&self) -> Result<()> {
        debug!("Rank {} entering barrier", self.rank);

        // First phase: everyone reports to root
        if self.rank == 0 {
            for rank in 1..self.size {
                debug!("Root waiting for rank {}", rank);
                self.recv_frames(rank, BARRIER_ARRIVE_TAG, |_, _| Ok(()))?;
            }
        } else {
            debug!("Rank {} signaling root", self.rank);
            self.send_bytes(&[], 0, BARRIER_ARRIVE_TAG)?;
        }

        // Second phase: root releases everyone
        if self.rank == 0 {
            for rank in 1..self.size {
                self.send_bytes(&[], rank, BARRIER_COMPLETE_TAG)?;
            }
        } else {
            self.recv_frames(0, BARRIER_COMPLETE_TAG, |_, _| Ok(()))?;
        }

        debug!("Rank {} exiting barrier", self.rank);
        Ok(())
    }

    /// Leave the group.
    ///
    /// Members rendezvous so no one releases the segment while others still
    /// use it; rank 0 then reaps the processes it launched. After an abort the
    /// rendezvous is skipped.
    pub fn destruct(mut self) {
        if !self.is_aborted() {
            let state = self.segment.state();
            let size = self.size as usize;
            state.cleanup_ready[self.rank as usize].store(true, Ordering::SeqCst);
            if let Err(e) = self.wait_until(|| {
                (0..size).all(|i| state.cleanup_ready[i].load(Ordering::SeqCst))
            }) {
                warn!("Rank {} left the group during shutdown: {}", self.rank, e);
            }
        }

        if !self.children.is_empty() {
            debug!("Parent process waiting for children to finish");
        }
        for mut child in self.children.drain(..) {
            match child.wait() {
                Ok(status) if !status.success() => {
                    warn!("Child process {} exited with {}", child.id(), status)
                }
                Ok(_) => {}
                Err(e) => warn!("Could not wait for child process {}: {}", child.id(), e),
            }
        }

        debug!("Process {} finished", self.rank);
    }
}

fn check_user_tag(tag: i32) -> Result<()> {
    if tag < 0 {
        return Err(GroupError::CommunicationError(format!(
            "Tag {} is reserved for collective operations",
            tag
        )));
    }
    Ok(())
}
