use rowscatter::{GroupConfig, GroupError, World};
use std::panic::{self, AssertUnwindSafe};
use std::thread;

/// Run `f` on every rank of an in-process group of `size`, one thread per
/// rank. Results come back in rank order.
pub fn run_group<R, F>(size: i32, f: F) -> Vec<R>
where
    R: Send,
    F: Fn(&World) -> R + Sync,
{
    run_group_with(GroupConfig::new(size), f)
}

/// Like [`run_group`] with an explicit configuration. A panicking rank
/// aborts the group so the other threads do not wait on it forever.
pub fn run_group_with<R, F>(config: GroupConfig, f: F) -> Vec<R>
where
    R: Send,
    F: Fn(&World) -> R + Sync,
{
    let worlds = World::local(&config).unwrap();
    thread::scope(|scope| {
        let handles: Vec<_> = worlds
            .into_iter()
            .map(|world| {
                let f = &f;
                scope.spawn(move || {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(&world)));
                    if outcome.is_err() {
                        world.abort(&GroupError::ProcessError(format!(
                            "rank {} panicked",
                            world.rank()
                        )));
                    }
                    world.destruct();
                    match outcome {
                        Ok(out) => out,
                        Err(payload) => panic::resume_unwind(payload),
                    }
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

/// `rows x cols` matrix whose elements are their own flat index.
pub fn indexed(rows: usize, cols: usize) -> Vec<i32> {
    (0..(rows * cols) as i32).collect()
}
