use super::helpers::run_group;
use std::sync::atomic::{AtomicUsize, Ordering};

#[test]
fn test_barrier_4_members() {
    run_group(4, |world| {
        world.barrier().unwrap();
    });
}

#[test]
fn test_barrier_waits_for_last_arrival() {
    let arrived = AtomicUsize::new(0);
    let seen = run_group(5, |world| {
        if world.rank() == 3 {
            std::thread::sleep(std::time::Duration::from_millis(50));
        }
        arrived.fetch_add(1, Ordering::SeqCst);
        world.barrier().unwrap();
        arrived.load(Ordering::SeqCst)
    });
    assert!(seen.iter().all(|&n| n == 5), "{:?}", seen);
}

#[test]
fn test_barrier_repeated() {
    let rounds = AtomicUsize::new(0);
    run_group(3, |world| {
        for round in 1..=4 {
            if world.rank() == 0 {
                rounds.fetch_add(1, Ordering::SeqCst);
            }
            world.barrier().unwrap();
            assert!(rounds.load(Ordering::SeqCst) >= round);
            world.barrier().unwrap();
        }
    });
    assert_eq!(rounds.load(Ordering::SeqCst), 4);
}
