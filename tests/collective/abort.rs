use super::helpers::run_group;
use rowscatter::{GroupError, Phase, ReverseRow, Worker};

#[test]
fn test_coordinator_failure_releases_waiting_workers() {
    let results = run_group(4, |world| {
        if world.rank() == 0 {
            // Coordinator fails before issuing any collective.
            world.abort(&GroupError::LoadError("input missing".into()));
            None
        } else {
            Some(Worker::new(world, ReverseRow).unwrap().run().unwrap_err())
        }
    });
    for err in results.into_iter().flatten() {
        assert_eq!(err.phase(), Some(Phase::Announce));
        assert!(matches!(err.root_cause(), GroupError::Aborted { by_rank: 0 }));
    }
}

#[test]
fn test_first_abort_is_reported() {
    let results = run_group(3, |world| {
        if world.rank() == 2 {
            world.abort(&GroupError::CommunicationError("link down".into()));
        }
        world.barrier().err()
    });
    for err in results.into_iter().flatten() {
        assert!(matches!(err, GroupError::Aborted { by_rank: 2 }));
    }
}
