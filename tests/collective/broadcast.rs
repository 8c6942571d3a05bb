use super::helpers::run_group_with;
use rowscatter::{DistributionPlan, GroupConfig};

#[test]
fn test_broadcast_from_root_0() {
    let results = run_group_with(GroupConfig::new(3), |world| {
        let data = if world.rank() == 0 { vec![1, 2, 3, 4] } else { vec![] };
        world.broadcast(&data, 0).unwrap()
    });
    for (rank, data) in results.iter().enumerate() {
        assert_eq!(data, &vec![1, 2, 3, 4], "rank {rank} broadcast failed");
    }
}

#[test]
fn test_broadcast_plan_is_identical_everywhere() {
    let expected = DistributionPlan::new(11, 4, 4).unwrap();
    let results = run_group_with(GroupConfig::new(4), |world| {
        let plan = (world.rank() == 0).then(|| DistributionPlan::new(11, 4, 4).unwrap());
        world.broadcast_from(plan.as_ref(), 0).unwrap()
    });
    assert!(results.iter().all(|plan| plan == &expected));
}

#[test]
fn test_broadcast_larger_than_a_slot() {
    let payload: Vec<u64> = (0..5_000).collect();
    let results = run_group_with(GroupConfig::new(4).with_slot_capacity(100), |world| {
        let data = if world.rank() == 0 { payload.clone() } else { Vec::new() };
        world.broadcast(&data, 0).unwrap()
    });
    assert!(results.iter().all(|data| data == &payload));
}

#[test]
fn test_consecutive_broadcasts_stay_ordered() {
    let results = run_group_with(GroupConfig::new(3), |world| {
        (0..5)
            .map(|i| {
                let value = if world.rank() == 0 { i * 10 } else { -1 };
                world.broadcast(&value, 0).unwrap()
            })
            .collect::<Vec<i32>>()
    });
    assert!(results.iter().all(|seen| seen == &vec![0, 10, 20, 30, 40]));
}
