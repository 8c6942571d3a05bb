use super::helpers::{indexed, run_group, run_group_with};
use rowscatter::{DistributionPlan, GroupConfig, GroupError};

#[test]
fn test_scatter_then_gather_is_lossless() {
    for rows in [0usize, 1, 7, 100] {
        for cols in [1usize, 5] {
            for size in [1i32, 2, 3, 8] {
                let original = indexed(rows, cols);
                let config = GroupConfig::new(size).with_slot_capacity(24);
                let results = run_group_with(config, |world| {
                    let plan = DistributionPlan::new(rows, cols, size as usize).unwrap();
                    let is_root = world.rank() == 0;
                    let local = world
                        .scatterv(is_root.then_some(&original[..]), &plan, 0)
                        .unwrap();
                    assert_eq!(local.len(), plan.count(world.rank() as usize));

                    let mut full = vec![-1; if is_root { rows * cols } else { 0 }];
                    let recv = if is_root { Some(&mut full[..]) } else { None };
                    world.gatherv(&local, recv, &plan, 0).unwrap();
                    full
                });
                assert_eq!(
                    results[0], original,
                    "rows={} cols={} size={}",
                    rows, cols, size
                );
            }
        }
    }
}

#[test]
fn test_each_member_gets_its_own_range() {
    let original = indexed(10, 3);
    let results = run_group(4, |world| {
        let plan = DistributionPlan::new(10, 3, 4).unwrap();
        let data = (world.rank() == 0).then_some(&original[..]);
        let local = world.scatterv(data, &plan, 0).unwrap();
        (plan.range(world.rank() as usize), local)
    });
    for (rank, (range, local)) in results.into_iter().enumerate() {
        assert_eq!(local, original[range].to_vec(), "rank {rank}");
    }
}

#[test]
fn test_members_without_rows_are_no_ops() {
    let original = indexed(2, 3);
    let results = run_group(5, |world| {
        let plan = DistributionPlan::new(2, 3, 5).unwrap();
        let is_root = world.rank() == 0;
        let local = world
            .scatterv(is_root.then_some(&original[..]), &plan, 0)
            .unwrap();
        let mut full = vec![0; if is_root { 6 } else { 0 }];
        let recv = if is_root { Some(&mut full[..]) } else { None };
        world.gatherv(&local, recv, &plan, 0).unwrap();
        (local.len(), full)
    });
    let lengths: Vec<usize> = results.iter().map(|(len, _)| *len).collect();
    assert_eq!(lengths, vec![3, 3, 0, 0, 0]);
    assert_eq!(results[0].1, original);
}

#[test]
fn test_nonzero_root() {
    let original = indexed(9, 2);
    let results = run_group(3, |world| {
        let plan = DistributionPlan::new(9, 2, 3).unwrap();
        let is_root = world.rank() == 2;
        let mut local = world
            .scatterv(is_root.then_some(&original[..]), &plan, 2)
            .unwrap();
        local.iter_mut().for_each(|v| *v *= 2);
        let mut full = vec![0; if is_root { 18 } else { 0 }];
        let recv = if is_root { Some(&mut full[..]) } else { None };
        world.gatherv(&local, recv, &plan, 2).unwrap();
        full
    });
    let doubled: Vec<i32> = original.iter().map(|v| v * 2).collect();
    assert_eq!(results[2], doubled);
}

#[test]
fn test_gather_rejects_wrong_local_length() {
    let results = run_group(1, |world| {
        let plan = DistributionPlan::new(2, 2, 1).unwrap();
        let mut full = vec![0; 4];
        world.gatherv(&[1, 2, 3], Some(&mut full[..]), &plan, 0)
    });
    assert!(matches!(
        results[0],
        Err(GroupError::BufferSizeMismatch { expected: 4, actual: 3 })
    ));
}
