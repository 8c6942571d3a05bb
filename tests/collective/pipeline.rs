use super::helpers::{indexed, run_group, run_group_with};
use rowscatter::{
    Checkpoint, Coordinator, GroupConfig, Matrix, ReverseRow, RunOptions, RunReport, Worker,
};

fn run_reverse(config: GroupConfig, matrix: Matrix, parallel_rows: bool) -> RunReport {
    let options = RunOptions { parallel_rows };
    let mut results = run_group_with(config, |world| {
        if world.is_coordinator() {
            Some(
                Coordinator::new(world, matrix.clone(), ReverseRow)
                    .unwrap()
                    .with_options(options)
                    .run()
                    .unwrap(),
            )
        } else {
            Worker::new(world, ReverseRow)
                .unwrap()
                .with_options(options)
                .run()
                .unwrap();
            None
        }
    });
    results.swap_remove(0).unwrap()
}

#[test]
fn test_four_by_three_over_two_members() {
    let matrix = Matrix::new(4, 3, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]).unwrap();
    let report = run_reverse(GroupConfig::new(2), matrix, false);

    assert_eq!(report.plan.counts(), &[6, 6]);
    assert_eq!(report.plan.offsets(), &[0, 6]);
    assert_eq!(
        report.matrix.as_slice(),
        &[3, 2, 1, 6, 5, 4, 9, 8, 7, 12, 11, 10]
    );
}

#[test]
fn test_more_members_than_rows() {
    let matrix = Matrix::new(2, 4, indexed(2, 4)).unwrap();
    let report = run_reverse(GroupConfig::new(5), matrix, false);

    assert_eq!(report.plan.counts(), &[4, 4, 0, 0, 0]);
    assert_eq!(report.matrix.as_slice(), &[3, 2, 1, 0, 7, 6, 5, 4]);
}

#[test]
fn test_framed_transfers_with_parallel_rows() {
    let (rows, cols) = (100, 5);
    let matrix = Matrix::new(rows, cols, indexed(rows, cols)).unwrap();
    let config = GroupConfig::new(8).with_slot_capacity(32);
    let report = run_reverse(config, matrix.clone(), true);

    for (got, original) in report.matrix.iter_rows().zip(matrix.iter_rows()) {
        let mut expected = original.to_vec();
        expected.reverse();
        assert_eq!(got, &expected[..]);
    }
}

#[test]
fn test_timing_is_monotonic() {
    let matrix = Matrix::new(30, 7, indexed(30, 7)).unwrap();
    let report = run_reverse(GroupConfig::new(3), matrix, false);
    let timing = report.timing;
    assert!(timing.broadcast_phase <= timing.total);
    assert!(timing.gather_phase <= timing.total);
    assert_eq!(timing.overhead, timing.broadcast_phase + timing.gather_phase);
    assert!(timing.overhead <= timing.total);
}

#[test]
fn test_worker_records_only_its_own_checkpoints() {
    let records = run_group(2, |world| {
        if world.is_coordinator() {
            let matrix = Matrix::new(2, 2, vec![1, 2, 3, 4]).unwrap();
            Coordinator::new(world, matrix, ReverseRow).unwrap().run().unwrap();
            None
        } else {
            Some(Worker::new(world, ReverseRow).unwrap().run().unwrap())
        }
    });
    let worker = records[1].as_ref().unwrap();
    assert!(worker.get(Checkpoint::RunStart).is_none());
    assert!(worker.get(Checkpoint::PlanBroadcast).is_some());
    assert!(worker.get(Checkpoint::ComputeComplete).is_some());
    assert!(worker.summary().is_none());
}

#[test]
fn test_custom_transform() {
    let results = run_group(3, |world| {
        let double = |row: &mut [i32]| row.iter_mut().for_each(|v| *v *= 2);
        if world.is_coordinator() {
            let matrix = Matrix::new(5, 2, indexed(5, 2)).unwrap();
            Some(Coordinator::new(world, matrix, double).unwrap().run().unwrap().matrix)
        } else {
            Worker::new(world, double).unwrap().run().unwrap();
            None
        }
    });
    let expected: Vec<i32> = indexed(5, 2).iter().map(|v| v * 2).collect();
    assert_eq!(results[0].as_ref().unwrap().as_slice(), &expected[..]);
}
