use rowscatter::{Coordinator, GroupConfig, Matrix, RunOptions, Worker, World};
use std::thread;

fn main() {
    env_logger::init();

    // Same pipeline, with every rank on a thread of this process
    let config = GroupConfig::new(3).with_slot_capacity(64);
    let worlds = World::local(&config).unwrap();

    // Any pure per-row function can be distributed; here, a running sum
    let prefix_sum = |row: &mut [i32]| {
        for i in 1..row.len() {
            row[i] += row[i - 1];
        }
    };
    let options = RunOptions { parallel_rows: true };

    thread::scope(|scope| {
        for world in worlds {
            scope.spawn(move || {
                if world.is_coordinator() {
                    let matrix = Matrix::new(7, 4, vec![1; 28]).unwrap();
                    let report = Coordinator::new(&world, matrix, prefix_sum)
                        .unwrap()
                        .with_options(options)
                        .run()
                        .unwrap();
                    for row in report.matrix.iter_rows() {
                        println!("{:?}", row);
                    }
                    println!("{}", report.timing);
                } else {
                    Worker::new(&world, prefix_sum)
                        .unwrap()
                        .with_options(options)
                        .run()
                        .unwrap();
                }
                world.destruct();
            });
        }
    });
}
