use rowscatter::{Coordinator, GroupConfig, Matrix, ReverseRow, Worker, World};

fn main() {
    env_logger::init();

    // Launch 4 processes - this creates the shared segment and spawns ranks 1..3
    println!("Starting process with PID: {}", std::process::id());
    let world = World::init(&GroupConfig::new(4)).unwrap();
    println!(
        "Process {} initialized on {} (PID: {})",
        world.rank(),
        world.processor_name(),
        std::process::id()
    );

    if world.is_coordinator() {
        // 10 rows over 4 ranks: ranks 0 and 1 take three rows, ranks 2 and 3 take two
        let (rows, cols) = (10, 5);
        let data: Vec<i32> = (0..(rows * cols) as i32).collect();
        let matrix = Matrix::new(rows, cols, data).unwrap();

        let report = Coordinator::new(&world, matrix, ReverseRow)
            .unwrap()
            .run()
            .unwrap();

        for (rank, rows) in (0..report.plan.group_size()).map(|r| (r, report.plan.row_range(r))) {
            println!("Rank {} handled rows {:?}", rank, rows);
        }
        for row in report.matrix.iter_rows() {
            println!("{:?}", row);
        }
        println!("{}", report.timing);
    } else {
        let timing = Worker::new(&world, ReverseRow).unwrap().run().unwrap();
        println!(
            "Rank {} finished, compute took {:?}",
            world.rank(),
            timing.compute_time().unwrap_or_default()
        );
    }

    // Clean up group resources
    world.destruct();
}
