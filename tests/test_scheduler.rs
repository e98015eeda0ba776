use s1tiling::config::OutputMode;
use s1tiling::core::scheduler::{CommandFailure, ProcessPool};
use s1tiling::core::CommandUnit;
use std::time::Instant;

#[test]
fn test_pool_bounds_concurrency() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().expect("Failed to create temp dir");

    let total = 6;
    let units: Vec<CommandUnit> = (0..total)
        .map(|i| {
            let marker = dir.path().join(format!("done_{}", i));
            CommandUnit::new("Sleeping", format!("sleep 0.2 && touch {}", marker.display()))
        })
        .collect();

    let pool = ProcessPool::new(2, OutputMode::Quiet, dir.path());
    let start = Instant::now();
    let report = pool.run(&units).expect("Failed to run batch");
    let elapsed = start.elapsed();

    println!("Ran {} commands in {:.2}s, peak {}", report.launched, elapsed.as_secs_f64(), report.peak_in_flight);

    assert_eq!(report.launched, total);
    assert_eq!(report.succeeded, total);
    assert!(report.peak_in_flight >= 1);
    assert!(report.peak_in_flight <= 2);
    // three waves of two
    assert!(elapsed.as_secs_f64() >= 0.55);

    // every unit has terminated when run() returns
    for i in 0..total {
        assert!(dir.path().join(format!("done_{}", i)).exists());
    }
}

#[test]
fn test_failures_are_reported_not_raised() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().expect("Failed to create temp dir");

    let units = vec![
        CommandUnit::new("Mixed", "true"),
        CommandUnit::new("Mixed", "exit 2"),
        CommandUnit::new("Mixed", "sleep 0.1"),
        CommandUnit::new("Mixed", "no_such_command_for_s1tiling_tests"),
    ];
    let report = ProcessPool::new(4, OutputMode::Quiet, dir.path())
        .run(&units)
        .expect("Failed to run batch");

    assert_eq!(report.launched, 4);
    assert_eq!(report.succeeded, 2);
    assert!(!report.all_succeeded());
    let codes: Vec<CommandFailure> = report.failed.iter().map(|f| f.failure.clone()).collect();
    assert!(codes.contains(&CommandFailure::Exit(Some(2))));
    // the shell reports unknown commands with 127
    assert!(codes.contains(&CommandFailure::Exit(Some(127))));
}
