//! Device-bound work never overlaps.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tagsmith_core::models::DeviceGate;
use tagsmith_core::ModelKind;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_runs_execute_one_at_a_time() {
    let gate = DeviceGate::new();
    let intervals = Arc::new(Mutex::new(Vec::new()));

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let gate = gate.clone();
            let intervals = Arc::clone(&intervals);
            let model = ModelKind::ALL[i % ModelKind::ALL.len()];
            tokio::spawn(async move {
                gate.run(model, move || {
                    let start = Instant::now();
                    std::thread::sleep(Duration::from_millis(15));
                    intervals.lock().unwrap().push((start, Instant::now()));
                    Ok(i)
                })
                .await
            })
        })
        .collect();

    let mut finished = Vec::new();
    for task in tasks {
        finished.push(task.await.unwrap().unwrap());
    }
    finished.sort_unstable();
    assert_eq!(finished, (0..8).collect::<Vec<_>>());

    let mut intervals = intervals.lock().unwrap().clone();
    assert_eq!(intervals.len(), 8);
    intervals.sort_by_key(|(start, _)| *start);
    for pair in intervals.windows(2) {
        let (_, prev_end) = pair[0];
        let (next_start, _) = pair[1];
        assert!(next_start >= prev_end, "inference intervals overlap");
    }
    assert!(gate.is_idle());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropped_caller_still_holds_the_gate_until_done() {
    let gate = DeviceGate::new();

    let slow = {
        let gate = gate.clone();
        tokio::spawn(async move {
            gate.run(ModelKind::DualEncoder, || {
                std::thread::sleep(Duration::from_millis(200));
                Ok(())
            })
            .await
        })
    };
    while gate.is_idle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    slow.abort();

    // The blocking task keeps the permit until it returns
    assert!(!gate.is_idle());
    gate.run(ModelKind::ImageTagger, || Ok(())).await.unwrap();
    assert!(gate.is_idle());
}
