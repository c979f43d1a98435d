//! Scheduler semantics: quiescent termination, self-feeding tasks, and the
//! concurrency cap.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use shopcrawl::TaskScheduler;

#[tokio::test(flavor = "multi_thread")]
async fn terminates_when_queue_and_in_flight_are_empty() {
    let scheduler = TaskScheduler::new(4);
    for i in 0..10 {
        scheduler.submit(i).await;
    }

    let ran = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ran);
    scheduler
        .run_until_quiescent(move |_task: usize| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })
        .await;

    assert_eq!(ran.load(Ordering::SeqCst), 10);
    assert_eq!(scheduler.queued().await, 0);
    assert_eq!(scheduler.in_flight().await, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn task_submitting_after_queue_drains_keeps_scheduler_alive() {
    let scheduler: Arc<TaskScheduler<u32>> = TaskScheduler::new(2);
    scheduler.submit(0).await;

    let ran = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&ran);
    let feeder = Arc::clone(&scheduler);
    scheduler
        .run_until_quiescent(move |task| {
            let counter = Arc::clone(&counter);
            let feeder = Arc::clone(&feeder);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if task < 3 {
                    // Let the queue drain completely before producing the
                    // next task, so termination is decided while work is
                    // still only in flight.
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    feeder.submit(task + 1).await;
                }
            }
        })
        .await;

    // The chain 0 → 1 → 2 → 3 must run to completion before exit.
    assert_eq!(ran.load(Ordering::SeqCst), 4);
}

#[tokio::test(flavor = "multi_thread")]
async fn in_flight_never_exceeds_cap() {
    const CAP: usize = 3;
    let scheduler = TaskScheduler::new(CAP);
    for i in 0..24 {
        scheduler.submit(i).await;
    }

    let current = Arc::new(AtomicUsize::new(0));
    let observed_max = Arc::new(AtomicUsize::new(0));

    let current_ref = Arc::clone(&current);
    let max_ref = Arc::clone(&observed_max);
    scheduler
        .run_until_quiescent(move |_task: usize| {
            let current = Arc::clone(&current_ref);
            let observed_max = Arc::clone(&max_ref);
            async move {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                observed_max.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                current.fetch_sub(1, Ordering::SeqCst);
            }
        })
        .await;

    assert!(
        observed_max.load(Ordering::SeqCst) <= CAP,
        "cap exceeded: {} > {CAP}",
        observed_max.load(Ordering::SeqCst)
    );
    assert!(observed_max.load(Ordering::SeqCst) >= 2, "no concurrency observed");
}

#[tokio::test(flavor = "multi_thread")]
async fn fan_out_from_a_single_seed_completes() {
    // Each task spawns two children until depth 4: 31 tasks in total.
    let scheduler: Arc<TaskScheduler<u32>> = TaskScheduler::new(4);
    scheduler.submit(0).await;

    let ran = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ran);
    let feeder = Arc::clone(&scheduler);
    scheduler
        .run_until_quiescent(move |depth| {
            let counter = Arc::clone(&counter);
            let feeder = Arc::clone(&feeder);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if depth < 4 {
                    feeder.submit(depth + 1).await;
                    feeder.submit(depth + 1).await;
                }
            }
        })
        .await;

    assert_eq!(ran.load(Ordering::SeqCst), 31);
}
