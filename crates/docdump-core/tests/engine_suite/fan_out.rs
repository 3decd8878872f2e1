//! Fan-out/fan-in coordinator tests.
//!
//! The continuation must run exactly once, after every sub-operation has
//! reported, whatever the number of failures.

use docdump_core::{Error, FanIn, FanOut, Result};
use rand::Rng;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Run `n` sub-operations, failing the ones in `failing`, and return the
/// fan-in with how many times the continuation ran and how many
/// sub-operations had finished when it did.
async fn instrumented_run(n: usize, failing: &HashSet<usize>) -> (FanIn, usize, usize) {
    let finished = AtomicUsize::new(0);
    let continuations = AtomicUsize::new(0);

    let ops = (0..n).map(|i| {
        let finished = &finished;
        let fails = failing.contains(&i);
        (i, async move {
            tokio::time::sleep(Duration::from_millis((i % 7) as u64)).await;
            finished.fetch_add(1, Ordering::SeqCst);
            if fails {
                Err::<(), Error>(Error::Metadata(format!("op {} failed", i)))
            } else {
                Ok(())
            }
        })
    });

    let (fan_in, seen_finished) = FanOut::new("op")
        .run_then(ops, |fan_in| {
            continuations.fetch_add(1, Ordering::SeqCst);
            (fan_in, finished.load(Ordering::SeqCst))
        })
        .await;

    (fan_in, continuations.load(Ordering::SeqCst), seen_finished)
}

#[tokio::test]
async fn zero_operations_is_vacuous_success() {
    let (fan_in, continuations, finished) = instrumented_run(0, &HashSet::new()).await;
    assert_eq!(continuations, 1);
    assert_eq!(finished, 0);
    assert_eq!(fan_in.total, 0);
    assert!(fan_in.into_result().is_ok());
}

#[tokio::test]
async fn single_operation() {
    let (fan_in, continuations, finished) = instrumented_run(1, &HashSet::new()).await;
    assert_eq!(continuations, 1);
    assert_eq!(finished, 1);
    assert_eq!(fan_in.succeeded, 1);

    let failing: HashSet<usize> = [0].into_iter().collect();
    let (fan_in, continuations, _) = instrumented_run(1, &failing).await;
    assert_eq!(continuations, 1);
    assert!(matches!(fan_in.into_result(), Err(Error::Metadata(_))));
}

#[tokio::test]
async fn fifty_operations_with_random_failures() {
    let mut rng = rand::thread_rng();
    let failing: HashSet<usize> = (0..50).filter(|_| rng.gen_bool(0.3)).collect();

    let (fan_in, continuations, finished) = instrumented_run(50, &failing).await;

    assert_eq!(continuations, 1);
    assert_eq!(finished, 50);
    assert_eq!(fan_in.total, 50);
    assert_eq!(fan_in.failed, failing.len());
    assert_eq!(fan_in.succeeded, 50 - failing.len());
    assert_eq!(fan_in.is_success(), failing.is_empty());
}

#[tokio::test]
async fn bounded_window_still_runs_everything() {
    let ran = AtomicUsize::new(0);
    let ops = (0..25).map(|i| {
        let ran = &ran;
        (i, async move {
            ran.fetch_add(1, Ordering::SeqCst);
            Result::Ok(())
        })
    });

    let fan_in = FanOut::new("op").limit(4).run(ops).await;
    assert_eq!(fan_in.succeeded, 25);
    assert_eq!(ran.load(Ordering::SeqCst), 25);
}
