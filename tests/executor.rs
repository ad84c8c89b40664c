use spindle::{Error, ExecutorExt, ExecutorKind, Executors, TaskError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

#[test]
fn fixed_pool_runs_every_job_once() {
    let pool = Executors::new_fixed_thread_pool(4).expect("executor");
    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..200 {
        let counter = counter.clone();
        pool.submit(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .expect("submit");
    }

    pool.shutdown();
    assert_eq!(counter.load(Ordering::SeqCst), 200);
    assert_eq!(pool.worker_count(), 4);
}

#[test]
fn concurrent_submitters() {
    let pool = Executors::new_fixed_thread_pool(3).expect("executor");
    let counter = Arc::new(AtomicUsize::new(0));

    let submitters: Vec<_> = (0..4)
        .map(|_| {
            let pool = pool.clone();
            let counter = counter.clone();
            thread::spawn(move || {
                for _ in 0..50 {
                    let counter = counter.clone();
                    pool.submit(Box::new(move || {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }))
                    .expect("submit");
                }
            })
        })
        .collect();

    for submitter in submitters {
        submitter.join().expect("submitter thread");
    }
    pool.shutdown();

    assert_eq!(counter.load(Ordering::SeqCst), 200);
}

#[test]
fn shutdown_drains_queue_and_is_idempotent() {
    let pool = Executors::new_single_thread_executor().expect("executor");
    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..10 {
        let counter = counter.clone();
        pool.submit(Box::new(move || {
            thread::sleep(Duration::from_millis(2));
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .expect("submit");
    }

    pool.shutdown();
    pool.shutdown();

    assert!(pool.is_shutdown());
    assert_eq!(counter.load(Ordering::SeqCst), 10);
}

#[test]
fn submit_after_shutdown_is_rejected() {
    let pool = Executors::new_fixed_thread_pool(2).expect("executor");
    pool.shutdown();

    let result = pool.submit(Box::new(|| {}));
    assert!(matches!(result, Err(Error::Rejected)));

    let handle = pool.execute(|| 1);
    assert!(matches!(handle.join(), Err(Error::Rejected)));
}

#[test]
fn single_thread_runs_in_submission_order() {
    let pool = Executors::new(ExecutorKind::SingleThread).expect("executor");
    let order = Arc::new(Mutex::new(Vec::new()));

    for i in 0..20 {
        let order = order.clone();
        pool.submit(Box::new(move || order.lock().expect("order lock").push(i)))
            .expect("submit");
    }
    pool.shutdown();

    let order = order.lock().expect("order lock");
    assert_eq!(*order, (0..20).collect::<Vec<_>>());
}

#[test]
fn panicking_job_does_not_kill_worker() {
    let pool = Executors::new_single_thread_executor().expect("executor");

    let failed = pool.execute(|| -> u32 { panic!("job exploded") });
    let after = pool.execute(|| 5);

    match failed.join() {
        Err(Error::Task(TaskError::Panicked(message))) => assert!(message.contains("exploded")),
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(after.join().expect("later job"), 5);
    pool.shutdown();
}

#[test]
fn zero_sized_pool_is_rejected() {
    assert!(matches!(
        Executors::new_fixed_thread_pool(0),
        Err(Error::Config(_))
    ));
}

#[test]
fn reserved_kinds_are_not_implemented() {
    let reserved = [
        ExecutorKind::CachedThreadPool,
        ExecutorKind::WorkStealingPool(4),
        ExecutorKind::Async,
        ExecutorKind::Coroutine,
        ExecutorKind::Fiber,
    ];

    for kind in reserved {
        assert!(!kind.is_supported(), "{kind} should be reserved");
        assert!(matches!(Executors::new(kind), Err(Error::NotImplemented(_))));
    }

    assert!(ExecutorKind::SingleThread.is_supported());
    assert!(ExecutorKind::FixedThreadPool(2).is_supported());
}

#[test]
fn join_handle_is_awaitable() {
    let pool = Executors::new_fixed_thread_pool(2).expect("executor");

    let handle = pool.execute(|| "computed".to_string());
    let value = futures::executor::block_on(handle).expect("awaited result");

    assert_eq!(value, "computed");
    pool.shutdown();
}

#[test]
fn job_can_shut_down_its_own_executor() {
    let pool = Executors::new_fixed_thread_pool(2).expect("executor");
    let (done_tx, done_rx) = mpsc::channel();

    let inner = pool.clone();
    pool.submit(Box::new(move || {
        inner.shutdown();
        done_tx.send(inner.is_shutdown()).expect("report");
    }))
    .expect("submit");

    let stopped = done_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("job finished");
    assert!(stopped);
    assert!(pool.is_shutdown());
}
