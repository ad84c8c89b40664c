use spindle::{DispatcherConfig, DispatcherKind, Dispatchers, Error, TaskStatus, block_on};
use futures::task::{ArcWake, waker};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

fn small_config() -> DispatcherConfig {
    DispatcherConfig {
        io_threads: 2,
        worker_threads: 2,
    }
}

#[test]
fn main_dispatcher_runs_fifo() {
    let dispatchers = Dispatchers::new(&small_config()).expect("dispatchers");
    let order = Arc::new(Mutex::new(Vec::new()));

    let handles: Vec<_> = (0..10)
        .map(|i| {
            let order = order.clone();
            dispatchers
                .main()
                .schedule(move || order.lock().expect("order lock").push(i))
        })
        .collect();

    for handle in handles {
        handle.join().expect("scheduled job");
    }

    assert_eq!(*order.lock().expect("order lock"), (0..10).collect::<Vec<_>>());
    dispatchers.shutdown();
}

#[test]
fn worker_dispatcher_spawns_tasks() {
    let dispatchers = Dispatchers::new(&small_config()).expect("dispatchers");

    let task = dispatchers
        .worker()
        .spawn(async { (1..=10).sum::<u32>() })
        .expect("spawn");

    assert_eq!(task.get_result().expect("task result"), 55);
    assert_eq!(task.status(), TaskStatus::Completed);
    dispatchers.shutdown();
}

#[test]
fn co_schedule_moves_task_to_main() {
    let dispatchers = Arc::new(Dispatchers::new(&small_config()).expect("dispatchers"));
    let inside = dispatchers.clone();

    let task = dispatchers
        .worker()
        .spawn(async move {
            let before = thread::current().name().map(str::to_string);
            inside.main().co_schedule().await?;
            let after = thread::current().name().map(str::to_string);
            Ok::<_, Error>((before, after))
        })
        .expect("spawn");

    let (before, after) = task.join().expect("join").expect("task body");
    assert!(before.is_some_and(|name| name.starts_with("spindle-worker")));
    assert!(after.is_some_and(|name| name.starts_with("spindle-main")));
    dispatchers.shutdown();
}

#[test]
fn co_schedule_outside_task() {
    let dispatchers = Dispatchers::new(&small_config()).expect("dispatchers");

    block_on(dispatchers.io().co_schedule()).expect("co_schedule");
    dispatchers.shutdown();

    let rejected = block_on(dispatchers.io().co_schedule());
    assert!(matches!(rejected, Err(Error::Rejected)));
}

struct Flag {
    sender: Mutex<mpsc::Sender<String>>,
}

impl ArcWake for Flag {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        let name = thread::current().name().unwrap_or_default().to_string();
        let _ = arc_self.sender.lock().expect("flag lock").send(name);
    }
}

#[test]
fn resume_wakes_on_dispatcher_thread() {
    let dispatchers = Dispatchers::new(&small_config()).expect("dispatchers");
    let (sender, receiver) = mpsc::channel();
    let flag = Arc::new(Flag {
        sender: Mutex::new(sender),
    });

    dispatchers.main().resume(waker(flag)).expect("resume");

    let woken_on = receiver
        .recv_timeout(Duration::from_secs(5))
        .expect("waker was called");
    assert!(woken_on.starts_with("spindle-main"));
    dispatchers.shutdown();
}

#[test]
fn kinds_and_pool_sizes() {
    let dispatchers = Dispatchers::new(&DispatcherConfig {
        io_threads: 3,
        worker_threads: 2,
    })
    .expect("dispatchers");

    for kind in [DispatcherKind::Io, DispatcherKind::Main, DispatcherKind::Worker] {
        assert_eq!(dispatchers.get(kind).kind(), kind);
    }
    assert_eq!(dispatchers.io().executor().worker_count(), 3);
    assert_eq!(dispatchers.main().executor().worker_count(), 1);
    assert_eq!(dispatchers.worker().executor().worker_count(), 2);
    assert_eq!(DispatcherKind::Main.to_string(), "main");

    dispatchers.shutdown();
}

#[test]
fn invalid_config_is_rejected() {
    let result = Dispatchers::new(&DispatcherConfig {
        io_threads: 0,
        worker_threads: 1,
    });
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn global_is_shared() {
    let first = Dispatchers::global().expect("global dispatchers");
    let second = Dispatchers::global().expect("global dispatchers");

    assert!(std::ptr::eq(first, second));
    assert_eq!(first.io().schedule(|| 2 + 2).join().expect("io job"), 4);
}

#[test]
fn spawn_after_shutdown_is_rejected() {
    let dispatchers = Dispatchers::new(&small_config()).expect("dispatchers");
    dispatchers.shutdown();

    let result = dispatchers.worker().spawn(async { 1 });
    assert!(matches!(result, Err(Error::Rejected)));
}
