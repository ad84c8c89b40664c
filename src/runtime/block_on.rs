use crate::runtime::waker::ThreadWaker;

use std::future::Future;
use std::pin::pin;
use std::task::{Context, Poll};

/// Runs a future to completion on the calling thread.
///
/// The thread parks while the future is pending and is unparked by the
/// future's waker. Unlike `futures::executor::block_on` this may be nested:
/// a task body driven here can itself block on another future, which is
/// what lets [`Task::run`](crate::Task::run) be called from inside a worker.
pub fn block_on<F: Future>(future: F) -> F::Output {
    let mut future = pin!(future);
    let (signal, waker) = ThreadWaker::current();
    let mut cx = Context::from_waker(&waker);

    loop {
        if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
            return output;
        }
        signal.wait();
    }
}
