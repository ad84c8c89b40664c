//! Lazy, pull-based sequences.
//!
//! A [`Generator`] wraps an async producer that hands values out through a
//! [`Co`] handle. Nothing runs until the first call to `next`; every pull
//! resumes the producer until it yields a value or returns.
//!
//! ```ignore
//! use spindle::Generator;
//!
//! let squares = Generator::new(|co| async move {
//!     for i in 1..=3u32 {
//!         co.yield_(i * i).await;
//!     }
//! });
//! assert_eq!(squares.collect::<Vec<_>>(), vec![1, 4, 9]);
//! ```
//!
//! The producer may also await other futures, such as a [`Task`](crate::Task);
//! the pulling thread parks until that future wakes it.

use crate::runtime::lock;
use crate::runtime::waker::ThreadWaker;

use std::fmt;
use std::future::Future;
use std::iter::FusedIterator;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

type Slot<T> = Arc<Mutex<Option<T>>>;

/// Handle given to a generator's producer to yield values.
pub struct Co<T> {
    slot: Slot<T>,
}

impl<T> Co<T> {
    /// Hands `value` to the consumer and suspends until the next pull.
    pub fn yield_(&self, value: T) -> Yield<T> {
        Yield {
            slot: self.slot.clone(),
            value: Some(value),
        }
    }
}

impl<T> Clone for Co<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
        }
    }
}

/// Future returned by [`Co::yield_`].
#[must_use = "a yielded value is only delivered when the future is awaited"]
pub struct Yield<T> {
    slot: Slot<T>,
    value: Option<T>,
}

impl<T> Unpin for Yield<T> {}

impl<T> Future for Yield<T> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        // First poll parks the value and suspends; the consumer resumes us
        // explicitly on its next pull, so no waker is registered.
        match self.value.take() {
            Some(value) => {
                *lock(&self.slot) = Some(value);
                Poll::Pending
            }
            None => Poll::Ready(()),
        }
    }
}

type Producer = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A single-pass lazy sequence.
///
/// Movable but not clonable: the producer is owned by exactly one
/// generator. Once it returns `None` it keeps returning `None`.
pub struct Generator<T> {
    slot: Slot<T>,
    producer: Option<Producer>,
}

impl<T: Send + 'static> Generator<T> {
    /// Builds a generator from a producer. The producer does not run until
    /// the first pull.
    pub fn new<F, Fut>(producer: F) -> Self
    where
        F: FnOnce(Co<T>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let slot: Slot<T> = Arc::new(Mutex::new(None));
        let co = Co { slot: slot.clone() };

        Self {
            slot,
            producer: Some(Box::pin(producer(co))),
        }
    }

    /// Returns `true` once the producer has finished.
    pub fn is_done(&self) -> bool {
        self.producer.is_none()
    }
}

/// Numbers a [`Generator::range`] can count over.
pub trait RangeValue: Copy + PartialOrd + Send + 'static {
    const ZERO: Self;
    const ONE: Self;

    /// Returns `self + step`, or `None` when the sum leaves the type's range.
    fn checked_step(self, step: Self) -> Option<Self>;
}

macro_rules! integer_range_value {
    ($($ty:ty),*) => {
        $(
            impl RangeValue for $ty {
                const ZERO: Self = 0;
                const ONE: Self = 1;

                fn checked_step(self, step: Self) -> Option<Self> {
                    self.checked_add(step)
                }
            }
        )*
    };
}

integer_range_value!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);

macro_rules! float_range_value {
    ($($ty:ty),*) => {
        $(
            impl RangeValue for $ty {
                const ZERO: Self = 0.0;
                const ONE: Self = 1.0;

                fn checked_step(self, step: Self) -> Option<Self> {
                    let next = self + step;
                    next.is_finite().then_some(next)
                }
            }
        )*
    };
}

float_range_value!(f32, f64);

impl<T: RangeValue> Generator<T> {
    /// Yields `start, start + 1, ..` up to but excluding `end`.
    pub fn range(start: T, end: T) -> Self {
        Self::range_step(start, end, T::ONE)
    }

    /// Yields `start, start + step, ..` while below `end`. A step that is
    /// not positive yields nothing. The sequence also ends when the next
    /// value would overflow `T`.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let tens: Vec<u8> = Generator::range_step(0u8, 255, 10).collect();
    /// assert_eq!(tens.last(), Some(&250));
    /// ```
    pub fn range_step(start: T, end: T, step: T) -> Self {
        Self::new(move |co| async move {
            if step <= T::ZERO {
                return;
            }
            let mut current = start;
            while current < end {
                co.yield_(current).await;
                match current.checked_step(step) {
                    Some(next) => current = next,
                    None => break,
                }
            }
        })
    }
}

impl<T> Iterator for Generator<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let producer = self.producer.as_mut()?;
        let (signal, waker) = ThreadWaker::current();
        let mut cx = Context::from_waker(&waker);

        let panicked = loop {
            match panic::catch_unwind(AssertUnwindSafe(|| producer.as_mut().poll(&mut cx))) {
                Ok(Poll::Ready(())) => break None,
                Ok(Poll::Pending) => {
                    if let Some(value) = lock(&self.slot).take() {
                        return Some(value);
                    }
                    // Suspended on something other than a yield.
                    signal.wait();
                }
                Err(payload) => break Some(payload),
            }
        };

        self.producer = None;
        if let Some(payload) = panicked {
            panic::resume_unwind(payload);
        }
        None
    }
}

impl<T> FusedIterator for Generator<T> {}

impl<T> fmt::Debug for Generator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Generator")
            .field("done", &self.producer.is_none())
            .finish()
    }
}
