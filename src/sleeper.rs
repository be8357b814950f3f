//! Clock collaborator used for per-attempt deadlines and retry delays.
//!
//! Dropping the returned future cancels the wait.

use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

pub type SleepFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Suspends the calling task for a duration.
pub trait Sleeper: Send + Sync + std::fmt::Debug {
    fn sleep(&self, duration: Duration) -> SleepFuture;
}

impl<S: Sleeper + ?Sized> Sleeper for Arc<S> {
    fn sleep(&self, duration: Duration) -> SleepFuture {
        (**self).sleep(duration)
    }
}

/// Sleeps on the tokio timer.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> SleepFuture {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Completes immediately.
#[derive(Clone, Copy, Debug, Default)]
pub struct InstantSleeper;

impl Sleeper for InstantSleeper {
    fn sleep(&self, _duration: Duration) -> SleepFuture {
        Box::pin(std::future::ready(()))
    }
}

/// Records every requested duration and completes immediately.
#[derive(Clone, Debug, Default)]
pub struct TrackingSleeper {
    calls: Arc<Mutex<Vec<Duration>>>,
}

impl TrackingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Duration> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of recorded waits equal to `duration`.
    pub fn count(&self, duration: Duration) -> usize {
        self.calls().into_iter().filter(|d| *d == duration).count()
    }
}

impl Sleeper for TrackingSleeper {
    fn sleep(&self, duration: Duration) -> SleepFuture {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration);
        Box::pin(std::future::ready(()))
    }
}
