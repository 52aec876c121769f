//! The pause primitive used by virtual users.
//!
//! Virtual users suspend in exactly two places, network calls and pauses. All
//! pauses go through [`Clock`] so tests can run the shopping loop without
//! waiting in real time.

use std::time::Duration;

use async_trait::async_trait;

#[async_trait]
/// The `Clock` used for every pause
pub trait Clock: Send + Sync {
    /// Suspend the caller for `duration`.
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
/// A clock that operates with respect to real-clock time.
pub struct RealClock;

#[async_trait]
impl Clock for RealClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
pub(crate) mod test {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use async_trait::async_trait;

    use super::Clock;

    /// Records requested pauses and returns immediately.
    #[derive(Debug, Clone, Default)]
    pub(crate) struct RecordingClock {
        pauses: Arc<Mutex<Vec<Duration>>>,
    }

    impl RecordingClock {
        pub(crate) fn pauses(&self) -> Vec<Duration> {
            self.pauses.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Clock for RecordingClock {
        async fn sleep(&self, duration: Duration) {
            self.pauses.lock().unwrap().push(duration);
        }
    }
}
