//! The virtual user runner.
//!
//! The runner hosts a population of [`Driver`] instances, one tokio task per
//! virtual user, and stops them when their budget runs out or the shutdown
//! signal arrives. Users share nothing through the runner. A user is never
//! interrupted mid-iteration: the budget and the shutdown signal are checked
//! between iterations only.
//!
//! ## Metrics
//!
//! `virtual_users`: Number of virtual users running
//! `iterations`: Iterations started
//! `iteration_failure`: Iterations that returned an error
//!

use std::{error::Error as StdError, num::NonZeroU32, time::Duration};

use async_trait::async_trait;
use metrics::{counter, gauge};
use tokio::{task::JoinSet, time::Instant};
use tracing::{Instrument, debug, info, info_span, warn};

type BoxError = Box<dyn StdError + Send + Sync>;

#[async_trait]
/// The loop body of one virtual user.
///
/// The runner calls `start` once, then `run_iteration` until the budget is
/// spent or shutdown is signaled, then `stop` once.
pub trait Driver: Send {
    /// Error produced by a failed iteration
    type Error: StdError + Send + Sync + 'static;

    /// Prepare to run.
    async fn start(&mut self) -> Result<(), Self::Error>;

    /// Run one iteration to completion.
    async fn run_iteration(&mut self) -> Result<(), Self::Error>;

    /// Stop. No further iterations will be requested.
    async fn stop(&mut self);
}

/// Errors produced by [`Runner`].
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A virtual user task panicked or was cancelled.
    #[error("Could not join virtual user task: {0}")]
    Join(#[from] tokio::task::JoinError),
    /// A virtual user could not start.
    #[error("Virtual user {user} failed to start: {source}")]
    Start {
        /// Index of the user
        user: u32,
        /// Underlying driver error
        #[source]
        source: BoxError,
    },
    /// An iteration failed under an iteration budget.
    #[error("Virtual user {user} failed an iteration: {source}")]
    Iteration {
        /// Index of the user
        user: u32,
        /// Underlying driver error
        #[source]
        source: BoxError,
    },
}

/// How long each virtual user runs for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Budget {
    /// Start iterations until this much time has passed since the run began.
    Duration(Duration),
    /// Run exactly this many iterations per user. The first failed iteration
    /// fails the run.
    Iterations(NonZeroU32),
}

/// Plain counts of what the run did, totalled over every user.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    /// Iterations started
    pub iterations: u64,
    /// Iterations that returned an error
    pub failures: u64,
}

#[derive(Debug)]
struct Report {
    user: u32,
    summary: Summary,
    first_failure: Option<BoxError>,
}

/// The virtual user runner.
#[derive(Debug)]
pub struct Runner {
    users: NonZeroU32,
    budget: Budget,
    shutdown: loadgen_signal::Watcher,
}

impl Runner {
    /// Create a new [`Runner`] for `users` virtual users.
    #[must_use]
    pub fn new(users: NonZeroU32, budget: Budget, shutdown: loadgen_signal::Watcher) -> Self {
        Self {
            users,
            budget,
            shutdown,
        }
    }

    /// Run every virtual user to completion. `factory` is called once per
    /// user with the user's index.
    ///
    /// # Errors
    ///
    /// Function will return an error if any user fails to start, any user
    /// task panics or, under [`Budget::Iterations`], any iteration fails.
    pub async fn run<D, F>(self, mut factory: F) -> Result<Summary, Error>
    where
        D: Driver + 'static,
        F: FnMut(u32) -> D,
    {
        let deadline = match self.budget {
            Budget::Duration(duration) => Instant::now().checked_add(duration),
            Budget::Iterations(_) => None,
        };

        let mut users = JoinSet::new();
        for user in 0..self.users.get() {
            let driver = factory(user);
            let shutdown = self.shutdown.clone();
            users.spawn(
                drive(user, driver, self.budget, deadline, shutdown)
                    .instrument(info_span!("virtual_user", user)),
            );
        }
        drop(self.shutdown);
        gauge!("virtual_users").set(f64::from(self.users.get()));
        info!("{users} virtual users started", users = self.users);

        let mut summary = Summary::default();
        let mut first_failure: Option<(u32, BoxError)> = None;
        let mut result = Ok(());
        while let Some(joined) = users.join_next().await {
            match joined {
                Ok(Ok(report)) => {
                    summary.iterations += report.summary.iterations;
                    summary.failures += report.summary.failures;
                    if first_failure.is_none() {
                        first_failure = report.first_failure.map(|err| (report.user, err));
                    }
                }
                Ok(Err(err)) => {
                    if result.is_ok() {
                        result = Err(err);
                    }
                }
                Err(err) => {
                    if result.is_ok() {
                        result = Err(Error::Join(err));
                    }
                }
            }
            gauge!("virtual_users").set(f64::from(u32::try_from(users.len()).unwrap_or(u32::MAX)));
        }
        result?;

        if let (Budget::Iterations(_), Some((user, source))) = (self.budget, first_failure) {
            return Err(Error::Iteration { user, source });
        }
        Ok(summary)
    }
}

async fn drive<D>(
    user: u32,
    mut driver: D,
    budget: Budget,
    deadline: Option<Instant>,
    shutdown: loadgen_signal::Watcher,
) -> Result<Report, Error>
where
    D: Driver,
{
    driver.start().await.map_err(|err| Error::Start {
        user,
        source: Box::new(err),
    })?;

    let mut report = Report {
        user,
        summary: Summary::default(),
        first_failure: None,
    };
    loop {
        if shutdown.try_recv() {
            debug!("shutdown signal received");
            break;
        }
        let spent = match budget {
            Budget::Iterations(limit) => report.summary.iterations >= u64::from(limit.get()),
            Budget::Duration(_) => deadline.is_some_and(|deadline| Instant::now() >= deadline),
        };
        if spent {
            break;
        }

        report.summary.iterations += 1;
        counter!("iterations").increment(1);
        if let Err(err) = driver.run_iteration().await {
            report.summary.failures += 1;
            counter!("iteration_failure").increment(1);
            warn!("iteration failed: {err}");
            if report.first_failure.is_none() {
                report.first_failure = Some(Box::new(err));
            }
        }
    }

    driver.stop().await;
    drop(shutdown);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::{
        num::NonZeroU32,
        sync::{
            Arc,
            atomic::{AtomicU32, Ordering},
        },
        time::Duration,
    };

    use async_trait::async_trait;

    use super::{Budget, Driver, Error, Runner, Summary};

    #[derive(thiserror::Error, Debug)]
    #[error("iteration {0} failed")]
    struct Failed(u32);

    #[derive(Debug)]
    struct Counting {
        iterations: u32,
        fail_on: Option<u32>,
        started: Arc<AtomicU32>,
        stopped: Arc<AtomicU32>,
        pause: Duration,
    }

    impl Counting {
        fn new(started: &Arc<AtomicU32>, stopped: &Arc<AtomicU32>) -> Self {
            Self {
                iterations: 0,
                fail_on: None,
                started: Arc::clone(started),
                stopped: Arc::clone(stopped),
                pause: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl Driver for Counting {
        type Error = Failed;

        async fn start(&mut self) -> Result<(), Failed> {
            self.started.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn run_iteration(&mut self) -> Result<(), Failed> {
            let iteration = self.iterations;
            self.iterations += 1;
            if !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }
            if self.fail_on == Some(iteration) {
                return Err(Failed(iteration));
            }
            Ok(())
        }

        async fn stop(&mut self) {
            self.stopped.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn nz(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).unwrap()
    }

    #[tokio::test]
    async fn iteration_budget_is_exact() {
        let started = Arc::new(AtomicU32::new(0));
        let stopped = Arc::new(AtomicU32::new(0));
        let (watcher, _broadcaster) = loadgen_signal::signal();

        let summary = Runner::new(nz(4), Budget::Iterations(nz(3)), watcher)
            .run(|_| Counting::new(&started, &stopped))
            .await
            .unwrap();

        assert_eq!(
            summary,
            Summary {
                iterations: 12,
                failures: 0
            }
        );
        assert_eq!(started.load(Ordering::SeqCst), 4);
        assert_eq!(stopped.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn iteration_budget_reports_failure() {
        let started = Arc::new(AtomicU32::new(0));
        let stopped = Arc::new(AtomicU32::new(0));
        let (watcher, _broadcaster) = loadgen_signal::signal();

        let result = Runner::new(nz(1), Budget::Iterations(nz(1)), watcher)
            .run(|_| Counting {
                fail_on: Some(0),
                ..Counting::new(&started, &stopped)
            })
            .await;

        match result {
            Err(Error::Iteration { user, source }) => {
                assert_eq!(user, 0);
                assert_eq!(source.to_string(), "iteration 0 failed");
            }
            other => panic!("unexpected result {other:?}"),
        }
        assert_eq!(stopped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn duration_budget_counts_failures_and_continues() {
        let started = Arc::new(AtomicU32::new(0));
        let stopped = Arc::new(AtomicU32::new(0));
        let (watcher, _broadcaster) = loadgen_signal::signal();

        let summary = Runner::new(nz(2), Budget::Duration(Duration::from_millis(100)), watcher)
            .run(|_| Counting {
                fail_on: Some(1),
                pause: Duration::from_millis(5),
                ..Counting::new(&started, &stopped)
            })
            .await
            .unwrap();

        assert!(summary.iterations > 2, "{summary:?}");
        assert_eq!(summary.failures, 2);
        assert_eq!(stopped.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn shutdown_stops_users_between_iterations() {
        let started = Arc::new(AtomicU32::new(0));
        let stopped = Arc::new(AtomicU32::new(0));
        let (watcher, broadcaster) = loadgen_signal::signal();

        let runner = Runner::new(nz(3), Budget::Duration(Duration::MAX), watcher);
        let run = tokio::spawn({
            let started = Arc::clone(&started);
            let stopped = Arc::clone(&stopped);
            async move {
                runner
                    .run(move |_| Counting {
                        pause: Duration::from_millis(5),
                        ..Counting::new(&started, &stopped)
                    })
                    .await
            }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        tokio::time::timeout(Duration::from_secs(5), broadcaster.signal_and_wait())
            .await
            .expect("virtual users did not stop");

        let summary = run.await.unwrap().unwrap();
        assert!(summary.iterations > 0);
        assert_eq!(stopped.load(Ordering::SeqCst), 3);
    }
}
