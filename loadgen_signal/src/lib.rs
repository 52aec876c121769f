//! Module to signal phase changes in loadgen.
//!
//! A load run has one phase change that matters to every virtual user: the
//! moment the run is over, whether because the configured duration elapsed or
//! the operator pressed ctrl-c. This crate provides the mechanism to
//! communicate that change.
//!
//! The mechanism has two components, a `Broadcaster` and a `Watcher`. The
//! `Broadcaster` signals every `Watcher` that the phase has been reached. This
//! is a one-time event. There is only one `Broadcaster` and potentially many
//! `Watcher` instances, one per virtual user plus whatever else wants to know.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![deny(clippy::dbg_macro)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]
#![deny(missing_debug_implementations)]

use tokio::sync::watch;
use tracing::info;

/// Construct a `Watcher` and `Broadcaster` pair.
#[must_use]
pub fn signal() -> (Watcher, Broadcaster) {
    // NOTE a watch channel is used here rather than a broadcast channel as
    // every peer only ever cares about the latest value, and the sender can
    // learn when the last receiver has gone away through `closed`.
    let (sender, receiver) = watch::channel(false);

    (Watcher { receiver }, Broadcaster { sender })
}

#[derive(Debug)]
/// Mechanism to notify one or more `Watcher` instances that a phase has been
/// achieved.
pub struct Broadcaster {
    sender: watch::Sender<bool>,
}

impl Broadcaster {
    /// Send the signal through any `Watcher` instances.
    ///
    /// Function will NOT block until all peers have ack'ed the signal.
    pub fn signal(self) {
        self.sender.send_replace(true);
    }

    /// Send the signal through to any `Watcher` instances.
    ///
    /// Function WILL block until every `Watcher` has been dropped, clones
    /// included.
    pub async fn signal_and_wait(self) {
        self.sender.send_replace(true);

        let peers = self.sender.receiver_count();
        if peers > 0 {
            info!("Waiting for {peers} peers");
        }
        self.sender.closed().await;
    }
}

#[derive(Debug, Clone)]
/// Mechanism to watch for phase changes, typically used to control shutdown.
///
/// Every live `Watcher`, clones included, is a peer that
/// `Broadcaster::signal_and_wait` waits on.
pub struct Watcher {
    receiver: watch::Receiver<bool>,
}

impl Watcher {
    /// Check if the signal has been sent without blocking. Dropping the
    /// `Broadcaster` without signaling counts as the signal.
    #[must_use]
    pub fn try_recv(&self) -> bool {
        *self.receiver.borrow() || self.receiver.has_changed().is_err()
    }
}
