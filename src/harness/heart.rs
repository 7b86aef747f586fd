//! Structures to keep the process alive until some event occurs

use futures::{
    channel::mpsc::{channel, Receiver, Sender},
    future::{self, BoxFuture},
    prelude::*,
};
use std::fmt;
use tokio::signal::{
    ctrl_c,
    unix::{signal, Signal, SignalKind},
};
use tracing::{debug, error};

/// Reason why the heart stopped beating
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeathReason {
    /// Internal kill signal has been sent
    Killed(String),
    /// SIGTERM, SIGINT or other process-external cause
    Terminated,
}

impl fmt::Display for DeathReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeathReason::Killed(reason) => write!(f, "Killed ({})", reason),
            DeathReason::Terminated => write!(f, "Terminated due to external signal"),
        }
    }
}

/// Lifecycle management struct that can be used to keep the application alive
///
/// The heart dies when the process receives SIGTERM or SIGINT, or when the linked [`HeartStone`] is used to kill it.
pub struct Heart {
    rx: Receiver<String>,
    sigterm: Option<Signal>,
}

impl Heart {
    /// Creates a new heart and linked stone
    ///
    /// Signal handlers are installed right away so that a termination request arriving before
    /// [`death`](Heart::death) is polled is not lost. Must be called within a tokio runtime.
    pub fn new() -> (Self, HeartStone) {
        let (tx, rx) = channel(2);

        let sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => Some(sigterm),
            Err(e) => {
                error!(error = %e, "Unable to install SIGTERM handler");
                None
            }
        };

        (Self { rx, sigterm }, HeartStone { remote: tx })
    }

    /// Future that waits until the heart dies for the returned reason
    pub fn death(self) -> BoxFuture<'static, DeathReason> {
        let Heart { mut rx, sigterm } = self;

        async move {
            debug!("Heart starts beating");

            let kill = async move {
                match rx.next().await {
                    Some(reason) => DeathReason::Killed(reason),
                    // All stones have been dropped, nobody can kill us anymore
                    None => future::pending().await,
                }
            };

            let sigterm = async move {
                match sigterm {
                    Some(mut sigterm) => {
                        sigterm.recv().await;
                    }
                    None => future::pending::<()>().await,
                }
            };

            let interrupt = async {
                if let Err(e) = ctrl_c().await {
                    error!(error = %e, "Unable to listen for SIGINT");
                    future::pending::<()>().await;
                }
            };

            tokio::select! {
                reason = kill => reason,
                _ = sigterm => DeathReason::Terminated,
                _ = interrupt => DeathReason::Terminated,
            }
        }
        .boxed()
    }
}

/// Remote controller for the heart
#[derive(Clone)]
pub struct HeartStone {
    remote: Sender<String>,
}

impl HeartStone {
    /// Kill the associated heart
    pub async fn kill(&mut self, reason: String) {
        if let Err(e) = self.remote.send(reason).await {
            error!(error = %e, "Failed to interact with Heart");
        }
    }
}
