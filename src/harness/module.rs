use super::{DeathReason, Heart};
use crate::library::{BoxedError, EmptyResult};
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::any::type_name;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument};

/// Future resolving once the process has been asked to shut down
///
/// It can be cloned freely and polled from multiple places at once.
pub type ShutdownSignal = Shared<BoxFuture<'static, DeathReason>>;

/// Executable module
#[async_trait]
pub trait Module {
    /// Executed before running the core loop
    async fn pre_startup(&mut self) -> EmptyResult {
        Ok(())
    }

    /// Core run loop of the module
    ///
    /// Implementations are expected to wind down and return once the `shutdown` future resolves.
    async fn run(&mut self, shutdown: ShutdownSignal) -> EmptyResult;

    /// Shutdown hook executed after the core loop has terminated
    #[instrument(skip(self))]
    async fn post_shutdown(&mut self, termination_reason: &ModuleTerminationReason) {
        match termination_reason {
            ModuleTerminationReason::HeartDied(_) | ModuleTerminationReason::ExitedNormally => {
                info!("Module exited normally")
            }
            _ => error!("Module terminated with an error"),
        }
    }
}

/// Reason why a module has terminated
#[derive(Error, Debug)]
pub enum ModuleTerminationReason {
    /// Startup routine threw an error
    #[error("startup routine threw an error")]
    StartupFailed(#[source] BoxedError),
    /// Core run loop threw an error
    #[error("error during operation")]
    OperationalError(#[source] BoxedError),
    /// Shutdown was requested and the run loop wound down
    #[error("heart died: {0}")]
    HeartDied(DeathReason),
    /// Run loop exited cleanly on its own
    #[error("run loop exited cleanly")]
    ExitedNormally,
    /// Timeout during startup
    #[error("timeout during startup")]
    Timeout,
}

impl ModuleTerminationReason {
    /// Whether the process should report a failure to its supervisor
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            ModuleTerminationReason::StartupFailed(_)
                | ModuleTerminationReason::OperationalError(_)
                | ModuleTerminationReason::Timeout
        )
    }
}

/// Runner for [`Module`] implementations
pub struct ModuleRunner {
    startup_timeout: Duration,
    shutdown_timeout: Duration,
}

impl Default for ModuleRunner {
    fn default() -> Self {
        Self {
            startup_timeout: Duration::from_secs(60),
            shutdown_timeout: Duration::from_secs(60),
        }
    }
}

impl ModuleRunner {
    /// Executes a [`Module`] until it exits by calling the corresponding lifecycle functions in order
    /// and returns the reason why it terminated.
    #[instrument(skip(self, module, heart), fields(module_name = type_name::<M>()))]
    pub async fn run<M: Module + Send + Sync>(
        &self,
        mut module: M,
        heart: Heart,
    ) -> ModuleTerminationReason {
        let shutdown: ShutdownSignal = heart.death().shared();

        info!("Commencing module startup sequence");
        let startup = tokio::select! {
            biased;

            startup = timeout(self.startup_timeout, module.pre_startup()) => startup,
            reason = shutdown.clone() => {
                info!(%reason, "Shutdown requested during startup");
                return ModuleTerminationReason::HeartDied(reason);
            }
        };

        let termination_reason = match startup {
            Ok(Ok(_)) => self.run_loop(&mut module, shutdown).await,
            Ok(Err(error)) => {
                error!(%error, "Module startup sequence encountered an error");
                ModuleTerminationReason::StartupFailed(error)
            }
            Err(_) => {
                error!("Module startup sequence timed out");
                ModuleTerminationReason::Timeout
            }
        };

        info!("Commencing module shutdown sequence");
        let result = timeout(
            self.shutdown_timeout,
            module.post_shutdown(&termination_reason),
        )
        .await;

        if result.is_err() {
            error!("Module shutdown sequence timed out");
        }

        termination_reason
    }

    #[instrument(skip(self, module, shutdown))]
    async fn run_loop<M: Module + Send + Sync>(
        &self,
        module: &mut M,
        shutdown: ShutdownSignal,
    ) -> ModuleTerminationReason {
        info!("Executing module run procedure");

        match module.run(shutdown.clone()).await {
            Ok(()) => match shutdown.peek() {
                Some(reason) => {
                    info!(%reason, "Module run procedure wound down after shutdown request");
                    ModuleTerminationReason::HeartDied(reason.clone())
                }
                None => {
                    debug!("Module run procedure completed successfully");
                    ModuleTerminationReason::ExitedNormally
                }
            },
            Err(error) => {
                error!(%error, "Module run procedure encountered an error");
                ModuleTerminationReason::OperationalError(error)
            }
        }
    }
}
