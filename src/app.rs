//! Application shell: wires the ports, runs the selected mode and releases
//! the browser on the way out.

use std::future::Future;
use std::sync::Arc;

use tracing::{error, info};

use crate::automation::{FormActor, build_form_actor};
use crate::channels::{EmailSource, ImapEmailSource};
use crate::classifier::{Classifier, load_classifier};
use crate::cli::Mode;
use crate::config::{AppConfig, PipelineConfig};
use crate::error::Result;
use crate::pipeline::{CycleOutcome, Orchestrator};
use crate::worker::Scheduler;

pub struct App {
    scheduler: Scheduler,
    actor: Arc<dyn FormActor>,
}

impl App {
    /// Build the production ports from configuration. Classifier and browser
    /// failures degrade to their inert forms instead of failing startup.
    pub async fn initialize(config: AppConfig) -> Self {
        let source: Arc<dyn EmailSource> = Arc::new(ImapEmailSource::new(config.email));
        let classifier = load_classifier(&config.classifier);
        let actor = build_form_actor(&config.browser).await;
        Self::from_parts(source, classifier, actor, config.pipeline)
    }

    pub fn from_parts(
        source: Arc<dyn EmailSource>,
        classifier: Arc<dyn Classifier>,
        actor: Arc<dyn FormActor>,
        pipeline: PipelineConfig,
    ) -> Self {
        let orchestrator = Orchestrator::new(source, classifier, Arc::clone(&actor), pipeline);
        Self {
            scheduler: Scheduler::new(Arc::new(orchestrator)),
            actor,
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Run `mode`; `auto` keeps going until Ctrl-C.
    pub async fn run(&self, mode: Mode, interval_secs: u64) -> Result<()> {
        self.run_until(mode, interval_secs, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Could not listen for Ctrl-C, stopping");
                return;
            }
            info!("Shutdown signal received");
        })
        .await
    }

    /// Run `mode`; `auto` keeps going until `shutdown` resolves.
    pub async fn run_until(
        &self,
        mode: Mode,
        interval_secs: u64,
        shutdown: impl Future<Output = ()>,
    ) -> Result<()> {
        match mode {
            Mode::Once => {
                let outcome: CycleOutcome = self.scheduler.run_once().await;
                info!(%outcome, "Single cycle finished");
            }
            Mode::Auto => {
                let job = self.scheduler.start(interval_secs).await?;
                info!(
                    job = %job.id,
                    interval_secs,
                    "Running in auto mode, press Ctrl-C to stop"
                );
                shutdown.await;
                self.scheduler.stop().await;
            }
        }
        Ok(())
    }

    /// Stop scheduling, then release the browser. Safe to call repeatedly.
    pub async fn shutdown(&self) {
        self.scheduler.stop().await;
        self.actor.close().await;
        info!("Shutdown complete");
    }
}
