//! Orchestrator: one fetch, classify, gate, act pass over a batch.
//!
//! Messages are handled strictly in fetch order. A failure on one message
//! (an error or a panic inside the classifier or the form actor) is caught
//! at the message boundary and recorded as `Failed`; the cycle carries on
//! and always returns a [`CycleOutcome`].

use std::sync::Arc;

use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::automation::FormActor;
use crate::channels::{EmailMessage, EmailSource};
use crate::classifier::{ClassificationResult, Classifier};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::pipeline::types::{CycleOutcome, MessageOutcome, MessageReport};

/// Wires the three ports together and runs cycles over them.
pub struct Orchestrator {
    source: Arc<dyn EmailSource>,
    classifier: Arc<dyn Classifier>,
    actor: Arc<dyn FormActor>,
    config: PipelineConfig,
}

impl Orchestrator {
    pub fn new(
        source: Arc<dyn EmailSource>,
        classifier: Arc<dyn Classifier>,
        actor: Arc<dyn FormActor>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            source,
            classifier,
            actor,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one complete cycle. Never fails.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let span = info_span!("cycle", id = %Uuid::new_v4());
        self.cycle().instrument(span).await
    }

    async fn cycle(&self) -> CycleOutcome {
        info!(
            label = %self.config.label,
            unread_only = self.config.unread_only,
            max_results = self.config.max_results,
            "Cycle started"
        );

        let messages = match self.fetch().await {
            Ok(messages) => messages,
            Err(e) => {
                error!(error = %e, "Cycle aborted");
                return CycleOutcome::default();
            }
        };

        let mut outcome = CycleOutcome {
            fetched: messages.len(),
            ..Default::default()
        };
        if messages.is_empty() {
            info!("No messages to process");
        }

        for message in &messages {
            let (result, classification) = match self.process_message(message).await {
                Ok((result, classification)) => (result, Some(classification)),
                Err(e) => {
                    error!(id = %message.id, error = %e, "Message processing failed");
                    (MessageOutcome::Failed, None)
                }
            };

            if result.should_mark_read(self.config.mark_read) {
                if self.source.mark_as_read(&message.id).await {
                    outcome.marked_read += 1;
                } else {
                    warn!(id = %message.id, "Could not mark message as read");
                }
            }

            outcome.record(MessageReport {
                id: message.id.clone(),
                subject: message.subject.clone(),
                outcome: result,
                confidence: classification.map(|c| c.confidence),
            });
        }

        self.send_report(&outcome).await;

        info!(
            fetched = outcome.fetched,
            acted = outcome.acted,
            participated = outcome.participated,
            skipped = outcome.skipped,
            failed = outcome.failed,
            marked_read = outcome.marked_read,
            "Cycle complete"
        );
        outcome
    }

    /// Fetch the batch on its own task so a panicking source ends only the
    /// cycle.
    async fn fetch(&self) -> Result<Vec<EmailMessage>, PipelineError> {
        let source = Arc::clone(&self.source);
        let label = self.config.label.clone();
        let unread_only = self.config.unread_only;
        let max_results = self.config.max_results;

        tokio::spawn(async move { source.fetch(&label, unread_only, max_results).await })
            .await
            .map_err(|e| PipelineError::Fetch(e.to_string()))
    }

    async fn process_message(
        &self,
        message: &EmailMessage,
    ) -> Result<(MessageOutcome, ClassificationResult), PipelineError> {
        let classifier = Arc::clone(&self.classifier);
        let text = message.classification_text();
        let classification = tokio::task::spawn_blocking(move || {
            ClassificationResult::classify(classifier.as_ref(), &text)
        })
        .await
        .map_err(|e| PipelineError::Classification {
            id: message.id.clone(),
            reason: e.to_string(),
        })?;

        debug!(
            id = %message.id,
            label = classification.label,
            confidence = classification.confidence,
            "Classified"
        );

        if !classification.passes_gate() {
            debug!(id = %message.id, "Below gate, skipped");
            return Ok((MessageOutcome::Skipped, classification));
        }

        info!(
            id = %message.id,
            subject = %message.subject,
            confidence = classification.confidence,
            "Giveaway detected, participating"
        );

        let actor = Arc::clone(&self.actor);
        let owned = message.clone();
        let participated = tokio::spawn(async move { actor.participate(&owned).await })
            .await
            .map_err(|e| PipelineError::Action {
                id: message.id.clone(),
                reason: e.to_string(),
            })?;

        if participated {
            info!(id = %message.id, "Participation succeeded");
            Ok((MessageOutcome::Participated, classification))
        } else {
            warn!(id = %message.id, "Participation failed");
            Ok((MessageOutcome::ParticipationFailed, classification))
        }
    }

    async fn send_report(&self, outcome: &CycleOutcome) {
        let Some(to) = self.config.report_to.clone() else {
            return;
        };
        if outcome.acted == 0 {
            return;
        }

        let source = Arc::clone(&self.source);
        let subject = format!("Giveaway agent: {} giveaway(s) entered", outcome.participated);
        let body = outcome.report_text();
        match tokio::spawn(async move { source.send(&to, &subject, &body).await }).await {
            Ok(Some(message_id)) => info!(message_id = %message_id, "Cycle report sent"),
            Ok(None) => warn!("Cycle report could not be sent"),
            Err(e) => error!(error = %e, "Cycle report task failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::classifier::InertClassifier;
    use crate::config::MarkReadPolicy;

    #[derive(Default)]
    struct FakeSource {
        messages: Vec<EmailMessage>,
        fetches: AtomicUsize,
        marked: Mutex<Vec<String>>,
        sent: Mutex<Vec<(String, String, String)>>,
        fetch_args: Mutex<Option<(String, bool, usize)>>,
    }

    #[async_trait]
    impl EmailSource for FakeSource {
        async fn fetch(&self, label: &str, unread_only: bool, max_results: usize) -> Vec<EmailMessage> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            *self.fetch_args.lock().unwrap() = Some((label.to_string(), unread_only, max_results));
            self.messages.clone()
        }

        async fn mark_as_read(&self, id: &str) -> bool {
            self.marked.lock().unwrap().push(id.to_string());
            true
        }

        async fn send(&self, to: &str, subject: &str, body: &str) -> Option<String> {
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), subject.to_string(), body.to_string()));
            Some("<report@example.com>".to_string())
        }
    }

    /// Scores by keyword: "giveaway" → 0.95, "maybe" → 0.85, else 0.1.
    struct KeywordClassifier;

    impl Classifier for KeywordClassifier {
        fn predict(&self, text: &str) -> bool {
            text.contains("giveaway") || text.contains("maybe")
        }

        fn confidence(&self, text: &str) -> f64 {
            if text.contains("giveaway") {
                0.95
            } else if text.contains("maybe") {
                0.85
            } else {
                0.1
            }
        }
    }

    /// Succeeds unless the body mentions "broken".
    #[derive(Default)]
    struct FakeActor {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl FormActor for FakeActor {
        async fn participate(&self, message: &EmailMessage) -> bool {
            self.seen.lock().unwrap().push(message.id.clone());
            !message.body.contains("broken")
        }

        async fn close(&self) {}
    }

    fn message(id: &str, subject: &str, body: &str) -> EmailMessage {
        EmailMessage::new(id, subject, "alice@example.com", body)
    }

    fn orchestrator(
        source: Arc<FakeSource>,
        actor: Arc<FakeActor>,
        config: PipelineConfig,
    ) -> Orchestrator {
        Orchestrator::new(source, Arc::new(KeywordClassifier), actor, config)
    }

    #[tokio::test]
    async fn cycle_gates_and_acts_in_order() {
        let source = Arc::new(FakeSource {
            messages: vec![
                message("m1", "A giveaway", "https://a.example.com"),
                message("m2", "Newsletter", "nothing here"),
                message("m3", "maybe", "https://b.example.com"),
                message("m4", "giveaway", "broken https://c.example.com"),
            ],
            ..Default::default()
        });
        let actor = Arc::new(FakeActor::default());
        let orch = orchestrator(source.clone(), actor.clone(), PipelineConfig::default());

        let outcome = orch.run_cycle().await;

        assert_eq!(outcome.fetched, 4);
        assert_eq!(outcome.acted, 2);
        assert_eq!(outcome.participated, 1);
        assert_eq!(outcome.skipped, 2);
        assert_eq!(outcome.failed, 0);
        let outcomes: Vec<MessageOutcome> = outcome.reports.iter().map(|r| r.outcome).collect();
        assert_eq!(
            outcomes,
            vec![
                MessageOutcome::Participated,
                MessageOutcome::Skipped,
                MessageOutcome::Skipped,
                MessageOutcome::ParticipationFailed,
            ]
        );
        // Exactly 0.85 does not pass the gate.
        assert_eq!(*actor.seen.lock().unwrap(), vec!["m1", "m4"]);
    }

    #[tokio::test]
    async fn fetch_uses_pipeline_settings() {
        let source = Arc::new(FakeSource::default());
        let config = PipelineConfig {
            label: "Prizes".into(),
            unread_only: false,
            max_results: 3,
            ..Default::default()
        };
        let orch = orchestrator(source.clone(), Arc::new(FakeActor::default()), config);

        let outcome = orch.run_cycle().await;

        assert_eq!(outcome, CycleOutcome::default());
        assert_eq!(
            *source.fetch_args.lock().unwrap(),
            Some(("Prizes".to_string(), false, 3))
        );
    }

    #[tokio::test]
    async fn inert_classifier_skips_everything() {
        let source = Arc::new(FakeSource {
            messages: vec![message("m1", "giveaway", "https://a.example.com")],
            ..Default::default()
        });
        let actor = Arc::new(FakeActor::default());
        let orch = Orchestrator::new(
            source,
            Arc::new(InertClassifier),
            actor.clone(),
            PipelineConfig::default(),
        );

        let outcome = orch.run_cycle().await;
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.acted, 0);
        assert!(actor.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn never_policy_marks_nothing() {
        let source = Arc::new(FakeSource {
            messages: vec![message("m1", "giveaway", "x"), message("m2", "other", "y")],
            ..Default::default()
        });
        let orch = orchestrator(source.clone(), Arc::new(FakeActor::default()), PipelineConfig::default());

        let outcome = orch.run_cycle().await;
        assert_eq!(outcome.marked_read, 0);
        assert!(source.marked.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn acted_policy_marks_successful_participations() {
        let source = Arc::new(FakeSource {
            messages: vec![
                message("m1", "giveaway", "https://a.example.com"),
                message("m2", "other", "y"),
                message("m3", "giveaway", "broken"),
            ],
            ..Default::default()
        });
        let config = PipelineConfig {
            mark_read: MarkReadPolicy::Acted,
            ..Default::default()
        };
        let orch = orchestrator(source.clone(), Arc::new(FakeActor::default()), config);

        let outcome = orch.run_cycle().await;
        assert_eq!(outcome.marked_read, 1);
        assert_eq!(*source.marked.lock().unwrap(), vec!["m1"]);
    }

    #[tokio::test]
    async fn processed_policy_marks_every_handled_message() {
        let source = Arc::new(FakeSource {
            messages: vec![message("m1", "giveaway", "https://a"), message("m2", "other", "y")],
            ..Default::default()
        });
        let config = PipelineConfig {
            mark_read: MarkReadPolicy::Processed,
            ..Default::default()
        };
        let orch = orchestrator(source.clone(), Arc::new(FakeActor::default()), config);

        let outcome = orch.run_cycle().await;
        assert_eq!(outcome.marked_read, 2);
        assert_eq!(*source.marked.lock().unwrap(), vec!["m1", "m2"]);
    }

    #[tokio::test]
    async fn report_sent_only_when_something_was_acted_on() {
        let config = PipelineConfig {
            report_to: Some("me@example.com".into()),
            ..Default::default()
        };

        let quiet = Arc::new(FakeSource {
            messages: vec![message("m1", "other", "y")],
            ..Default::default()
        });
        orchestrator(quiet.clone(), Arc::new(FakeActor::default()), config.clone())
            .run_cycle()
            .await;
        assert!(quiet.sent.lock().unwrap().is_empty());

        let busy = Arc::new(FakeSource {
            messages: vec![message("m1", "giveaway", "https://a.example.com")],
            ..Default::default()
        });
        orchestrator(busy.clone(), Arc::new(FakeActor::default()), config)
            .run_cycle()
            .await;
        let sent = busy.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "me@example.com");
        assert!(sent[0].2.contains("[participated] giveaway"));
    }

    #[tokio::test]
    async fn panicking_actor_fails_only_that_message() {
        struct PanickyActor;

        #[async_trait]
        impl FormActor for PanickyActor {
            async fn participate(&self, message: &EmailMessage) -> bool {
                if message.id == "m1" {
                    panic!("page crashed");
                }
                true
            }

            async fn close(&self) {}
        }

        let source = Arc::new(FakeSource {
            messages: vec![message("m1", "giveaway", "a"), message("m2", "giveaway", "b")],
            ..Default::default()
        });
        let orch = Orchestrator::new(
            source,
            Arc::new(KeywordClassifier),
            Arc::new(PanickyActor),
            PipelineConfig::default(),
        );

        let outcome = orch.run_cycle().await;
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.participated, 1);
        assert_eq!(outcome.reports[0].outcome, MessageOutcome::Failed);
        assert_eq!(outcome.reports[0].confidence, None);
    }

    #[tokio::test]
    async fn panicking_fetch_ends_cycle_with_zero_outcome() {
        struct PanickySource;

        #[async_trait]
        impl EmailSource for PanickySource {
            async fn fetch(&self, _: &str, _: bool, _: usize) -> Vec<EmailMessage> {
                panic!("mailbox exploded");
            }
            async fn mark_as_read(&self, _: &str) -> bool {
                false
            }
            async fn send(&self, _: &str, _: &str, _: &str) -> Option<String> {
                None
            }
        }

        let orch = Orchestrator::new(
            Arc::new(PanickySource),
            Arc::new(KeywordClassifier),
            Arc::new(FakeActor::default()),
            PipelineConfig::default(),
        );
        assert_eq!(orch.run_cycle().await, CycleOutcome::default());
    }
}
