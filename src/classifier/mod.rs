//! Classifier port: label and confidence for message text.
//!
//! Every implementation is fail-closed: when the model is missing or
//! inference fails, `predict` answers `false` and `confidence` answers `0.0`.

pub mod model;

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};

use crate::config::ClassifierConfig;

pub use model::{ModelClassifier, TextModel, Tokenizer};

/// Confidence a positive label must strictly exceed before anything is
/// acted upon.
pub const CONFIDENCE_THRESHOLD: f64 = 0.85;

/// Narrow capability interface toward the trained model.
pub trait Classifier: Send + Sync {
    /// Is this a legitimate giveaway?
    fn predict(&self, text: &str) -> bool;

    /// Model score in `[0, 1]`.
    fn confidence(&self, text: &str) -> f64;

    /// `predict` applied to each text, same order and length.
    fn predict_batch(&self, texts: &[String]) -> Vec<bool> {
        texts.iter().map(|text| self.predict(text)).collect()
    }

    /// Whether a model is actually loaded.
    fn is_available(&self) -> bool {
        true
    }
}

/// Label and confidence for one message.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub label: bool,
    /// Always within `[0, 1]`.
    pub confidence: f64,
}

impl ClassificationResult {
    /// Build a result, clamping `confidence` into `[0, 1]` (NaN becomes 0).
    pub fn new(label: bool, confidence: f64) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self { label, confidence }
    }

    /// Run both port calls for `text`.
    pub fn classify(classifier: &dyn Classifier, text: &str) -> Self {
        Self::new(classifier.predict(text), classifier.confidence(text))
    }

    /// The action gate: positive label and confidence strictly above
    /// [`CONFIDENCE_THRESHOLD`].
    pub fn passes_gate(&self) -> bool {
        self.label && self.confidence > CONFIDENCE_THRESHOLD
    }
}

/// Stand-in used when no model could be loaded.
#[derive(Debug, Default, Clone, Copy)]
pub struct InertClassifier;

impl Classifier for InertClassifier {
    fn predict(&self, _text: &str) -> bool {
        false
    }

    fn confidence(&self, _text: &str) -> f64 {
        0.0
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// Load the configured model, degrading to [`InertClassifier`] when the
/// artifacts cannot be loaded.
pub fn load_classifier(config: &ClassifierConfig) -> Arc<dyn Classifier> {
    match ModelClassifier::load(&config.model_path, &config.tokenizer_path) {
        Ok(classifier) => {
            info!(
                model = %config.model_path.display(),
                vocabulary = classifier.model().vocabulary_size(),
                "Classifier model loaded"
            );
            Arc::new(classifier)
        }
        Err(e) => {
            error!(error = %e, "Classifier unavailable, every message will be skipped");
            Arc::new(InertClassifier)
        }
    }
}
