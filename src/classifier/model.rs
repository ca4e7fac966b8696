//! Text model loaded from JSON artifacts.
//!
//! Two files, produced by the training side:
//! - tokenizer: `{"word_index": {"free": 1, ...}, "num_words": 5000}`
//! - model: `{"weights": [0.0, 1.2, ...], "bias": -0.4, "max_length": 100}`
//!
//! Text is lowercased, punctuation becomes whitespace, words map through
//! `word_index` (unknown words are dropped) and the last `max_length` ids are
//! kept. Score = sigmoid(bias + sum of the kept ids' weights).

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use crate::classifier::Classifier;
use crate::error::ClassifierError;

/// Characters replaced by whitespace before splitting.
const DEFAULT_FILTERS: &str = "!\"#$%&()*+,-./:;<=>?@[\\]^_`{|}~\t\n";

const DEFAULT_MAX_LENGTH: usize = 100;

const DEFAULT_DECISION_THRESHOLD: f64 = 0.5;

fn default_filters() -> String {
    DEFAULT_FILTERS.to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_length() -> usize {
    DEFAULT_MAX_LENGTH
}

fn default_decision_threshold() -> f64 {
    DEFAULT_DECISION_THRESHOLD
}

/// Word → id mapping.
#[derive(Debug, Clone, Deserialize)]
pub struct Tokenizer {
    pub word_index: HashMap<String, usize>,
    /// Only ids below this are kept.
    #[serde(default)]
    pub num_words: Option<usize>,
    #[serde(default = "default_true")]
    pub lower: bool,
    #[serde(default = "default_filters")]
    pub filters: String,
}

impl Tokenizer {
    pub fn new(word_index: HashMap<String, usize>) -> Self {
        Self {
            word_index,
            num_words: None,
            lower: true,
            filters: default_filters(),
        }
    }

    /// Map text to known word ids, in text order.
    pub fn texts_to_sequence(&self, text: &str) -> Vec<usize> {
        let text = if self.lower {
            text.to_lowercase()
        } else {
            text.to_string()
        };
        let cleaned: String = text
            .chars()
            .map(|c| if self.filters.contains(c) { ' ' } else { c })
            .collect();

        cleaned
            .split_whitespace()
            .filter_map(|word| self.word_index.get(word).copied())
            .filter(|&id| self.num_words.is_none_or(|limit| id < limit))
            .collect()
    }
}

/// Linear token model with a sigmoid output.
#[derive(Debug, Clone, Deserialize)]
pub struct TextModel {
    /// Weight per token id; id 0 is padding.
    pub weights: Vec<f64>,
    pub bias: f64,
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    /// Score above which the label is positive.
    #[serde(default = "default_decision_threshold")]
    pub decision_threshold: f64,
}

impl TextModel {
    pub fn vocabulary_size(&self) -> usize {
        self.weights.len()
    }

    /// Score a token sequence, keeping its last `max_length` ids.
    pub fn score(&self, sequence: &[usize]) -> Result<f64, ClassifierError> {
        let start = sequence.len().saturating_sub(self.max_length);
        let mut logit = self.bias;
        for &id in &sequence[start..] {
            let weight = self.weights.get(id).ok_or_else(|| {
                ClassifierError::Inference(format!(
                    "token id {id} outside weight table of {}",
                    self.weights.len()
                ))
            })?;
            logit += weight;
        }

        let score = 1.0 / (1.0 + (-logit).exp());
        if score.is_finite() {
            Ok(score)
        } else {
            Err(ClassifierError::Inference(format!(
                "non-finite score from logit {logit}"
            )))
        }
    }

    fn validate(&self) -> Result<(), ClassifierError> {
        if self.weights.is_empty() {
            return Err(ClassifierError::InvalidModel("empty weight table".into()));
        }
        if self.max_length == 0 {
            return Err(ClassifierError::InvalidModel("max_length must be > 0".into()));
        }
        if !self.bias.is_finite() || self.weights.iter().any(|w| !w.is_finite()) {
            return Err(ClassifierError::InvalidModel("non-finite parameters".into()));
        }
        Ok(())
    }
}

/// Classifier backed by a loaded [`TextModel`] and [`Tokenizer`].
#[derive(Debug, Clone)]
pub struct ModelClassifier {
    model: TextModel,
    tokenizer: Tokenizer,
}

impl ModelClassifier {
    pub fn new(model: TextModel, tokenizer: Tokenizer) -> Result<Self, ClassifierError> {
        model.validate()?;
        Ok(Self { model, tokenizer })
    }

    /// Load both artifacts from disk.
    pub fn load(model_path: &Path, tokenizer_path: &Path) -> Result<Self, ClassifierError> {
        let model: TextModel = read_json("model", model_path)?;
        let tokenizer: Tokenizer = read_json("tokenizer", tokenizer_path)?;
        Self::new(model, tokenizer)
    }

    pub fn model(&self) -> &TextModel {
        &self.model
    }

    /// Raw score for `text`.
    pub fn score(&self, text: &str) -> Result<f64, ClassifierError> {
        let sequence = self.tokenizer.texts_to_sequence(text);
        self.model.score(&sequence)
    }
}

impl Classifier for ModelClassifier {
    fn predict(&self, text: &str) -> bool {
        match self.score(text) {
            Ok(score) => score > self.model.decision_threshold,
            Err(e) => {
                warn!(error = %e, "Prediction failed");
                false
            }
        }
    }

    fn confidence(&self, text: &str) -> f64 {
        match self.score(text) {
            Ok(score) => score.clamp(0.0, 1.0),
            Err(e) => {
                warn!(error = %e, "Confidence scoring failed");
                0.0
            }
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(
    artifact: &str,
    path: &Path,
) -> Result<T, ClassifierError> {
    let load_failed = |reason: String| ClassifierError::LoadFailed {
        artifact: artifact.to_string(),
        path: path.display().to_string(),
        reason,
    };
    let content = std::fs::read_to_string(path).map_err(|e| load_failed(e.to_string()))?;
    serde_json::from_str(&content).map_err(|e| load_failed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenizer() -> Tokenizer {
        let words = [("free", 1), ("giveaway", 2), ("win", 3), ("scam", 4)];
        Tokenizer::new(words.iter().map(|(w, i)| (w.to_string(), *i)).collect())
    }

    fn model() -> TextModel {
        TextModel {
            weights: vec![0.0, 1.0, 2.0, 1.5, -6.0],
            bias: -1.0,
            max_length: 100,
            decision_threshold: 0.5,
        }
    }

    fn sigmoid(x: f64) -> f64 {
        1.0 / (1.0 + (-x).exp())
    }

    #[test]
    fn tokenizer_lowercases_and_strips_punctuation() {
        let seq = tokenizer().texts_to_sequence("FREE Giveaway!!! Win, win.");
        assert_eq!(seq, vec![1, 2, 3, 3]);
    }

    #[test]
    fn tokenizer_drops_unknown_words() {
        assert_eq!(tokenizer().texts_to_sequence("hello world"), Vec::<usize>::new());
    }

    #[test]
    fn tokenizer_respects_num_words() {
        let mut tok = tokenizer();
        tok.num_words = Some(3);
        assert_eq!(tok.texts_to_sequence("free giveaway win scam"), vec![1, 2]);
    }

    #[test]
    fn score_is_sigmoid_of_weighted_sum() {
        let score = model().score(&[1, 2]).unwrap();
        assert!((score - sigmoid(2.0)).abs() < 1e-12);
    }

    #[test]
    fn empty_sequence_scores_bias() {
        let score = model().score(&[]).unwrap();
        assert!((score - sigmoid(-1.0)).abs() < 1e-12);
    }

    #[test]
    fn sequence_keeps_last_max_length_ids() {
        let mut m = model();
        m.max_length = 2;
        // Leading "scam" is truncated away.
        let score = m.score(&[4, 2, 3]).unwrap();
        assert!((score - sigmoid(-1.0 + 2.0 + 1.5)).abs() < 1e-12);
    }

    #[test]
    fn out_of_range_id_is_inference_error() {
        assert!(matches!(
            model().score(&[99]),
            Err(ClassifierError::Inference(_))
        ));
    }

    #[test]
    fn model_classifier_predicts_and_scores() {
        let classifier = ModelClassifier::new(model(), tokenizer()).unwrap();
        assert!(classifier.predict("Free giveaway, win now"));
        assert!(classifier.confidence("Free giveaway, win now") > 0.9);
        assert!(!classifier.predict("scam giveaway"));
        assert!(classifier.confidence("scam") < 0.01);
    }

    #[test]
    fn model_classifier_fails_closed_on_bad_vocabulary() {
        let mut tok = tokenizer();
        tok.word_index.insert("broken".into(), 500);
        let classifier = ModelClassifier::new(model(), tok).unwrap();
        assert!(!classifier.predict("broken"));
        assert_eq!(classifier.confidence("broken"), 0.0);
    }

    #[test]
    fn rejects_empty_model() {
        let m = TextModel {
            weights: vec![],
            bias: 0.0,
            max_length: 100,
            decision_threshold: 0.5,
        };
        assert!(matches!(
            ModelClassifier::new(m, tokenizer()),
            Err(ClassifierError::InvalidModel(_))
        ));
    }

    #[test]
    fn load_reads_json_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let model_path = dir.path().join("model.json");
        let tokenizer_path = dir.path().join("tokenizer.json");
        std::fs::write(&model_path, r#"{"weights": [0.0, 3.0], "bias": 0.0}"#).unwrap();
        std::fs::write(&tokenizer_path, r#"{"word_index": {"prize": 1}}"#).unwrap();

        let classifier = ModelClassifier::load(&model_path, &tokenizer_path).unwrap();
        assert_eq!(classifier.model().max_length, 100);
        assert!(classifier.predict("Claim your PRIZE"));
        assert!((classifier.confidence("prize") - sigmoid(3.0)).abs() < 1e-12);
    }

    #[test]
    fn load_reports_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let model_path = dir.path().join("model.json");
        let tokenizer_path = dir.path().join("tokenizer.json");
        std::fs::write(&model_path, "not json").unwrap();
        std::fs::write(&tokenizer_path, r#"{"word_index": {}}"#).unwrap();

        match ModelClassifier::load(&model_path, &tokenizer_path) {
            Err(ClassifierError::LoadFailed { artifact, .. }) => assert_eq!(artifact, "model"),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
