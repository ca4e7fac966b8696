//! Message processing cycle.
//!
//! Every cycle flows through:
//! 1. `EmailSource::fetch()`: the batch, in source order
//! 2. `Classifier`: label and confidence per message
//! 3. The gate: positive label with confidence above 0.85
//! 4. `FormActor::participate()` for gated-in messages
//!
//! Nothing else happens to a message unless a read policy is configured.

pub mod orchestrator;
pub mod types;

pub use orchestrator::Orchestrator;
pub use types::{CycleOutcome, MessageOutcome, MessageReport};
