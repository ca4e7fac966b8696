//! Giveaway agent: classify incoming giveaway emails and enter the ones
//! the model trusts.

pub mod app;
pub mod automation;
pub mod channels;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod worker;

pub use error::{Error, Result};
