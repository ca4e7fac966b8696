//! Error types for the giveaway agent.
//!
//! Port adapters use these internally and convert them into fail-closed
//! results at their boundary. Only errors raised while building the app
//! reach `main`.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Mail channel errors (IMAP listing, read marking, SMTP sending).
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to connect: {reason}")]
    ConnectFailed { name: String, reason: String },

    #[error("Authentication failed for channel {name}: {reason}")]
    AuthFailed { name: String, reason: String },

    #[error("Channel {name} command failed: {reason}")]
    CommandFailed { name: String, reason: String },

    #[error("Channel {name} disconnected: {reason}")]
    Disconnected { name: String, reason: String },

    #[error("Failed to send message on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Invalid message id: {0}")]
    InvalidMessageId(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Model loading and inference errors.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("Failed to load {artifact} from {path}: {reason}")]
    LoadFailed {
        artifact: String,
        path: String,
        reason: String,
    },

    #[error("Invalid model: {0}")]
    InvalidModel(String),

    #[error("Inference failed: {0}")]
    Inference(String),
}

/// Browser session errors.
#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("Browser failed to launch: {0}")]
    LaunchFailed(String),

    #[error("Navigation to {url} failed: {reason}")]
    NavigationFailed { url: String, reason: String },

    #[error("Page interaction failed on {selector}: {reason}")]
    Interaction { selector: String, reason: String },

    #[error("Browser shutdown failed: {0}")]
    ShutdownFailed(String),
}

/// Scheduler job errors.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Job {id} is already running")]
    AlreadyRunning { id: String },

    #[error("Invalid job interval: {0}s")]
    InvalidInterval(u64),
}

/// Per-message and per-cycle pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Classification of message {id} failed: {reason}")]
    Classification { id: String, reason: String },

    #[error("Action on message {id} failed: {reason}")]
    Action { id: String, reason: String },
}

/// Result type alias for the agent.
pub type Result<T> = std::result::Result<T, Error>;
