//! Error types for producer, consumer and queue admin operations.

use thiserror::Error;

/// Error surfaced by every public operation of the crate
#[derive(Debug, Error)]
pub enum SqsError {
    #[error("sqs: no message body passed")]
    EmptyMessageBody,

    #[error("sqs: message {message_id} body could not be parsed into the target type")]
    BodyParseFailed { message_id: String },

    #[error("sqs: message attributes must be a map or a record, got {kind}")]
    InvalidAttributeContainer { kind: &'static str },

    #[error("sqs: invalid AWSTraceHeader value: {value}")]
    InvalidTraceHeader { value: String },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Transport error: {0}")]
    Transport(TransportError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Failed to initialize queue client: {message}")]
    ClientInitialization { message: String },

    #[error("Stop consumer: number of failed fetch attempts reached {attempts}, last error: {last_error}")]
    FetchAttemptsExhausted {
        attempts: u32,
        last_error: TransportError,
    },
}

impl SqsError {
    /// Check if error is transient and the operation may succeed when retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::EmptyMessageBody => false,
            Self::BodyParseFailed { .. } => false,
            Self::InvalidAttributeContainer { .. } => false,
            Self::InvalidTraceHeader { .. } => false,
            Self::Validation(_) => false,
            Self::Configuration(_) => false,
            Self::Transport(e) => e.transient,
            Self::ClientInitialization { .. } => false,
            Self::FetchAttemptsExhausted { .. } => false,
        }
    }

    /// Check if error ends a consumer loop
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ClientInitialization { .. } | Self::FetchAttemptsExhausted { .. }
        )
    }
}

/// Failure reported by a queue transport
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} failed: {code} - {message}")]
pub struct TransportError {
    pub operation: String,
    pub code: String,
    pub message: String,
    pub transient: bool,
}

impl TransportError {
    /// Create a new transport error
    pub fn new(
        operation: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation: operation.into(),
            code: code.into(),
            message: message.into(),
            transient: false,
        }
    }

    /// Mark the error as transient
    pub fn transient(mut self) -> Self {
        self.transient = true;
        self
    }

    /// Error raised when the underlying client could not be constructed
    pub fn client_initialization(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(operation, Self::CLIENT_INITIALIZATION, message)
    }

    /// Check whether the transport never got a usable client
    pub fn is_client_initialization(&self) -> bool {
        self.code == Self::CLIENT_INITIALIZATION
    }

    pub const CLIENT_INITIALIZATION: &'static str = "ClientInitialization";
}

impl From<TransportError> for SqsError {
    /// Client construction failures become [`SqsError::ClientInitialization`]
    fn from(error: TransportError) -> Self {
        if error.is_client_initialization() {
            Self::ClientInitialization {
                message: error.message,
            }
        } else {
            Self::Transport(error)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("Failed to read configuration: {message}")]
    Parsing { message: String },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Validation errors for operation inputs and configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}

impl ValidationError {
    /// Shorthand for a missing required field
    pub fn required(field: impl Into<String>) -> Self {
        Self::Required {
            field: field.into(),
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
