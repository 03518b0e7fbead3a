//! Unified error handling system
//!
//! Provides structured error types with context, recovery suggestions, and proper error chaining

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

pub type BoothResult<T> = Result<T, BoothError>;

/// Error context providing additional information for debugging and recovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Unique error ID for tracking
    pub error_id: String,
    /// Timestamp when error occurred
    pub timestamp: DateTime<Utc>,
    /// Component where error originated
    pub component: String,
    /// Operation being performed when error occurred
    pub operation: Option<String>,
    /// Additional metadata
    pub metadata: std::collections::HashMap<String, String>,
    /// Recovery suggestions
    pub recovery_suggestions: Vec<String>,
}

impl ErrorContext {
    pub fn new(component: &str) -> Self {
        Self {
            error_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            component: component.to_string(),
            operation: None,
            metadata: std::collections::HashMap::new(),
            recovery_suggestions: Vec::new(),
        }
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_suggestion(mut self, suggestion: &str) -> Self {
        self.recovery_suggestions.push(suggestion.to_string());
        self
    }
}

/// Main error type for the booth client
#[derive(Error, Debug)]
pub enum BoothError {
    /// The backend could not be reached
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    /// The backend rejected the credentials; `message` is what the backend said
    #[error("Authentication error: {message}")]
    Authentication {
        message: String,
        context: ErrorContext,
    },

    /// The backend answered with success but the body was not usable
    #[error("Protocol error: {message}")]
    Protocol {
        message: String,
        context: ErrorContext,
    },

    /// Persisted session data could not be parsed
    #[error("Stored session is corrupt: {message}")]
    StorageCorruption {
        message: String,
        context: ErrorContext,
    },

    #[error("Storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    /// Non-success answer from a resource endpoint
    #[error("API error ({status}): {message}")]
    Api {
        message: String,
        status: u16,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
        context: ErrorContext,
    },

    /// A newer session change won the race against this operation
    #[error("Session changed while {operation} was in flight")]
    Superseded {
        operation: String,
        context: ErrorContext,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },
}

impl BoothError {
    /// Get the error context
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            BoothError::Network { context, .. } => Some(context),
            BoothError::Authentication { context, .. } => Some(context),
            BoothError::Protocol { context, .. } => Some(context),
            BoothError::StorageCorruption { context, .. } => Some(context),
            BoothError::Storage { context, .. } => Some(context),
            BoothError::Api { context, .. } => Some(context),
            BoothError::Config { context, .. } => Some(context),
            BoothError::Validation { context, .. } => Some(context),
            BoothError::Superseded { context, .. } => Some(context),
            BoothError::Internal { context, .. } => Some(context),
            BoothError::Io(_) | BoothError::Serialization(_) => None,
        }
    }

    /// Check if error is recoverable by simply trying again
    pub fn is_recoverable(&self) -> bool {
        match self {
            BoothError::Network { .. } => true,
            BoothError::Superseded { .. } => true,
            BoothError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Message suitable for showing to an end user. Never empty.
    pub fn user_message(&self) -> String {
        let message = match self {
            BoothError::Authentication { message, .. } => fallback(message, "Login failed"),
            BoothError::Api { message, status, .. } => {
                fallback(message, &format!("Request failed with status {}", status))
            }
            BoothError::Network { .. } => {
                "Cannot reach the booking service. Check your connection and try again."
                    .to_string()
            }
            BoothError::Protocol { .. } => "Invalid response from server".to_string(),
            other => other.to_string(),
        };

        fallback(&message, "An unexpected error occurred")
    }

    /// Failures that are part of normal use and log at warn level
    pub fn is_routine(&self) -> bool {
        matches!(
            self,
            BoothError::Authentication { .. }
                | BoothError::Superseded { .. }
                | BoothError::Network { .. }
        )
    }

    /// Log the error with appropriate level
    pub fn log(&self) {
        if self.is_routine() {
            warn!(
                error_id = ?self.context().map(|c| &c.error_id),
                error = %self,
                "Operation did not complete (may be recoverable)"
            );
            return;
        }

        match self {
            BoothError::Internal { .. } | BoothError::Storage { .. } => {
                error!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Internal error occurred"
                );
            }
            BoothError::Config { .. } | BoothError::Validation { .. } => {
                error!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Configuration or validation error"
                );
            }
            _ => {
                error!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Error occurred"
                );
            }
        }
    }
}

fn fallback(message: &str, default: &str) -> String {
    if message.trim().is_empty() {
        default.to_string()
    } else {
        message.to_string()
    }
}

/// Convenience macros for creating errors with context
#[macro_export]
macro_rules! network_error {
    ($msg:expr, $component:expr) => {
        $crate::BoothError::Network {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check network connectivity and the backend URL"),
        }
    };
    ($msg:expr, $component:expr, $source:expr) => {
        $crate::BoothError::Network {
            message: $msg.to_string(),
            source: Some(Box::new($source)),
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check network connectivity and the backend URL"),
        }
    };
}

#[macro_export]
macro_rules! protocol_error {
    ($msg:expr, $component:expr) => {
        $crate::BoothError::Protocol {
            message: $msg.to_string(),
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check that the backend version matches this client"),
        }
    };
}

#[macro_export]
macro_rules! config_error {
    ($msg:expr, $component:expr) => {
        $crate::BoothError::Config {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check your configuration file")
                .with_suggestion("Run 'booth config init' to create default config"),
        }
    };
}

#[macro_export]
macro_rules! validation_error {
    ($msg:expr, $field:expr, $component:expr) => {
        $crate::BoothError::Validation {
            message: $msg.to_string(),
            field: Some($field.to_string()),
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check the field value and format"),
        }
    };
}
