// SPDX-License-Identifier: MIT OR Apache-2.0

//! mqbridge Error Types
//!
//! One variant per failure category of the connector:
//!
//! - **Configuration**: fatal, raised synchronously by `start()`, never retried
//! - **ResourceSetup**: sessions, receivers or senders that could not be created
//! - **Transport**: anything the message-queue client reports (send, close, ...)
//! - **NotSerializable / ValueMismatch**: outbound encoding refused before any transport call
//! - **Deserialization / UnsupportedMessage**: inbound decode failures, never caught by the core
//! - **ChannelClosed**: the push-to-pull bridge can no longer accept or yield messages

use thiserror::Error;

/// Result type for mqbridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        config_key: Option<String>,
    },

    #[error("Stage '{stage}' failed to set up transport resources: {message}")]
    ResourceSetup {
        stage: String,
        message: String,
        source: Option<BoxedSource>,
    },

    #[error("Transport error: {message}")]
    Transport {
        message: String,
        source: Option<BoxedSource>,
    },

    #[error("Only serializable values are supported, but '{type_name}' is not{}", .reason.as_ref().map(|r| format!(": {r}")).unwrap_or_default())]
    NotSerializable {
        type_name: String,
        reason: Option<String>,
    },

    #[error("A value of type '{actual}' cannot be encoded as a {expected} message")]
    ValueMismatch { expected: String, actual: String },

    #[error("Deserialization failed: {message}")]
    Deserialization {
        message: String,
        source: Option<BoxedSource>,
    },

    #[error("The {body} message body is not supported by {deserializer}")]
    UnsupportedMessage { body: String, deserializer: String },

    #[error("Message channel closed: {message}")]
    ChannelClosed { message: String },

    #[error("{component} is not started")]
    NotStarted { component: String },
}

impl BridgeError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            config_key: None,
        }
    }

    /// Create a configuration error bound to a property key
    pub fn configuration_with_key(message: impl Into<String>, config_key: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            config_key: Some(config_key.into()),
        }
    }

    /// Wrap a failure that occurred while a stage was opening its transport resources
    pub fn resource_setup(stage: impl Into<String>, cause: BridgeError) -> Self {
        Self::ResourceSetup {
            stage: stage.into(),
            message: cause.to_string(),
            source: Some(Box::new(cause)),
        }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Create a transport error keeping the client error as source
    pub fn transport_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn not_serializable(type_name: impl Into<String>) -> Self {
        Self::NotSerializable {
            type_name: type_name.into(),
            reason: None,
        }
    }

    pub fn not_serializable_with_reason(
        type_name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::NotSerializable {
            type_name: type_name.into(),
            reason: Some(reason.into()),
        }
    }

    pub fn value_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::ValueMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a deserialization error keeping the codec error as source
    pub fn deserialization(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Deserialization {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn unsupported_message(body: impl Into<String>, deserializer: impl Into<String>) -> Self {
        Self::UnsupportedMessage {
            body: body.into(),
            deserializer: deserializer.into(),
        }
    }

    pub fn channel_closed(message: impl Into<String>) -> Self {
        Self::ChannelClosed {
            message: message.into(),
        }
    }

    pub fn not_started(component: impl Into<String>) -> Self {
        Self::NotStarted {
            component: component.into(),
        }
    }

    /// Whether the error comes from configuration, which is never worth retrying
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error() {
        let error = BridgeError::configuration_with_key("bad value", "mq.consumer.queues");
        assert!(error.is_configuration());
        if let BridgeError::Configuration { config_key, .. } = error {
            assert_eq!(config_key.as_deref(), Some("mq.consumer.queues"));
        }
    }

    #[test]
    fn test_not_serializable_names_the_type() {
        let error = BridgeError::not_serializable("my_crate::Session");
        assert_eq!(
            error.to_string(),
            "Only serializable values are supported, but 'my_crate::Session' is not"
        );

        let error = BridgeError::not_serializable_with_reason("Vec<u8>", "sequence too long");
        assert!(error.to_string().ends_with(": sequence too long"));
    }

    #[test]
    fn test_resource_setup_keeps_cause() {
        let error = BridgeError::resource_setup("consume-orders", BridgeError::transport("refused"));
        assert!(!error.is_configuration());
        assert!(error.to_string().contains("consume-orders"));
        assert!(std::error::Error::source(&error).is_some());
    }
}
