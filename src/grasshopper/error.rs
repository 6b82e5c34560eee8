//! Error types for the Grasshopper bridge.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while talking to the Grasshopper component.
///
/// These never reach an MCP client directly: [`crate::grasshopper::GrasshopperClient`]
/// turns every variant into a uniform `{success: false, error}` result.
#[derive(Debug, Error)]
pub enum HostError {
    /// The TCP connection could not be established.
    #[error("Failed to connect to Grasshopper at {address}: {source}")]
    Connect {
        /// Address that was dialled.
        address: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Connecting, writing or reading took longer than the configured wait time.
    #[error("Timed out {phase} Grasshopper after {}ms", .timeout.as_millis())]
    Timeout {
        /// What the bridge was doing when the timer expired.
        phase: &'static str,
        /// The wait time that elapsed.
        timeout: Duration,
    },

    /// Writing the request or reading the response failed mid-stream.
    #[error("Error communicating with Grasshopper: {source}")]
    Io {
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The peer closed the connection without sending a single byte.
    #[error("Connection closed before response received")]
    ConnectionClosed,

    /// The peer closed the connection before the newline terminator arrived.
    #[error("Incomplete response from Grasshopper ({received} bytes without terminator)")]
    IncompleteResponse {
        /// Number of bytes received before the close.
        received: usize,
    },

    /// The response bytes were not valid UTF-8.
    #[error("Response from Grasshopper is not valid UTF-8")]
    InvalidEncoding,

    /// The payload was not valid JSON.
    #[error("Invalid JSON from Grasshopper: {source}")]
    InvalidJson {
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The payload was JSON but did not match any known envelope shape.
    #[error("Malformed envelope: {message}")]
    MalformedEnvelope {
        /// Description of what's wrong.
        message: String,
    },

    /// A request named a command the bridge does not know.
    #[error("Unknown command: {name}")]
    UnknownCommand {
        /// The command name as received.
        name: String,
    },
}

impl HostError {
    /// Creates a timeout error.
    #[must_use]
    pub const fn timeout(phase: &'static str, timeout: Duration) -> Self {
        Self::Timeout { phase, timeout }
    }

    /// Creates a malformed envelope error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedEnvelope {
            message: message.into(),
        }
    }

    /// Returns `true` for failures of the socket itself rather than of the payload.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. }
                | Self::Timeout { .. }
                | Self::Io { .. }
                | Self::ConnectionClosed
                | Self::IncompleteResponse { .. }
        )
    }
}

/// Errors raised while loading the knowledge base document.
#[derive(Debug, Error)]
pub enum KnowledgeError {
    /// The knowledge base file could not be read.
    #[error("Failed to read knowledge base: {path}")]
    Read {
        /// Path to the file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The knowledge base document is not valid JSON of the expected shape.
    #[error("Failed to parse knowledge base: {origin}")]
    Parse {
        /// File path, or `<embedded>` for the built-in document.
        origin: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Errors surfaced to the caller by a dispatcher operation.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Grasshopper reported failure for an operation that must not fail silently.
    #[error("Failed to {operation}: {message}")]
    Remote {
        /// Human-readable operation, e.g. "save document".
        operation: &'static str,
        /// Error text reported by the host.
        message: String,
    },

    /// The knowledge base could not be loaded.
    #[error(transparent)]
    Knowledge(#[from] KnowledgeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_display() {
        let err = HostError::timeout("waiting for response from", Duration::from_secs(5));
        assert_eq!(
            err.to_string(),
            "Timed out waiting for response from Grasshopper after 5000ms"
        );
        assert!(err.is_transport());
    }

    #[test]
    fn malformed_is_not_transport() {
        let err = HostError::malformed("neither result nor error");
        assert!(!err.is_transport());
        assert!(err.to_string().contains("neither result nor error"));
    }

    #[test]
    fn remote_error_display() {
        let err = CommandError::Remote {
            operation: "save document",
            message: "disk full".to_string(),
        };
        assert_eq!(err.to_string(), "Failed to save document: disk full");
    }
}
