//! Error handling for gate and batch operations.
//!
//! Construction and configuration problems surface as a `BatchGateError`
//! to the caller of the failing operation. Failures of individual work units
//! never do: they are folded into that unit's `Outcome`.

use std::fmt;
use std::time::Duration;

/// Main error type for gate, executor, configuration and HTTP operations.
#[derive(Debug, Clone)]
pub enum BatchGateError {
    /// Gate capacity is zero or larger than the runtime can represent
    InvalidCapacity {
        capacity: usize,
        reason: String,
    },

    /// Executor invoked without a usable gate
    InvalidConfiguration {
        message: String,
    },

    /// An acquisition was interrupted before a slot was granted
    Cancelled {
        operation: String,
    },

    /// More releases than acquisitions were attempted on a gate
    ImbalancedRelease {
        capacity: usize,
    },

    /// Configuration file or environment errors
    ConfigError {
        message: String,
    },

    /// File I/O errors when reading target lists or config files
    FileError {
        path: String,
        message: String,
    },

    /// Transport-level errors (connection refused, DNS, TLS, ...)
    NetworkError {
        message: String,
        source: Option<String>,
    },

    /// A request completed with a non-success status code
    HttpStatus {
        url: String,
        status: u16,
    },

    /// Timeout errors when operations take too long
    Timeout {
        operation: String,
        duration: Duration,
    },

    /// A request target that cannot be turned into a URL
    InvalidTarget {
        target: String,
        reason: String,
    },
}

impl BatchGateError {
    /// Create a new invalid capacity error.
    pub fn invalid_capacity<R: Into<String>>(capacity: usize, reason: R) -> Self {
        Self::InvalidCapacity {
            capacity,
            reason: reason.into(),
        }
    }

    /// Create a new invalid configuration error.
    pub fn invalid_configuration<M: Into<String>>(message: M) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Create a new cancellation error.
    pub fn cancelled<O: Into<String>>(operation: O) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create a new configuration error.
    pub fn config<M: Into<String>>(message: M) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Create a new file error.
    pub fn file_error<P: Into<String>, M: Into<String>>(path: P, message: M) -> Self {
        Self::FileError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new network error.
    pub fn network<M: Into<String>>(message: M) -> Self {
        Self::NetworkError {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new network error with source information.
    pub fn network_with_source<M: Into<String>, S: Into<String>>(message: M, source: S) -> Self {
        Self::NetworkError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a new HTTP status error.
    pub fn http_status<U: Into<String>>(url: U, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Create a new timeout error.
    pub fn timeout<O: Into<String>>(operation: O, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a new invalid target error.
    pub fn invalid_target<T: Into<String>, R: Into<String>>(target: T, reason: R) -> Self {
        Self::InvalidTarget {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error came from a cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Check if this error suggests the operation could succeed if repeated.
    ///
    /// Informational only: the executor never retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkError { .. }
                | Self::Timeout { .. }
                | Self::HttpStatus {
                    status: 429 | 500..=599,
                    ..
                }
        )
    }
}

impl fmt::Display for BatchGateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCapacity { capacity, reason } => {
                write!(f, "Invalid gate capacity {}: {}", capacity, reason)
            }
            Self::InvalidConfiguration { message } => {
                write!(f, "Invalid executor configuration: {}", message)
            }
            Self::Cancelled { operation } => {
                write!(f, "Cancelled while {}", operation)
            }
            Self::ImbalancedRelease { capacity } => {
                write!(
                    f,
                    "Release without a matching acquire (gate capacity {})",
                    capacity
                )
            }
            Self::ConfigError { message } => {
                write!(f, "Configuration error: {}", message)
            }
            Self::FileError { path, message } => {
                write!(f, "File error at '{}': {}", path, message)
            }
            Self::NetworkError { message, source } => {
                if let Some(source) = source {
                    write!(f, "Network error: {} (source: {})", message, source)
                } else {
                    write!(f, "Network error: {}", message)
                }
            }
            Self::HttpStatus { url, status } => {
                write!(f, "HTTP {} from '{}'", status, url)
            }
            Self::Timeout {
                operation,
                duration,
            } => {
                if duration.is_zero() {
                    write!(f, "Timeout during: {}", operation)
                } else {
                    write!(f, "Timeout after {:?} during: {}", duration, operation)
                }
            }
            Self::InvalidTarget { target, reason } => {
                write!(f, "Invalid target '{}': {}", target, reason)
            }
        }
    }
}

impl std::error::Error for BatchGateError {}

#[cfg(feature = "http")]
impl From<reqwest::Error> for BatchGateError {
    fn from(err: reqwest::Error) -> Self {
        let url = err
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "request".to_string());
        if err.is_timeout() {
            Self::Timeout {
                operation: format!("GET {}", url),
                duration: Duration::ZERO,
            }
        } else if err.is_connect() {
            Self::network_with_source("Connection failed", err.to_string())
        } else if let Some(status) = err.status() {
            Self::http_status(url, status.as_u16())
        } else {
            Self::network_with_source("HTTP request failed", err.to_string())
        }
    }
}

impl From<toml::de::Error> for BatchGateError {
    fn from(err: toml::de::Error) -> Self {
        Self::ConfigError {
            message: format!("Failed to parse TOML configuration: {}", err),
        }
    }
}
