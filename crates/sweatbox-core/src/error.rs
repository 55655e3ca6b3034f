//! Error taxonomy shared by the parsers, the engine and the assembler.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal outcome of a generation run. Nothing is written when one of these is returned.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("{file}:{line}: {message}")]
    Parse {
        file: String,
        line: usize,
        message: String,
    },

    #[error("{airport}: requested {requested} aircraft but only {available} {pool} available")]
    Capacity {
        airport: String,
        requested: usize,
        available: usize,
        pool: String,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("generation cancelled")]
    Cancelled,
}

impl GenerationError {
    pub fn parse(file: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            file: file.into(),
            line,
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failure of an external data source. Always recovered through the local fallback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExternalSourceError {
    #[error("request timed out")]
    Timeout,
    #[error("HTTP {0}")]
    Http(u16),
    #[error("transport: {0}")]
    Transport(String),
    #[error("decode: {0}")]
    Decode(String),
    #[error("source disabled")]
    Disabled,
}

/// Non-fatal anomaly reported alongside a successful result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub origin: String,
    pub line: Option<usize>,
    pub message: String,
}

impl Warning {
    pub fn new(origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            line: None,
            message: message.into(),
        }
    }

    pub fn at_line(origin: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            line: Some(line),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{}: {}", self.origin, line, self.message),
            None => write!(f, "{}: {}", self.origin, self.message),
        }
    }
}

/// A parsed value plus the anomalies skipped on the way.
#[derive(Debug, Clone)]
pub struct Parsed<T> {
    pub value: T,
    pub warnings: Vec<Warning>,
}

pub type Result<T, E = GenerationError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_carries_file_and_line() {
        let err = GenerationError::parse("KPHX.geojson", 12, "expected object");
        assert_eq!(err.to_string(), "KPHX.geojson:12: expected object");
    }

    #[test]
    fn test_capacity_error_message() {
        let err = GenerationError::Capacity {
            airport: "KPHX".into(),
            requested: 5,
            available: 3,
            pool: "airline parking spots".into(),
        };
        assert!(err.to_string().contains("only 3 airline parking spots"));
    }

    #[test]
    fn test_warning_display() {
        assert_eq!(Warning::new("cifp", "x").to_string(), "cifp: x");
        assert_eq!(Warning::at_line("cifp", 4, "x").to_string(), "cifp:4: x");
    }
}
