// Unified error type for the translation core. Errors are values: parsers
// and emitters return them, nothing logs or panics on bad input.

use std::fmt;

/// Discriminator over the failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Input bytes failed JSON validation at a parser boundary.
    Parse,
    /// The (source, target) pair is not implemented.
    UnsupportedTranslation,
    /// The upstream reported an error payload or the reader failed.
    Upstream,
    /// A streaming-layer failure (mid-stream read error, closed channel).
    Stream,
    /// The bounded wait for the first upstream chunk elapsed.
    Timeout,
    /// Bad rule file or invalid caller-supplied configuration.
    Configuration,
}

/// The single error type for the core.
#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    pub fn parse(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Parse,
            message: message.into(),
            source: None,
        }
    }

    pub fn unsupported_translation(from: &str, to: &str) -> Self {
        Self {
            kind: ErrorKind::UnsupportedTranslation,
            message: format!("unsupported translation: {from} -> {to}"),
            source: None,
        }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Upstream,
            message: message.into(),
            source: None,
        }
    }

    pub fn stream(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Stream,
            message: message.into(),
            source: None,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Timeout,
            message: message.into(),
            source: None,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Configuration,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self {
            kind: ErrorKind::Parse,
            message: format!("invalid JSON: {err}"),
            source: Some(Box::new(err)),
        }
    }
}
