use std::error::Error;
use std::fmt;

use crate::constants::{ERROR_CANCELLED, ERROR_MISSING_BODY};

/// Error type for completion requests and the streaming read loop
#[derive(Debug, Clone)]
pub struct StreamError {
    pub message: String,
    pub status_code: Option<u16>,
    pub body: Option<String>,
    kind: StreamErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamErrorKind {
    Transport,
    HttpStatus,
    Cancelled,
    MissingBody,
    Stream,
    InvalidRequest,
}

impl StreamError {
    /// Connection-level failure (DNS, connect, transport). Eligible for fallback.
    pub fn transport(message: &str) -> Self {
        Self {
            message: message.to_string(),
            status_code: None,
            body: None,
            kind: StreamErrorKind::Transport,
        }
    }

    pub fn http_status(status_code: u16, body: String) -> Self {
        Self {
            message: format!("server returned {}: {}", status_code, body),
            status_code: Some(status_code),
            body: Some(body),
            kind: StreamErrorKind::HttpStatus,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            message: ERROR_CANCELLED.to_string(),
            status_code: None,
            body: None,
            kind: StreamErrorKind::Cancelled,
        }
    }

    pub fn missing_body() -> Self {
        Self {
            message: ERROR_MISSING_BODY.to_string(),
            status_code: None,
            body: None,
            kind: StreamErrorKind::MissingBody,
        }
    }

    pub fn stream(message: &str) -> Self {
        Self {
            message: message.to_string(),
            status_code: None,
            body: None,
            kind: StreamErrorKind::Stream,
        }
    }

    pub fn invalid_request(message: &str) -> Self {
        Self {
            message: message.to_string(),
            status_code: None,
            body: None,
            kind: StreamErrorKind::InvalidRequest,
        }
    }

    pub fn is_transport(&self) -> bool {
        self.kind == StreamErrorKind::Transport
    }

    pub fn is_http_status(&self) -> bool {
        self.kind == StreamErrorKind::HttpStatus
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == StreamErrorKind::Cancelled
    }

    pub fn is_missing_body(&self) -> bool {
        self.kind == StreamErrorKind::MissingBody
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "StreamError {}: {}", code, self.message),
            None => write!(f, "StreamError: {}", self.message),
        }
    }
}

impl Error for StreamError {}

/// Error type for the embedding + search phase
#[derive(Debug, Clone)]
pub struct RetrievalError {
    pub message: String,
    kind: RetrievalErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetrievalErrorKind {
    Cancelled,
    Embedding,
    Search,
    Corpus,
}

impl RetrievalError {
    pub fn cancelled() -> Self {
        Self {
            message: ERROR_CANCELLED.to_string(),
            kind: RetrievalErrorKind::Cancelled,
        }
    }

    pub fn embedding(message: &str) -> Self {
        Self {
            message: message.to_string(),
            kind: RetrievalErrorKind::Embedding,
        }
    }

    pub fn search(message: &str) -> Self {
        Self {
            message: message.to_string(),
            kind: RetrievalErrorKind::Search,
        }
    }

    pub fn corpus(message: &str) -> Self {
        Self {
            message: message.to_string(),
            kind: RetrievalErrorKind::Corpus,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == RetrievalErrorKind::Cancelled
    }

    pub fn is_search(&self) -> bool {
        self.kind == RetrievalErrorKind::Search
    }
}

impl fmt::Display for RetrievalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RetrievalError: {}", self.message)
    }
}

impl Error for RetrievalError {}

impl From<StreamError> for RetrievalError {
    fn from(err: StreamError) -> Self {
        if err.is_cancelled() {
            RetrievalError::cancelled()
        } else {
            RetrievalError::embedding(&err.message)
        }
    }
}

#[macro_export]
macro_rules! check_cancelled {
    ($token:expr, $err:expr) => {
        if $token.is_cancelled() {
            return Err($err);
        }
    };
    ($token:expr) => {
        if $token.is_cancelled() {
            return Err($crate::error::StreamError::cancelled());
        }
    };
}
