use std::fmt;

#[derive(Debug)]
pub enum Error {
    Http(reqwest::Error),
    Status { status: u16, body: String },
    Unauthorized,
    Protocol(String),
    MissingConfig(&'static str),
    UnsupportedVersion(u32),
    Json(serde_json::Error),
    Io(std::io::Error),
    Closed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Http(e) => write!(f, "HTTP error: {e}"),
            Error::Status { status, body } => write!(f, "HTTP {status}: {body}"),
            Error::Unauthorized => write!(f, "unauthorized"),
            Error::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Error::MissingConfig(field) => write!(f, "missing config field: {field}"),
            Error::UnsupportedVersion(v) => write!(f, "unsupported config version: {v}"),
            Error::Json(e) => write!(f, "JSON error: {e}"),
            Error::Io(e) => write!(f, "IO error: {e}"),
            Error::Closed => write!(f, "telemetry watcher stopped"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Http(e) => Some(e),
            Error::Json(e) => Some(e),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl Error {
    /// True for hard 401s and soft (in-body) authorization failures.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Error::Unauthorized | Error::Status { status: 401, .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
