/// Nacos config client errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Network failure, or a server response that is neither success nor "not found".
    #[error("transport error: {0}")]
    Transport(String),

    #[error("config not found")]
    NotFound,

    #[error("server response can't be deserialized: {0}")]
    Deserialization(String),

    #[error("invalid client config: {0}")]
    InvalidConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The transport does not implement the operation.
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    #[error(transparent)]
    ConfigSource(#[from] ::config::ConfigError),

    #[error("request timed out")]
    Timeout,

    /// The config service was shut down.
    #[error("config service is shut down")]
    Shutdown,
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Deserialization(e.to_string())
    }
}

impl Error {
    /// Map a Nacos open API status code onto an error.
    pub(crate) fn from_status(code: u16, message: &str) -> Self {
        let reason = match code {
            400 => "Bad Request",
            403 => "Forbidden",
            404 => return Error::NotFound,
            500 => "Internal Server Error",
            _ => "Client Error",
        };
        if message.trim().is_empty() {
            Error::Transport(format!("status[code : {code} , message : {reason}]"))
        } else {
            Error::Transport(format!("status[code : {code} , message : {message}]"))
        }
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        // connect timeouts also report `is_timeout`, they are not an idle poll
        if e.is_connect() {
            Error::Transport(e.to_string())
        } else if e.is_timeout() {
            Error::Timeout
        } else {
            Error::Transport(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
