//! Error types for the WARP player.
//!
//! Errors are scoped to the stream that produced them: a decode task that
//! fails logs its error and exits without affecting other streams.

/// Error type for warp-player operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed frame: bad size, tag or header JSON, or a stream that ended
    /// mid-frame or mid-atom.
    #[error("Framing error: {0}")]
    Framing(String),

    /// Out-of-contract sequencing, such as a push after finish.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Initialization or atom bytes could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The underlying stream failed.
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The media sink rejected an operation.
    #[error("Sink error: {0}")]
    Sink(String),

    /// The session was closed while waiting.
    #[error("Cancelled")]
    Cancelled,

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Create a new Framing error.
    pub fn framing<S: Into<String>>(msg: S) -> Self {
        Self::Framing(msg.into())
    }

    /// Create a new Protocol error.
    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a new Parse error.
    pub fn parse<S: Into<String>>(msg: S) -> Self {
        Self::Parse(msg.into())
    }

    /// Create a new Sink error.
    pub fn sink<S: Into<String>>(msg: S) -> Self {
        Self::Sink(msg.into())
    }

    /// Create a new Config error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }
}

impl From<warp_media::Error> for Error {
    fn from(err: warp_media::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Result type alias using the player Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::framing("bad tag");
        assert_eq!(err.to_string(), "Framing error: bad tag");

        let err = Error::protocol("push after finish");
        assert_eq!(err.to_string(), "Protocol error: push after finish");

        let err = Error::Cancelled;
        assert_eq!(err.to_string(), "Cancelled");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Transport(_)));
    }

    #[test]
    fn test_error_from_media() {
        let err = Error::from(warp_media::Error::MissingAtom("moov"));
        assert!(matches!(err, Error::Parse(_)));
        assert!(err.to_string().contains("moov"));
    }
}
