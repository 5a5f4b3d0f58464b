//! Error types shared by the transport, the codec and the evaluation loop.

use std::io;

use thiserror::Error;

use crate::endpoint::Endpoint;

/// Failure of one transport operation.
///
/// The wrapped [`io::Error`] keeps the precise cause: [`io::ErrorKind::TimedOut`] when the
/// deadline expired, [`io::ErrorKind::UnexpectedEof`] when the peer closed the stream,
/// [`io::ErrorKind::NotConnected`] when the client was already closed.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Resolution failed, the peer refused, or the connect deadline expired.
    #[error("could not connect to {endpoint}: {source}")]
    Connect {
        /// Endpoint the client tried to reach.
        endpoint: Endpoint,
        /// Underlying cause.
        #[source]
        source: io::Error,
    },

    /// The message could not be written completely before the deadline.
    #[error("write error: {0}")]
    Write(#[source] io::Error),

    /// No complete reply arrived before the deadline, or the peer closed early.
    #[error("read error: {0}")]
    Read(#[source] io::Error),
}

impl TransportError {
    /// True when the operation was cut short by its deadline.
    pub fn is_timeout(&self) -> bool {
        let source = match self {
            TransportError::Connect { source, .. } => source,
            TransportError::Write(source) | TransportError::Read(source) => source,
        };
        matches!(
            source.kind(),
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
        )
    }
}

/// A reply that could not be decoded.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The payload is not a JSON document.
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload is valid JSON but not an object.
    #[error("reply is not a json object")]
    NotAnObject,

    /// A required field is absent.
    #[error("missing field `{0}`")]
    MissingField(String),

    /// A field is present with the wrong type.
    #[error("field `{path}` is not {expected}")]
    WrongType {
        /// Dotted path of the field.
        path: String,
        /// Expected type, for the message.
        expected: &'static str,
    },

    /// A `tiles` key is not a signed integer.
    #[error("invalid tile row key `{0}`")]
    InvalidTileKey(String),

    /// The tile grid does not fit in a square matrix with odd side.
    #[error("malformed tile grid: {0}")]
    MalformedGrid(String),

    /// A command field or value this protocol does not define.
    #[error("unknown command `{0}`")]
    UnknownCommand(String),
}

/// Anything that can go wrong during an episode round-trip.
#[derive(Debug, Error)]
pub enum EpisodeError {
    /// See [`TransportError`].
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// See [`ParseError`].
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl EpisodeError {
    /// Whether the failure only spoils the current step.
    ///
    /// Failed writes, failed reads and bad replies are skipped by the step loop. A failed
    /// connect is never transient, and neither is an operation on a connection that an
    /// earlier failure already closed.
    pub fn is_transient(&self) -> bool {
        match self {
            EpisodeError::Transport(TransportError::Connect { .. }) => false,
            EpisodeError::Transport(
                TransportError::Write(source) | TransportError::Read(source),
            ) => source.kind() != io::ErrorKind::NotConnected,
            EpisodeError::Parse(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_failures_are_terminal() {
        let err: EpisodeError = TransportError::Connect {
            endpoint: Endpoint::new("localhost", "1"),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        }
        .into();
        assert!(!err.is_transient());
    }

    #[test]
    fn step_failures_are_transient() {
        let read: EpisodeError =
            TransportError::Read(io::Error::from(io::ErrorKind::UnexpectedEof)).into();
        let write: EpisodeError =
            TransportError::Write(io::Error::from(io::ErrorKind::TimedOut)).into();
        let parse: EpisodeError = ParseError::MissingField("lives".to_string()).into();
        assert!(read.is_transient());
        assert!(write.is_transient());
        assert!(parse.is_transient());
    }

    #[test]
    fn closed_connection_is_terminal() {
        let err: EpisodeError =
            TransportError::Read(io::Error::from(io::ErrorKind::NotConnected)).into();
        assert!(!err.is_transient());
    }

    #[test]
    fn timeout_detection() {
        assert!(TransportError::Read(io::Error::from(io::ErrorKind::TimedOut)).is_timeout());
        assert!(!TransportError::Read(io::Error::from(io::ErrorKind::UnexpectedEof)).is_timeout());
    }
}
