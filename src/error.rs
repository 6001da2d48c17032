//! Crate error types.

use std::io;
use std::result;

use thiserror::Error;

use crate::INIT_TTL;

pub type Result<T> = result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed packet: {0}")]
    Parse(#[from] ParseError),

    #[error("codec error: {0}")]
    Codec(#[from] Box<bincode::ErrorKind>),

    #[error("bad config file: {0}")]
    BadConfig(String),

    #[error("join failed: {0}")]
    JoinFailed(String),
}

/// A rejected wire packet.
///
/// The reason string is echoed back to the sender in a `failure` reply,
/// along with whatever tag and ttl could be salvaged from the bad text.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{reason}")]
pub struct ParseError {
    pub reason: String,
    pub tag: u32,
    pub ttl: i32,
}

impl ParseError {
    pub fn new(reason: &str) -> ParseError {
        ParseError {
            reason: reason.to_string(),
            tag: 0,
            ttl: INIT_TTL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::new("missing magic");
        assert_eq!(err.to_string(), "missing magic");

        let err: Error = err.into();
        assert_eq!(err.to_string(), "malformed packet: missing magic");
    }

    #[test]
    fn test_join_failed_display() {
        let err = Error::JoinFailed("no reply from predecessor".to_string());
        assert_eq!(err.to_string(), "join failed: no reply from predecessor");
    }
}
