/// Errors returned by the mesh transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connection to {addr} failed after {attempts} attempts: {source}")]
    Connect {
        addr: String,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("too many frames: {count} (max {max})")]
    TooManyFrames { count: usize, max: usize },

    #[error("socket is closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_message_too_large() {
        let err = TransportError::MessageTooLarge { size: 128, max: 64 };
        assert_eq!(err.to_string(), "message too large: 128 bytes (max 64)");
    }

    #[test]
    fn display_connect_includes_attempts() {
        let err = TransportError::Connect {
            addr: "127.0.0.1:5550".into(),
            attempts: 3,
            source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
        };
        let text = err.to_string();
        assert!(text.starts_with("connection to 127.0.0.1:5550 failed after 3 attempts"));
    }
}
