use std::net::SocketAddr;

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that stop the filter or the responder.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failed to bind to address.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Opening or binding the packet queue failed.
    #[error("packet queue {queue_num}: {source}")]
    Queue {
        queue_num: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_bind() {
        let err = Error::Bind {
            addr: "127.0.0.1:53".parse().unwrap(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };

        assert!(err.to_string().contains("127.0.0.1:53"));
    }

    #[test]
    fn display_queue() {
        let err = Error::Queue {
            queue_num: 5,
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };

        assert!(err.to_string().contains("packet queue 5"));
    }
}
