use std::time::Duration;

/// Configuration shared by [`RouterSocket`](crate::RouterSocket) and
/// [`DealerSocket`](crate::DealerSocket).
///
/// All fields have sensible defaults. Use the builder pattern:
///
/// ```rust
/// use mesh_transport::SocketConfig;
///
/// let config = SocketConfig::new()
///     .max_message_size(2 * 1024 * 1024)
///     .send_queue(64);
/// ```
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Maximum encoded body size of one multipart message, in bytes.
    pub(crate) max_message_size: usize,
    /// Maximum number of frames in one multipart message.
    pub(crate) max_frames: usize,
    /// Per-connection outbound queue (send high-water mark).
    pub(crate) send_queue: usize,
    /// Channel buffer for messages received from all connections.
    pub(crate) recv_buffer: usize,
    /// How long a new connection has to send its greeting.
    pub(crate) handshake_timeout: Duration,
    /// Connect attempts before a dealer gives up.
    pub(crate) connect_attempts: u32,
    /// Delay between connect attempts.
    pub(crate) connect_backoff: Duration,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SocketConfig {
    /// Create a new config with defaults.
    pub fn new() -> Self {
        Self {
            max_message_size: 1024 * 1024, // 1 MB
            max_frames: 16,
            send_queue: 1024,
            recv_buffer: 1024,
            handshake_timeout: Duration::from_secs(5),
            connect_attempts: 10,
            connect_backoff: Duration::from_millis(200),
        }
    }

    /// Set maximum message size (default: 1 MB).
    pub fn max_message_size(mut self, bytes: usize) -> Self {
        self.max_message_size = bytes;
        self
    }

    /// Set maximum frames per message (default: 16).
    pub fn max_frames(mut self, frames: usize) -> Self {
        self.max_frames = frames.max(1);
        self
    }

    /// Set the per-connection outbound queue depth (default: 1024).
    ///
    /// When a connection's queue is full, further sends to it are dropped
    /// and reported as [`SendOutcome::QueueFull`](crate::SendOutcome::QueueFull).
    pub fn send_queue(mut self, capacity: usize) -> Self {
        self.send_queue = capacity.max(1);
        self
    }

    /// Set the inbound channel buffer (default: 1024).
    pub fn recv_buffer(mut self, capacity: usize) -> Self {
        self.recv_buffer = capacity.max(1);
        self
    }

    /// Set the greeting timeout for new connections (default: 5s).
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set how many times a dealer tries to connect (default: 10).
    pub fn connect_attempts(mut self, attempts: u32) -> Self {
        self.connect_attempts = attempts.max(1);
        self
    }

    /// Set the delay between connect attempts (default: 200ms).
    pub fn connect_backoff(mut self, backoff: Duration) -> Self {
        self.connect_backoff = backoff;
        self
    }

    pub fn get_max_message_size(&self) -> usize {
        self.max_message_size
    }

    pub fn get_max_frames(&self) -> usize {
        self.max_frames
    }
}
