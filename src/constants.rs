//! Application constants for Spool Fetcher
//!
//! This module centralizes all constants used throughout the crate,
//! organized by functional domain for maintainability and clarity.

use std::time::Duration;

/// Transfer worker configuration constants
pub mod transfer {
    /// Default chunk size for pumping bytes from source to sinks (1 MiB)
    pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

    /// Maximum accepted chunk size (64 MiB)
    pub const MAX_CHUNK_SIZE: usize = 64 * 1024 * 1024;

    /// Bytes held in memory before the spool buffer rolls over to disk (8 MiB)
    pub const SPOOL_MEMORY_LIMIT: usize = 8 * 1024 * 1024;
}

/// Retry policy constants
pub mod retry {
    use super::Duration;

    /// Maximum retry attempts after a failed transfer attempt
    pub const MAX_RETRY_ATTEMPTS: u32 = 3;

    /// Delay between retry attempts
    pub const DELAY_BETWEEN_ATTEMPTS: Duration = Duration::from_secs(10);
}

/// Stall monitor configuration constants
pub mod monitor {
    use super::Duration;

    /// Interval between no-progress checks
    pub const PERIOD: Duration = Duration::from_secs(5);

    /// Delay before the first no-progress check
    pub const INITIAL_DELAY: Duration = Duration::from_secs(1);
}

/// Client stream configuration constants
pub mod stream {
    use super::Duration;

    /// Sleep between polls while waiting for the worker to produce bytes
    pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

    /// How long `download()` waits for the first chunk before returning anyway
    pub const START_WAIT_TIMEOUT: Duration = Duration::from_secs(1);

    /// Sleep between polls of the started flag during the handshake
    pub const START_POLL_INTERVAL: Duration = Duration::from_millis(10);
}

/// Event channel constants
pub mod events {
    /// Buffer size for the best-effort download event channel
    pub const CHANNEL_BUFFER_SIZE: usize = 100;
}

/// HTTP retriever configuration constants
pub mod http {
    use super::Duration;

    /// Default user agent for all HTTP requests
    pub const USER_AGENT: &str = "Spool-Fetcher/0.1.0 (Reliable Download Pipeline)";

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Connection pool idle timeout
    pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

    /// Maximum number of redirects to follow
    pub const MAX_REDIRECTS: usize = 10;

    /// Property key carrying the content length reported by the server
    pub const PROP_CONTENT_LENGTH: &str = "content-length";

    /// Property key carrying the content type reported by the server
    pub const PROP_CONTENT_TYPE: &str = "content-type";
}

/// Cache store constants
pub mod store {
    /// Temporary file suffix for atomic cache commits
    pub const TEMP_FILE_SUFFIX: &str = ".tmp";
}

// Re-export commonly used constants for convenience
pub use monitor::{INITIAL_DELAY as MONITOR_INITIAL_DELAY, PERIOD as MONITOR_PERIOD};
pub use retry::{DELAY_BETWEEN_ATTEMPTS, MAX_RETRY_ATTEMPTS};
pub use transfer::{DEFAULT_CHUNK_SIZE, SPOOL_MEMORY_LIMIT};
