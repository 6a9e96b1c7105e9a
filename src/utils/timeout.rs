//! Default deadlines shared by the config layer and the transports.

use std::time::Duration;

/// Bounded wait for establishing a client connection
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Client write-idle period after which a heartbeat ping is sent
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Server read-idle period after which a connection is closed
pub const IDLE_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Default upper bound on waiting for a response
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Grace period for in-flight work during shutdown
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);
