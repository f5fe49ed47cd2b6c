//! Server configuration defaults.
//!
//! Centralizes the bootstrap values used when neither the config file nor
//! the command line sets them.

/// Default control port.
pub const DEFAULT_PORT: u16 = 2121;

/// Maximum number of threads in the protocol engine's pool.
pub const DEFAULT_MAX_THREADS: u32 = 200;

/// Maximum number of simultaneous logins.
pub const DEFAULT_MAX_LOGINS: u32 = 50;

/// Failed logins before a connection is dropped.
pub const DEFAULT_MAX_LOGIN_FAILURES: u32 = 3;

/// Delay after a failed login, in milliseconds.
pub const DEFAULT_LOGIN_FAILURE_DELAY_MS: u64 = 500;

/// Maximum number of simultaneous anonymous logins.
pub const DEFAULT_MAX_ANONYMOUS_LOGINS: u32 = 0;

/// Prefix of every key in a user definition file.
pub const USER_KEY_PREFIX: &str = "ftpserver.user.";
