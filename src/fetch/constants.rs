//! Defaults shared by the fetch client and the worker pool.

/// Default library base URL; item pages live at `<base><id>`.
pub const DEFAULT_BASE_URL: &str = "https://sb.atlantaned.space/library/";

/// Default name of the session cookie.
pub const DEFAULT_COOKIE_NAME: &str = "PHPSESSID";

/// Default connect timeout in seconds.
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default read timeout in seconds.
pub const READ_TIMEOUT_SECS: u64 = 30;

/// Default number of parallel fetch workers.
pub const DEFAULT_WORKERS: usize = 4;

/// Upper bound for the number of parallel fetch workers.
pub const MAX_WORKERS: usize = 64;
