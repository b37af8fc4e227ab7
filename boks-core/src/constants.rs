//! Protocol constants

use std::time::Duration;

/// Default timeout for a correlated command/response exchange
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Total send attempts for a request hitting transport-level faults.
/// Timeouts and device-reported errors are never retried.
pub const SEND_ATTEMPTS: usize = 2;

/// Fixed delay between send attempts, before jitter is added
pub const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

/// Upper bound of the random jitter added to the retry delay, in milliseconds
pub const RETRY_JITTER_MS: u64 = 500;

/// A door event younger than this marks the session as needing a
/// battery/log refresh before the final disconnect
pub const FRESH_EVENT_WINDOW: Duration = Duration::from_secs(10);

/// Minimum time the device gets to settle (flash writes, battery reading)
/// between a door event and the last-reference disconnect
pub const DISCONNECT_SETTLE_DELAY: Duration = Duration::from_secs(5);

/// The device may follow a logs-count answer with a corrected value;
/// keep collecting same-opcode pushes for this long and report the maximum
pub const LOG_COUNT_COLLECT_WINDOW: Duration = Duration::from_millis(500);

/// How long a fetched logs count stays valid for near-immediate repeat calls
pub const LOG_COUNT_CACHE_TTL: Duration = Duration::from_secs(5);

/// Window within which an identical notification is flagged as a
/// potential duplicate (logged only, never suppressed)
pub const DUPLICATE_NOTIFICATION_WINDOW: Duration = Duration::from_secs(1);

/// Floor for the log batch retrieval deadline; scaled up by expected count
pub const LOG_FETCH_MIN_TIMEOUT: Duration = Duration::from_secs(15);

/// Time allowed per expected log entry during batch retrieval
pub const LOG_FETCH_PER_ENTRY: Duration = Duration::from_secs(1);

/// How long an NFC scan session waits for a tag result
pub const NFC_SCAN_RESULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Elapsed-seconds values at or above this (10 years) are treated as
/// corrupt and the log entry falls back to the current time
pub const MAX_LOG_AGE_SECONDS: u32 = 315_360_000;
