//! Time-ordered 64-bit identifier generation.
//!
//! [`IdGenerator`] issues snowflake-style identifiers used as blob storage
//! IDs and as default version and upload IDs:
//!
//! ```text
//!  63                22 21      17 16      12 11           0
//! +--------------------+----------+----------+--------------+
//! | ms since EPOCH_MS  | datactr  | worker   | sequence     |
//! +--------------------+----------+----------+--------------+
//! ```
//!
//! IDs are strictly increasing for a single generator as long as the clock
//! never goes backwards. A regression is reported as
//! [`EngineError::ClockMovedBackwards`] and never retried.

use std::fmt;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{error, trace};

use crate::error::{EngineError, EngineResult};

/// Custom epoch (2024-01-01T00:00:00Z) subtracted from wall-clock milliseconds.
pub const EPOCH_MS: u64 = 1_704_067_200_000;

const WORKER_ID_BITS: u32 = 5;
const DATACENTER_ID_BITS: u32 = 5;
const SEQUENCE_BITS: u32 = 12;

/// Largest accepted worker ID.
pub const MAX_WORKER_ID: u64 = (1 << WORKER_ID_BITS) - 1;
/// Largest accepted datacenter ID.
pub const MAX_DATACENTER_ID: u64 = (1 << DATACENTER_ID_BITS) - 1;

const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;
const WORKER_ID_SHIFT: u32 = SEQUENCE_BITS;
const DATACENTER_ID_SHIFT: u32 = SEQUENCE_BITS + WORKER_ID_BITS;
const TIMESTAMP_SHIFT: u32 = SEQUENCE_BITS + WORKER_ID_BITS + DATACENTER_ID_BITS;

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Source of wall-clock milliseconds.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;
}

/// [`Clock`] backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// IdGenerator
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct SequenceState {
    last_ms: u64,
    sequence: u64,
}

/// Snowflake-style generator. Share one instance per engine.
///
/// # Examples
///
/// ```
/// use ruststack_s3_engine::id::IdGenerator;
///
/// let ids = IdGenerator::new(1, 1).unwrap();
/// let a = ids.next_id().unwrap();
/// let b = ids.next_id().unwrap();
/// assert!(a < b);
/// ```
pub struct IdGenerator {
    datacenter_id: u64,
    worker_id: u64,
    clock: Box<dyn Clock>,
    state: Mutex<SequenceState>,
}

impl fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdGenerator")
            .field("datacenter_id", &self.datacenter_id)
            .field("worker_id", &self.worker_id)
            .finish_non_exhaustive()
    }
}

impl IdGenerator {
    /// Create a generator reading the system clock.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidArgument`] if either ID does not fit its
    /// 5-bit field.
    pub fn new(datacenter_id: u64, worker_id: u64) -> EngineResult<Self> {
        Self::with_clock(datacenter_id, worker_id, Box::new(SystemClock))
    }

    /// Create a generator reading the given clock.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidArgument`] if either ID does not fit its
    /// 5-bit field.
    pub fn with_clock(
        datacenter_id: u64,
        worker_id: u64,
        clock: Box<dyn Clock>,
    ) -> EngineResult<Self> {
        if datacenter_id > MAX_DATACENTER_ID {
            return Err(EngineError::invalid_argument(format!(
                "datacenter id {datacenter_id} must be between 0 and {MAX_DATACENTER_ID}"
            )));
        }
        if worker_id > MAX_WORKER_ID {
            return Err(EngineError::invalid_argument(format!(
                "worker id {worker_id} must be between 0 and {MAX_WORKER_ID}"
            )));
        }
        Ok(Self {
            datacenter_id,
            worker_id,
            clock,
            state: Mutex::new(SequenceState::default()),
        })
    }

    /// Issue the next identifier.
    ///
    /// Calls are serialized. When the per-millisecond sequence wraps the call
    /// spins until the clock advances.
    ///
    /// # Errors
    ///
    /// - [`EngineError::ClockMovedBackwards`] if the clock reads earlier than
    ///   the last issued millisecond.
    /// - [`EngineError::InvalidArgument`] if the clock reads earlier than
    ///   [`EPOCH_MS`].
    pub fn next_id(&self) -> EngineResult<u64> {
        let mut state = self.state.lock();
        let mut now = self.clock.now_millis();

        if now < state.last_ms {
            error!(
                last_ms = state.last_ms,
                now_ms = now,
                "clock moved backwards, refusing to generate id"
            );
            return Err(EngineError::ClockMovedBackwards {
                last_ms: state.last_ms,
                now_ms: now,
            });
        }

        if now == state.last_ms {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                trace!(last_ms = state.last_ms, "sequence exhausted, waiting for next millisecond");
                now = self.wait_past(state.last_ms)?;
            }
        } else {
            state.sequence = 0;
        }
        state.last_ms = now;

        let elapsed = now.checked_sub(EPOCH_MS).ok_or_else(|| {
            EngineError::invalid_argument(format!("clock reading {now} precedes epoch {EPOCH_MS}"))
        })?;

        Ok((elapsed << TIMESTAMP_SHIFT)
            | (self.datacenter_id << DATACENTER_ID_SHIFT)
            | (self.worker_id << WORKER_ID_SHIFT)
            | state.sequence)
    }

    /// Issue the next identifier rendered as a decimal string.
    ///
    /// # Errors
    ///
    /// See [`IdGenerator::next_id`].
    pub fn next_id_string(&self) -> EngineResult<String> {
        self.next_id().map(|id| id.to_string())
    }

    /// Spin until the clock reads strictly after `last_ms`.
    fn wait_past(&self, last_ms: u64) -> EngineResult<u64> {
        loop {
            let now = self.clock.now_millis();
            if now > last_ms {
                return Ok(now);
            }
            if now < last_ms {
                error!(last_ms, now_ms = now, "clock moved backwards while waiting");
                return Err(EngineError::ClockMovedBackwards {
                    last_ms,
                    now_ms: now,
                });
            }
            std::hint::spin_loop();
        }
    }
}

/// Split an identifier into `(timestamp_ms, datacenter_id, worker_id, sequence)`.
#[must_use]
pub fn decompose(id: u64) -> (u64, u64, u64, u64) {
    (
        (id >> TIMESTAMP_SHIFT) + EPOCH_MS,
        (id >> DATACENTER_ID_SHIFT) & MAX_DATACENTER_ID,
        (id >> WORKER_ID_SHIFT) & MAX_WORKER_ID,
        id & SEQUENCE_MASK,
    )
}
