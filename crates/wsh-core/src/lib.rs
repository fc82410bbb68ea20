//! Core primitives for the wsh capability-secure microkernel: handles,
//! clock, RNG, signals, environment, capabilities, and the tracer/logger
//! ring buffers. See the workspace `SPEC_FULL.md` for the full contract.

pub mod caps;
pub mod clock;
pub mod constants;
pub mod environment;
pub mod error;
pub mod logger;
pub mod resource_table;
pub mod rng;
pub mod signal;
pub mod tracer;

pub use caps::{require_cap, Cap, CapabilitySet};
pub use clock::{Clock, FixedClock, SystemClock};
pub use constants::Limits;
pub use environment::Environment;
pub use error::{CoreError, CoreResult};
pub use logger::{Level, LogEntry, Logger};
pub use resource_table::{Entry, Handle, ResourceTable};
pub use rng::{seeded, CryptoRng, Rng, SeededRng};
pub use signal::{AbortSignal, SignalController};
pub use tracer::{TraceEvent, Tracer};
