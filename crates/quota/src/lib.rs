//! Usage quota for authenticated callers
//!
//! Durable per-identity daily counters and the admission decision made
//! against them before an enhancement is attempted.
//!
//! ## Backends
//!
//! - [`FileQuotaStore`] - JSON file written through on every mutation
//! - [`RedisQuotaStore`] - one hash per identity, mutated by Lua scripts
//!
//! Both apply the daily reset rule inside the same critical section as the
//! read or increment, so a record is reset at most once per calendar day.

pub mod admission;
pub mod clock;
pub mod file_store;
pub mod redis_store;
pub mod store;

pub use admission::{Admission, AdmissionController, DenyReason};
pub use clock::{Clock, ManualClock, SystemClock};
pub use file_store::FileQuotaStore;
pub use redis_store::RedisQuotaStore;
pub use store::QuotaStore;
