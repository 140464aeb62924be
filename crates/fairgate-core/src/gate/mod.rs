//! Request gates applied ahead of the enqueue handler, in order: admission
//! (backpressure), idempotency (duplicate suppression), integrity (body
//! checksum).

pub mod admission;
pub mod idempotency;
pub mod integrity;

pub use admission::{queue_name_from_path, Admission, AdmissionController};
pub use idempotency::{IdempotencyFilter, IdempotencyOutcome, StoredResponse};
