//! Key layout for the queue store.
//!
//! Logical keys (shared by every backend) are `:`-separated strings:
//! - `queue:{name}:items`: the FIFO list backing a named queue
//! - `counter:{name}:enqueued`: total items ever enqueued on a queue
//! - `dead:{name}`: raw entries of a queue that could not be decoded
//! - `idempotency:{key}`: idempotency records
//! - `cache:{key}`: general-purpose response cache entries
//!
//! The RocksDB backend additionally encodes list entries as binary keys:
//! a big-endian u32 length-prefixed list key, a separator, then an 8-byte
//! big-endian sequence number, so entries of one list sort contiguously in
//! FIFO order.

pub const QUEUE_KEY_PREFIX: &str = "queue:";
const QUEUE_KEY_SUFFIX: &str = ":items";

/// Longest accepted queue name, in bytes.
pub const MAX_QUEUE_NAME_LEN: usize = 128;

const SEPARATOR: u8 = b':';

/// Check that a queue name can be embedded in the key namespace.
pub fn validate_queue_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("queue name must not be empty".to_string());
    }
    if name.len() > MAX_QUEUE_NAME_LEN {
        return Err(format!(
            "queue name exceeds {MAX_QUEUE_NAME_LEN} bytes: {}",
            name.len()
        ));
    }
    if name.contains(':') {
        return Err(format!("queue name must not contain ':': {name}"));
    }
    Ok(())
}

/// `queue:{name}:items`
pub fn queue_key(name: &str) -> String {
    format!("{QUEUE_KEY_PREFIX}{name}{QUEUE_KEY_SUFFIX}")
}

/// Inverse of [`queue_key`]. Returns `None` for keys outside the queue namespace.
pub fn queue_name_from_key(key: &str) -> Option<&str> {
    let name = key
        .strip_prefix(QUEUE_KEY_PREFIX)?
        .strip_suffix(QUEUE_KEY_SUFFIX)?;
    (!name.is_empty() && !name.contains(':')).then_some(name)
}

/// `counter:{name}:enqueued`
pub fn enqueued_counter_key(name: &str) -> String {
    format!("counter:{name}:enqueued")
}

/// `dead:{name}`. Outside the `queue:` namespace, so never scheduled.
pub fn dead_letter_key(name: &str) -> String {
    format!("dead:{name}")
}

/// `idempotency:{key}`
pub fn idempotency_key(key: &str) -> String {
    format!("idempotency:{key}")
}

/// `cache:{key}`
pub fn cache_key(key: &str) -> String {
    format!("cache:{key}")
}

/// Encode a list key with a 4-byte big-endian length prefix.
fn encode_string(s: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + s.len());
    buf.extend_from_slice(&(s.len() as u32).to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
    buf
}

/// Build the prefix shared by every entry of a list.
pub(crate) fn list_entry_prefix(list_key: &str) -> Vec<u8> {
    let mut prefix = encode_string(list_key);
    prefix.push(SEPARATOR);
    prefix
}

/// Build a list entry key: `{len-prefixed list_key}:{seq}`.
pub(crate) fn list_entry_key(list_key: &str, seq: u64) -> Vec<u8> {
    let mut key = list_entry_prefix(list_key);
    key.extend_from_slice(&seq.to_be_bytes());
    key
}
