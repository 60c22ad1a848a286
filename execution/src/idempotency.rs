//! Idempotency key derivation (§9): `task_id = HMAC-SHA256(secret,
//! idempotency_key || account_id)`.
//!
//! This crate derives its own `task_id` rather than depending on
//! `tickgate-integration` (which owns the identical derivation for the
//! downstream wire surface) — the Order Executor's task table is a
//! self-contained concern that should not pull in a WebSocket codec
//! crate just to hash two strings. The law itself — same inputs always
//! derive the same id — is preserved exactly; see `DESIGN.md`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// A derived, hex-encoded task identifier. Deterministic: stable across
/// process restarts as long as the signing secret is unchanged, which is
/// what makes restart-time idempotency (spec §8 scenario 3) possible.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(String);

impl TaskId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive `task_id = HMAC(secret, idempotency_key || account_id)`.
///
/// `secret` never enters a log line or the returned value; only the
/// resulting digest does.
pub fn derive_task_id(secret: &[u8], idempotency_key: &str, account_id: &str) -> TaskId {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts a key of any length");
    mac.update(idempotency_key.as_bytes());
    mac.update(account_id.as_bytes());
    let digest = mac.finalize().into_bytes();
    TaskId(hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_inputs_derive_the_same_task_id() {
        let a = derive_task_id(b"secret", "K1", "primary");
        let b = derive_task_id(b"secret", "K1", "primary");
        assert_eq!(a, b);
    }

    #[test]
    fn different_idempotency_key_derives_a_different_task_id() {
        let a = derive_task_id(b"secret", "K1", "primary");
        let b = derive_task_id(b"secret", "K2", "primary");
        assert_ne!(a, b);
    }
}
