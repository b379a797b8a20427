//! Identifier generation.
//!
//! Session, run, and relation ids are random; runner ids are derived
//! deterministically from the runner's identity tuple so that re-registration
//! from the same place always resolves to the same record.

use sha2::{Digest, Sha256};
use uuid::Uuid;

const HEX_LEN: usize = 12;

fn random_hex() -> String {
    let mut buf = Uuid::encode_buffer();
    let hex = Uuid::new_v4().simple().encode_lower(&mut buf);
    hex[..HEX_LEN].to_string()
}

/// `ses_<12 hex>`
pub fn new_session_id() -> String {
    format!("ses_{}", random_hex())
}

/// `run_<12 hex>`
pub fn new_run_id() -> String {
    format!("run_{}", random_hex())
}

/// `rel_<12 hex>`
pub fn new_relation_id() -> String {
    format!("rel_{}", random_hex())
}

/// `lnch_<12 hex>` derived from `sha256(hostname ":" project_dir ":" executor_type)`.
pub fn derive_runner_id(hostname: &str, project_dir: &str, executor_type: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(hostname.as_bytes());
    hasher.update(b":");
    hasher.update(project_dir.as_bytes());
    hasher.update(b":");
    hasher.update(executor_type.as_bytes());
    let digest = hasher.finalize();
    format!("lnch_{}", &hex::encode(digest)[..HEX_LEN])
}
