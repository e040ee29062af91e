//! Launch-configuration fingerprints.
//!
//! A signature identifies everything that affects what a backend process
//! exposes: command, argument list (order-sensitive) and environment overlay
//! (key-order-insensitive). Two specs with equal signatures are
//! interchangeable, so signatures key both the persisted catalog cache and
//! the reuse of live sessions.

use std::collections::BTreeMap;

use serde::Serialize;

use super::config::BackendSpec;

/// Signature of a missing spec. Never equal to a real (hex digest) signature.
pub const ABSENT_SIGNATURE: &str = "absent";

#[derive(Serialize)]
struct CanonicalSpec<'a> {
    command: &'a str,
    args: &'a [String],
    env: BTreeMap<&'a str, &'a str>,
}

/// Compute the signature of a backend spec.
pub fn signature(spec: Option<&BackendSpec>) -> String {
    let Some(spec) = spec else {
        return ABSENT_SIGNATURE.to_string();
    };

    let canonical = CanonicalSpec {
        command: &spec.command,
        args: &spec.args,
        env: spec
            .env
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect(),
    };

    // Serializing borrowed strings, a BTreeMap and a slice cannot fail.
    let encoded = serde_json::to_vec(&canonical).unwrap_or_default();
    blake3::hash(&encoded).to_hex().to_string()
}
