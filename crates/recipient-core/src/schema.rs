//! Typed decoding at the data service boundary.
//!
//! Remote payloads are checked against the record schemas exactly once, when
//! they cross into the core. Components past this point never inspect shapes.

use crate::error::DashboardError;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Decode an untyped payload into `T`, naming `context` on failure.
pub fn decode<T: DeserializeOwned>(context: &str, payload: Value) -> Result<T, DashboardError> {
    serde_json::from_value(payload).map_err(|e| DashboardError::schema(context, e.to_string()))
}

pub fn decode_slice<T: DeserializeOwned>(context: &str, bytes: &[u8]) -> Result<T, DashboardError> {
    serde_json::from_slice(bytes).map_err(|e| DashboardError::schema(context, e.to_string()))
}
