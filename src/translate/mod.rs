//! API translation between the canonical (OpenAI-compatible) and SenseNova formats.
//!
//! Converts requests, complete responses, and streaming events between the two
//! shapes. All translation functions are pure (no I/O).

pub mod openai_types;
pub mod request;
pub mod response;
pub mod sensetime_types;
pub mod streaming;

use serde::{Deserialize, Deserializer};

/// Treat an explicit JSON `null` like a missing field. Pair with `#[serde(default)]`.
pub(crate) fn null_to_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
