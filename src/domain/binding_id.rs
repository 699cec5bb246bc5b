//! Type-safe handler binding identifier.
//!
//! [`BindingId`] is a newtype wrapper around [`uuid::Uuid`] (v4) so that
//! binding identifiers cannot be confused with other UUIDs in log fields.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for one [`super::HandlerBinding`].
///
/// Generated once at registration time and immutable thereafter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BindingId(uuid::Uuid);

impl BindingId {
    /// Creates a new random `BindingId` (UUID v4).
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Returns the inner [`uuid::Uuid`].
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for BindingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
