//! Internal helpers for model validation and conversion.
//!
//! These utilities are **not** part of the public API. They centralize
//! validation and mapping logic so the engine enforces consistent invariants.

use uuid::Uuid;

use crate::{EngineError, ResultEngine};

/// Parse a UUID coming out of storage and return a labeled error on failure.
///
/// Only stored identifiers go through this, so a parse failure means the
/// ledger itself is damaged.
pub(crate) fn parse_uuid(value: &str, label: &str) -> ResultEngine<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| EngineError::LedgerCorruption(format!("invalid {label} id: {value}")))
}
