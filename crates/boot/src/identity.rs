//! Install identity: adopt a legacy identity once, otherwise mint a fresh one.

use hoard_common::{PlayerId, StateTree, Value, fields};
use hoard_migrate::Migration;
use std::sync::Arc;

use crate::boundary::LegacyIdentitySource;

/// Completion flag guarding legacy adoption.
pub const ADOPT_LEGACY_IDENTITY: &str = "adopt_legacy_identity";

/// Where the identity committed at startup came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    /// Already present in persisted state.
    Stored,
    /// Copied from the legacy storage location.
    Legacy,
    /// Freshly generated this startup.
    Generated,
}

/// The identity held in `state`, if it is a non-empty string.
pub fn current_identity(state: &StateTree) -> Option<&str> {
    state
        .get(fields::IDENTITY)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// One-time adoption of the identity an older client stored under `legacy_key`.
///
/// Runs under its own completion flag so a legacy value is only ever consulted
/// on the first startup with this store. Leaves state untouched if an identity
/// already exists or the legacy value is absent.
pub fn adopt_legacy_identity(
    legacy: Arc<dyn LegacyIdentitySource>,
    legacy_key: String,
) -> Migration {
    Migration::new(ADOPT_LEGACY_IDENTITY, move |mut state: StateTree| {
        if current_identity(&state).is_some() {
            return Ok(state);
        }
        match legacy.lookup(&legacy_key) {
            Some(id) if !id.trim().is_empty() => {
                tracing::info!("adopted legacy identity");
                state.insert(fields::IDENTITY, Value::String(id.trim().to_string()));
            }
            _ => tracing::debug!(key = %legacy_key, "no legacy identity to adopt"),
        }
        Ok(state)
    })
}

/// Guarantee `state` carries an identity, generating one if needed.
pub fn ensure_identity(mut state: StateTree) -> (StateTree, String, bool) {
    if let Some(id) = current_identity(&state) {
        let id = id.to_string();
        return (state, id, false);
    }
    let id = PlayerId::new().to_string();
    tracing::info!("generated new identity");
    state.insert(fields::IDENTITY, Value::String(id.clone()));
    (state, id, true)
}
