// ciris-core/src/dma/variance.rs
// ============================================================================
// Module: CIRIS Identity Variance
// Description: Normalized attribute-diff metric for identity mutations.
// Purpose: Quantify how far a proposed identity write drifts from the root.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! Identity-scope writes must stay within a bounded variance of the stored
//! identity root. The metric is a symmetric normalized attribute diff over
//! the top-level attribute maps: `changed_keys / union_keys`, where a key
//! counts as changed when it is added, removed, or value-unequal under deep
//! JSON equality. Proposals exceeding the threshold are forced through defer.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde_json::Value;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default variance threshold above which identity writes are deferred.
pub const DEFAULT_IDENTITY_VARIANCE_THRESHOLD: f64 = 0.20;

// ============================================================================
// SECTION: Variance Metric
// ============================================================================

/// Computes the normalized attribute variance between two identity payloads.
///
/// Returns a value in `[0, 1]`: `0.0` for identical attribute maps, `1.0`
/// when no key survives unchanged. Non-object payloads compare as a single
/// attribute.
#[must_use]
pub fn identity_variance(current: &Value, proposed: &Value) -> f64 {
    let (Some(current_map), Some(proposed_map)) = (current.as_object(), proposed.as_object())
    else {
        return if current == proposed { 0.0 } else { 1.0 };
    };

    let keys: BTreeSet<&String> = current_map.keys().chain(proposed_map.keys()).collect();
    if keys.is_empty() {
        return 0.0;
    }

    let changed =
        keys.iter().filter(|key| current_map.get(key.as_str()) != proposed_map.get(key.as_str()));
    #[allow(clippy::cast_precision_loss, reason = "Attribute counts are far below 2^52.")]
    {
        changed.count() as f64 / keys.len() as f64
    }
}
