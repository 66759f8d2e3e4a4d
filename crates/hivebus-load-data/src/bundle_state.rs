/// Bundle ownership state machine
/// Tracks the transfer/split lifecycle of each bundle; absence of an entry is
/// the tombstone state and is modeled as `None`.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Ownership state of a bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleState {
    /// A broker owns the bundle and serves its topics
    Owned,
    /// The bundle has been assigned to a broker that has not yet taken ownership
    Assigned,
    /// The previous owner released the bundle during a transfer
    Released,
    /// The bundle is being split into children
    Splitting,
}

#[derive(Error, Debug)]
#[error("invalid bundle state transition for '{bundle}': {from:?} -> {to:?}")]
pub struct TransitionError {
    pub bundle: String,
    pub from: Option<BundleState>,
    pub to: Option<BundleState>,
}

/// Whether `from -> to` appears in the valid-transition table
/// `None` on either side is the tombstone / no-entry state.
pub fn is_valid_transition(from: Option<BundleState>, to: Option<BundleState>) -> bool {
    use BundleState::*;
    matches!(
        (from, to),
        (None, Some(Owned))
            | (None, Some(Assigned))
            | (Some(Owned), Some(Assigned))
            | (Some(Owned), Some(Splitting))
            | (Some(Owned), None)
            | (Some(Assigned), Some(Owned))
            | (Some(Assigned), Some(Released))
            | (Some(Assigned), None)
            | (Some(Released), Some(Owned))
            | (Some(Released), None)
            | (Some(Splitting), None)
    )
}

/// Thread-safe table of per-bundle ownership states
pub struct BundleStateTable {
    states: DashMap<String, BundleState>,
}

impl BundleStateTable {
    pub fn new() -> Self {
        BundleStateTable {
            states: DashMap::new(),
        }
    }

    /// Current state of a bundle, `None` when tombstoned or never seen
    pub fn state(&self, bundle: &str) -> Option<BundleState> {
        self.states.get(bundle).map(|s| *s)
    }

    /// Apply a transition, rejecting anything outside the valid table
    ///
    /// `to = None` tombstones the entry.
    pub fn transition(
        &self,
        bundle: &str,
        to: Option<BundleState>,
    ) -> Result<(), TransitionError> {
        match self.states.entry(bundle.to_string()) {
            Entry::Occupied(mut occupied) => {
                let from = Some(*occupied.get());
                if !is_valid_transition(from, to) {
                    return Err(TransitionError {
                        bundle: bundle.to_string(),
                        from,
                        to,
                    });
                }
                match to {
                    Some(next) => {
                        *occupied.get_mut() = next;
                    }
                    None => {
                        occupied.remove();
                    }
                }
                debug!(bundle, ?from, ?to, "bundle state transition");
                Ok(())
            }
            Entry::Vacant(vacant) => {
                if !is_valid_transition(None, to) {
                    return Err(TransitionError {
                        bundle: bundle.to_string(),
                        from: None,
                        to,
                    });
                }
                if let Some(next) = to {
                    vacant.insert(next);
                }
                debug!(bundle, from = "none", ?to, "bundle state transition");
                Ok(())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl Default for BundleStateTable {
    fn default() -> Self {
        Self::new()
    }
}
