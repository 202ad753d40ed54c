//! Merging a remote listing with the local store into one view.
//!
//! # Rules
//!
//! 1. No remote listing (offline, request failed): show the local list.
//! 2. Empty remote listing while local entries exist: show the local list.
//!    An empty page from the server must not wipe records the user can see.
//! 3. Otherwise: remote entries first, in remote order, then local entries
//!    whose id the remote did not return, in local order.
//!
//! The result is always truncated to the requested limit. The function does
//! no IO; given the same inputs it returns the same view.

use crate::record::Keyed;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Which rule produced a merged view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ViewSource {
    /// Remote and local entries were combined
    Merged,
    /// No remote listing was available
    Offline,
    /// The remote listing was empty, local entries were kept
    EmptyRemote,
}

/// The deduplicated list shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedView<T> {
    pub entries: Vec<T>,
    pub source: ViewSource,
}

impl<T: Keyed> MergedView<T> {
    pub fn ids(&self) -> Vec<&str> {
        self.entries.iter().map(Keyed::key).collect()
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.entries.iter().find(|entry| entry.key() == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<T> {
        self.entries
    }
}

/// Combine a remote listing with local entries.
///
/// `server` is `None` when the remote could not be reached.
pub fn merge<T: Keyed + Clone>(server: Option<&[T]>, local: &[T], limit: usize) -> MergedView<T> {
    let server = match server {
        None => return local_view(local, limit, ViewSource::Offline),
        Some(server) if server.is_empty() && !local.is_empty() => {
            return local_view(local, limit, ViewSource::EmptyRemote)
        }
        Some(server) => server,
    };

    let mut seen: HashSet<&str> = HashSet::with_capacity(server.len() + local.len());
    let mut entries = Vec::with_capacity(limit.min(server.len() + local.len()));

    for entry in server.iter().chain(local.iter()) {
        if entries.len() >= limit {
            break;
        }
        if seen.insert(entry.key()) {
            entries.push(entry.clone());
        }
    }

    MergedView {
        entries,
        source: ViewSource::Merged,
    }
}

fn local_view<T: Keyed + Clone>(local: &[T], limit: usize, source: ViewSource) -> MergedView<T> {
    // Local lists come from a keyed store, but dedupe anyway so the
    // at-most-one-per-id guarantee does not depend on the caller.
    let mut seen = HashSet::with_capacity(local.len());
    let entries = local
        .iter()
        .filter(|entry| seen.insert(entry.key()))
        .take(limit)
        .cloned()
        .collect();
    MergedView { entries, source }
}
