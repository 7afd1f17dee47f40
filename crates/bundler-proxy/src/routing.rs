//! Frozen routing snapshot: both backends and the entry points each serves.
//!
//! Built once after discovery and shared read-only behind an `Arc`.

use crate::backend::{Backend, BackendVersion};

/// Entry point addresses reported by one backend, in reported order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryPointSet {
    addresses: Vec<String>,
}

impl EntryPointSet {
    pub fn new(addresses: Vec<String>) -> Self {
        Self { addresses }
    }

    /// Exact string membership, as reported by the bundler.
    pub fn contains(&self, address: &str) -> bool {
        self.addresses.iter().any(|a| a == address)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.addresses.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

/// Backend plus the entry points it owns.
#[derive(Debug, Clone)]
pub struct Route {
    pub backend: Backend,
    pub entry_points: EntryPointSet,
}

#[derive(Debug, Clone)]
pub struct RoutingTable {
    v06: Route,
    v07: Route,
}

impl RoutingTable {
    /// Addresses reported by both backends are logged; resolution keeps
    /// preferring v0.6 for them.
    pub fn new(v06: Route, v07: Route) -> Self {
        let table = Self { v06, v07 };
        let overlap = table.overlapping();
        if !overlap.is_empty() {
            tracing::warn!(
                entry_points = ?overlap,
                "Entry points reported by both bundlers, v0.6 will serve them"
            );
        }
        table
    }

    pub fn route(&self, version: BackendVersion) -> &Route {
        match version {
            BackendVersion::V06 => &self.v06,
            BackendVersion::V07 => &self.v07,
        }
    }

    pub fn backend(&self, version: BackendVersion) -> &Backend {
        &self.route(version).backend
    }

    /// Owner of `entry_point`, checking v0.6 before v0.7.
    pub fn resolve(&self, entry_point: &str) -> Option<BackendVersion> {
        if self.v06.entry_points.contains(entry_point) {
            Some(BackendVersion::V06)
        } else if self.v07.entry_points.contains(entry_point) {
            Some(BackendVersion::V07)
        } else {
            None
        }
    }

    pub fn is_supported(&self, entry_point: &str) -> bool {
        self.resolve(entry_point).is_some()
    }

    /// v0.6 entry points followed by v0.7 entry points, duplicates kept.
    pub fn all_entry_points(&self) -> impl Iterator<Item = &str> {
        self.v06.entry_points.iter().chain(self.v07.entry_points.iter())
    }

    pub fn overlapping(&self) -> Vec<&str> {
        self.v06
            .entry_points
            .iter()
            .filter(|ep| self.v07.entry_points.contains(ep))
            .collect()
    }
}
