use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::utils::address::CanonicalAddress;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InvolverRole {
    Generic,
    /// Fungible token participants.
    Erc20,
    /// Non-fungible token participants.
    Nft,
}

/// Addresses materially affected by a transaction, grouped by role. Built per
/// request and discarded once the response is written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct InvolverSet {
    involvers: BTreeMap<InvolverRole, BTreeSet<CanonicalAddress>>,
}

impl InvolverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, role: InvolverRole, address: CanonicalAddress) -> bool {
        self.involvers.entry(role).or_default().insert(address)
    }

    pub fn merge(&mut self, other: InvolverSet) {
        for (role, addresses) in other.involvers {
            self.involvers.entry(role).or_default().extend(addresses);
        }
    }

    pub fn addresses(&self, role: InvolverRole) -> impl Iterator<Item = &CanonicalAddress> {
        self.involvers.get(&role).into_iter().flatten()
    }

    pub fn contains(&self, role: InvolverRole, address: &str) -> bool {
        self.involvers
            .get(&role)
            .is_some_and(|set| set.iter().any(|a| a.as_str() == address))
    }

    /// Distinct addresses across every role.
    pub fn all_addresses(&self) -> BTreeSet<&CanonicalAddress> {
        self.involvers.values().flatten().collect()
    }

    pub fn len(&self, role: InvolverRole) -> usize {
        self.involvers.get(&role).map_or(0, BTreeSet::len)
    }

    pub fn is_empty(&self) -> bool {
        self.involvers.values().all(BTreeSet::is_empty)
    }
}
