use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fetch categories that are tracked independently for staleness.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FetchCategory {
    Recipient,
    AnticipationLimit,
    BalancePage,
    BalanceTotals,
    Search,
}

impl FetchCategory {
    pub fn name(self) -> &'static str {
        match self {
            Self::Recipient => "recipient",
            Self::AnticipationLimit => "anticipation_limit",
            Self::BalancePage => "balance_page",
            Self::BalanceTotals => "balance_totals",
            Self::Search => "search",
        }
    }
}

/// Token attached to one in-flight fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation {
    pub category: FetchCategory,
    pub value: u64,
}

/// Per-category monotonically increasing counters.
///
/// A response is applied only if its token is still the latest issued for its
/// category; anything older lost the race to a newer request.
#[derive(Debug, Clone, Default)]
pub struct GenerationTracker {
    latest: BTreeMap<FetchCategory, u64>,
}

impl GenerationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&mut self, category: FetchCategory) -> Generation {
        let value = self.latest.entry(category).or_insert(0);
        *value += 1;
        Generation {
            category,
            value: *value,
        }
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        self.latest.get(&generation.category).copied() == Some(generation.value)
    }

    pub fn latest(&self, category: FetchCategory) -> u64 {
        self.latest.get(&category).copied().unwrap_or(0)
    }
}
