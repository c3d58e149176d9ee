//! Read-side listing of an owner's entries.

use serde::{Deserialize, Serialize};

use crate::entry::{EntryKind, LedgerEntry};

pub const DEFAULT_PAGE_LIMIT: u32 = 10;
pub const MAX_PAGE_LIMIT: u32 = 500;

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    DEFAULT_PAGE_LIMIT
}

/// Filter + 1-based pagination over an owner's entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryFilter {
    #[serde(default)]
    pub kind: Option<EntryKind>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

impl Default for EntryFilter {
    fn default() -> Self {
        Self {
            kind: None,
            category: None,
            page: default_page(),
            limit: default_limit(),
        }
    }
}

impl EntryFilter {
    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        self.kind.is_none_or(|k| k == entry.kind)
            && self.category.as_deref().is_none_or(|c| c == entry.category)
    }

    pub fn limit(&self) -> u32 {
        self.limit.clamp(1, MAX_PAGE_LIMIT)
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.max(1) - 1) * u64::from(self.limit())
    }

    /// Filter, order newest first and cut one page out of `entries`.
    pub fn paginate<'a>(&self, entries: impl IntoIterator<Item = &'a LedgerEntry>) -> Page<LedgerEntry> {
        let mut matching: Vec<&LedgerEntry> = entries.into_iter().filter(|e| self.matches(e)).collect();
        matching.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at).then_with(|| b.id.cmp(&a.id)));

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(usize::try_from(self.offset()).unwrap_or(usize::MAX))
            .take(self.limit() as usize)
            .cloned()
            .collect();

        Page {
            items,
            total,
            page: self.page.max(1),
            limit: self.limit(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}
