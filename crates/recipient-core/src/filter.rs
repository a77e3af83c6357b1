use crate::aggregation::RefetchScope;
use crate::config::DashboardConfig;
use crate::error::DashboardError;
use crate::query::QueryPersistence;
use crate::types::{DateRange, FilterState, Pagination, SortOrder};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::debug;

/// Confirmed user actions that replace the filter state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterChange {
    Confirm {
        search: String,
        filters: BTreeMap<String, Vec<String>>,
        date_range: Option<DateRange>,
    },
    Clear,
    DateRange(DateRange),
    Page(u32),
    PageSize(u32),
    Order(SortOrder),
}

impl FilterChange {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Confirm { .. } => "confirm",
            Self::Clear => "clear",
            Self::DateRange(_) => "date_range",
            Self::Page(_) => "page",
            Self::PageSize(_) => "page_size",
            Self::Order(_) => "order",
        }
    }
}

/// Row selection and expansion; dropped on every confirmed change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransientSelection {
    expanded: Vec<usize>,
    selected: Vec<usize>,
}

impl TransientSelection {
    pub fn toggle_expanded(&mut self, row: usize) {
        if let Some(idx) = self.expanded.iter().position(|r| *r == row) {
            self.expanded.remove(idx);
        } else {
            self.expanded.push(row);
        }
    }

    pub fn set_expanded(&mut self, rows: Vec<usize>) {
        self.expanded = rows;
    }

    pub fn set_selected(&mut self, rows: Vec<usize>) {
        self.selected = rows;
    }

    pub fn expanded(&self) -> &[usize] {
        &self.expanded
    }

    pub fn selected(&self) -> &[usize] {
        &self.selected
    }

    pub fn clear(&mut self) {
        self.expanded.clear();
        self.selected.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.expanded.is_empty() && self.selected.is_empty()
    }
}

/// Outcome of one confirmed change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterTransition {
    pub change: &'static str,
    pub scope: RefetchScope,
    pub state: FilterState,
    /// New persisted query; `None` when the serialized state did not change.
    pub query: Option<String>,
}

impl FilterTransition {
    pub fn needs_refetch(&self) -> bool {
        self.query.is_some()
    }
}

/// What a page-size change does to the current page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PageSizePolicy {
    /// Restart at page 1. Used by the search list.
    #[default]
    FirstPage,
    /// Stay on the current page. Used by the detail screen's operations table.
    KeepPage,
}

/// Owns the screen's [`FilterState`] and decides what each change re-fetches.
///
/// A change is applied and persisted immediately so the fetch it triggers can
/// be built from it. The last state backed by a successful fetch is kept
/// aside; [`rollback`](Self::rollback) restores it when the fetch fails, so
/// retrying the same change is not mistaken for a no-op.
#[derive(Debug, Clone)]
pub struct FilterStateMachine {
    state: FilterState,
    persistence: QueryPersistence,
    committed: FilterState,
    committed_query: String,
    selection: TransientSelection,
    page_size_policy: PageSizePolicy,
    pagination_upper_bound: u32,
}

impl FilterStateMachine {
    /// Restore from the current location query, or the configured defaults
    /// when the location carries none.
    pub fn from_location(config: &DashboardConfig, today: NaiveDate, location_query: &str) -> Self {
        let persistence = QueryPersistence::new(config.initial_filter(today), location_query);
        let state = persistence.parse(location_query);
        Self {
            committed: state.clone(),
            committed_query: persistence.current().to_string(),
            state,
            persistence,
            selection: TransientSelection::default(),
            page_size_policy: PageSizePolicy::default(),
            pagination_upper_bound: config.pagination_upper_bound,
        }
    }

    pub fn with_page_size_policy(mut self, policy: PageSizePolicy) -> Self {
        self.page_size_policy = policy;
        self
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }

    pub fn location(&self) -> &str {
        self.persistence.current()
    }

    pub fn selection(&self) -> &TransientSelection {
        &self.selection
    }

    pub fn selection_mut(&mut self) -> &mut TransientSelection {
        &mut self.selection
    }

    /// Write the current state to an empty location. Returns the query when
    /// something was persisted.
    pub fn sync_location(&mut self) -> Option<String> {
        let query = self.persistence.persist(&self.state)?;
        if self.state == self.committed {
            self.committed_query = query.clone();
        }
        Some(query)
    }

    /// Record the current state as the one the screen's data was fetched for.
    pub fn commit(&mut self) {
        self.committed = self.state.clone();
        self.committed_query = self.persistence.current().to_string();
    }

    /// Restore the last committed state and location. Returns whether
    /// anything was rolled back.
    pub fn rollback(&mut self) -> bool {
        if self.state == self.committed && self.persistence.current() == self.committed_query {
            return false;
        }
        debug!(
            page = self.committed.page,
            query = %self.committed_query,
            "filter rolled back to last fetched state"
        );
        self.state = self.committed.clone();
        self.persistence.restore(self.committed_query.clone());
        true
    }

    pub fn apply(&mut self, change: FilterChange) -> Result<FilterTransition, DashboardError> {
        let next = self.next_state(&change)?;
        self.selection.clear();

        let scope = scope_between(&self.state, &next);
        let query = self.persistence.persist(&next);
        if query.is_none() {
            debug!(change = change.name(), "filter change left query unchanged");
        }
        self.state = next;

        Ok(FilterTransition {
            change: change.name(),
            scope,
            state: self.state.clone(),
            query,
        })
    }

    /// Page count heuristic for a list that returned `rows` rows.
    pub fn pagination(&self, rows: usize) -> Pagination {
        Pagination::estimate(
            rows,
            self.state.page_size,
            self.state.page,
            self.pagination_upper_bound,
        )
    }

    fn next_state(&self, change: &FilterChange) -> Result<FilterState, DashboardError> {
        let mut next = self.state.clone();
        match change {
            FilterChange::Confirm {
                search,
                filters,
                date_range,
            } => {
                next.search = search.clone();
                next.filters = filters.clone();
                if let Some(range) = date_range {
                    next.date_range = checked_range(*range)?;
                }
            }
            FilterChange::Clear => {
                next = self.persistence.defaults().clone();
            }
            FilterChange::DateRange(range) => {
                next.date_range = checked_range(*range)?;
            }
            FilterChange::Page(page) => {
                if *page == 0 {
                    return Err(DashboardError::InvalidQuery(
                        "page must be positive".to_string(),
                    ));
                }
                next.page = *page;
                return Ok(next);
            }
            FilterChange::PageSize(size) => {
                if *size == 0 {
                    return Err(DashboardError::InvalidQuery(
                        "page size must be positive".to_string(),
                    ));
                }
                next.page_size = *size;
                if self.page_size_policy == PageSizePolicy::KeepPage {
                    return Ok(next);
                }
            }
            FilterChange::Order(order) => {
                next.sort = Some(order.clone());
            }
        }

        next.page = 1;
        Ok(next)
    }
}

fn checked_range(range: DateRange) -> Result<DateRange, DashboardError> {
    if range.start > range.end {
        return Err(DashboardError::InvalidQuery(format!(
            "date range starts {} after it ends {}",
            range.start, range.end
        )));
    }
    Ok(range)
}

fn scope_between(current: &FilterState, next: &FilterState) -> RefetchScope {
    if current.date_range != next.date_range {
        RefetchScope::DateRange
    } else if current.page_size != next.page_size {
        RefetchScope::PageSize
    } else if current.search != next.search
        || current.filters != next.filters
        || current.sort != next.sort
    {
        RefetchScope::Query
    } else if current.page != next.page {
        RefetchScope::Page
    } else {
        RefetchScope::Query
    }
}
