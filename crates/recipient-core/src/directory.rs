//! Search screen controller.

use crate::classifier::SearchPlan;
use crate::config::DashboardConfig;
use crate::error::DashboardError;
use crate::filter::{FilterChange, FilterStateMachine};
use crate::generation::{FetchCategory, Generation, GenerationTracker};
use crate::service::DataService;
use crate::types::{Pagination, RecipientSummary};
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lookups issued by [`RecipientDirectory::begin_search`].
pub struct PendingSearch {
    service: Arc<dyn DataService>,
    plan: SearchPlan,
    generation: Generation,
}

impl PendingSearch {
    pub fn plan(&self) -> &SearchPlan {
        &self.plan
    }

    /// External-id results first, then classified results.
    pub async fn run(&self) -> Result<Vec<RecipientSummary>, DashboardError> {
        let classified = self.service.find_recipients(&self.plan.classified);
        match &self.plan.external {
            Some(external) => {
                let (mut rows, classified) =
                    tokio::try_join!(self.service.find_recipients(external), classified)?;
                rows.extend(classified);
                Ok(rows)
            }
            None => classified.await,
        }
    }
}

/// Owns the search screen's filter and result rows.
pub struct RecipientDirectory {
    service: Arc<dyn DataService>,
    filter: FilterStateMachine,
    generations: GenerationTracker,
    rows: Vec<RecipientSummary>,
    pagination: Pagination,
    loading: bool,
    error: Option<DashboardError>,
}

impl RecipientDirectory {
    pub fn new(
        service: Arc<dyn DataService>,
        config: &DashboardConfig,
        today: NaiveDate,
        location_query: &str,
    ) -> Self {
        let filter = FilterStateMachine::from_location(config, today, location_query);
        let pagination = Pagination {
            offset: filter.state().page,
            total: filter.state().page,
        };
        Self {
            service,
            filter,
            generations: GenerationTracker::new(),
            rows: Vec::new(),
            pagination,
            loading: false,
            error: None,
        }
    }

    pub fn rows(&self) -> &[RecipientSummary] {
        &self.rows
    }

    pub fn pagination(&self) -> Pagination {
        self.pagination
    }

    pub fn filter(&self) -> &FilterStateMachine {
        &self.filter
    }

    pub fn filter_mut(&mut self) -> &mut FilterStateMachine {
        &mut self.filter
    }

    pub fn location(&self) -> &str {
        self.filter.location()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&DashboardError> {
        self.error.as_ref()
    }

    /// An empty location gets the defaults persisted; either way the current
    /// filter is searched once.
    pub async fn mount(&mut self) -> Result<(), DashboardError> {
        if let Some(query) = self.filter.sync_location() {
            debug!(query = %query, "default search filter persisted");
        }
        self.search().await.map(|_| ())
    }

    /// Apply a confirmed change. Returns whether a search was issued.
    pub async fn apply(&mut self, change: FilterChange) -> Result<bool, DashboardError> {
        let transition = self.filter.apply(change).map_err(|err| {
            self.error = Some(err.clone());
            err
        })?;
        if !transition.needs_refetch() {
            debug!(change = transition.change, "search query unchanged");
            return Ok(false);
        }
        self.search().await
    }

    pub async fn search(&mut self) -> Result<bool, DashboardError> {
        let pending = self.begin_search();
        let result = pending.run().await;
        self.finish_search(pending, result)
    }

    pub fn begin_search(&mut self) -> PendingSearch {
        self.loading = true;
        PendingSearch {
            service: self.service.clone(),
            plan: SearchPlan::for_filter(self.filter.state()),
            generation: self.generations.issue(FetchCategory::Search),
        }
    }

    /// Apply finished lookups. Returns whether they were still current.
    pub fn finish_search(
        &mut self,
        pending: PendingSearch,
        result: Result<Vec<RecipientSummary>, DashboardError>,
    ) -> Result<bool, DashboardError> {
        if !self.generations.is_current(pending.generation) {
            debug!(
                generation = pending.generation.value,
                "superseded search discarded"
            );
            return Ok(false);
        }

        self.loading = false;
        match result {
            Ok(rows) => {
                self.pagination = self.filter.pagination(rows.len());
                info!(
                    key = pending.plan.classified.key.as_str(),
                    lookups = pending.plan.remote_calls(),
                    rows = rows.len(),
                    "recipient search finished"
                );
                self.rows = rows;
                self.filter.commit();
                self.error = None;
                Ok(true)
            }
            Err(err) => {
                warn!(error = %err, "recipient search failed");
                self.filter.rollback();
                self.error = Some(err.clone());
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::LookupKey;
    use crate::testing::{day, ScriptedService, ServiceMethod};
    use std::collections::BTreeMap;

    fn directory(service: &Arc<ScriptedService>, location: &str) -> RecipientDirectory {
        RecipientDirectory::new(
            service.clone(),
            &DashboardConfig::default(),
            day(2024, 1, 31),
            location,
        )
    }

    fn search_for(term: &str) -> FilterChange {
        FilterChange::Confirm {
            search: term.to_string(),
            filters: BTreeMap::new(),
            date_range: None,
        }
    }

    #[tokio::test]
    async fn mount_on_empty_location_persists_defaults_and_fetches() {
        let service = Arc::new(ScriptedService::fixture());
        let mut directory = directory(&service, "");

        directory.mount().await.unwrap();

        assert!(directory.location().contains("count=15"));
        assert!(directory.location().contains("offset=1"));
        assert_eq!(service.calls(), vec![ServiceMethod::FindRecipients]);
        assert_eq!(service.lookups()[0].key, LookupKey::Name);
        assert_eq!(service.lookups()[0].value, "");
    }

    #[tokio::test]
    async fn recipient_id_search_issues_single_lookup() {
        let service = Arc::new(ScriptedService::fixture());
        let mut directory = directory(&service, "");

        directory
            .apply(search_for("re_ci7nheu0m0006n016o5sglg9t"))
            .await
            .unwrap();

        let lookups = service.lookups();
        assert_eq!(lookups.len(), 1);
        assert_eq!(lookups[0].key, LookupKey::Id);
        assert_eq!(directory.rows().len(), 1);
    }

    #[tokio::test]
    async fn bank_account_search_also_queries_external_id() {
        let service = Arc::new(ScriptedService::fixture());
        let mut directory = directory(&service, "");

        directory.apply(search_for("17929")).await.unwrap();

        let mut keys: Vec<_> = service.lookups().iter().map(|l| l.key).collect();
        keys.sort();
        assert_eq!(keys, vec![LookupKey::BankAccountId, LookupKey::ExternalId]);
        assert_eq!(directory.rows()[0].bank_account_id.as_deref(), Some("17929"));
    }

    #[tokio::test]
    async fn external_results_come_first_without_dedup() {
        let service = Arc::new(ScriptedService::fixture());
        let mut directory = directory(&service, "");

        // Matches one recipient both by external id and by bank account id.
        directory.apply(search_for("17931")).await.unwrap();

        let names: Vec<_> = directory.rows().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Quiosque Praia", "Quiosque Praia"]);
    }

    #[tokio::test]
    async fn lookups_carry_page_and_size() {
        let service = Arc::new(ScriptedService::fixture());
        let mut directory = directory(&service, "?count=30&offset=2&search=Loja");

        directory.search().await.unwrap();

        for lookup in service.lookups() {
            assert_eq!((lookup.count, lookup.page), (30, 2));
        }
    }

    #[tokio::test]
    async fn short_page_reports_current_offset() {
        let service = Arc::new(ScriptedService::fixture());
        let mut directory = directory(&service, "");

        directory.mount().await.unwrap();

        assert_eq!(directory.rows().len(), 3);
        assert_eq!(directory.pagination(), Pagination { offset: 1, total: 1 });
    }

    #[tokio::test]
    async fn failed_lookup_surfaces_error() {
        let service = Arc::new(ScriptedService::fixture());
        service.fail(ServiceMethod::FindRecipients);
        let mut directory = directory(&service, "");

        assert!(directory.mount().await.is_err());
        assert!(directory.error().is_some());
        assert!(!directory.is_loading());
    }

    #[tokio::test]
    async fn failed_search_can_be_retried() {
        let service = Arc::new(ScriptedService::fixture());
        let mut directory = directory(&service, "");
        directory.mount().await.unwrap();
        let location = directory.location().to_string();
        service.fail(ServiceMethod::FindRecipients);

        assert!(directory.apply(search_for("Loja Norte")).await.is_err());
        assert_eq!(directory.filter().state().search, "");
        assert_eq!(directory.location(), location);

        service.recover(ServiceMethod::FindRecipients);
        assert!(directory.apply(search_for("Loja Norte")).await.unwrap());
        let names: Vec<_> = directory.rows().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Loja Norte"]);
    }

    #[tokio::test]
    async fn page_size_change_restarts_search_at_first_page() {
        let service = Arc::new(ScriptedService::fixture());
        let mut directory = directory(&service, "?count=15&offset=3");

        directory.apply(FilterChange::PageSize(30)).await.unwrap();

        let lookup = service.lookups().last().cloned().unwrap();
        assert_eq!((lookup.count, lookup.page), (30, 1));
    }

    #[tokio::test]
    async fn superseded_search_is_discarded() {
        let service = Arc::new(ScriptedService::fixture());
        let mut directory = directory(&service, "");

        let stale = directory.begin_search();
        directory.filter_mut().apply(search_for("Loja Norte")).unwrap();
        let fresh = directory.begin_search();

        let fresh_rows = fresh.run().await;
        assert!(directory.finish_search(fresh, fresh_rows).unwrap());
        let stale_rows = stale.run().await;
        assert!(!directory.finish_search(stale, stale_rows).unwrap());

        let names: Vec<_> = directory.rows().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Loja Norte"]);
    }
}
