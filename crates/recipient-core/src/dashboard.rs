//! Detail screen controller.
//!
//! [`RecipientDashboard`] is the single owner of the recipient's
//! [`ViewModel`] and the screen's [`FilterState`](crate::types::FilterState).
//! Remote work is split into a synchronous `begin_*` step that issues
//! generation tokens, an owned pending future that borrows nothing from the
//! controller, and a `finish_*` step that drops any fragment whose token was
//! superseded while it was in flight.

use crate::aggregation::{AggregationEngine, BalanceRefresh, RefetchScope};
use crate::cancellation::{CancellationFlow, CancellationState};
use crate::config::DashboardConfig;
use crate::error::DashboardError;
use crate::filter::{FilterChange, FilterStateMachine, PageSizePolicy};
use crate::generation::{FetchCategory, Generation, GenerationTracker};
use crate::mutation::{BankAccountSave, MutationCoordinator, MutationResult};
use crate::service::{DataService, ExportArtifact, ExportFormat, Exporter};
use crate::types::{AnticipationConfig, FilterState, Pagination, TransferConfig, ViewModel};
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Categories a full reload of the detail screen refreshes.
const LOAD_CATEGORIES: [FetchCategory; 4] = [
    FetchCategory::Recipient,
    FetchCategory::AnticipationLimit,
    FetchCategory::BalancePage,
    FetchCategory::BalanceTotals,
];

/// Full aggregated load issued by [`RecipientDashboard::begin_load`].
pub struct PendingLoad {
    engine: AggregationEngine,
    filter: FilterState,
    generations: Vec<Generation>,
}

impl PendingLoad {
    pub async fn run(&self) -> Result<ViewModel, DashboardError> {
        self.engine.initial_load(&self.filter).await
    }
}

/// Balance refetch issued by [`RecipientDashboard::begin_refetch`].
pub struct PendingRefetch {
    engine: AggregationEngine,
    scope: RefetchScope,
    filter: FilterState,
    page: Generation,
    totals: Option<Generation>,
}

impl PendingRefetch {
    pub fn scope(&self) -> RefetchScope {
        self.scope
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub async fn run(&self) -> Result<BalanceRefresh, DashboardError> {
        self.engine.refetch(self.scope, &self.filter).await
    }
}

pub struct RecipientDashboard {
    engine: AggregationEngine,
    mutations: MutationCoordinator,
    exporter: Arc<dyn Exporter>,
    filter: FilterStateMachine,
    generations: GenerationTracker,
    cancellation: CancellationFlow,
    view: Option<ViewModel>,
    loading: bool,
    saving: bool,
    exporting: bool,
    configuration_saved: bool,
    page_error: Option<DashboardError>,
    local_error: Option<DashboardError>,
}

impl RecipientDashboard {
    /// Build the controller for `recipient_id`, restoring the filter from
    /// `location_query` when it carries one.
    pub fn new(
        service: Arc<dyn DataService>,
        exporter: Arc<dyn Exporter>,
        recipient_id: impl Into<String>,
        config: DashboardConfig,
        today: NaiveDate,
        location_query: &str,
    ) -> Self {
        let recipient_id = recipient_id.into();
        let filter = FilterStateMachine::from_location(&config, today, location_query)
            .with_page_size_policy(PageSizePolicy::KeepPage);
        let mutations = MutationCoordinator::new(service.clone(), recipient_id.clone());
        let engine = AggregationEngine::new(service, recipient_id, config);

        Self {
            engine,
            mutations,
            exporter,
            filter,
            generations: GenerationTracker::new(),
            cancellation: CancellationFlow::new(),
            view: None,
            loading: false,
            saving: false,
            exporting: false,
            configuration_saved: false,
            page_error: None,
            local_error: None,
        }
    }

    pub fn recipient_id(&self) -> &str {
        self.engine.recipient_id()
    }

    pub fn view(&self) -> Option<&ViewModel> {
        self.view.as_ref()
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

    pub fn is_saving(&self) -> bool {
        self.saving
    }

    pub fn is_exporting(&self) -> bool {
        self.exporting
    }

    pub fn configuration_saved(&self) -> bool {
        self.configuration_saved
    }

    pub fn dismiss_saved_notice(&mut self) {
        self.configuration_saved = false;
    }

    pub fn page_error(&self) -> Option<&DashboardError> {
        self.page_error.as_ref()
    }

    pub fn local_error(&self) -> Option<&DashboardError> {
        self.local_error.as_ref()
    }

    pub fn cancellation(&self) -> &CancellationState {
        self.cancellation.state()
    }

    /// Pagination for the operations table of the loaded page.
    pub fn pagination(&self) -> Option<Pagination> {
        self.view
            .as_ref()
            .map(|view| self.filter.pagination(view.balance.operations.len()))
    }

    /// Persist the initial filter into an empty location and load.
    pub async fn mount(&mut self) -> Result<(), DashboardError> {
        if let Some(query) = self.filter.sync_location() {
            debug!(recipient = %self.recipient_id(), query = %query, "initial filter persisted");
        }
        self.load().await
    }

    /// Drop the view and invalidate everything still in flight.
    pub fn unmount(&mut self) {
        for category in LOAD_CATEGORIES {
            self.generations.issue(category);
        }
        self.view = None;
        self.loading = false;
        self.cancellation = CancellationFlow::new();
    }

    pub async fn load(&mut self) -> Result<(), DashboardError> {
        let pending = self.begin_load();
        let result = pending.run().await;
        self.finish_load(pending, result).map(|_| ())
    }

    pub fn begin_load(&mut self) -> PendingLoad {
        self.loading = true;
        let generations = LOAD_CATEGORIES
            .iter()
            .map(|category| self.generations.issue(*category))
            .collect();
        PendingLoad {
            engine: self.engine.clone(),
            filter: self.filter.state().clone(),
            generations,
        }
    }

    /// Apply a finished load. Returns whether it was applied.
    pub fn finish_load(
        &mut self,
        pending: PendingLoad,
        result: Result<ViewModel, DashboardError>,
    ) -> Result<bool, DashboardError> {
        if let Some(stale) = pending
            .generations
            .iter()
            .find(|g| !self.generations.is_current(**g))
        {
            debug!(
                recipient = %self.recipient_id(),
                category = stale.category.name(),
                "superseded load discarded"
            );
            return Ok(false);
        }

        self.loading = false;
        match result {
            Ok(view) => {
                self.view = Some(view);
                self.filter.commit();
                self.page_error = None;
                self.local_error = None;
                Ok(true)
            }
            Err(err) => {
                warn!(recipient = %self.recipient_id(), error = %err, "recipient load failed");
                self.view = None;
                self.page_error = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Apply a confirmed filter change and re-run what it invalidated.
    /// Returns the scope that was refetched, if any.
    pub async fn apply_filter(
        &mut self,
        change: FilterChange,
    ) -> Result<Option<RefetchScope>, DashboardError> {
        let Some(pending) = self.begin_refetch(change)? else {
            return Ok(None);
        };
        let result = pending.run().await;
        self.finish_refetch(pending, result)
    }

    pub fn begin_refetch(
        &mut self,
        change: FilterChange,
    ) -> Result<Option<PendingRefetch>, DashboardError> {
        let transition = self.filter.apply(change).map_err(|err| {
            self.local_error = Some(err.clone());
            err
        })?;

        if !transition.needs_refetch() {
            debug!(change = transition.change, "query unchanged, refetch skipped");
            return Ok(None);
        }
        if self.view.is_none() {
            debug!(change = transition.change, "no view loaded, refetch skipped");
            return Ok(None);
        }

        let page = self.generations.issue(FetchCategory::BalancePage);
        let totals = transition
            .scope
            .recomputes_totals()
            .then(|| self.generations.issue(FetchCategory::BalanceTotals));
        self.loading = true;

        Ok(Some(PendingRefetch {
            engine: self.engine.clone(),
            scope: transition.scope,
            filter: transition.state,
            page,
            totals,
        }))
    }

    /// Merge the fragments of a finished refetch that are still current.
    pub fn finish_refetch(
        &mut self,
        pending: PendingRefetch,
        result: Result<BalanceRefresh, DashboardError>,
    ) -> Result<Option<RefetchScope>, DashboardError> {
        let page_current = self.generations.is_current(pending.page);
        let totals_current = pending
            .totals
            .map(|g| self.generations.is_current(g))
            .unwrap_or(false);

        if !page_current && !totals_current {
            debug!(scope = pending.scope.name(), "superseded refetch discarded");
            return Ok(None);
        }
        if page_current {
            self.loading = false;
        }

        let refresh = match result {
            Ok(refresh) => refresh,
            Err(err) => {
                warn!(scope = pending.scope.name(), error = %err, "balance refetch failed");
                if page_current {
                    self.filter.rollback();
                }
                self.local_error = Some(err.clone());
                return Err(err);
            }
        };

        let Some(view) = self.view.as_mut() else {
            debug!(scope = pending.scope.name(), "view gone, refetch discarded");
            return Ok(None);
        };
        if page_current {
            view.balance = refresh.page;
            self.filter.commit();
        } else {
            debug!(scope = pending.scope.name(), "stale balance page discarded");
        }
        if totals_current {
            if let Some(totals) = refresh.totals {
                view.totals = totals;
            }
        }
        self.local_error = None;

        info!(
            recipient = %self.engine.recipient_id(),
            scope = pending.scope.name(),
            page = pending.filter.page,
            "balance view refreshed"
        );
        Ok(Some(pending.scope))
    }

    pub async fn save_anticipation_config(&mut self, data: AnticipationConfig) -> MutationResult {
        self.start_saving()?;
        let result = match self.view.as_mut() {
            Some(view) => self.mutations.save_anticipation_config(view, data).await,
            None => Err(DashboardError::NotLoaded),
        };
        self.finish_saving(result)
    }

    pub async fn save_transfer_config(&mut self, data: TransferConfig) -> MutationResult {
        self.start_saving()?;
        let result = match self.view.as_mut() {
            Some(view) => self.mutations.save_transfer_config(view, data).await,
            None => Err(DashboardError::NotLoaded),
        };
        self.finish_saving(result)
    }

    pub async fn save_bank_account(&mut self, data: BankAccountSave) -> MutationResult {
        self.start_saving()?;
        let result = match self.view.as_mut() {
            Some(view) => self.mutations.save_bank_account(view, data).await,
            None => Err(DashboardError::NotLoaded),
        };
        self.finish_saving(result)
    }

    fn start_saving(&mut self) -> Result<(), DashboardError> {
        if self.saving {
            return Err(DashboardError::Busy("save"));
        }
        self.saving = true;
        self.configuration_saved = false;
        Ok(())
    }

    fn finish_saving(&mut self, result: MutationResult) -> MutationResult {
        self.saving = false;
        match &result {
            Ok(_) => {
                self.configuration_saved = true;
                self.local_error = None;
            }
            Err(err) => self.local_error = Some(err.clone()),
        }
        result
    }

    /// Open the confirmation prompt for the pending request `id`.
    pub fn request_cancel(&mut self, id: impl Into<String>) -> Result<(), DashboardError> {
        let id = id.into();
        let view = self.view.as_ref().ok_or(DashboardError::NotLoaded)?;
        if !view.requests().iter().any(|r| r.id == id) {
            return Err(DashboardError::InvalidQuery(format!(
                "no pending anticipation request '{id}'"
            )));
        }
        self.cancellation.request(id)
    }

    pub fn dismiss_cancel(&mut self) -> Result<(), DashboardError> {
        self.cancellation.dismiss()
    }

    /// Cancel the request awaiting confirmation. Returns the removed id.
    pub async fn confirm_cancel(&mut self) -> Result<String, DashboardError> {
        let service = self.engine.service();
        let recipient_id = self.engine.recipient_id().to_string();

        let result = match self.view.as_mut() {
            Some(view) => {
                self.cancellation
                    .confirm(service.as_ref(), &recipient_id, &mut view.balance.requests)
                    .await
            }
            None => Err(DashboardError::NotLoaded),
        };

        match result {
            Ok(id) => {
                self.page_error = None;
                Ok(id)
            }
            Err(err) => {
                self.page_error = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Export the statement for the current date range and hand it to the
    /// exporter. The view is never touched.
    pub async fn export(
        &mut self,
        format: ExportFormat,
        today: NaiveDate,
    ) -> Result<ExportArtifact, DashboardError> {
        if self.exporting {
            return Err(DashboardError::Busy("export"));
        }
        self.exporting = true;

        let dates = self.filter.state().date_range;
        let result = async {
            let artifact = self.engine.export(dates, format, today).await?;
            self.exporter.deliver(artifact.clone()).await?;
            Ok::<_, DashboardError>(artifact)
        }
        .await;

        self.exporting = false;
        if let Err(err) = &result {
            warn!(recipient = %self.engine.recipient_id(), error = %err, "statement export failed");
        }
        result
    }
}
