use crate::config::DashboardConfig;
use crate::error::DashboardError;
use crate::service::{
    BalanceQuery, DataService, ExportArtifact, ExportFormat, ExportQuery, OperationsQuery,
};
use crate::types::{
    AnticipationLimit, BalanceCursor, BalancePage, BalanceTotals, DateRange, FilterState,
    RecipientData, ViewModel,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Which fetches a filter change re-runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RefetchScope {
    /// Balance page at page 1 plus totals for the new range.
    DateRange,
    /// Balance page at the new page.
    Page,
    /// Balance page at the current page with the new size.
    PageSize,
    /// Search text, filters or ordering changed.
    Query,
}

impl RefetchScope {
    pub fn name(self) -> &'static str {
        match self {
            Self::DateRange => "date_range",
            Self::Page => "page",
            Self::PageSize => "page_size",
            Self::Query => "query",
        }
    }

    pub fn recomputes_totals(self) -> bool {
        matches!(self, Self::DateRange)
    }
}

/// Balance fragments produced by a refetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceRefresh {
    pub page: BalancePage,
    pub totals: Option<BalanceTotals>,
}

/// Fans out the dashboard fetches for one recipient and merges them.
///
/// The engine owns no view state; callers hand it the filter that should
/// drive each fetch and apply the returned fragments themselves.
#[derive(Clone)]
pub struct AggregationEngine {
    service: Arc<dyn DataService>,
    recipient_id: String,
    config: DashboardConfig,
}

impl AggregationEngine {
    pub fn new(
        service: Arc<dyn DataService>,
        recipient_id: impl Into<String>,
        config: DashboardConfig,
    ) -> Self {
        Self {
            service,
            recipient_id: recipient_id.into(),
            config,
        }
    }

    pub fn recipient_id(&self) -> &str {
        &self.recipient_id
    }

    pub fn service(&self) -> Arc<dyn DataService> {
        self.service.clone()
    }

    /// Profile followed by the bank accounts registered under its document.
    pub async fn fetch_recipient(&self) -> Result<RecipientData, DashboardError> {
        let detail = self.service.recipient_detail(&self.recipient_id).await?;
        let accounts = self
            .service
            .recipient_bank_accounts(&detail.profile.identification)
            .await?;

        debug!(
            recipient = %self.recipient_id,
            accounts = accounts.len(),
            "recipient stage resolved"
        );

        Ok(RecipientData {
            profile: detail.profile,
            configuration: detail.configuration,
            accounts,
        })
    }

    /// Never fails: a rejected limits call degrades to `{amount: 0, error: true}`.
    pub async fn fetch_anticipation_limit(&self) -> AnticipationLimit {
        match self.service.anticipation_limits(&self.recipient_id).await {
            Ok(limits) => AnticipationLimit::available(limits.maximum.amount),
            Err(err) => {
                let degraded = DashboardError::PartialDegradation(err.to_string());
                warn!(recipient = %self.recipient_id, error = %degraded, "anticipation limit degraded");
                AnticipationLimit::degraded()
            }
        }
    }

    pub async fn fetch_balance_page(
        &self,
        cursor: BalanceCursor,
    ) -> Result<BalancePage, DashboardError> {
        let operations_query = OperationsQuery {
            recipient_id: self.recipient_id.clone(),
            count: cursor.count,
            page: cursor.page,
            dates: cursor.dates,
            timeframe: self.config.balance_timeframe.clone(),
        };
        let balance_query = BalanceQuery {
            count: cursor.count,
            page: cursor.page,
            dates: cursor.dates,
        };

        let (operations, data) = tokio::try_join!(
            self.service.balance_operations(&operations_query),
            self.service.balance_data(&self.recipient_id, &balance_query),
        )?;

        Ok(BalancePage {
            amounts: data.amounts,
            operations: operations.operations,
            requests: data.requests,
            cursor,
        })
    }

    pub async fn fetch_totals(&self, dates: DateRange) -> Result<BalanceTotals, DashboardError> {
        let totals = self.service.balance_total(&self.recipient_id, &dates).await?;
        if totals.dates != dates {
            return Err(DashboardError::InvariantViolation(format!(
                "totals computed for {}..{} while {}..{} was requested",
                totals.dates.start, totals.dates.end, dates.start, dates.end
            )));
        }
        Ok(totals)
    }

    /// Full aggregated load. Any failure other than the anticipation limit
    /// fails the whole load; no partial view is produced.
    pub async fn initial_load(&self, filter: &FilterState) -> Result<ViewModel, DashboardError> {
        let (recipient, anticipation_limit, balance, totals) = tokio::try_join!(
            self.fetch_recipient(),
            async { Ok::<_, DashboardError>(self.fetch_anticipation_limit().await) },
            self.fetch_balance_page(filter.balance_cursor()),
            self.fetch_totals(filter.date_range),
        )?;

        info!(
            recipient = %self.recipient_id,
            operations = balance.operations.len(),
            requests = balance.requests.len(),
            anticipation_degraded = anticipation_limit.error,
            "recipient view loaded"
        );

        Ok(ViewModel::assemble(
            recipient,
            anticipation_limit,
            balance,
            totals,
        ))
    }

    /// Re-run the fetch subset `scope` calls for, driven by `filter`.
    pub async fn refetch(
        &self,
        scope: RefetchScope,
        filter: &FilterState,
    ) -> Result<BalanceRefresh, DashboardError> {
        let refresh = match scope {
            RefetchScope::DateRange => {
                let cursor = BalanceCursor {
                    page: 1,
                    ..filter.balance_cursor()
                };
                let (page, totals) = tokio::try_join!(
                    self.fetch_balance_page(cursor),
                    self.fetch_totals(filter.date_range),
                )?;
                BalanceRefresh {
                    page,
                    totals: Some(totals),
                }
            }
            RefetchScope::Page | RefetchScope::PageSize | RefetchScope::Query => BalanceRefresh {
                page: self.fetch_balance_page(filter.balance_cursor()).await?,
                totals: None,
            },
        };

        debug!(
            recipient = %self.recipient_id,
            scope = scope.name(),
            page = refresh.page.cursor.page,
            count = refresh.page.cursor.count,
            "balance refetched"
        );
        Ok(refresh)
    }

    /// One-shot statement export for `dates`. Never touches any view.
    pub async fn export(
        &self,
        dates: DateRange,
        format: ExportFormat,
        issued_on: NaiveDate,
    ) -> Result<ExportArtifact, DashboardError> {
        let (start_date, end_date) = dates.epoch_millis();
        let query = ExportQuery {
            recipient_id: self.recipient_id.clone(),
            start_date,
            end_date,
            format,
        };

        let bytes = self
            .service
            .export_balance_operations(&self.config.export_api_version, &query)
            .await?;

        info!(
            recipient = %self.recipient_id,
            format = format.as_str(),
            bytes = bytes.len(),
            "balance statement exported"
        );

        Ok(ExportArtifact::new(
            &self.config.export_file_prefix,
            issued_on,
            format,
            bytes,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{day, january, ScriptedService, ServiceMethod};

    fn engine(service: &Arc<ScriptedService>) -> AggregationEngine {
        AggregationEngine::new(service.clone(), "re_fixture", DashboardConfig::default())
    }

    #[tokio::test]
    async fn initial_load_merges_every_fragment() {
        let service = Arc::new(ScriptedService::fixture());
        let view = engine(&service).initial_load(&january()).await.unwrap();

        assert_eq!(view.profile.id, "re_fixture");
        assert_eq!(view.accounts.len(), 1);
        assert_eq!(view.anticipation_limit, AnticipationLimit::available(90_000));
        assert_eq!(view.balance.cursor, january().balance_cursor());
        assert_eq!(view.totals.dates, january().date_range);
        assert!(view.balance.operations.len() <= 15);
    }

    #[tokio::test]
    async fn limit_failure_degrades_without_failing_load() {
        let service = Arc::new(ScriptedService::fixture());
        service.fail(ServiceMethod::AnticipationLimits);

        let view = engine(&service).initial_load(&january()).await.unwrap();

        assert_eq!(view.anticipation_limit, AnticipationLimit::degraded());
        assert_eq!(view.profile.name, "Loja Centro");
        assert_eq!(view.balance.requests.len(), 3);
        assert_eq!(view.totals.net, service.totals_for(january().date_range).net);
    }

    #[tokio::test]
    async fn fatal_fragment_failure_fails_load() {
        for method in [
            ServiceMethod::RecipientDetail,
            ServiceMethod::BankAccounts,
            ServiceMethod::BalanceOperations,
            ServiceMethod::BalanceData,
            ServiceMethod::BalanceTotal,
        ] {
            let service = Arc::new(ScriptedService::fixture());
            service.fail(method);
            let err = engine(&service).initial_load(&january()).await.unwrap_err();
            assert!(matches!(err, DashboardError::Network { .. }), "{method:?}");
        }
    }

    #[tokio::test]
    async fn bank_accounts_follow_profile_identification() {
        let service = Arc::new(ScriptedService::fixture());
        engine(&service).fetch_recipient().await.unwrap();

        let calls = service.calls();
        let detail = calls.iter().position(|c| *c == ServiceMethod::RecipientDetail);
        let accounts = calls.iter().position(|c| *c == ServiceMethod::BankAccounts);
        assert!(detail.unwrap() < accounts.unwrap());
    }

    #[tokio::test]
    async fn page_refetch_skips_totals() {
        let service = Arc::new(ScriptedService::fixture());
        let mut filter = january();
        filter.page = 2;

        let refresh = engine(&service)
            .refetch(RefetchScope::Page, &filter)
            .await
            .unwrap();

        assert!(refresh.totals.is_none());
        assert_eq!(refresh.page.cursor.page, 2);
        assert_eq!(service.count(ServiceMethod::BalanceTotal), 0);
        assert_eq!(service.count(ServiceMethod::BalanceOperations), 1);
    }

    #[tokio::test]
    async fn date_range_refetch_restarts_at_first_page() {
        let service = Arc::new(ScriptedService::fixture());
        let mut filter = january();
        filter.page = 4;
        filter.date_range = DateRange::new(day(2024, 2, 1), day(2024, 2, 29));

        let refresh = engine(&service)
            .refetch(RefetchScope::DateRange, &filter)
            .await
            .unwrap();

        assert_eq!(refresh.page.cursor.page, 1);
        assert_eq!(refresh.totals.unwrap().dates, filter.date_range);
    }

    #[tokio::test]
    async fn export_uses_versioned_endpoint_and_names_artifact() {
        let service = Arc::new(ScriptedService::fixture());
        let artifact = engine(&service)
            .export(january().date_range, ExportFormat::Csv, day(2024, 2, 5))
            .await
            .unwrap();

        assert_eq!(artifact.file_name, "PagarMe_Extrato_05/02/2024.csv");
        assert_eq!(service.last_export_version().as_deref(), Some("2018-09-10"));
        assert!(!artifact.bytes.is_empty());
    }
}
