//! Collaborator contracts: the remote data service and the export sink.
//!
//! Both are consumed, never implemented, by this crate. Implementations are
//! expected to decode their payloads through [`crate::schema`] so every
//! record reaching the engine is already typed.

use crate::error::DashboardError;
use crate::types::{
    AnticipationConfig, AnticipationLimits, AnticipationModel, BalanceAmounts, BalanceOperation,
    BalanceTotals, BankAccount, DateRange, Identification, NewBankAccount,
    PendingAnticipationRequest, RecipientDetail, RecipientSummary, TransferConfig,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Key a recipient lookup is issued under.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum LookupKey {
    Id,
    BankAccountId,
    Name,
    ExternalId,
}

impl LookupKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::BankAccountId => "bank_account_id",
            Self::Name => "name",
            Self::ExternalId => "external_id",
        }
    }
}

/// `recipients.find({count, page, <key>: value})`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecipientLookup {
    pub key: LookupKey,
    pub value: String,
    pub count: u32,
    pub page: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OperationsQuery {
    pub recipient_id: String,
    pub count: u32,
    pub page: u32,
    pub dates: DateRange,
    pub timeframe: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BalanceQuery {
    pub count: u32,
    pub page: u32,
    pub dates: DateRange,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OperationsPage {
    pub operations: Vec<BalanceOperation>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BalanceData {
    pub amounts: BalanceAmounts,
    pub requests: Vec<PendingAnticipationRequest>,
}

/// Outgoing configuration patch for `recipient.update`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecipientPatch {
    Anticipation(AnticipationConfig),
    /// Transfer and anticipation settings are mutually exclusive server side,
    /// so the patch always carries an explicit null anticipation model.
    Transfer {
        transfer: TransferConfig,
        anticipation_model: Option<AnticipationModel>,
    },
    BankAccount {
        bank_account_id: String,
    },
}

impl RecipientPatch {
    pub fn transfer(transfer: TransferConfig) -> Self {
        Self::Transfer {
            transfer,
            anticipation_model: None,
        }
    }
}

/// Recipient as echoed back by `recipient.update`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdatedRecipient {
    pub id: String,
    pub bank_account: Option<BankAccount>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewAccountRequest {
    pub bank_account: NewBankAccount,
    pub identification: Identification,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CancelRequest {
    pub id: String,
    pub recipient_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CancelAck {
    pub id: String,
    pub status: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Csv,
    Xlsx,
}

impl ExportFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Xlsx => "xlsx",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Csv => "text/csv;charset=utf-8",
            Self::Xlsx => "application/ms-excel",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportQuery {
    pub recipient_id: String,
    pub start_date: i64,
    pub end_date: i64,
    pub format: ExportFormat,
}

/// Downloadable statement handed to the [`Exporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub file_name: String,
    pub format: ExportFormat,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

impl ExportArtifact {
    pub fn new(prefix: &str, issued_on: NaiveDate, format: ExportFormat, bytes: Vec<u8>) -> Self {
        Self {
            file_name: format!(
                "{}_{}.{}",
                prefix,
                issued_on.format("%d/%m/%Y"),
                format.as_str()
            ),
            format,
            content_type: format.content_type(),
            bytes,
        }
    }
}

/// Remote client contract used by every component.
#[async_trait]
pub trait DataService: Send + Sync {
    async fn recipient_detail(&self, recipient_id: &str) -> Result<RecipientDetail, DashboardError>;

    async fn recipient_bank_accounts(
        &self,
        identification: &Identification,
    ) -> Result<Vec<BankAccount>, DashboardError>;

    async fn anticipation_limits(
        &self,
        recipient_id: &str,
    ) -> Result<AnticipationLimits, DashboardError>;

    async fn update_recipient(
        &self,
        recipient_id: &str,
        patch: &RecipientPatch,
    ) -> Result<UpdatedRecipient, DashboardError>;

    async fn create_bank_account(
        &self,
        request: &NewAccountRequest,
    ) -> Result<BankAccount, DashboardError>;

    async fn find_recipients(
        &self,
        lookup: &RecipientLookup,
    ) -> Result<Vec<RecipientSummary>, DashboardError>;

    async fn balance_operations(
        &self,
        query: &OperationsQuery,
    ) -> Result<OperationsPage, DashboardError>;

    async fn balance_data(
        &self,
        recipient_id: &str,
        query: &BalanceQuery,
    ) -> Result<BalanceData, DashboardError>;

    async fn balance_total(
        &self,
        recipient_id: &str,
        dates: &DateRange,
    ) -> Result<BalanceTotals, DashboardError>;

    async fn cancel_anticipation(&self, request: &CancelRequest)
        -> Result<CancelAck, DashboardError>;

    /// Versioned `balanceOperations.find`, returning the raw statement bytes.
    async fn export_balance_operations(
        &self,
        api_version: &str,
        query: &ExportQuery,
    ) -> Result<Vec<u8>, DashboardError>;
}

/// Sink for exported statements.
#[async_trait]
pub trait Exporter: Send + Sync {
    async fn deliver(&self, artifact: ExportArtifact) -> Result<(), DashboardError>;
}
