use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Inclusive calendar date range used by balance queries and totals.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Window ending at `today` and starting `days` before it. A window
    /// reaching past the calendar's range starts at its first day.
    pub fn last_days(today: NaiveDate, days: i64) -> Self {
        let start = Duration::try_days(days.max(0))
            .and_then(|span| today.checked_sub_signed(span))
            .unwrap_or(NaiveDate::MIN);
        Self { start, end: today }
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        day >= self.start && day <= self.end
    }

    /// Milliseconds since the epoch at the first instant of `start` and the
    /// last millisecond of `end`, both UTC.
    pub fn epoch_millis(&self) -> (i64, i64) {
        let start = self
            .start
            .and_hms_opt(0, 0, 0)
            .map(|at| at.and_utc().timestamp_millis())
            .unwrap_or_default();
        let end = self
            .end
            .and_hms_milli_opt(23, 59, 59, 999)
            .map(|at| at.and_utc().timestamp_millis())
            .unwrap_or_default();
        (start, end)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Cpf,
    Cnpj,
}

impl DocumentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cpf => "cpf",
            Self::Cnpj => "cnpj",
        }
    }
}

/// Identification document of the recipient; bank accounts are scoped to it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identification {
    pub document_type: DocumentType,
    pub document_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecipientProfile {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub external_id: Option<String>,
    pub identification: Identification,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    ContaCorrente,
    ContaPoupanca,
    ContaCorrenteConjunta,
    ContaPoupancaConjunta,
}

/// Persisted bank account record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BankAccount {
    pub id: String,
    pub name: String,
    pub bank: String,
    pub agency: String,
    pub agency_digit: Option<String>,
    pub number: String,
    pub number_digit: String,
    pub account_type: AccountType,
    pub document_number: String,
}

/// Raw bank fields for an account that does not exist yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewBankAccount {
    pub name: String,
    pub bank: String,
    pub agency: String,
    pub agency_digit: Option<String>,
    pub number: String,
    pub number_digit: String,
    pub account_type: AccountType,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnticipationModel {
    Automatic1025,
    AutomaticDx,
    AutomaticVolume,
    Manual,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnticipationConfig {
    pub model: Option<AnticipationModel>,
    pub volume_percentage: Option<u8>,
    pub delay_days: Option<u32>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransferInterval {
    Daily,
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferConfig {
    pub transfer_enabled: bool,
    pub interval: Option<TransferInterval>,
    pub day: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Configuration {
    pub anticipation: AnticipationConfig,
    pub transfer: TransferConfig,
    pub bank_account: Option<BankAccount>,
}

/// Recipient detail as returned by the data service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecipientDetail {
    pub profile: RecipientProfile,
    pub configuration: Configuration,
}

/// Result of the profile → bank accounts pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecipientData {
    pub profile: RecipientProfile,
    pub configuration: Configuration,
    pub accounts: Vec<BankAccount>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LimitAmount {
    pub amount: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnticipationLimits {
    pub maximum: LimitAmount,
    pub minimum: LimitAmount,
}

/// Anticipation headroom shown on the dashboard; `error` marks a degraded fetch.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnticipationLimit {
    pub amount: i64,
    pub error: bool,
}

impl AnticipationLimit {
    pub fn available(amount: i64) -> Self {
        Self {
            amount,
            error: false,
        }
    }

    pub fn degraded() -> Self {
        Self {
            amount: 0,
            error: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BalanceOperation {
    pub id: String,
    pub kind: String,
    pub status: String,
    pub amount: i64,
    pub fee: i64,
    pub net: i64,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingAnticipationRequest {
    pub id: String,
    pub amount: i64,
    pub status: String,
    pub payment_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BalanceAmounts {
    pub available: i64,
    pub waiting_funds: i64,
    pub transferred: i64,
}

/// Query identity that produced a balance page.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BalanceCursor {
    pub dates: DateRange,
    pub page: u32,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BalancePage {
    pub amounts: BalanceAmounts,
    pub operations: Vec<BalanceOperation>,
    pub requests: Vec<PendingAnticipationRequest>,
    pub cursor: BalanceCursor,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BalanceTotals {
    pub dates: DateRange,
    pub incoming: i64,
    pub outgoing: i64,
    pub net: i64,
}

/// Merged, screen-ready view of one recipient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ViewModel {
    pub profile: RecipientProfile,
    pub accounts: Vec<BankAccount>,
    pub configuration: Configuration,
    pub balance: BalancePage,
    pub totals: BalanceTotals,
    pub anticipation_limit: AnticipationLimit,
}

impl ViewModel {
    pub fn assemble(
        recipient: RecipientData,
        anticipation_limit: AnticipationLimit,
        balance: BalancePage,
        totals: BalanceTotals,
    ) -> Self {
        Self {
            profile: recipient.profile,
            accounts: recipient.accounts,
            configuration: recipient.configuration,
            balance,
            totals,
            anticipation_limit,
        }
    }

    pub fn requests(&self) -> &[PendingAnticipationRequest] {
        &self.balance.requests
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ascending => "asc",
            Self::Descending => "desc",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "asc" | "ascending" => Some(Self::Ascending),
            "desc" | "descending" => Some(Self::Descending),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SortOrder {
    pub field: String,
    pub direction: SortDirection,
}

/// User-chosen query parameters shared by the search and detail screens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilterState {
    pub date_range: DateRange,
    pub page: u32,
    pub page_size: u32,
    pub search: String,
    pub filters: BTreeMap<String, Vec<String>>,
    pub sort: Option<SortOrder>,
}

impl FilterState {
    pub fn new(date_range: DateRange, page_size: u32) -> Self {
        Self {
            date_range,
            page: 1,
            page_size,
            search: String::new(),
            filters: BTreeMap::new(),
            sort: None,
        }
    }

    pub fn balance_cursor(&self) -> BalanceCursor {
        BalanceCursor {
            dates: self.date_range,
            page: self.page,
            count: self.page_size,
        }
    }
}

/// Row of the recipients search list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecipientSummary {
    pub id: String,
    pub name: String,
    pub external_id: Option<String>,
    pub document_number: String,
    pub bank_account_id: Option<String>,
    pub status: String,
}

/// Pagination reported to the list; `total` is a heuristic page count.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pagination {
    pub offset: u32,
    pub total: u32,
}

impl Pagination {
    /// A full page means more pages are likely: report `upper_bound`.
    /// A short page is the last one: report the current offset.
    pub fn estimate(rows: usize, page_size: u32, offset: u32, upper_bound: u32) -> Self {
        let total = if rows == page_size as usize {
            upper_bound
        } else {
            offset
        };
        Self { offset, total }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn full_page_reports_upper_bound() {
        let pagination = Pagination::estimate(15, 15, 3, 100);
        assert_eq!(pagination.total, 100);
        assert_eq!(pagination.offset, 3);
    }

    #[test]
    fn short_page_reports_offset_as_last_page() {
        assert_eq!(Pagination::estimate(4, 15, 3, 100).total, 3);
        assert_eq!(Pagination::estimate(0, 15, 1, 100).total, 1);
    }

    #[test]
    fn date_range_epoch_bounds_cover_whole_days() {
        let range = DateRange::new(day(2024, 1, 1), day(2024, 1, 1));
        let (start, end) = range.epoch_millis();
        assert_eq!(start, 1_704_067_200_000);
        assert_eq!(end - start, 86_399_999);
    }

    #[test]
    fn oversized_window_saturates_instead_of_overflowing() {
        let range = DateRange::last_days(day(2024, 1, 31), i64::MAX);
        assert_eq!(range.start, NaiveDate::MIN);
        assert_eq!(range.end, day(2024, 1, 31));
    }

    #[test]
    fn last_days_window_ends_today() {
        let range = DateRange::last_days(day(2024, 1, 31), 7);
        assert_eq!(range.start, day(2024, 1, 24));
        assert!(range.contains(day(2024, 1, 31)));
        assert!(!range.contains(day(2024, 2, 1)));
    }
}
