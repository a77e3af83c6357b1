use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use recipient_core::error::DashboardError;
use recipient_core::schema;
use recipient_core::service::{
    BalanceData, BalanceQuery, CancelAck, CancelRequest, DataService, ExportFormat, ExportQuery,
    LookupKey, NewAccountRequest, OperationsPage, OperationsQuery, RecipientLookup,
    RecipientPatch, UpdatedRecipient,
};
use recipient_core::types::{
    AccountType, AnticipationConfig, AnticipationLimits, AnticipationModel, BalanceAmounts,
    BalanceOperation, BalanceTotals, BankAccount, Configuration, DateRange, DocumentType,
    Identification, LimitAmount, PendingAnticipationRequest, RecipientDetail, RecipientProfile,
    RecipientSummary, TransferConfig, TransferInterval,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Data service operations, as recorded in the call log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ServiceMethod {
    RecipientDetail,
    RecipientBankAccounts,
    AnticipationLimits,
    UpdateRecipient,
    CreateBankAccount,
    FindRecipients,
    BalanceOperations,
    BalanceData,
    BalanceTotal,
    CancelAnticipation,
    ExportBalanceOperations,
}

impl ServiceMethod {
    pub fn name(self) -> &'static str {
        match self {
            Self::RecipientDetail => "recipient.detail",
            Self::RecipientBankAccounts => "recipient.bank_accounts",
            Self::AnticipationLimits => "recipient.anticipation_limits",
            Self::UpdateRecipient => "recipient.update",
            Self::CreateBankAccount => "recipient.create_bank_account",
            Self::FindRecipients => "recipients.find",
            Self::BalanceOperations => "balance_operations.find",
            Self::BalanceData => "recipient.balance",
            Self::BalanceTotal => "balance.total",
            Self::CancelAnticipation => "recipient.cancel_anticipation",
            Self::ExportBalanceOperations => "balance_operations.export",
        }
    }
}

/// One recorded call.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ServiceCall {
    pub call_id: Uuid,
    pub method: ServiceMethod,
    pub at: DateTime<Utc>,
}

/// Backing records of the in-memory service, keyed by recipient id where
/// they belong to one recipient.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Fixture {
    pub recipients: Vec<RecipientDetail>,
    pub accounts: Vec<BankAccount>,
    pub operations: BTreeMap<String, Vec<BalanceOperation>>,
    pub requests: BTreeMap<String, Vec<PendingAnticipationRequest>>,
    pub amounts: BTreeMap<String, BalanceAmounts>,
    pub limits: BTreeMap<String, AnticipationLimits>,
}

pub const DEMO_RECIPIENT_ID: &str = "re_cjg5mw0yd00ahw46es3u6h7kx";
pub const DEMO_SECOND_RECIPIENT_ID: &str = "re_cjg5n2k1x00b2w46e8dtq4m0p";
pub const DEMO_BRANCH_RECIPIENT_ID: &str = "re_cjg5n9qfa00c4w46e1zr7y2lb";

impl Fixture {
    /// Three recipients with operations spread over the 30 days before
    /// `anchor`. The second recipient has no anticipation limits on record.
    pub fn demo(anchor: NaiveDate) -> Self {
        let aurora = Identification {
            document_type: DocumentType::Cnpj,
            document_number: "18727053000174".to_string(),
        };
        let boa_vista = Identification {
            document_type: DocumentType::Cpf,
            document_number: "09512345678".to_string(),
        };
        let filial = Identification {
            document_type: DocumentType::Cnpj,
            document_number: "18727053000255".to_string(),
        };

        let accounts = vec![
            demo_account("17929", "Padaria Aurora LTDA", "341", &aurora),
            demo_account("17932", "Padaria Aurora Reserva", "001", &aurora),
            demo_account("17930", "Joana Vieira", "237", &boa_vista),
            demo_account("17931", "Aurora Filial Sul LTDA", "341", &filial),
        ];

        let recipients = vec![
            demo_recipient(
                DEMO_RECIPIENT_ID,
                "Padaria Aurora",
                "aurora-01",
                aurora,
                Configuration {
                    anticipation: AnticipationConfig {
                        model: Some(AnticipationModel::AutomaticVolume),
                        volume_percentage: Some(50),
                        delay_days: None,
                    },
                    transfer: TransferConfig {
                        transfer_enabled: true,
                        interval: Some(TransferInterval::Weekly),
                        day: Some(2),
                    },
                    bank_account: Some(accounts[0].clone()),
                },
            ),
            demo_recipient(
                DEMO_SECOND_RECIPIENT_ID,
                "Mercado Boa Vista",
                "bv-02",
                boa_vista,
                Configuration {
                    bank_account: Some(accounts[2].clone()),
                    ..Configuration::default()
                },
            ),
            demo_recipient(
                DEMO_BRANCH_RECIPIENT_ID,
                "Aurora Filial Sul",
                "17931",
                filial,
                Configuration {
                    bank_account: Some(accounts[3].clone()),
                    ..Configuration::default()
                },
            ),
        ];

        let mut operations = BTreeMap::new();
        operations.insert(DEMO_RECIPIENT_ID.to_string(), demo_operations(anchor, 45, 2_000));
        operations.insert(
            DEMO_SECOND_RECIPIENT_ID.to_string(),
            demo_operations(anchor, 12, 800),
        );
        operations.insert(DEMO_BRANCH_RECIPIENT_ID.to_string(), Vec::new());

        let mut requests = BTreeMap::new();
        requests.insert(
            DEMO_RECIPIENT_ID.to_string(),
            (1..=3)
                .map(|n| PendingAnticipationRequest {
                    id: format!("ar_100{n}"),
                    amount: 15_000 * i64::from(n),
                    status: "pending".to_string(),
                    payment_date: anchor + ChronoDuration::days(i64::from(n)),
                })
                .collect(),
        );

        let mut amounts = BTreeMap::new();
        amounts.insert(
            DEMO_RECIPIENT_ID.to_string(),
            BalanceAmounts {
                available: 184_250,
                waiting_funds: 96_400,
                transferred: 412_000,
            },
        );
        amounts.insert(
            DEMO_SECOND_RECIPIENT_ID.to_string(),
            BalanceAmounts {
                available: 7_900,
                waiting_funds: 0,
                transferred: 21_300,
            },
        );

        let mut limits = BTreeMap::new();
        limits.insert(
            DEMO_RECIPIENT_ID.to_string(),
            AnticipationLimits {
                maximum: LimitAmount { amount: 250_000 },
                minimum: LimitAmount { amount: 1_000 },
            },
        );
        limits.insert(
            DEMO_BRANCH_RECIPIENT_ID.to_string(),
            AnticipationLimits {
                maximum: LimitAmount { amount: 0 },
                minimum: LimitAmount { amount: 0 },
            },
        );

        Self {
            recipients,
            accounts,
            operations,
            requests,
            amounts,
            limits,
        }
    }
}

fn demo_account(id: &str, name: &str, bank: &str, owner: &Identification) -> BankAccount {
    BankAccount {
        id: id.to_string(),
        name: name.to_string(),
        bank: bank.to_string(),
        agency: "0932".to_string(),
        agency_digit: Some("5".to_string()),
        number: format!("5{id}"),
        number_digit: "1".to_string(),
        account_type: AccountType::ContaCorrente,
        document_number: owner.document_number.clone(),
    }
}

fn demo_recipient(
    id: &str,
    name: &str,
    external_id: &str,
    identification: Identification,
    configuration: Configuration,
) -> RecipientDetail {
    RecipientDetail {
        profile: RecipientProfile {
            id: id.to_string(),
            name: name.to_string(),
            email: Some(format!("financeiro@{external_id}.example")),
            external_id: Some(external_id.to_string()),
            identification,
        },
        configuration,
    }
}

/// Every ninth operation is an outgoing transfer; the rest are payables.
fn demo_operations(anchor: NaiveDate, count: u32, base: i64) -> Vec<BalanceOperation> {
    (0..count)
        .map(|n| {
            let (kind, amount, fee) = if n % 9 == 8 {
                ("transfer", -5_000, 367)
            } else {
                let amount = base + i64::from(n) * 37;
                ("payable", amount, amount / 50)
            };
            BalanceOperation {
                id: format!("bo_{:04}", n + 1),
                kind: kind.to_string(),
                status: if n % 4 == 0 { "available" } else { "waiting_funds" }.to_string(),
                amount,
                fee,
                net: amount - fee,
                date: anchor - ChronoDuration::days(i64::from(n % 30)),
            }
        })
        .collect()
}

#[derive(Debug, Default)]
struct State {
    fixture: Fixture,
    calls: Vec<ServiceCall>,
    failing: BTreeSet<ServiceMethod>,
    delays: BTreeMap<ServiceMethod, Duration>,
    ack_override: Option<String>,
    export_versions: Vec<String>,
}

/// Deterministic [`DataService`] over a [`Fixture`], with a call log,
/// failure injection and per-method latency.
#[derive(Debug, Default)]
pub struct InMemoryDataService {
    state: Mutex<State>,
}

impl InMemoryDataService {
    pub fn new(fixture: Fixture) -> Self {
        Self {
            state: Mutex::new(State {
                fixture,
                ..State::default()
            }),
        }
    }

    pub fn demo(anchor: NaiveDate) -> Self {
        Self::new(Fixture::demo(anchor))
    }

    /// Build from a JSON fixture document.
    pub fn from_json(raw: &str) -> Result<Self, DashboardError> {
        let fixture: Fixture = schema::decode_slice("fixture", raw.as_bytes())?;
        info!(
            recipients = fixture.recipients.len(),
            accounts = fixture.accounts.len(),
            "fixture loaded"
        );
        Ok(Self::new(fixture))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, DashboardError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DashboardError::schema(format!("fixture {}", path.display()), e.to_string())
        })?;
        Self::from_json(&raw)
    }

    /// Make every later call to `method` fail with a network error.
    pub fn fail(&self, method: ServiceMethod) -> Result<(), DashboardError> {
        self.with_state(|state| {
            state.failing.insert(method);
        })
    }

    pub fn recover(&self, method: ServiceMethod) -> Result<(), DashboardError> {
        self.with_state(|state| {
            state.failing.remove(&method);
        })
    }

    /// Delay every later call to `method` by `latency` before it answers.
    pub fn delay(&self, method: ServiceMethod, latency: Duration) -> Result<(), DashboardError> {
        self.with_state(|state| {
            state.delays.insert(method, latency);
        })
    }

    /// Acknowledge the next cancellations under `id` instead of the requested id.
    pub fn acknowledge_as(&self, id: impl Into<String>) -> Result<(), DashboardError> {
        let id = id.into();
        self.with_state(|state| state.ack_override = Some(id))
    }

    pub fn calls(&self) -> Result<Vec<ServiceCall>, DashboardError> {
        self.with_state(|state| state.calls.clone())
    }

    pub fn methods(&self) -> Result<Vec<ServiceMethod>, DashboardError> {
        self.with_state(|state| state.calls.iter().map(|c| c.method).collect())
    }

    pub fn count(&self, method: ServiceMethod) -> Result<usize, DashboardError> {
        self.with_state(|state| state.calls.iter().filter(|c| c.method == method).count())
    }

    pub fn clear_calls(&self) -> Result<(), DashboardError> {
        self.with_state(|state| state.calls.clear())
    }

    pub fn export_versions(&self) -> Result<Vec<String>, DashboardError> {
        self.with_state(|state| state.export_versions.clone())
    }

    pub fn snapshot(&self) -> Result<Fixture, DashboardError> {
        self.with_state(|state| state.fixture.clone())
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> Result<T, DashboardError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| DashboardError::InvariantViolation("fixture lock poisoned".to_string()))?;
        Ok(f(&mut state))
    }

    /// Record the call, apply injected failure, then wait out any latency.
    async fn enter(&self, method: ServiceMethod) -> Result<(), DashboardError> {
        let latency = self.with_state(|state| {
            state.calls.push(ServiceCall {
                call_id: Uuid::new_v4(),
                method,
                at: Utc::now(),
            });
            if state.failing.contains(&method) {
                return Err(DashboardError::network(method.name(), "injected failure"));
            }
            Ok(state.delays.get(&method).copied())
        })??;

        if let Some(latency) = latency {
            debug!(
                method = method.name(),
                latency_ms = latency.as_millis() as u64,
                "delaying response"
            );
            tokio::time::sleep(latency).await;
        }
        Ok(())
    }
}

fn not_found(method: ServiceMethod, what: &str, id: &str) -> DashboardError {
    DashboardError::network(method.name(), format!("{what} '{id}' not found"))
}

fn page_of<T: Clone>(rows: &[T], page: u32, count: u32) -> Vec<T> {
    let skip = page.saturating_sub(1).saturating_mul(count) as usize;
    rows.iter().skip(skip).take(count as usize).cloned().collect()
}

fn summary_of(detail: &RecipientDetail) -> RecipientSummary {
    RecipientSummary {
        id: detail.profile.id.clone(),
        name: detail.profile.name.clone(),
        external_id: detail.profile.external_id.clone(),
        document_number: detail.profile.identification.document_number.clone(),
        bank_account_id: detail
            .configuration
            .bank_account
            .as_ref()
            .map(|account| account.id.clone()),
        status: "active".to_string(),
    }
}

fn matches_lookup(summary: &RecipientSummary, key: LookupKey, value: &str) -> bool {
    match key {
        LookupKey::Id => summary.id == value,
        LookupKey::BankAccountId => summary.bank_account_id.as_deref() == Some(value),
        LookupKey::ExternalId => summary.external_id.as_deref() == Some(value),
        LookupKey::Name => summary.name.to_lowercase().contains(&value.to_lowercase()),
    }
}

fn operations_in(operations: &[BalanceOperation], dates: &DateRange) -> Vec<BalanceOperation> {
    let mut rows: Vec<_> = operations
        .iter()
        .filter(|op| dates.contains(op.date))
        .cloned()
        .collect();
    rows.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.id.cmp(&b.id)));
    rows
}

fn millis_to_date(millis: i64) -> Result<NaiveDate, DashboardError> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|at| at.date_naive())
        .ok_or_else(|| DashboardError::Export(format!("timestamp {millis} out of range")))
}

fn render_csv(rows: &[BalanceOperation]) -> Result<Vec<u8>, DashboardError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| DashboardError::Export(e.to_string()))?;
    }
    writer
        .into_inner()
        .map_err(|e| DashboardError::Export(e.to_string()))
}

#[async_trait]
impl DataService for InMemoryDataService {
    async fn recipient_detail(&self, recipient_id: &str) -> Result<RecipientDetail, DashboardError> {
        let method = ServiceMethod::RecipientDetail;
        self.enter(method).await?;
        self.with_state(|state| {
            state
                .fixture
                .recipients
                .iter()
                .find(|r| r.profile.id == recipient_id)
                .cloned()
                .ok_or_else(|| not_found(method, "recipient", recipient_id))
        })?
    }

    async fn recipient_bank_accounts(
        &self,
        identification: &Identification,
    ) -> Result<Vec<BankAccount>, DashboardError> {
        self.enter(ServiceMethod::RecipientBankAccounts).await?;
        self.with_state(|state| {
            state
                .fixture
                .accounts
                .iter()
                .filter(|a| a.document_number == identification.document_number)
                .cloned()
                .collect()
        })
    }

    async fn anticipation_limits(
        &self,
        recipient_id: &str,
    ) -> Result<AnticipationLimits, DashboardError> {
        let method = ServiceMethod::AnticipationLimits;
        self.enter(method).await?;
        self.with_state(|state| {
            state
                .fixture
                .limits
                .get(recipient_id)
                .copied()
                .ok_or_else(|| not_found(method, "anticipation limits for", recipient_id))
        })?
    }

    async fn update_recipient(
        &self,
        recipient_id: &str,
        patch: &RecipientPatch,
    ) -> Result<UpdatedRecipient, DashboardError> {
        let method = ServiceMethod::UpdateRecipient;
        self.enter(method).await?;
        self.with_state(|state| -> Result<UpdatedRecipient, DashboardError> {
            let account = match patch {
                RecipientPatch::BankAccount { bank_account_id } => Some(
                    state
                        .fixture
                        .accounts
                        .iter()
                        .find(|a| &a.id == bank_account_id)
                        .cloned()
                        .ok_or_else(|| not_found(method, "bank account", bank_account_id))?,
                ),
                _ => None,
            };

            let recipient = state
                .fixture
                .recipients
                .iter_mut()
                .find(|r| r.profile.id == recipient_id)
                .ok_or_else(|| not_found(method, "recipient", recipient_id))?;
            let configuration = &mut recipient.configuration;

            match patch {
                RecipientPatch::Anticipation(data) => configuration.anticipation = data.clone(),
                RecipientPatch::Transfer {
                    transfer,
                    anticipation_model,
                } => {
                    configuration.transfer = transfer.clone();
                    configuration.anticipation.model = *anticipation_model;
                }
                RecipientPatch::BankAccount { .. } => {
                    configuration.bank_account = account;
                }
            }

            info!(recipient = %recipient_id, "recipient updated");
            Ok(UpdatedRecipient {
                id: recipient_id.to_string(),
                bank_account: configuration.bank_account.clone(),
            })
        })?
    }

    async fn create_bank_account(
        &self,
        request: &NewAccountRequest,
    ) -> Result<BankAccount, DashboardError> {
        self.enter(ServiceMethod::CreateBankAccount).await?;
        self.with_state(|state| {
            let next_id = state
                .fixture
                .accounts
                .iter()
                .filter_map(|a| a.id.parse::<u64>().ok())
                .max()
                .unwrap_or(10_000)
                + 1;
            let raw = &request.bank_account;
            let account = BankAccount {
                id: next_id.to_string(),
                name: raw.name.clone(),
                bank: raw.bank.clone(),
                agency: raw.agency.clone(),
                agency_digit: raw.agency_digit.clone(),
                number: raw.number.clone(),
                number_digit: raw.number_digit.clone(),
                account_type: raw.account_type,
                document_number: request.identification.document_number.clone(),
            };
            state.fixture.accounts.push(account.clone());
            info!(
                account = %account.id,
                document_type = request.identification.document_type.as_str(),
                "bank account created"
            );
            account
        })
    }

    async fn find_recipients(
        &self,
        lookup: &RecipientLookup,
    ) -> Result<Vec<RecipientSummary>, DashboardError> {
        self.enter(ServiceMethod::FindRecipients).await?;
        self.with_state(|state| {
            let matching: Vec<_> = state
                .fixture
                .recipients
                .iter()
                .map(summary_of)
                .filter(|s| matches_lookup(s, lookup.key, &lookup.value))
                .collect();
            page_of(&matching, lookup.page, lookup.count)
        })
    }

    async fn balance_operations(
        &self,
        query: &OperationsQuery,
    ) -> Result<OperationsPage, DashboardError> {
        self.enter(ServiceMethod::BalanceOperations).await?;
        self.with_state(|state| {
            let all = state
                .fixture
                .operations
                .get(&query.recipient_id)
                .map(|ops| operations_in(ops, &query.dates))
                .unwrap_or_default();
            OperationsPage {
                operations: page_of(&all, query.page, query.count),
            }
        })
    }

    async fn balance_data(
        &self,
        recipient_id: &str,
        _query: &BalanceQuery,
    ) -> Result<BalanceData, DashboardError> {
        self.enter(ServiceMethod::BalanceData).await?;
        self.with_state(|state| BalanceData {
            amounts: state
                .fixture
                .amounts
                .get(recipient_id)
                .copied()
                .unwrap_or_default(),
            requests: state
                .fixture
                .requests
                .get(recipient_id)
                .cloned()
                .unwrap_or_default(),
        })
    }

    async fn balance_total(
        &self,
        recipient_id: &str,
        dates: &DateRange,
    ) -> Result<BalanceTotals, DashboardError> {
        self.enter(ServiceMethod::BalanceTotal).await?;
        self.with_state(|state| {
            let rows = state
                .fixture
                .operations
                .get(recipient_id)
                .map(|ops| operations_in(ops, dates))
                .unwrap_or_default();
            let incoming: i64 = rows.iter().filter(|op| op.amount > 0).map(|op| op.amount).sum();
            let outgoing: i64 = rows
                .iter()
                .map(|op| op.fee + (-op.amount).max(0))
                .sum();
            BalanceTotals {
                dates: *dates,
                incoming,
                outgoing,
                net: incoming - outgoing,
            }
        })
    }

    async fn cancel_anticipation(
        &self,
        request: &CancelRequest,
    ) -> Result<CancelAck, DashboardError> {
        let method = ServiceMethod::CancelAnticipation;
        self.enter(method).await?;
        self.with_state(|state| -> Result<CancelAck, DashboardError> {
            let requests = state
                .fixture
                .requests
                .get_mut(&request.recipient_id)
                .ok_or_else(|| not_found(method, "recipient", &request.recipient_id))?;
            let position = requests
                .iter()
                .position(|r| r.id == request.id)
                .ok_or_else(|| not_found(method, "anticipation", &request.id))?;
            requests.remove(position);

            Ok(CancelAck {
                id: state
                    .ack_override
                    .clone()
                    .unwrap_or_else(|| request.id.clone()),
                status: "canceled".to_string(),
            })
        })?
    }

    async fn export_balance_operations(
        &self,
        api_version: &str,
        query: &ExportQuery,
    ) -> Result<Vec<u8>, DashboardError> {
        self.enter(ServiceMethod::ExportBalanceOperations).await?;
        let dates = DateRange::new(
            millis_to_date(query.start_date)?,
            millis_to_date(query.end_date)?,
        );
        let rows = self.with_state(|state| {
            state.export_versions.push(api_version.to_string());
            state
                .fixture
                .operations
                .get(&query.recipient_id)
                .map(|ops| operations_in(ops, &dates))
                .unwrap_or_default()
        })?;

        match query.format {
            ExportFormat::Csv => render_csv(&rows),
            ExportFormat::Xlsx => Err(DashboardError::Export(
                "xlsx rendering is not available in the in-memory service".to_string(),
            )),
        }
    }
}
