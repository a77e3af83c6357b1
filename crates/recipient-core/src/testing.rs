//! Scripted data service for unit tests.

use crate::error::DashboardError;
use crate::service::{
    BalanceData, BalanceQuery, CancelAck, CancelRequest, DataService, ExportQuery, LookupKey,
    NewAccountRequest, OperationsPage, OperationsQuery, RecipientLookup, RecipientPatch,
    UpdatedRecipient,
};
use crate::types::{
    AccountType, AnticipationConfig, AnticipationLimits, BalanceAmounts, BalanceOperation,
    BalanceTotals, BankAccount, Configuration, DateRange, DocumentType, FilterState,
    Identification, LimitAmount, PendingAnticipationRequest, RecipientDetail, RecipientProfile,
    RecipientSummary, TransferConfig,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ServiceMethod {
    RecipientDetail,
    BankAccounts,
    AnticipationLimits,
    UpdateRecipient,
    CreateBankAccount,
    FindRecipients,
    BalanceOperations,
    BalanceData,
    BalanceTotal,
    CancelAnticipation,
    Export,
}

#[derive(Debug, Default)]
struct Script {
    failing: BTreeSet<ServiceMethod>,
    calls: Vec<ServiceMethod>,
    accounts: Vec<BankAccount>,
    requests: Vec<PendingAnticipationRequest>,
    recipients: Vec<RecipientSummary>,
    patches: Vec<RecipientPatch>,
    lookups: Vec<RecipientLookup>,
    ack_override: Option<String>,
    export_version: Option<String>,
}

pub struct ScriptedService {
    profile: RecipientProfile,
    configuration: Configuration,
    operations: Vec<BalanceOperation>,
    script: Mutex<Script>,
}

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn january() -> FilterState {
    FilterState::new(DateRange::new(day(2024, 1, 1), day(2024, 1, 31)), 15)
}

pub fn account(id: &str, name: &str) -> BankAccount {
    BankAccount {
        id: id.to_string(),
        name: name.to_string(),
        bank: "341".to_string(),
        agency: "0932".to_string(),
        agency_digit: Some("5".to_string()),
        number: "58054".to_string(),
        number_digit: "1".to_string(),
        account_type: AccountType::ContaCorrente,
        document_number: "26268738888".to_string(),
    }
}

pub fn request(id: &str, amount: i64) -> PendingAnticipationRequest {
    PendingAnticipationRequest {
        id: id.to_string(),
        amount,
        status: "pending".to_string(),
        payment_date: day(2024, 2, 1),
    }
}

impl ScriptedService {
    pub fn fixture() -> Self {
        let primary = account("ba_1", "Loja Centro LTDA");
        let operations = (0..40)
            .map(|n| {
                let amount = 1_000 + i64::from(n) * 10;
                BalanceOperation {
                    id: format!("op_{n}"),
                    kind: "payable".to_string(),
                    status: "waiting_funds".to_string(),
                    amount,
                    fee: 50,
                    net: amount - 50,
                    date: day(2024, 1, 1 + n % 31),
                }
            })
            .collect();

        Self {
            profile: RecipientProfile {
                id: "re_fixture".to_string(),
                name: "Loja Centro".to_string(),
                email: Some("financeiro@lojacentro.example".to_string()),
                external_id: Some("loja-01".to_string()),
                identification: Identification {
                    document_type: DocumentType::Cnpj,
                    document_number: "26268738888".to_string(),
                },
            },
            configuration: Configuration {
                anticipation: AnticipationConfig::default(),
                transfer: TransferConfig::default(),
                bank_account: Some(primary.clone()),
            },
            operations,
            script: Mutex::new(Script {
                accounts: vec![primary],
                requests: vec![request("5", 500), request("7", 700), request("9", 900)],
                recipients: vec![
                    summary("re_ci7nheu0m0006n016o5sglg9t", "Loja Centro", "loja-01", "17929"),
                    summary("re_ci7nhf1ay0007n016wd5t22nl", "Loja Norte", "loja-02", "17930"),
                    summary("re_ci7nhg5tz0008n016pq3vbx1k", "Quiosque Praia", "17931", "17931"),
                ],
                ..Script::default()
            }),
        }
    }

    pub fn fail(&self, method: ServiceMethod) {
        self.script.lock().unwrap().failing.insert(method);
    }

    pub fn recover(&self, method: ServiceMethod) {
        self.script.lock().unwrap().failing.remove(&method);
    }

    pub fn acknowledge_as(&self, id: &str) {
        self.script.lock().unwrap().ack_override = Some(id.to_string());
    }

    pub fn calls(&self) -> Vec<ServiceMethod> {
        self.script.lock().unwrap().calls.clone()
    }

    pub fn count(&self, method: ServiceMethod) -> usize {
        self.calls().into_iter().filter(|c| *c == method).count()
    }

    pub fn clear_calls(&self) {
        self.script.lock().unwrap().calls.clear();
    }

    pub fn patches(&self) -> Vec<RecipientPatch> {
        self.script.lock().unwrap().patches.clone()
    }

    pub fn lookups(&self) -> Vec<RecipientLookup> {
        self.script.lock().unwrap().lookups.clone()
    }

    pub fn last_export_version(&self) -> Option<String> {
        self.script.lock().unwrap().export_version.clone()
    }

    pub fn totals_for(&self, dates: DateRange) -> BalanceTotals {
        let incoming: i64 = self
            .operations
            .iter()
            .filter(|op| dates.contains(op.date))
            .map(|op| op.amount)
            .sum();
        let outgoing: i64 = self
            .operations
            .iter()
            .filter(|op| dates.contains(op.date))
            .map(|op| op.fee)
            .sum();
        BalanceTotals {
            dates,
            incoming,
            outgoing,
            net: incoming - outgoing,
        }
    }

    fn enter(&self, method: ServiceMethod) -> Result<(), DashboardError> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(method);
        if script.failing.contains(&method) {
            return Err(DashboardError::network(
                format!("{method:?}"),
                "scripted failure",
            ));
        }
        Ok(())
    }
}

fn summary(id: &str, name: &str, external_id: &str, bank_account_id: &str) -> RecipientSummary {
    RecipientSummary {
        id: id.to_string(),
        name: name.to_string(),
        external_id: Some(external_id.to_string()),
        document_number: "26268738888".to_string(),
        bank_account_id: Some(bank_account_id.to_string()),
        status: "active".to_string(),
    }
}

#[async_trait]
impl DataService for ScriptedService {
    async fn recipient_detail(&self, _recipient_id: &str) -> Result<RecipientDetail, DashboardError> {
        self.enter(ServiceMethod::RecipientDetail)?;
        Ok(RecipientDetail {
            profile: self.profile.clone(),
            configuration: self.configuration.clone(),
        })
    }

    async fn recipient_bank_accounts(
        &self,
        identification: &Identification,
    ) -> Result<Vec<BankAccount>, DashboardError> {
        self.enter(ServiceMethod::BankAccounts)?;
        let script = self.script.lock().unwrap();
        Ok(script
            .accounts
            .iter()
            .filter(|a| a.document_number == identification.document_number)
            .cloned()
            .collect())
    }

    async fn anticipation_limits(
        &self,
        _recipient_id: &str,
    ) -> Result<AnticipationLimits, DashboardError> {
        self.enter(ServiceMethod::AnticipationLimits)?;
        Ok(AnticipationLimits {
            maximum: LimitAmount { amount: 90_000 },
            minimum: LimitAmount { amount: 1_000 },
        })
    }

    async fn update_recipient(
        &self,
        recipient_id: &str,
        patch: &RecipientPatch,
    ) -> Result<UpdatedRecipient, DashboardError> {
        self.enter(ServiceMethod::UpdateRecipient)?;
        let mut script = self.script.lock().unwrap();
        script.patches.push(patch.clone());
        let bank_account = match patch {
            RecipientPatch::BankAccount { bank_account_id } => script
                .accounts
                .iter()
                .find(|a| &a.id == bank_account_id)
                .cloned(),
            _ => self.configuration.bank_account.clone(),
        };
        Ok(UpdatedRecipient {
            id: recipient_id.to_string(),
            bank_account,
        })
    }

    async fn create_bank_account(
        &self,
        request: &NewAccountRequest,
    ) -> Result<BankAccount, DashboardError> {
        self.enter(ServiceMethod::CreateBankAccount)?;
        let mut script = self.script.lock().unwrap();
        let raw = &request.bank_account;
        let created = BankAccount {
            id: format!("ba_new_{}", script.accounts.len() + 1),
            name: raw.name.clone(),
            bank: raw.bank.clone(),
            agency: raw.agency.clone(),
            agency_digit: raw.agency_digit.clone(),
            number: raw.number.clone(),
            number_digit: raw.number_digit.clone(),
            account_type: raw.account_type,
            document_number: request.identification.document_number.clone(),
        };
        script.accounts.push(created.clone());
        Ok(created)
    }

    async fn find_recipients(
        &self,
        lookup: &RecipientLookup,
    ) -> Result<Vec<RecipientSummary>, DashboardError> {
        self.enter(ServiceMethod::FindRecipients)?;
        let mut script = self.script.lock().unwrap();
        script.lookups.push(lookup.clone());
        let value = lookup.value.as_str();
        Ok(script
            .recipients
            .iter()
            .filter(|r| match lookup.key {
                LookupKey::Id => r.id == value,
                LookupKey::BankAccountId => r.bank_account_id.as_deref() == Some(value),
                LookupKey::Name => r.name.to_lowercase().contains(&value.to_lowercase()),
                LookupKey::ExternalId => r.external_id.as_deref() == Some(value),
            })
            .cloned()
            .collect())
    }

    async fn balance_operations(
        &self,
        query: &OperationsQuery,
    ) -> Result<OperationsPage, DashboardError> {
        self.enter(ServiceMethod::BalanceOperations)?;
        let skip = (query.page.saturating_sub(1) * query.count) as usize;
        Ok(OperationsPage {
            operations: self
                .operations
                .iter()
                .filter(|op| query.dates.contains(op.date))
                .skip(skip)
                .take(query.count as usize)
                .cloned()
                .collect(),
        })
    }

    async fn balance_data(
        &self,
        _recipient_id: &str,
        _query: &BalanceQuery,
    ) -> Result<BalanceData, DashboardError> {
        self.enter(ServiceMethod::BalanceData)?;
        let script = self.script.lock().unwrap();
        Ok(BalanceData {
            amounts: BalanceAmounts {
                available: 120_000,
                waiting_funds: 40_000,
                transferred: 10_000,
            },
            requests: script.requests.clone(),
        })
    }

    async fn balance_total(
        &self,
        _recipient_id: &str,
        dates: &DateRange,
    ) -> Result<BalanceTotals, DashboardError> {
        self.enter(ServiceMethod::BalanceTotal)?;
        Ok(self.totals_for(*dates))
    }

    async fn cancel_anticipation(
        &self,
        request: &CancelRequest,
    ) -> Result<CancelAck, DashboardError> {
        self.enter(ServiceMethod::CancelAnticipation)?;
        let mut script = self.script.lock().unwrap();
        let id = script
            .ack_override
            .clone()
            .unwrap_or_else(|| request.id.clone());
        script.requests.retain(|r| r.id != id);
        Ok(CancelAck {
            id,
            status: "canceled".to_string(),
        })
    }

    async fn export_balance_operations(
        &self,
        api_version: &str,
        query: &ExportQuery,
    ) -> Result<Vec<u8>, DashboardError> {
        self.enter(ServiceMethod::Export)?;
        self.script.lock().unwrap().export_version = Some(api_version.to_string());
        Ok(format!("recipient,start,end\n{},{},{}\n", query.recipient_id, query.start_date, query.end_date)
            .into_bytes())
    }
}
