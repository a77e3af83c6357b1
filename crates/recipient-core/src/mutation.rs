use crate::error::DashboardError;
use crate::service::{DataService, NewAccountRequest, RecipientPatch, UpdatedRecipient};
use crate::types::{AnticipationConfig, BankAccount, NewBankAccount, TransferConfig, ViewModel};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Shape of a bank account save request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum BankAccountSave {
    /// Point the recipient at an already persisted account.
    Existing { id: String },
    /// Create the account first, then point the recipient at it.
    New(NewBankAccount),
}

/// View fragment a successful mutation merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationFragment {
    Anticipation(AnticipationConfig),
    Transfer(TransferConfig),
    BankAccount { account: BankAccount, created: bool },
}

pub type MutationResult = Result<MutationFragment, DashboardError>;

/// Stages of the create-then-link bank account script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStage {
    Pending,
    Created,
    Appended,
    Linked,
}

impl LinkStage {
    pub fn name(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Created => "created",
            Self::Appended => "appended",
            Self::Linked => "linked",
        }
    }
}

/// Enforces create → append → link ordering for a new bank account.
///
/// Stopping after `Appended` is the "account created, link pending" window:
/// the local account list already holds the account while the recipient's
/// configuration does not reference it yet.
#[derive(Debug, Clone)]
pub struct BankAccountTransaction {
    stage: LinkStage,
    account_id: Option<String>,
}

impl BankAccountTransaction {
    pub fn new() -> Self {
        Self {
            stage: LinkStage::Pending,
            account_id: None,
        }
    }

    pub fn stage(&self) -> LinkStage {
        self.stage
    }

    pub fn account_id(&self) -> Option<&str> {
        self.account_id.as_deref()
    }

    pub fn mark_created(&mut self, account_id: impl Into<String>) -> Result<(), DashboardError> {
        self.advance(LinkStage::Pending, LinkStage::Created)?;
        self.account_id = Some(account_id.into());
        Ok(())
    }

    pub fn mark_appended(&mut self) -> Result<(), DashboardError> {
        self.advance(LinkStage::Created, LinkStage::Appended)
    }

    pub fn mark_linked(&mut self) -> Result<(), DashboardError> {
        self.advance(LinkStage::Appended, LinkStage::Linked)
    }

    /// Error describing a transaction that stopped before linking.
    pub fn link_pending(&self, cause: &DashboardError) -> DashboardError {
        DashboardError::AccountLinkPending {
            account_id: self.account_id.clone().unwrap_or_default(),
            message: cause.to_string(),
        }
    }

    fn advance(&mut self, expected: LinkStage, next: LinkStage) -> Result<(), DashboardError> {
        if self.stage != expected {
            return Err(DashboardError::stage_violation(
                expected.name(),
                self.stage.name(),
            ));
        }
        self.stage = next;
        Ok(())
    }
}

impl Default for BankAccountTransaction {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs configuration and bank account mutations against the data service
/// and merges their results into the view.
#[derive(Clone)]
pub struct MutationCoordinator {
    service: Arc<dyn DataService>,
    recipient_id: String,
}

impl MutationCoordinator {
    pub fn new(service: Arc<dyn DataService>, recipient_id: impl Into<String>) -> Self {
        Self {
            service,
            recipient_id: recipient_id.into(),
        }
    }

    pub async fn save_anticipation_config(
        &self,
        view: &mut ViewModel,
        data: AnticipationConfig,
    ) -> MutationResult {
        self.service
            .update_recipient(&self.recipient_id, &RecipientPatch::Anticipation(data.clone()))
            .await?;

        view.configuration.anticipation = data.clone();
        info!(recipient = %self.recipient_id, "anticipation configuration saved");
        Ok(MutationFragment::Anticipation(data))
    }

    pub async fn save_transfer_config(
        &self,
        view: &mut ViewModel,
        data: TransferConfig,
    ) -> MutationResult {
        self.service
            .update_recipient(&self.recipient_id, &RecipientPatch::transfer(data.clone()))
            .await?;

        view.configuration.transfer = data.clone();
        info!(
            recipient = %self.recipient_id,
            transfer_enabled = data.transfer_enabled,
            "transfer configuration saved"
        );
        Ok(MutationFragment::Transfer(data))
    }

    pub async fn save_bank_account(
        &self,
        view: &mut ViewModel,
        data: BankAccountSave,
    ) -> MutationResult {
        match data {
            BankAccountSave::Existing { id } => {
                let updated = self
                    .service
                    .update_recipient(
                        &self.recipient_id,
                        &RecipientPatch::BankAccount {
                            bank_account_id: id,
                        },
                    )
                    .await?;
                let account = merge_linked_account(view, updated)?;
                info!(recipient = %self.recipient_id, account = %account.id, "bank account linked");
                Ok(MutationFragment::BankAccount {
                    account,
                    created: false,
                })
            }
            BankAccountSave::New(raw) => self.create_and_link(view, raw).await,
        }
    }

    async fn create_and_link(&self, view: &mut ViewModel, raw: NewBankAccount) -> MutationResult {
        let mut tx = BankAccountTransaction::new();

        let request = NewAccountRequest {
            bank_account: raw,
            identification: view.profile.identification.clone(),
        };
        let created = self.service.create_bank_account(&request).await?;
        tx.mark_created(created.id.clone())?;

        view.accounts.push(created.clone());
        tx.mark_appended()?;

        let patch = RecipientPatch::BankAccount {
            bank_account_id: created.id.clone(),
        };
        let updated = match self.service.update_recipient(&self.recipient_id, &patch).await {
            Ok(updated) => updated,
            Err(err) => {
                let pending = tx.link_pending(&err);
                warn!(
                    recipient = %self.recipient_id,
                    account = %created.id,
                    stage = tx.stage().name(),
                    error = %err,
                    "bank account created but link failed"
                );
                return Err(pending);
            }
        };
        tx.mark_linked()?;

        let account = merge_linked_account(view, updated)?;
        info!(
            recipient = %self.recipient_id,
            account = %account.id,
            "bank account created and linked"
        );
        Ok(MutationFragment::BankAccount {
            account,
            created: true,
        })
    }
}

/// The account echoed by the update becomes the configured account and its
/// holder name becomes the profile name.
fn merge_linked_account(
    view: &mut ViewModel,
    updated: UpdatedRecipient,
) -> Result<BankAccount, DashboardError> {
    let account = updated.bank_account.ok_or_else(|| {
        DashboardError::schema("recipient.update", "response carries no bank_account")
    })?;
    view.profile.name = account.name.clone();
    view.configuration.bank_account = Some(account.clone());
    Ok(account)
}
