//! Recipient dashboard core.
//!
//! Aggregates a recipient's profile, configuration and balance from several
//! partially failing remote calls into one view, keeps that view consistent
//! with the user's filter as it changes, and runs the configuration,
//! bank-account and cancellation mutations against it.

#![deny(unsafe_code)]

pub mod aggregation;
pub mod cancellation;
pub mod classifier;
pub mod config;
pub mod dashboard;
pub mod directory;
pub mod error;
pub mod filter;
pub mod generation;
pub mod mutation;
pub mod query;
pub mod schema;
pub mod service;
pub mod types;

#[cfg(test)]
mod testing;

pub use aggregation::{AggregationEngine, BalanceRefresh, RefetchScope};
pub use cancellation::{CancellationFlow, CancellationState};
pub use classifier::{classify, SearchPlan};
pub use config::DashboardConfig;
pub use dashboard::{PendingLoad, PendingRefetch, RecipientDashboard};
pub use directory::{PendingSearch, RecipientDirectory};
pub use error::DashboardError;
pub use filter::{
    FilterChange, FilterStateMachine, FilterTransition, PageSizePolicy, TransientSelection,
};
pub use generation::{FetchCategory, Generation, GenerationTracker};
pub use mutation::{
    BankAccountSave, BankAccountTransaction, LinkStage, MutationCoordinator, MutationFragment,
    MutationResult,
};
pub use query::QueryPersistence;
pub use service::{
    BalanceData, BalanceQuery, CancelAck, CancelRequest, DataService, ExportArtifact,
    ExportFormat, ExportQuery, Exporter, LookupKey, NewAccountRequest, OperationsPage,
    OperationsQuery, RecipientLookup, RecipientPatch, UpdatedRecipient,
};
pub use types::{
    AccountType, AnticipationConfig, AnticipationLimit, AnticipationLimits, AnticipationModel,
    BalanceAmounts, BalanceCursor, BalanceOperation, BalancePage, BalanceTotals, BankAccount,
    Configuration, DateRange, DocumentType, FilterState, Identification, LimitAmount,
    NewBankAccount, Pagination, PendingAnticipationRequest, RecipientData, RecipientDetail,
    RecipientProfile, RecipientSummary, SortDirection, SortOrder, TransferConfig,
    TransferInterval, ViewModel,
};
