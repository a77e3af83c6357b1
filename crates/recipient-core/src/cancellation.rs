use crate::error::DashboardError;
use crate::service::{CancelAck, CancelRequest, DataService};
use crate::types::PendingAnticipationRequest;
use tracing::{info, warn};

/// Where the destructive cancel action stands.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CancellationState {
    #[default]
    Idle,
    ConfirmPending(String),
    Cancelling(String),
}

impl CancellationState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ConfirmPending(_) => "confirm_pending",
            Self::Cancelling(_) => "cancelling",
        }
    }

    pub fn pending_id(&self) -> Option<&str> {
        match self {
            Self::Idle => None,
            Self::ConfirmPending(id) | Self::Cancelling(id) => Some(id),
        }
    }
}

/// Confirmation-guarded cancellation of one pending anticipation request.
///
/// `Idle → ConfirmPending(id) → Cancelling(id) → Idle`. A request leaves the
/// local list only once the remote side acknowledged that exact id.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlow {
    state: CancellationState,
}

impl CancellationFlow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &CancellationState {
        &self.state
    }

    pub fn request(&mut self, id: impl Into<String>) -> Result<(), DashboardError> {
        if self.state != CancellationState::Idle {
            return Err(DashboardError::stage_violation("idle", self.state.name()));
        }
        self.state = CancellationState::ConfirmPending(id.into());
        Ok(())
    }

    /// Back out of the confirmation prompt. No remote call is made.
    pub fn dismiss(&mut self) -> Result<(), DashboardError> {
        match self.state {
            CancellationState::ConfirmPending(_) => {
                self.state = CancellationState::Idle;
                Ok(())
            }
            _ => Err(DashboardError::stage_violation(
                "confirm_pending",
                self.state.name(),
            )),
        }
    }

    /// Enter `Cancelling` and build the remote request for the pending id.
    pub fn begin_confirm(&mut self, recipient_id: &str) -> Result<CancelRequest, DashboardError> {
        let id = match &self.state {
            CancellationState::ConfirmPending(id) => id.clone(),
            other => {
                return Err(DashboardError::stage_violation(
                    "confirm_pending",
                    other.name(),
                ))
            }
        };
        self.state = CancellationState::Cancelling(id.clone());
        Ok(CancelRequest {
            id,
            recipient_id: recipient_id.to_string(),
        })
    }

    /// Settle the remote outcome and return to `Idle`. On success the
    /// acknowledged request is removed from `requests`; on any failure the
    /// list is left untouched.
    pub fn finish_confirm(
        &mut self,
        outcome: Result<CancelAck, DashboardError>,
        requests: &mut Vec<PendingAnticipationRequest>,
    ) -> Result<String, DashboardError> {
        let expected = match std::mem::take(&mut self.state) {
            CancellationState::Cancelling(id) => id,
            other => {
                let err = DashboardError::stage_violation("cancelling", other.name());
                self.state = other;
                return Err(err);
            }
        };

        let ack = outcome.map_err(|err| {
            warn!(request = %expected, error = %err, "anticipation cancel failed");
            err
        })?;

        if ack.id != expected {
            warn!(request = %expected, acknowledged = %ack.id, "cancel acknowledged another request");
            return Err(DashboardError::AcknowledgementMismatch {
                expected,
                actual: ack.id,
            });
        }

        requests.retain(|r| r.id != expected);
        info!(request = %expected, status = %ack.status, "anticipation request cancelled");
        Ok(expected)
    }

    pub async fn confirm(
        &mut self,
        service: &dyn DataService,
        recipient_id: &str,
        requests: &mut Vec<PendingAnticipationRequest>,
    ) -> Result<String, DashboardError> {
        let request = self.begin_confirm(recipient_id)?;
        let outcome = service.cancel_anticipation(&request).await;
        self.finish_confirm(outcome, requests)
    }
}
