//! Round trip between a tool asking for approval and the user answering it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use super::{ConfirmationError, SecurityContext};
use crate::permissions::PermissionStore;

/// What the UI renders. Carries no token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationRequest {
    pub id: String,
    pub tool: String,
    pub description: String,
    pub args: Value,
}

/// What the UI sends back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationResponse {
    pub id: String,
    pub approved: bool,
    #[serde(default)]
    pub remember: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl ConfirmationResponse {
    /// One-shot approval without remembering.
    pub fn approve(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            approved: true,
            remember: false,
            tool: None,
            path: None,
            token: None,
        }
    }

    pub fn deny(id: impl Into<String>) -> Self {
        Self {
            approved: false,
            ..Self::approve(id)
        }
    }

    /// Ask for the approval to be persisted, presenting the issued token.
    pub fn remember(
        mut self,
        tool: impl Into<String>,
        path: impl Into<String>,
        token: &RememberToken,
    ) -> Self {
        self.remember = true;
        self.tool = Some(tool.into());
        self.path = Some(path.into());
        self.token = Some(token.expose().to_string());
        self
    }
}

/// Proof of issuance, handed to the host bridge next to the request and
/// attached to the response only when the user asks to remember.
#[derive(Clone, PartialEq, Eq)]
pub struct RememberToken(String);

impl RememberToken {
    /// The raw token; only echo it back in a response.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for RememberToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RememberToken([REDACTED])")
    }
}

/// A tool's description of the action awaiting approval.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmationPrompt {
    pub tool: String,
    pub description: String,
    pub args: Value,
    /// Target the grant would cover; `*` for path-less actions.
    pub path: String,
}

impl ConfirmationPrompt {
    pub fn new(
        tool: impl Into<String>,
        description: impl Into<String>,
        args: Value,
        path: impl Into<String>,
    ) -> Self {
        Self {
            tool: tool.into(),
            description: description.into(),
            args,
            path: path.into(),
        }
    }
}

/// Delivers confirmation requests to the front end.
#[async_trait::async_trait]
pub trait ConfirmationUi: Send + Sync {
    async fn send(&self, request: ConfirmationRequest, token: RememberToken) -> crate::Result<()>;
}

/// Forwards requests over a channel; the receiving side owns the UI.
#[derive(Debug, Clone)]
pub struct ChannelConfirmationUi {
    tx: mpsc::Sender<(ConfirmationRequest, RememberToken)>,
}

impl ChannelConfirmationUi {
    pub fn new(tx: mpsc::Sender<(ConfirmationRequest, RememberToken)>) -> Self {
        Self { tx }
    }

    /// UI backed by a channel, plus the receiving end for the front end.
    pub fn channel(
        buffer: usize,
    ) -> (Self, mpsc::Receiver<(ConfirmationRequest, RememberToken)>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self::new(tx), rx)
    }
}

#[async_trait::async_trait]
impl ConfirmationUi for ChannelConfirmationUi {
    async fn send(&self, request: ConfirmationRequest, token: RememberToken) -> crate::Result<()> {
        self.tx
            .send((request, token))
            .await
            .map_err(|_| crate::Error::Permission("confirmation UI disconnected".into()))
    }
}

/// Result of [`ConfirmationGate::respond`] for a response that reached its requester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseOutcome {
    pub approved: bool,
    pub remembered: bool,
    /// Why a requested grant was not persisted.
    pub error: Option<ConfirmationError>,
}

impl ResponseOutcome {
    /// Approved and, if asked, remembered without error.
    pub fn success(&self) -> bool {
        self.error.is_none()
    }
}

/// Asks the user before sensitive actions and remembers approvals.
pub struct ConfirmationGate {
    security: Arc<SecurityContext>,
    store: Arc<dyn PermissionStore>,
    ui: Arc<dyn ConfirmationUi>,
    waiters: Mutex<HashMap<String, oneshot::Sender<bool>>>,
}

impl ConfirmationGate {
    pub fn new(
        security: Arc<SecurityContext>,
        store: Arc<dyn PermissionStore>,
        ui: Arc<dyn ConfirmationUi>,
    ) -> Self {
        Self {
            security,
            store,
            ui,
            waiters: Mutex::new(HashMap::new()),
        }
    }

    pub fn security(&self) -> &Arc<SecurityContext> {
        &self.security
    }

    pub fn store(&self) -> &Arc<dyn PermissionStore> {
        &self.store
    }

    fn waiters(&self) -> MutexGuard<'_, HashMap<String, oneshot::Sender<bool>>> {
        self.waiters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Requests currently waiting for an answer.
    pub fn waiting(&self) -> usize {
        self.waiters().len()
    }

    /// Ask the user, unless an active grant already covers the action.
    ///
    /// Resolves to `false` on denial, on timeout after the confirmation TTL,
    /// and when the UI cannot be reached.
    pub async fn request(&self, prompt: ConfirmationPrompt) -> bool {
        match self
            .store
            .find(&prompt.tool, &prompt.path, self.security.now())
            .await
        {
            Ok(Some(grant)) => {
                tracing::debug!(tool = %prompt.tool, pattern = %grant.path_pattern, "approved by stored grant");
                return true;
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(tool = %prompt.tool, error = %e, "permission lookup failed"),
        }

        let pending = match self.security.issue(&prompt.tool, &prompt.path) {
            Ok(pending) => pending,
            Err(e) => {
                tracing::warn!(tool = %prompt.tool, error = %e, "cannot issue confirmation");
                return false;
            }
        };

        let (tx, rx) = oneshot::channel();
        self.waiters().insert(pending.id.clone(), tx);
        let _forget = ForgetOnDrop {
            gate: self,
            id: &pending.id,
        };

        let request = ConfirmationRequest {
            id: pending.id.clone(),
            tool: prompt.tool,
            description: prompt.description,
            args: prompt.args,
        };
        if let Err(e) = self.ui.send(request, RememberToken(pending.token)).await {
            tracing::warn!(id = %pending.id, error = %e, "confirmation UI unreachable");
            return false;
        }

        let approved = match tokio::time::timeout(self.security.ttl(), rx).await {
            Ok(Ok(approved)) => approved,
            Ok(Err(_)) => false,
            Err(_) => {
                tracing::debug!(id = %pending.id, "confirmation timed out");
                false
            }
        };
        approved
    }

    /// Deliver the user's answer to the waiting requester and, when asked to,
    /// persist it as a grant.
    ///
    /// `Err` only when nobody is waiting for this id any more; every other
    /// failure is reported in [`ResponseOutcome::error`] while the answer is
    /// still delivered.
    pub async fn respond(
        &self,
        response: ConfirmationResponse,
    ) -> Result<ResponseOutcome, ConfirmationError> {
        let waiter = self.waiters().remove(&response.id);
        let Some(waiter) = waiter.filter(|w| !w.is_closed()) else {
            self.security.discard(&response.id);
            return Err(ConfirmationError::AgentUnavailable);
        };

        let resolution = self.security.resolve(&response);
        if waiter.send(resolution.approved).is_err() {
            return Err(ConfirmationError::AgentUnavailable);
        }

        let mut outcome = ResponseOutcome {
            approved: resolution.approved,
            remembered: false,
            error: None,
        };
        match resolution.grant {
            None => {}
            Some(Err(e)) => outcome.error = Some(e),
            Some(Ok(grant)) => match self.store.save(grant.clone()).await {
                Ok(()) => {
                    self.security.record_grant(&grant);
                    outcome.remembered = true;
                }
                Err(e) => {
                    tracing::warn!(tool = %grant.tool, error = %e, "failed to persist grant");
                    outcome.error = Some(ConfirmationError::Storage {
                        message: e.to_string(),
                    });
                }
            },
        }
        Ok(outcome)
    }

    /// Remove a stored grant. Returns whether one existed.
    pub async fn revoke(&self, tool: &str, path_pattern: &str) -> crate::Result<bool> {
        let removed = self.store.revoke(tool, path_pattern).await?;
        if removed {
            self.security.record_revoke(tool, path_pattern);
        }
        Ok(removed)
    }
}

/// Clears a request's waiter and pending entry however the request ends,
/// including when its future is dropped.
struct ForgetOnDrop<'a> {
    gate: &'a ConfirmationGate,
    id: &'a str,
}

impl Drop for ForgetOnDrop<'_> {
    fn drop(&mut self) {
        self.gate.waiters().remove(self.id);
        self.gate.security.discard(self.id);
    }
}

impl std::fmt::Debug for ConfirmationGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfirmationGate")
            .field("security", &self.security)
            .field("waiting", &self.waiting())
            .finish_non_exhaustive()
    }
}
