//! Signed, single-use confirmations and the audit trail around them.
//!
//! [`SecurityContext`] owns every piece of process-wide confirmation state:
//! the HMAC secret, the clock, pending confirmations and the audit ring.
//! Nothing here is global, so tests and concurrent orchestrators each get
//! their own instance.
//!
//! A pending confirmation is consumed by the first response naming its id,
//! whatever the outcome. Verification failures only block persisting a grant;
//! the one-shot approve/deny decision always follows the user's answer.

mod audit;
mod clock;
mod error;
pub mod gate;
mod pending;
mod secret;

pub use audit::{AuditAction, AuditEntry, AuditLog, AuditSink};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::ConfirmationError;
pub use gate::{
    ChannelConfirmationUi, ConfirmationGate, ConfirmationPrompt, ConfirmationRequest,
    ConfirmationResponse, ConfirmationUi, RememberToken, ResponseOutcome,
};
pub use pending::{PendingConfirmation, PendingConfirmations};
pub use secret::{FileSecretStore, MemorySecretStore, ProcessSecret, SecretStore};

use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::config::{
    CoreConfig, DEFAULT_AUDIT_CAPACITY, DEFAULT_CONFIRMATION_TTL_SECS, DEFAULT_GRANT_TTL_SECS,
    DEFAULT_MAX_PENDING,
};
use crate::permissions::PermissionGrant;

/// Outcome of a confirmation response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Whether the one-shot action should proceed.
    pub approved: bool,
    /// `None` when nothing was asked to be remembered.
    pub grant: Option<Result<PermissionGrant, ConfirmationError>>,
}

/// Process-wide confirmation state: secret, clock, pending entries and audit.
pub struct SecurityContext {
    secret: ProcessSecret,
    clock: Arc<dyn Clock>,
    pending: Mutex<PendingConfirmations>,
    audit: Mutex<AuditLog>,
    sink: Option<Arc<dyn AuditSink>>,
    ttl: Duration,
    grant_ttl: Duration,
}

impl SecurityContext {
    /// Start from the defaults: fresh secret, system clock, 5 minute TTL.
    pub fn builder() -> SecurityContextBuilder {
        SecurityContextBuilder::default()
    }

    /// Build from configuration, loading (or creating) the persisted secret.
    pub async fn from_config(config: &CoreConfig) -> crate::Result<Self> {
        config.validate()?;

        let store: Box<dyn SecretStore> = match (&config.secret_path, config.persist_secret) {
            (_, false) => Box::new(MemorySecretStore::new()),
            (Some(path), true) => Box::new(FileSecretStore::new(path.clone())),
            (None, true) => match FileSecretStore::default_location() {
                Some(store) => Box::new(store),
                None => {
                    tracing::warn!("no data directory; confirmation secret is session-scoped");
                    Box::new(MemorySecretStore::new())
                }
            },
        };
        let secret = ProcessSecret::load_or_generate(store.as_ref()).await;

        Ok(Self::builder()
            .secret(secret)
            .ttl(config.confirmation_ttl())
            .grant_ttl(config.grant_ttl())
            .max_pending(config.max_pending_confirmations)
            .audit_capacity(config.audit_capacity)
            .build())
    }

    /// Current time according to the configured clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// How long an issued confirmation stays valid.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Lifetime of a remembered grant.
    pub fn grant_ttl(&self) -> Duration {
        self.grant_ttl
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, PendingConfirmations> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a pending confirmation for `tool` on `path` and sign it.
    pub fn issue(
        &self,
        tool: impl Into<String>,
        path: impl Into<String>,
    ) -> Result<PendingConfirmation, ConfirmationError> {
        let tool = tool.into();
        let path = path.into();
        let issued_at = self.now();
        let token = self.secret.sign(&tool, &path, issued_at)?;

        let pending = PendingConfirmation {
            id: uuid::Uuid::new_v4().to_string(),
            tool,
            path,
            issued_at,
            token,
        };

        let evicted = self.pending().insert(pending.clone());
        for entry in evicted {
            tracing::debug!(
                id = %entry.id,
                tool = %entry.tool,
                "pending confirmation evicted at capacity"
            );
        }

        tracing::trace!(id = %pending.id, tool = %pending.tool, "confirmation issued");
        Ok(pending)
    }

    /// Whether `id` is still waiting for a response.
    pub fn is_pending(&self, id: &str) -> bool {
        self.pending().get(id).is_some()
    }

    pub fn pending_count(&self) -> usize {
        self.pending().len()
    }

    /// Drop a pending confirmation without verifying it.
    pub fn discard(&self, id: &str) -> bool {
        self.pending().take(id).is_some()
    }

    /// Check the token carried by a response, consuming the pending entry.
    ///
    /// Returns the entry as issued; the echoed tool/path are only compared,
    /// never trusted.
    pub fn verify(
        &self,
        response: &ConfirmationResponse,
    ) -> Result<PendingConfirmation, ConfirmationError> {
        let now = self.now();
        let entry = self.pending().take(&response.id);
        let Some(entry) = entry else {
            let tool = response.tool.as_deref().unwrap_or("unknown");
            self.fail_verification(tool, response.path.as_deref(), &ConfirmationError::InvalidId);
            return Err(ConfirmationError::InvalidId);
        };

        let result = self.check(&entry, response, now);
        match &result {
            Err(ConfirmationError::Expired) => {
                self.expired(&entry, now);
            }
            Err(err) => self.fail_verification(&entry.tool, Some(&entry.path), err),
            Ok(()) => {}
        }
        result.map(|()| entry)
    }

    fn check(
        &self,
        entry: &PendingConfirmation,
        response: &ConfirmationResponse,
        now: DateTime<Utc>,
    ) -> Result<(), ConfirmationError> {
        let Some(token) = response.token.as_deref() else {
            return Err(ConfirmationError::MissingToken);
        };
        let echoed_tool = response.tool.as_deref().unwrap_or(&entry.tool);
        let echoed_path = response.path.as_deref().unwrap_or(&entry.path);
        if echoed_tool != entry.tool
            || echoed_path != entry.path
            || !self.secret.verify(&entry.tool, &entry.path, entry.issued_at, token)
        {
            return Err(ConfirmationError::TokenMismatch);
        }
        if entry.is_expired(now, self.ttl) {
            return Err(ConfirmationError::Expired);
        }
        Ok(())
    }

    /// Settle a response: the action follows `approved`, a grant is only
    /// produced for a verified `approved && remember` that passes the
    /// wildcard rule.
    pub fn resolve(&self, response: &ConfirmationResponse) -> Resolution {
        if !(response.approved && response.remember) {
            self.discard(&response.id);
            return Resolution {
                approved: response.approved,
                grant: None,
            };
        }

        let grant = self.verify(response).and_then(|entry| {
            let grant =
                PermissionGrant::for_target(entry.tool, &entry.path, self.now(), self.grant_ttl);
            if let Err(err) = grant.validate() {
                self.fail_verification(&grant.tool, Some(&grant.path_pattern), &err);
                return Err(err);
            }
            Ok(grant)
        });

        Resolution {
            approved: true,
            grant: Some(grant),
        }
    }

    /// Evict every pending confirmation past its TTL. Returns the count.
    pub fn sweep_expired(&self) -> usize {
        let now = self.now();
        let expired = self.pending().drain_expired(now, self.ttl);
        for entry in &expired {
            self.expired(entry, now);
        }
        expired.len()
    }

    /// Audit a grant that was persisted.
    pub fn record_grant(&self, grant: &PermissionGrant) {
        self.append(
            AuditEntry::new(self.now(), AuditAction::Grant, &grant.tool)
                .path(&grant.path_pattern)
                .details(serde_json::json!({ "expiresAt": grant.expires_at })),
        );
    }

    /// Audit a revoked grant.
    pub fn record_revoke(&self, tool: &str, path_pattern: &str) {
        self.append(AuditEntry::new(self.now(), AuditAction::Revoke, tool).path(path_pattern));
    }

    /// Retained audit entries, oldest first.
    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.audit
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries()
    }

    fn fail_verification(&self, tool: &str, path: Option<&str>, err: &ConfirmationError) {
        tracing::warn!(
            tool = %tool,
            path = ?path,
            reason = err.code(),
            "confirmation verification failed"
        );
        let mut entry =
            AuditEntry::new(self.now(), AuditAction::VerifyFail, tool).reason(err.code());
        if let Some(path) = path {
            entry = entry.path(path);
        }
        self.append(entry);
    }

    fn expired(&self, entry: &PendingConfirmation, now: DateTime<Utc>) {
        let age = entry.age(now);
        tracing::warn!(
            id = %entry.id,
            tool = %entry.tool,
            age_secs = age.as_secs(),
            "confirmation token expired"
        );
        self.append(
            AuditEntry::new(now, AuditAction::TokenExpired, &entry.tool)
                .path(&entry.path)
                .details(serde_json::json!({ "id": entry.id, "ageSecs": age.as_secs() })),
        );
    }

    fn append(&self, entry: AuditEntry) {
        if let Some(sink) = &self.sink {
            sink.record(&entry);
        }
        self.audit
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    /// Periodically evict expired confirmations until the handle is stopped
    /// or dropped. The task holds only a weak reference.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> SweeperHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let weak: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(ctx) = weak.upgrade() else { break };
                        let evicted = ctx.sweep_expired();
                        if evicted > 0 {
                            tracing::debug!(evicted, "swept expired confirmations");
                        }
                    }
                }
            }
        });

        SweeperHandle { cancel }
    }
}

impl std::fmt::Debug for SecurityContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityContext")
            .field("ttl", &self.ttl)
            .field("grant_ttl", &self.grant_ttl)
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

/// Stops the sweeper on [`stop`](Self::stop) or drop.
#[derive(Debug)]
pub struct SweeperHandle {
    cancel: CancellationToken,
}

impl SweeperHandle {
    /// Cancel the sweeper task.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Builder for [`SecurityContext`].
pub struct SecurityContextBuilder {
    secret: Option<ProcessSecret>,
    clock: Arc<dyn Clock>,
    sink: Option<Arc<dyn AuditSink>>,
    ttl: Duration,
    grant_ttl: Duration,
    max_pending: usize,
    audit_capacity: usize,
}

impl Default for SecurityContextBuilder {
    fn default() -> Self {
        Self {
            secret: None,
            clock: Arc::new(SystemClock),
            sink: None,
            ttl: Duration::from_secs(DEFAULT_CONFIRMATION_TTL_SECS),
            grant_ttl: Duration::from_secs(DEFAULT_GRANT_TTL_SECS),
            max_pending: DEFAULT_MAX_PENDING,
            audit_capacity: DEFAULT_AUDIT_CAPACITY,
        }
    }
}

impl SecurityContextBuilder {
    /// Use an existing secret, typically one loaded from a [`SecretStore`].
    pub fn secret(mut self, secret: ProcessSecret) -> Self {
        self.secret = Some(secret);
        self
    }

    /// Replace the system clock, e.g. with a [`ManualClock`] in tests.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Also forward every audit entry to `sink`.
    pub fn sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Confirmation token lifetime.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Lifetime of grants produced by `resolve`.
    pub fn grant_ttl(mut self, ttl: Duration) -> Self {
        self.grant_ttl = ttl;
        self
    }

    /// Pending confirmations kept before the oldest is evicted.
    pub fn max_pending(mut self, max: usize) -> Self {
        self.max_pending = max;
        self
    }

    /// Size of the in-memory audit ring.
    pub fn audit_capacity(mut self, capacity: usize) -> Self {
        self.audit_capacity = capacity;
        self
    }

    /// Without an explicit secret a fresh in-memory one is generated.
    pub fn build(self) -> SecurityContext {
        SecurityContext {
            secret: self.secret.unwrap_or_else(ProcessSecret::generate),
            clock: self.clock,
            pending: Mutex::new(PendingConfirmations::new(self.max_pending)),
            audit: Mutex::new(AuditLog::new(self.audit_capacity)),
            sink: self.sink,
            ttl: self.ttl,
            grant_ttl: self.grant_ttl,
        }
    }
}
