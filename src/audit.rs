//! Audit log collaborator.
//!
//! The ledger emits one [`AuditEvent`] after each committed create, approve or
//! delete. Sinks are fire-and-forget from the ledger's point of view: a failing
//! sink is logged and the posting stands.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use crate::types::Actor;

/// One audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub action: String,
    pub module: String,
    pub entity_id: String,
    pub company_id: String,
    pub user_id: String,
    pub payload: serde_json::Value,
}

impl AuditEvent {
    pub fn new(
        actor: &Actor,
        action: &str,
        module: &str,
        entity_id: &str,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            action: action.to_string(),
            module: module.to_string(),
            entity_id: entity_id.to_string(),
            company_id: actor.company_id.clone(),
            user_id: actor.user_id.clone(),
            payload,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("audit sink failed: {0}")]
pub struct AuditError(pub String);

/// Destination for audit events
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent) -> Result<(), AuditError>;
}

/// Writes audit events to the `tracing` pipeline
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) -> Result<(), AuditError> {
        tracing::info!(
            target: "audit",
            action = %event.action,
            module = %event.module,
            entity_id = %event.entity_id,
            company_id = %event.company_id,
            user_id = %event.user_id,
            payload = %event.payload,
            "audit"
        );
        Ok(())
    }
}

/// Keeps audit events in memory
#[derive(Debug, Default, Clone)]
pub struct MemoryAuditLog {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every event recorded so far
    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn actions(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.action).collect()
    }
}

impl AuditSink for MemoryAuditLog {
    fn record(&self, event: &AuditEvent) -> Result<(), AuditError> {
        self.events
            .lock()
            .map_err(|_| AuditError("audit log lock poisoned".to_string()))?
            .push(event.clone());
        Ok(())
    }
}

/// Hands an event to a sink, logging instead of propagating failures.
pub(crate) fn emit(sink: &dyn AuditSink, event: AuditEvent) {
    if let Err(err) = sink.record(&event) {
        tracing::warn!(
            error = %err,
            action = %event.action,
            entity_id = %event.entity_id,
            "Failed to record audit event"
        );
    }
}
