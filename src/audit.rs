//! Best-effort audit trail for ledger mutations.

use chrono::Utc;
use tracing::{error, info};

use crate::database::Database;
use crate::models::AuditEntry;

/// Network metadata of the caller, attached to audit entries
#[derive(Debug, Clone, Default)]
pub struct Actor {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Appends audit entries without ever failing the triggering operation.
#[derive(Clone)]
pub struct AuditSink {
    db: Database,
}

impl AuditSink {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Append an entry on a detached task. Failures are logged, never
    /// surfaced to the caller.
    pub fn record(&self, entry: AuditEntry) {
        let db = self.db.clone();
        tokio::spawn(async move {
            match db.append_audit(&entry, Utc::now()).await {
                Ok(()) => info!(
                    action = entry.action.as_str(),
                    entity = %entry.entity,
                    entity_id = %entry.entity_id,
                    "Audit entry recorded"
                ),
                Err(e) => error!("Failed to record audit entry: {e}"),
            }
        });
    }
}
