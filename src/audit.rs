use crate::{models::NewAuditEntry, repository::RepositoryState};

/// record
///
/// Appends an audit row. A failed write is logged and otherwise ignored so that the
/// action being audited still completes.
pub async fn record(repo: &RepositoryState, entry: NewAuditEntry) {
    let action = entry.action;
    if let Err(e) = repo.record_audit(entry).await {
        tracing::error!(%action, error = %e, "failed to write audit entry");
    }
}
