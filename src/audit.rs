use crate::models::{Identity, ProductId};

/// Emits one audit line for a write made by a signed-in admin.
pub fn record(actor: &Identity, action: &str, resource: &ProductId) {
    tracing::info!(
        target: "audit",
        user_id = %actor.id,
        email = actor.email.as_deref().unwrap_or("-"),
        action,
        resource = %resource,
        "admin action"
    );
}
