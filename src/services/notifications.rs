use std::sync::Arc;
use uuid::Uuid;

use crate::domain::Notification;
use crate::error::AppError;
use crate::ports::Store;

/// Writes in-app notifications. Delivery is best effort: a failed insert is
/// logged and never surfaces to the request that triggered it.
#[derive(Clone)]
pub struct Notifier {
    store: Arc<dyn Store>,
}

impl Notifier {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn notify(&self, user_id: Uuid, kind: &str, title: &str, body: impl Into<String>) {
        let notification = Notification::new(user_id, kind, title, body);
        if let Err(e) = self.store.insert_notification(&notification).await {
            tracing::warn!(user_id = %user_id, kind, error = %e, "Failed to store notification");
        }
    }

    pub async fn list(&self, user_id: Uuid, unread_only: bool) -> Result<Vec<Notification>, AppError> {
        Ok(self.store.list_notifications(user_id, unread_only).await?)
    }

    pub async fn mark_read(&self, user_id: Uuid, id: Uuid) -> Result<Notification, AppError> {
        self.store
            .mark_notification_read(user_id, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Notification {} not found", id)))
    }

    pub async fn mark_all_read(&self, user_id: Uuid) -> Result<u64, AppError> {
        Ok(self.store.mark_all_notifications_read(user_id).await?)
    }
}
