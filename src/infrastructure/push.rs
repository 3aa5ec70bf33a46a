use crate::domain::account::PushToken;
use crate::domain::ports::{Notification, NotificationSink};
use crate::error::Result;
use async_trait::async_trait;
use tracing::info;

/// Stands in for a real push provider: every delivery is written to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn deliver(&self, device: &PushToken, notification: &Notification) -> Result<()> {
        info!(
            account = %notification.account_number,
            platform = %device.platform,
            badge = notification.badge,
            sound = %notification.sound,
            "push: {}",
            notification.message
        );
        Ok(())
    }
}
