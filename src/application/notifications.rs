use crate::domain::ports::{AccountRepositoryRef, Notification, NotificationSinkRef};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Delivery attempts per device before a notification is dropped.
pub const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_STEP: Duration = Duration::from_millis(200);

/// Fire-and-forget queue in front of the push provider.
///
/// Enqueuing never blocks and never fails the caller; a single worker task
/// resolves each account's devices and delivers with bounded retries.
#[derive(Clone)]
pub struct NotificationOutbox {
    sender: mpsc::UnboundedSender<Notification>,
}

impl NotificationOutbox {
    /// Spawns the delivery worker. The worker stops once every outbox clone
    /// has been dropped and the queue has drained.
    pub fn start(
        accounts: AccountRepositoryRef,
        sink: NotificationSinkRef,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(receiver, accounts, sink));
        (Self { sender }, worker)
    }

    pub fn enqueue(&self, notification: Notification) {
        if let Err(e) = self.sender.send(notification) {
            warn!(
                account = %e.0.account_number,
                "notification worker is gone, dropping notification"
            );
        }
    }
}

async fn run_worker(
    mut receiver: mpsc::UnboundedReceiver<Notification>,
    accounts: AccountRepositoryRef,
    sink: NotificationSinkRef,
) {
    while let Some(notification) = receiver.recv().await {
        let devices = match accounts
            .push_tokens_for_account(&notification.account_number)
            .await
        {
            Ok(devices) => devices,
            Err(e) => {
                warn!(
                    account = %notification.account_number,
                    error = %e,
                    "could not resolve push tokens"
                );
                continue;
            }
        };
        for device in devices {
            let mut attempt = 1;
            loop {
                match sink.deliver(&device, &notification).await {
                    Ok(()) => {
                        debug!(
                            account = %device.account_number,
                            platform = %device.platform,
                            "notification delivered"
                        );
                        break;
                    }
                    Err(e) if attempt < MAX_ATTEMPTS => {
                        debug!(attempt, error = %e, "notification delivery failed, retrying");
                        tokio::time::sleep(BACKOFF_STEP * attempt).await;
                        attempt += 1;
                    }
                    Err(e) => {
                        warn!(
                            account = %device.account_number,
                            platform = %device.platform,
                            error = %e,
                            "giving up on notification"
                        );
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::{PushPlatform, PushToken};
    use crate::domain::ports::{AccountRepository, NotificationSink};
    use crate::error::{BankError, Result};
    use crate::infrastructure::in_memory::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` deliveries, then succeeds.
    struct FlakySink {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl NotificationSink for FlakySink {
        async fn deliver(&self, _device: &PushToken, _notification: &Notification) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(BankError::internal("provider unavailable"));
            }
            Ok(())
        }
    }

    async fn store_with_device() -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .upsert_push_token(PushToken {
                account_number: "acc-1".to_string(),
                token: "device".to_string(),
                platform: PushPlatform::Android,
            })
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_delivery_is_retried() {
        let sink = Arc::new(FlakySink {
            failures: 2,
            calls: AtomicU32::new(0),
        });
        let (outbox, worker) =
            NotificationOutbox::start(Arc::new(store_with_device().await), sink.clone());

        outbox.enqueue(Notification::new("acc-1", "Payment received"));
        drop(outbox);
        worker.await.unwrap();

        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_delivery_gives_up_after_max_attempts() {
        let sink = Arc::new(FlakySink {
            failures: 10,
            calls: AtomicU32::new(0),
        });
        let (outbox, worker) =
            NotificationOutbox::start(Arc::new(store_with_device().await), sink.clone());

        outbox.enqueue(Notification::new("acc-1", "Payment received"));
        outbox.enqueue(Notification::new("acc-2", "No devices"));
        drop(outbox);
        worker.await.unwrap();

        assert_eq!(sink.calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }
}
