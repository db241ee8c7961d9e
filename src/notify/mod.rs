//! Notification delivery
//!
//! `Notifier::notify` fans one text out to every registered recipient. A
//! failure for one recipient is logged and does not stop the others.

pub mod telegram;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::Result;
use crate::store::RecipientStore;

pub use telegram::TelegramBot;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `text` to all recipients; returns how many received it
    async fn notify(&self, text: &str) -> Result<usize>;
}

/// Point-to-point delivery of a text to one chat
#[async_trait]
pub trait ChatSender: Send + Sync {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()>;
}

/// Broadcasts to the chats held in a recipient store
pub struct ChatNotifier {
    sender: Arc<dyn ChatSender>,
    recipients: Arc<dyn RecipientStore>,
}

impl ChatNotifier {
    pub fn new(sender: Arc<dyn ChatSender>, recipients: Arc<dyn RecipientStore>) -> Self {
        Self { sender, recipients }
    }
}

#[async_trait]
impl Notifier for ChatNotifier {
    async fn notify(&self, text: &str) -> Result<usize> {
        let recipients = self.recipients.all().await?;
        if recipients.is_empty() {
            warn!("No notification recipients registered, run `record-chats` first");
            return Ok(0);
        }

        let mut delivered = 0;
        for recipient in &recipients {
            match self.sender.send_message(recipient.id, text).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!("Failed to notify chat {}: {}", recipient.id, e),
            }
        }

        info!("Notified {}/{} recipients", delivered, recipients.len());
        Ok(delivered)
    }
}

/// Fallback when no bot is configured: the message only goes to the log
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, text: &str) -> Result<usize> {
        info!("Notification (no bot configured): {}", text);
        Ok(0)
    }
}

/// Pull recent bot updates and store any chats not seen before
pub async fn record_chat_ids(bot: &TelegramBot, store: &dyn RecipientStore) -> Result<usize> {
    let chats = bot.get_updates().await?;

    let mut added = 0;
    for chat in chats {
        let id = chat.id;
        if store.add(chat).await? {
            info!("Recorded chat {}", id);
            added += 1;
        }
    }

    if added == 0 {
        info!("No new chats to record");
    }
    Ok(added)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::store::{ChatRecipient, JsonRecipientStore};
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Records deliveries and fails for chat ids listed in `failing`
    #[derive(Default)]
    struct FlakySender {
        failing: Vec<i64>,
        sent: Mutex<Vec<(i64, String)>>,
    }

    #[async_trait]
    impl ChatSender for FlakySender {
        async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
            if self.failing.contains(&chat_id) {
                return Err(Error::Notification("chat not found".into()));
            }
            self.sent.lock().unwrap().push((chat_id, text.to_string()));
            Ok(())
        }
    }

    fn recipient(id: i64) -> ChatRecipient {
        ChatRecipient {
            id,
            first_name: format!("user{}", id),
            username: None,
        }
    }

    #[tokio::test]
    async fn test_empty_recipient_list_is_noop() {
        let dir = tempdir().unwrap();
        let store = Arc::new(JsonRecipientStore::open(dir.path().join("chats.json")).await.unwrap());
        let sender = Arc::new(FlakySender::default());
        let notifier = ChatNotifier::new(sender.clone(), store);

        assert_eq!(notifier.notify("hello").await.unwrap(), 0);
        assert!(sender.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_for_one_recipient_does_not_stop_others() {
        let dir = tempdir().unwrap();
        let store = Arc::new(JsonRecipientStore::open(dir.path().join("chats.json")).await.unwrap());
        for id in [1, 2, 3] {
            store.add(recipient(id)).await.unwrap();
        }
        let sender = Arc::new(FlakySender {
            failing: vec![2],
            ..Default::default()
        });
        let notifier = ChatNotifier::new(sender.clone(), store);

        assert_eq!(notifier.notify("balance changed").await.unwrap(), 2);
        let sent = sender.sent.lock().unwrap().clone();
        assert_eq!(
            sent,
            vec![(1, "balance changed".to_string()), (3, "balance changed".to_string())]
        );
    }

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        assert_eq!(LogNotifier.notify("text").await.unwrap(), 0);
    }
}
