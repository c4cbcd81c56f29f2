use {
    async_trait::async_trait,
    clinic_common::{ConsultationId, Message},
    tokio::sync::RwLock,
};

use crate::{error::StoreError, store::MessageStore};

/// Process-local store for tests and `--ephemeral` runs.
#[derive(Default)]
pub struct MemoryMessageStore {
    messages: RwLock<Vec<Message>>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.read().await.is_empty()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn append(&self, message: &Message) -> Result<(), StoreError> {
        self.messages.write().await.push(message.clone());
        Ok(())
    }

    async fn history(&self, consultation: &ConsultationId) -> Result<Vec<Message>, StoreError> {
        let mut out: Vec<Message> = self
            .messages
            .read()
            .await
            .iter()
            .filter(|m| &m.consultation_id == consultation)
            .cloned()
            .collect();
        // Stable: equal timestamps stay in insertion order.
        out.sort_by_key(|m| m.sent_at);
        Ok(out)
    }

    async fn count(&self, consultation: &ConsultationId) -> Result<usize, StoreError> {
        Ok(self
            .messages
            .read()
            .await
            .iter()
            .filter(|m| &m.consultation_id == consultation)
            .count())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        chrono::Duration,
        clinic_common::{Author, AuthorRole, MessageBody},
    };

    fn msg(consultation: &str, body: &str) -> Message {
        Message::new(
            consultation.into(),
            Author {
                id: "d1".into(),
                name: "Dr. Rui".into(),
                role: AuthorRole::Doctor,
            },
            MessageBody::Text(body.into()),
        )
    }

    #[tokio::test]
    async fn history_sorts_and_filters() {
        let store = MemoryMessageStore::new();
        let first = msg("c1", "first");
        let mut earlier = msg("c1", "earlier");
        earlier.sent_at = first.sent_at - Duration::seconds(1);
        let mut tie = msg("c1", "tie");
        tie.sent_at = first.sent_at;

        store.append(&first).await.unwrap();
        store.append(&msg("c2", "elsewhere")).await.unwrap();
        store.append(&earlier).await.unwrap();
        store.append(&tie).await.unwrap();

        let history = store.history(&"c1".into()).await.unwrap();
        let bodies: Vec<_> = history.iter().filter_map(|m| m.body.text()).collect();
        assert_eq!(bodies, vec!["earlier", "first", "tie"]);
        assert_eq!(store.count(&"c2".into()).await.unwrap(), 1);
        assert_eq!(store.len().await, 4);
    }
}
