/// Storage capability for chat messages.
use {
    async_trait::async_trait,
    clinic_common::{ConsultationId, Message},
};

use crate::error::StoreError;

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Durably write one message.
    async fn append(&self, message: &Message) -> Result<(), StoreError>;

    /// All messages of a consultation, oldest first. Messages with equal
    /// timestamps keep their insertion order.
    async fn history(&self, consultation: &ConsultationId) -> Result<Vec<Message>, StoreError>;

    async fn count(&self, consultation: &ConsultationId) -> Result<usize, StoreError>;
}
