//! Consultation chat: message ingest, room broadcast and history replay.

use std::sync::Arc;

use {
    serde_json::Value,
    tracing::{debug, error, info, warn},
};

use {
    clinic_common::{Attachment, Author, AuthorRole, ConsultationId, Message, MessageBody},
    clinic_protocol::{ErrorShape, SendMessageParams, error_codes, events},
    clinic_store::{MessageStore, StoreError},
};

use crate::{
    broadcast::{BroadcastOpts, broadcast_to_room, send_to},
    state::GatewayState,
};

// ── Ingest validation ───────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("malformed message payload: {0}")]
    Malformed(String),
    #[error("message has no consultation id")]
    MissingConsultation,
    #[error("message has no author id or name")]
    MissingAuthor,
    #[error("text message is empty")]
    EmptyBody,
    #[error("attachment is missing its url or mime type")]
    IncompleteAttachment,
    #[error("attachment size {0} is out of range")]
    AttachmentSizeOutOfRange(u64),
    #[error("failed to store message: {0}")]
    Store(#[from] StoreError),
}

impl IngestError {
    /// True when the message itself was invalid (as opposed to a storage failure).
    pub fn is_rejection(&self) -> bool {
        !matches!(self, Self::Store(_))
    }

    pub fn to_error_shape(&self) -> ErrorShape {
        let code = if self.is_rejection() {
            error_codes::INVALID_MESSAGE
        } else {
            error_codes::UNAVAILABLE
        };
        ErrorShape::new(code, self.to_string())
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Turn a raw `enviarMensagem` payload into a stamped message.
///
/// Attachment messages need a url and a MIME type and ignore any text; text
/// messages need at least one non-whitespace character.
pub fn build_message(params: SendMessageParams) -> Result<Message, IngestError> {
    let is_attachment = params.is_attachment();
    let author_id = params.author_id();
    let SendMessageParams {
        consulta_id,
        texto,
        autor_nome,
        tipo,
        arquivo_url,
        arquivo_tipo,
        nome_arquivo,
        tamanho,
        ..
    } = params;

    let consultation = non_blank(consulta_id).ok_or(IngestError::MissingConsultation)?;
    let (Some(author_id), Some(author_name)) = (author_id, non_blank(autor_nome)) else {
        return Err(IngestError::MissingAuthor);
    };

    let body = if is_attachment {
        let (Some(url), Some(mime)) = (non_blank(arquivo_url), non_blank(arquivo_tipo)) else {
            return Err(IngestError::IncompleteAttachment);
        };
        if let Some(size) = tamanho.filter(|s| i64::try_from(*s).is_err()) {
            return Err(IngestError::AttachmentSizeOutOfRange(size));
        }
        MessageBody::Attachment(Attachment {
            url,
            mime,
            filename: non_blank(nome_arquivo),
            size: tamanho,
        })
    } else {
        MessageBody::Text(non_blank(texto).ok_or(IngestError::EmptyBody)?)
    };

    Ok(Message::new(
        ConsultationId::new(consultation.trim()),
        Author {
            id: author_id,
            name: author_name,
            role: AuthorRole::from_wire(tipo.as_deref()),
        },
        body,
    ))
}

// ── ChatService ─────────────────────────────────────────────────────────────

pub struct ChatService {
    store: Arc<dyn MessageStore>,
    state: Arc<GatewayState>,
    error_events: bool,
}

impl ChatService {
    pub fn new(store: Arc<dyn MessageStore>, state: Arc<GatewayState>) -> Self {
        Self {
            store,
            state,
            error_events: false,
        }
    }

    /// Report ingest failures back to the sender as `erroMensagem`.
    pub fn with_error_events(mut self, enabled: bool) -> Self {
        self.error_events = enabled;
        self
    }

    pub fn error_events(&self) -> bool {
        self.error_events
    }

    pub fn state(&self) -> &Arc<GatewayState> {
        &self.state
    }

    /// Attach `conn_id` to a consultation room and replay its full history to
    /// that connection only. Returns the number of replayed messages.
    pub async fn join(
        &self,
        conn_id: &str,
        consultation: ConsultationId,
    ) -> Result<usize, StoreError> {
        let previous = self
            .state
            .rooms
            .write()
            .await
            .join(conn_id, consultation.clone());
        if let Some(previous) = previous {
            debug!(conn_id, from = %previous, to = %consultation, "connection switched rooms");
        }
        info!(conn_id, consultation_id = %consultation, "joined consultation");

        let history = self.store.history(&consultation).await?;
        send_to(&self.state, conn_id, events::MESSAGE_HISTORY, &history).await;
        debug!(
            conn_id,
            consultation_id = %consultation,
            count = history.len(),
            "replayed history"
        );
        Ok(history.len())
    }

    /// Validate, persist and broadcast a proposed message.
    ///
    /// The stored record goes to every member of the message's consultation
    /// room, the sender included.
    pub async fn send(&self, conn_id: &str, params: Value) -> Result<Message, IngestError> {
        let params: SendMessageParams =
            serde_json::from_value(params).map_err(|e| IngestError::Malformed(e.to_string()))?;
        let message = build_message(params)?;

        self.store.append(&message).await?;

        let delivered = broadcast_to_room(
            &self.state,
            &message.consultation_id,
            events::NEW_MESSAGE,
            &message,
            BroadcastOpts::default(),
        )
        .await;
        info!(
            conn_id,
            consultation_id = %message.consultation_id,
            message_id = %message.id,
            attachment = message.body.is_attachment(),
            delivered,
            "message stored"
        );
        Ok(message)
    }

    /// Log an ingest failure and, when enabled, tell the sender.
    pub async fn report(&self, conn_id: &str, err: &IngestError) {
        if err.is_rejection() {
            warn!(conn_id, error = %err, "dropping chat message");
        } else {
            error!(conn_id, error = %err, "chat message lost");
        }
        if self.error_events {
            send_to(
                &self.state,
                conn_id,
                events::MESSAGE_ERROR,
                &err.to_error_shape(),
            )
            .await;
        }
    }

    pub async fn history(
        &self,
        consultation: &ConsultationId,
    ) -> Result<Vec<Message>, StoreError> {
        self.store.history(consultation).await
    }

    /// Drop a connection and its room membership.
    pub async fn disconnect(&self, conn_id: &str) {
        if let Some(client) = self.state.remove_client(conn_id).await {
            info!(
                conn_id,
                connected_secs = client.connected_at.elapsed().as_secs(),
                "client disconnected"
            );
        }
    }
}
