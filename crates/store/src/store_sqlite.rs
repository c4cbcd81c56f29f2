use {
    async_trait::async_trait,
    chrono::DateTime,
    clinic_common::{ConsultationId, Message, MessageBody, MessageRecord},
    sqlx::SqlitePool,
    tracing::debug,
};

use crate::{error::StoreError, store::MessageStore};

/// SQLite-backed message store.
///
/// `seq` is an autoincrement column; it breaks ties between messages that
/// share a millisecond timestamp.
pub struct SqliteMessageStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    consultation_id: String,
    author_id: String,
    author_name: String,
    author_role: String,
    sent_at: i64,
    body_text: String,
    attachment_url: Option<String>,
    attachment_mime: Option<String>,
    attachment_name: Option<String>,
    attachment_size: Option<i64>,
}

impl MessageRow {
    fn into_message(self) -> Result<Message, StoreError> {
        let corrupt = |id: &str, reason: String| StoreError::Corrupt {
            id: id.to_string(),
            reason,
        };

        let tipo = self
            .author_role
            .parse()
            .map_err(|e: clinic_common::RecordError| corrupt(&self.id, e.to_string()))?;
        let horario = DateTime::from_timestamp_millis(self.sent_at)
            .ok_or_else(|| corrupt(&self.id, format!("bad timestamp {}", self.sent_at)))?;

        let tamanho = self
            .attachment_size
            .map(u64::try_from)
            .transpose()
            .map_err(|_| corrupt(&self.id, "negative attachment size".into()))?;

        let id = self.id.clone();
        let record = MessageRecord {
            id: self.id,
            consulta_id: self.consultation_id,
            texto: self.body_text,
            autor_id: self.author_id,
            autor_nome: self.author_name,
            tipo,
            horario,
            arquivo: self.attachment_url.is_some(),
            arquivo_url: self.attachment_url,
            arquivo_tipo: self.attachment_mime,
            nome_arquivo: self.attachment_name,
            tamanho,
        };
        Message::try_from(record).map_err(|e| corrupt(&id, e.to_string()))
    }
}

impl SqliteMessageStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a pool at `url` and make sure the schema exists.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePool::connect(url).await?;
        Self::init(&pool).await?;
        debug!(url, "message store ready");
        Ok(Self::new(pool))
    }

    /// Create the `messages` table and its index if they don't exist.
    pub async fn init(pool: &SqlitePool) -> Result<(), StoreError> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS messages (
                seq             INTEGER PRIMARY KEY AUTOINCREMENT,
                id              TEXT NOT NULL UNIQUE,
                consultation_id TEXT NOT NULL,
                author_id       TEXT NOT NULL,
                author_name     TEXT NOT NULL,
                author_role     TEXT NOT NULL,
                sent_at         INTEGER NOT NULL,
                body_text       TEXT NOT NULL DEFAULT '',
                attachment_url  TEXT,
                attachment_mime TEXT,
                attachment_name TEXT,
                attachment_size INTEGER
            )"#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_consultation \
             ON messages (consultation_id, sent_at, seq)",
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn append(&self, message: &Message) -> Result<(), StoreError> {
        let (text, attachment) = match &message.body {
            MessageBody::Text(t) => (t.as_str(), None),
            MessageBody::Attachment(a) => ("", Some(a)),
        };
        let size = attachment
            .and_then(|a| a.size)
            .map(|s| {
                i64::try_from(s).map_err(|_| StoreError::OutOfRange {
                    field: "attachment_size",
                    value: s,
                })
            })
            .transpose()?;
        sqlx::query(
            r#"INSERT INTO messages (
                id, consultation_id, author_id, author_name, author_role, sent_at,
                body_text, attachment_url, attachment_mime, attachment_name, attachment_size
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&message.id)
        .bind(message.consultation_id.as_str())
        .bind(&message.author.id)
        .bind(&message.author.name)
        .bind(message.author.role.as_str())
        .bind(message.sent_at.timestamp_millis())
        .bind(text)
        .bind(attachment.map(|a| a.url.as_str()))
        .bind(attachment.map(|a| a.mime.as_str()))
        .bind(attachment.and_then(|a| a.filename.as_deref()))
        .bind(size)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn history(&self, consultation: &ConsultationId) -> Result<Vec<Message>, StoreError> {
        sqlx::query_as::<_, MessageRow>(
            r#"SELECT id, consultation_id, author_id, author_name, author_role, sent_at,
                      body_text, attachment_url, attachment_mime, attachment_name, attachment_size
               FROM messages
               WHERE consultation_id = ?
               ORDER BY sent_at ASC, seq ASC"#,
        )
        .bind(consultation.as_str())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(MessageRow::into_message)
        .collect()
    }

    async fn count(&self, consultation: &ConsultationId) -> Result<usize, StoreError> {
        let (n,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM messages WHERE consultation_id = ?")
                .bind(consultation.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(usize::try_from(n).unwrap_or_default())
    }
}
