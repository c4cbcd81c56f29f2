//! Chat message model.
//!
//! A message body is either text or a file attachment, never both and never
//! neither. On the wire the body is flattened into the legacy record shape
//! (`texto` + `arquivo*` fields), see [`MessageRecord`].

use std::{fmt, str::FromStr};

use {
    chrono::{DateTime, SubsecRound, Utc},
    serde::{Deserialize, Serialize},
};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("message has neither text nor attachment")]
    EmptyBody,
    #[error("attachment is missing its url or mime type")]
    IncompleteAttachment,
    #[error("unknown author role: {0}")]
    UnknownRole(String),
}

// ── Identifiers ──────────────────────────────────────────────────────────────

/// Opaque consultation identifier; the unit of room partitioning.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsultationId(String);

impl ConsultationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConsultationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConsultationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ConsultationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ── Author ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthorRole {
    #[serde(rename = "paciente")]
    Patient,
    #[serde(rename = "medico")]
    Doctor,
}

impl AuthorRole {
    /// Lenient mapping used for client payloads: anything that is not a
    /// doctor marker is treated as a patient.
    pub fn from_wire(tipo: Option<&str>) -> Self {
        match tipo.map(str::trim) {
            Some("medico" | "doctor") => Self::Doctor,
            _ => Self::Patient,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Patient => "paciente",
            Self::Doctor => "medico",
        }
    }
}

impl FromStr for AuthorRole {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "paciente" | "patient" => Ok(Self::Patient),
            "medico" | "doctor" => Ok(Self::Doctor),
            other => Err(RecordError::UnknownRole(other.to_string())),
        }
    }
}

impl fmt::Display for AuthorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub id: String,
    pub name: String,
    pub role: AuthorRole,
}

// ── Body ─────────────────────────────────────────────────────────────────────

/// File metadata as returned by the upload endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub url: String,
    pub mime: String,
    pub filename: Option<String>,
    pub size: Option<u64>,
}

impl Attachment {
    /// Resolve a relative upload path against a public base URL.
    /// Absolute `http(s)` URLs are returned unchanged.
    pub fn absolute_url(&self, base: &str) -> String {
        absolute_url(base, &self.url)
    }
}

/// Join `url` onto `base` unless it already is an absolute `http(s)` URL.
pub fn absolute_url(base: &str, url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        return url.to_string();
    }
    let base = base.trim_end_matches('/');
    if url.starts_with('/') {
        format!("{base}{url}")
    } else {
        format!("{base}/{url}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Text(String),
    Attachment(Attachment),
}

impl MessageBody {
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            Self::Attachment(_) => None,
        }
    }

    pub fn attachment(&self) -> Option<&Attachment> {
        match self {
            Self::Attachment(a) => Some(a),
            Self::Text(_) => None,
        }
    }

    pub fn is_attachment(&self) -> bool {
        matches!(self, Self::Attachment(_))
    }
}

// ── Message ──────────────────────────────────────────────────────────────────

/// A persisted chat message. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "MessageRecord", try_from = "MessageRecord")]
pub struct Message {
    pub id: String,
    pub consultation_id: ConsultationId,
    pub author: Author,
    /// Server-assigned at receipt, millisecond precision.
    pub sent_at: DateTime<Utc>,
    pub body: MessageBody,
}

impl Message {
    /// Stamp a new message with a fresh id and the current server time.
    pub fn new(consultation_id: ConsultationId, author: Author, body: MessageBody) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            consultation_id,
            author,
            sent_at: Utc::now().trunc_subsecs(3),
            body,
        }
    }
}

/// Flat wire/storage shape of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub consulta_id: String,
    #[serde(default)]
    pub texto: String,
    pub autor_id: String,
    pub autor_nome: String,
    pub tipo: AuthorRole,
    pub horario: DateTime<Utc>,
    #[serde(default)]
    pub arquivo: bool,
    #[serde(default)]
    pub arquivo_url: Option<String>,
    #[serde(default)]
    pub arquivo_tipo: Option<String>,
    #[serde(default)]
    pub nome_arquivo: Option<String>,
    #[serde(default)]
    pub tamanho: Option<u64>,
}

impl From<Message> for MessageRecord {
    fn from(m: Message) -> Self {
        let (texto, attachment) = match m.body {
            MessageBody::Text(t) => (t, None),
            MessageBody::Attachment(a) => (String::new(), Some(a)),
        };
        Self {
            id: m.id,
            consulta_id: m.consultation_id.0,
            texto,
            autor_id: m.author.id,
            autor_nome: m.author.name,
            tipo: m.author.role,
            horario: m.sent_at,
            arquivo: attachment.is_some(),
            arquivo_url: attachment.as_ref().map(|a| a.url.clone()),
            arquivo_tipo: attachment.as_ref().map(|a| a.mime.clone()),
            nome_arquivo: attachment.as_ref().and_then(|a| a.filename.clone()),
            tamanho: attachment.and_then(|a| a.size),
        }
    }
}

impl TryFrom<MessageRecord> for Message {
    type Error = RecordError;

    fn try_from(r: MessageRecord) -> Result<Self, Self::Error> {
        let body = if r.arquivo {
            match (r.arquivo_url, r.arquivo_tipo) {
                (Some(url), Some(mime)) if !url.trim().is_empty() && !mime.trim().is_empty() => {
                    MessageBody::Attachment(Attachment {
                        url,
                        mime,
                        filename: r.nome_arquivo,
                        size: r.tamanho,
                    })
                },
                _ => return Err(RecordError::IncompleteAttachment),
            }
        } else if r.texto.trim().is_empty() {
            return Err(RecordError::EmptyBody);
        } else {
            MessageBody::Text(r.texto)
        };

        Ok(Self {
            id: r.id,
            consultation_id: ConsultationId(r.consulta_id),
            author: Author {
                id: r.autor_id,
                name: r.autor_nome,
                role: r.tipo,
            },
            sent_at: r.horario,
            body,
        })
    }
}
