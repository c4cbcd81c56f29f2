//! Wire protocol for the consultation chat gateway.
//!
//! Every WebSocket text frame is a JSON object. Clients send
//! `{"event": "...", "data": ...}`; the gateway answers with the same shape
//! plus a gateway-wide `seq` counter.

use {
    serde::{Deserialize, Deserializer, Serialize, de::Error as _},
    serde_json::Value,
};

pub const PROTOCOL_VERSION: u32 = 1;

/// Event names carried in the `event` field of a frame.
pub mod events {
    /// client → server: join a consultation room.
    pub const JOIN_CONSULTATION: &str = "entrarConsulta";
    /// client → server: propose a new chat message.
    pub const SEND_MESSAGE: &str = "enviarMensagem";
    /// server → joining client: full ordered history batch.
    pub const MESSAGE_HISTORY: &str = "historicoMensagens";
    /// server → room: a newly stored message.
    pub const NEW_MESSAGE: &str = "novaMensagem";
    /// server → sender: ingest rejection, only when error events are enabled.
    pub const MESSAGE_ERROR: &str = "erroMensagem";
}

pub mod error_codes {
    pub const INVALID_FRAME: &str = "INVALID_FRAME";
    pub const INVALID_MESSAGE: &str = "INVALID_MESSAGE";
    pub const UNAVAILABLE: &str = "UNAVAILABLE";
}

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("frame has no event name")]
    MissingEvent,
}

/// Error payload sent back to a single client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorShape {
    pub code: String,
    pub message: String,
}

impl ErrorShape {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

// ── Frames ───────────────────────────────────────────────────────────────────

/// A frame received from a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl ClientFrame {
    pub fn new(event: &str, data: Value) -> Self {
        Self {
            event: event.to_string(),
            data,
        }
    }

    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let frame: Self = serde_json::from_str(raw)?;
        if frame.event.trim().is_empty() {
            return Err(ProtocolError::MissingEvent);
        }
        Ok(frame)
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A frame pushed by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame {
    pub event: String,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

impl EventFrame {
    pub fn new(event: &str, data: Value, seq: u64) -> Self {
        Self {
            event: event.to_string(),
            data,
            seq: Some(seq),
        }
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ── Event payloads ───────────────────────────────────────────────────────────

/// Extract the consultation id from an `entrarConsulta` payload.
///
/// Accepts a bare string or number, or `{"consultaId": ...}` wrapping one.
/// Blank ids yield `None`.
pub fn join_consultation_id(data: &Value) -> Option<String> {
    let raw = match data {
        Value::Object(map) => map.get("consultaId")?,
        other => other,
    };
    let id = match raw {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!id.is_empty()).then_some(id)
}

/// Deserialize an optional id-like field sent either as a string or a number.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected a string or number, got {other}"
        ))),
    }
}

/// Raw `enviarMensagem` payload, exactly as a client may send it.
///
/// Every field is optional here; validation happens at ingest. Ids and the
/// author name may arrive as numbers and are stringified.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageParams {
    #[serde(default, deserialize_with = "string_or_number")]
    pub consulta_id: Option<String>,
    #[serde(default)]
    pub texto: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub autor_id: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub autor_nome: Option<String>,
    #[serde(default)]
    pub tipo: Option<String>,
    #[serde(default)]
    pub arquivo: Option<bool>,
    #[serde(default)]
    pub arquivo_url: Option<String>,
    #[serde(default)]
    pub arquivo_tipo: Option<String>,
    #[serde(default)]
    pub nome_arquivo: Option<String>,
    #[serde(default)]
    pub tamanho: Option<u64>,
}

impl SendMessageParams {
    pub fn author_id(&self) -> Option<String> {
        let id = self.autor_id.as_deref()?.trim();
        (!id.is_empty()).then(|| id.to_string())
    }

    pub fn is_attachment(&self) -> bool {
        self.arquivo == Some(true)
    }
}

#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    #[test]
    fn parses_client_frame() {
        let frame = ClientFrame::parse(r#"{"event":"entrarConsulta","data":"c1"}"#).unwrap();
        assert_eq!(frame.event, events::JOIN_CONSULTATION);
        assert_eq!(join_consultation_id(&frame.data).as_deref(), Some("c1"));
    }

    #[test]
    fn rejects_frame_without_event() {
        assert!(matches!(
            ClientFrame::parse(r#"{"event":"  ","data":1}"#),
            Err(ProtocolError::MissingEvent)
        ));
        assert!(matches!(
            ClientFrame::parse("not json"),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn join_id_accepts_object_form() {
        assert_eq!(
            join_consultation_id(&json!({"consultaId": " c9 "})).as_deref(),
            Some("c9")
        );
        assert!(join_consultation_id(&json!("")).is_none());
        assert!(join_consultation_id(&json!(null)).is_none());
        assert!(join_consultation_id(&json!({"id": "c9"})).is_none());
    }

    #[test]
    fn join_id_accepts_numbers() {
        assert_eq!(join_consultation_id(&json!(42)).as_deref(), Some("42"));
        assert_eq!(
            join_consultation_id(&json!({"consultaId": 7})).as_deref(),
            Some("7")
        );
        assert!(join_consultation_id(&json!(true)).is_none());
    }

    #[test]
    fn numeric_consultation_and_author_name_are_stringified() {
        let params: SendMessageParams = serde_json::from_value(json!({
            "consultaId": 42, "autorId": 7, "autorNome": 1001, "texto": "oi",
        }))
        .unwrap();
        assert_eq!(params.consulta_id.as_deref(), Some("42"));
        assert_eq!(params.author_id().as_deref(), Some("7"));
        assert_eq!(params.autor_nome.as_deref(), Some("1001"));

        let params: SendMessageParams =
            serde_json::from_value(json!({"consultaId": null})).unwrap();
        assert!(params.consulta_id.is_none());

        assert!(serde_json::from_value::<SendMessageParams>(json!({"consultaId": [1]})).is_err());
    }

    #[test]
    fn numeric_author_id_is_stringified() {
        let params: SendMessageParams =
            serde_json::from_value(json!({"consultaId": "c1", "autorId": 42})).unwrap();
        assert_eq!(params.author_id().as_deref(), Some("42"));

        let params: SendMessageParams =
            serde_json::from_value(json!({"autorId": "  "})).unwrap();
        assert!(params.author_id().is_none());
    }

    #[test]
    fn event_frame_carries_seq() {
        let text = EventFrame::new(events::NEW_MESSAGE, json!({"a": 1}), 7)
            .to_text()
            .unwrap();
        let v: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["event"], "novaMensagem");
        assert_eq!(v["seq"], 7);
    }
}
