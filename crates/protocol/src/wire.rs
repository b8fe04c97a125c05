//! Wire-Format fuer Ladepunkt-Verbindungen
//!
//! Jede Nachricht ist ein JSON-Array in einem WebSocket-Frame:
//!
//! ```text
//! Call:   [2, "<id>", "<Aktion>", {payload}]
//! Result: [3, "<id>", {payload}]
//! Fault:  [4, "<id>", "<Fehlercode>", "<Beschreibung>", {details}]
//! ```
//!
//! Die Groesse eines Frames ist begrenzt (Standard: 64 KB). Fehler beim
//! Dekodieren tragen, soweit ermittelbar, die Korrelations-ID und den
//! Typ-Tag mit, damit der Gateway eine passende Fault-Antwort bauen kann.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::action::Action;
use crate::message::{Call, CallError, CallResult, ErrorCode, Message, MessageTypeId};

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Standard-maximale Nachrichtengroesse (64 KB)
pub const DEFAULT_MAX_NACHRICHTENGROESSE: usize = 64 * 1024;

/// Korrelations-ID fuer Faults auf Nachrichten ohne lesbare ID
pub const UNBEKANNTE_MESSAGE_ID: &str = "-1";

// ---------------------------------------------------------------------------
// Fehler
// ---------------------------------------------------------------------------

/// Fehler beim Dekodieren eines Frames
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("Nachricht zu gross: {groesse} Bytes (Maximum: {maximum})")]
    Oversized { groesse: usize, maximum: usize },

    #[error("Fehlerhafte Nachricht: {grund}")]
    Malformed {
        message_id: Option<String>,
        tag: Option<i64>,
        grund: String,
    },

    #[error("Unbekannter Nachrichtentyp: {tag}")]
    UnknownTag {
        message_id: Option<String>,
        tag: i64,
    },

    #[error("Unbekannte Aktion: {action}")]
    UnknownAction { message_id: String, action: String },
}

impl DecodeError {
    /// Korrelations-ID der fehlerhaften Nachricht, falls lesbar
    pub fn message_id(&self) -> Option<&str> {
        match self {
            Self::Oversized { .. } => None,
            Self::Malformed { message_id, .. } | Self::UnknownTag { message_id, .. } => {
                message_id.as_deref()
            }
            Self::UnknownAction { message_id, .. } => Some(message_id),
        }
    }

    /// Korrelations-ID fuer die Fault-Antwort (`"-1"` wenn unbekannt)
    pub fn antwort_id(&self) -> &str {
        self.message_id().unwrap_or(UNBEKANNTE_MESSAGE_ID)
    }

    /// Fehler-Code der an den Absender zurueckgeht
    pub fn fault_code(&self) -> ErrorCode {
        match self {
            Self::Oversized { .. } | Self::Malformed { .. } => ErrorCode::FormationViolation,
            Self::UnknownTag { .. } => ErrorCode::ProtocolError,
            Self::UnknownAction { .. } => ErrorCode::NotImplemented,
        }
    }

    /// Gibt `true` zurueck wenn der Frame selbst ein Result oder Fault war
    ///
    /// Auf solche Frames wird nie mit einem Fault geantwortet.
    pub fn war_antwort(&self) -> bool {
        matches!(
            self,
            Self::Malformed {
                tag: Some(3) | Some(4),
                ..
            }
        )
    }

    /// Baut die Fault-Nachricht fuer diesen Fehler
    pub fn als_fault(&self) -> Message {
        Message::fault(self.antwort_id(), self.fault_code(), self.to_string())
    }
}

/// Fehler beim Kodieren einer Nachricht
///
/// Payload und Details muessen JSON-Objekte sein, sonst wuerde die
/// Gegenseite den Frame als `FormationViolation` ablehnen.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodeError {
    #[error("{feld} von Nachricht {message_id} ist kein Objekt")]
    KeinObjekt {
        message_id: String,
        feld: &'static str,
    },
}

// ---------------------------------------------------------------------------
// Encode / Decode
// ---------------------------------------------------------------------------

/// Kodiert eine Nachricht als JSON-Array
pub fn encode(message: &Message) -> Result<String, EncodeError> {
    pruefen(message)?;
    let array = match message {
        Message::Call(call) => vec![
            Value::from(MessageTypeId::Call.tag()),
            Value::String(call.message_id.clone()),
            Value::String(call.action.as_str().to_string()),
            call.payload.clone(),
        ],
        Message::Result(result) => vec![
            Value::from(MessageTypeId::Result.tag()),
            Value::String(result.message_id.clone()),
            result.payload.clone(),
        ],
        Message::Fault(fault) => vec![
            Value::from(MessageTypeId::Fault.tag()),
            Value::String(fault.message_id.clone()),
            Value::String(fault.error_code.as_str().to_string()),
            Value::String(fault.error_description.clone()),
            fault.error_details.clone(),
        ],
    };
    Ok(Value::Array(array).to_string())
}

fn pruefen(message: &Message) -> Result<(), EncodeError> {
    let (wert, feld) = match message {
        Message::Call(call) => (&call.payload, "Payload"),
        Message::Result(result) => (&result.payload, "Payload"),
        Message::Fault(fault) => (&fault.error_details, "Details"),
    };
    if wert.is_object() {
        Ok(())
    } else {
        Err(EncodeError::KeinObjekt {
            message_id: message.message_id().to_string(),
            feld,
        })
    }
}

/// Dekodiert einen Frame
///
/// Prueft zuerst die Groesse, dann Struktur, Tag und Aktion.
pub fn decode(bytes: &[u8], max_groesse: usize) -> Result<Message, DecodeError> {
    if bytes.len() > max_groesse {
        return Err(DecodeError::Oversized {
            groesse: bytes.len(),
            maximum: max_groesse,
        });
    }

    let wert: Value = serde_json::from_slice(bytes).map_err(|e| DecodeError::Malformed {
        message_id: None,
        tag: None,
        grund: format!("Kein gueltiges JSON: {e}"),
    })?;

    let Value::Array(mut elemente) = wert else {
        return Err(fehlerhaft(None, None, "Nachricht ist kein Array"));
    };

    let tag = match elemente.first().and_then(Value::as_i64) {
        Some(t) => t,
        None => return Err(fehlerhaft(None, None, "Typ-Tag fehlt oder ist keine Zahl")),
    };
    let message_id = elemente.get(1).and_then(Value::as_str).map(str::to_string);

    let typ = match MessageTypeId::aus_tag(tag) {
        Some(t) => t,
        None => return Err(DecodeError::UnknownTag { message_id, tag }),
    };
    let Some(message_id) = message_id else {
        return Err(fehlerhaft(None, Some(tag), "Korrelations-ID fehlt oder ist kein String"));
    };

    match typ {
        MessageTypeId::Call => {
            if elemente.len() != 4 {
                return Err(fehlerhaft(
                    Some(message_id),
                    Some(tag),
                    format!("Call erwartet 4 Elemente, erhalten: {}", elemente.len()),
                ));
            }
            let payload = objekt(elemente.pop(), &message_id, tag, "Payload")?;
            let action_name = match elemente.pop() {
                Some(Value::String(s)) => s,
                _ => {
                    return Err(fehlerhaft(
                        Some(message_id),
                        Some(tag),
                        "Aktion ist kein String",
                    ))
                }
            };
            let action: Action = match action_name.parse() {
                Ok(a) => a,
                Err(_) => {
                    return Err(DecodeError::UnknownAction {
                        message_id,
                        action: action_name,
                    })
                }
            };
            Ok(Message::Call(Call {
                message_id,
                action,
                payload,
            }))
        }
        MessageTypeId::Result => {
            if elemente.len() != 3 {
                return Err(fehlerhaft(
                    Some(message_id),
                    Some(tag),
                    format!("Result erwartet 3 Elemente, erhalten: {}", elemente.len()),
                ));
            }
            let payload = objekt(elemente.pop(), &message_id, tag, "Payload")?;
            Ok(Message::Result(CallResult {
                message_id,
                payload,
            }))
        }
        MessageTypeId::Fault => {
            // Details duerfen fehlen
            if elemente.len() != 4 && elemente.len() != 5 {
                return Err(fehlerhaft(
                    Some(message_id),
                    Some(tag),
                    format!("Fault erwartet 5 Elemente, erhalten: {}", elemente.len()),
                ));
            }
            let error_details = if elemente.len() == 5 {
                objekt(elemente.pop(), &message_id, tag, "Details")?
            } else {
                Value::Object(Map::new())
            };
            let error_description = match elemente.pop() {
                Some(Value::String(s)) => s,
                _ => {
                    return Err(fehlerhaft(
                        Some(message_id),
                        Some(tag),
                        "Fehlerbeschreibung ist kein String",
                    ))
                }
            };
            let error_code = match elemente.pop() {
                Some(Value::String(s)) => ErrorCode::vom_draht(&s),
                _ => {
                    return Err(fehlerhaft(
                        Some(message_id),
                        Some(tag),
                        "Fehlercode ist kein String",
                    ))
                }
            };
            Ok(Message::Fault(CallError {
                message_id,
                error_code,
                error_description,
                error_details,
            }))
        }
    }
}

fn fehlerhaft(message_id: Option<String>, tag: Option<i64>, grund: impl Into<String>) -> DecodeError {
    DecodeError::Malformed {
        message_id,
        tag,
        grund: grund.into(),
    }
}

fn objekt(
    wert: Option<Value>,
    message_id: &str,
    tag: i64,
    feld: &str,
) -> Result<Value, DecodeError> {
    match wert {
        Some(v @ Value::Object(_)) => Ok(v),
        _ => Err(fehlerhaft(
            Some(message_id.to_string()),
            Some(tag),
            format!("{feld} ist kein Objekt"),
        )),
    }
}

// ---------------------------------------------------------------------------
// WireCodec
// ---------------------------------------------------------------------------

/// Codec mit fester Groessengrenze
#[derive(Debug, Clone, Copy)]
pub struct WireCodec {
    max_nachrichtengroesse: usize,
}

impl WireCodec {
    /// Erstellt einen Codec mit der angegebenen Groessengrenze
    pub fn new(max_nachrichtengroesse: usize) -> Self {
        Self {
            max_nachrichtengroesse,
        }
    }

    /// Maximale Nachrichtengroesse in Bytes
    pub fn max_nachrichtengroesse(&self) -> usize {
        self.max_nachrichtengroesse
    }

    pub fn encode(&self, message: &Message) -> Result<String, EncodeError> {
        encode(message)
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<Message, DecodeError> {
        decode(bytes, self.max_nachrichtengroesse)
    }
}

impl Default for WireCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_NACHRICHTENGROESSE)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
