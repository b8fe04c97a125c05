//! Getaggte Protokollnachricht
//!
//! Jede Nachricht ist genau eine von drei Varianten:
//! - `Call`:   Anfrage mit Korrelations-ID, Aktion und Payload
//! - `Result`: erfolgreiche Antwort auf einen Call
//! - `Fault`:  Fehlerantwort auf einen Call
//!
//! Die Korrelations-ID ist auf dem Draht immer ein String. Der Gateway
//! vergibt fuer eigene Anfragen die Dezimaldarstellung eines Zaehlers.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::action::{Action, Anfrage};

// ---------------------------------------------------------------------------
// Nachrichtentyp
// ---------------------------------------------------------------------------

/// Numerischer Typ-Tag am Anfang jedes Frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageTypeId {
    Call = 2,
    Result = 3,
    Fault = 4,
}

impl MessageTypeId {
    /// Ordnet einen Tag-Wert zu, `None` bei unbekanntem Tag
    pub fn aus_tag(tag: i64) -> Option<Self> {
        match tag {
            2 => Some(Self::Call),
            3 => Some(Self::Result),
            4 => Some(Self::Fault),
            _ => None,
        }
    }

    /// Gibt den Tag-Wert fuer das Wire-Format zurueck
    pub fn tag(self) -> i64 {
        self as i64
    }
}

// ---------------------------------------------------------------------------
// Fehler-Codes
// ---------------------------------------------------------------------------

/// Fehler-Codes fuer Fault-Nachrichten (Schreibweise wie OCPP 1.6)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    NotImplemented,
    NotSupported,
    InternalError,
    ProtocolError,
    SecurityError,
    FormationViolation,
    PropertyConstraintViolation,
    OccurenceConstraintViolation,
    TypeConstraintViolation,
    GenericError,
}

impl ErrorCode {
    pub const ALLE: [ErrorCode; 10] = [
        Self::NotImplemented,
        Self::NotSupported,
        Self::InternalError,
        Self::ProtocolError,
        Self::SecurityError,
        Self::FormationViolation,
        Self::PropertyConstraintViolation,
        Self::OccurenceConstraintViolation,
        Self::TypeConstraintViolation,
        Self::GenericError,
    ];

    /// Gibt den Code so zurueck wie er auf dem Draht steht
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotImplemented => "NotImplemented",
            Self::NotSupported => "NotSupported",
            Self::InternalError => "InternalError",
            Self::ProtocolError => "ProtocolError",
            Self::SecurityError => "SecurityError",
            Self::FormationViolation => "FormationViolation",
            Self::PropertyConstraintViolation => "PropertyConstraintViolation",
            Self::OccurenceConstraintViolation => "OccurenceConstraintViolation",
            Self::TypeConstraintViolation => "TypeConstraintViolation",
            Self::GenericError => "GenericError",
        }
    }

    /// Liest einen Code vom Draht
    ///
    /// Unbekannte Codes werden als `GenericError` gelesen, damit eine
    /// Fehlerantwort des Ladepunkts die wartende Anfrage trotzdem aufloest.
    pub fn vom_draht(s: &str) -> Self {
        match s {
            "NotImplemented" => Self::NotImplemented,
            "NotSupported" => Self::NotSupported,
            "InternalError" => Self::InternalError,
            "ProtocolError" => Self::ProtocolError,
            "SecurityError" => Self::SecurityError,
            "FormationViolation" => Self::FormationViolation,
            "PropertyConstraintViolation" => Self::PropertyConstraintViolation,
            "OccurenceConstraintViolation" => Self::OccurenceConstraintViolation,
            "TypeConstraintViolation" => Self::TypeConstraintViolation,
            _ => Self::GenericError,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Varianten
// ---------------------------------------------------------------------------

/// Anfrage (Typ 2)
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub message_id: String,
    pub action: Action,
    pub payload: Value,
}

impl Call {
    /// Erstellt einen Call aus einer typisierten Anfrage
    pub fn typisiert<A: Anfrage>(
        message_id: impl Into<String>,
        anfrage: &A,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            message_id: message_id.into(),
            action: A::ACTION,
            payload: serde_json::to_value(anfrage)?,
        })
    }

    /// Deserialisiert den Payload in das Schema der Aktion
    pub fn parse_payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// Erfolgreiche Antwort (Typ 3)
#[derive(Debug, Clone, PartialEq)]
pub struct CallResult {
    pub message_id: String,
    pub payload: Value,
}

impl CallResult {
    /// Deserialisiert den Antwort-Payload
    pub fn parse_payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// Fehlerantwort (Typ 4)
#[derive(Debug, Clone, PartialEq)]
pub struct CallError {
    pub message_id: String,
    pub error_code: ErrorCode,
    pub error_description: String,
    pub error_details: Value,
}

/// Eine vollstaendig dekodierte Protokollnachricht
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Call(Call),
    Result(CallResult),
    Fault(CallError),
}

impl Message {
    /// Erstellt eine Result-Nachricht
    pub fn result(message_id: impl Into<String>, payload: Value) -> Self {
        Self::Result(CallResult {
            message_id: message_id.into(),
            payload,
        })
    }

    /// Erstellt eine Fault-Nachricht ohne Details
    pub fn fault(
        message_id: impl Into<String>,
        error_code: ErrorCode,
        beschreibung: impl Into<String>,
    ) -> Self {
        Self::Fault(CallError {
            message_id: message_id.into(),
            error_code,
            error_description: beschreibung.into(),
            error_details: Value::Object(Default::default()),
        })
    }

    /// Gibt die Korrelations-ID der Nachricht zurueck
    pub fn message_id(&self) -> &str {
        match self {
            Self::Call(c) => &c.message_id,
            Self::Result(r) => &r.message_id,
            Self::Fault(f) => &f.message_id,
        }
    }

    /// Gibt den Typ-Tag der Nachricht zurueck
    pub fn typ(&self) -> MessageTypeId {
        match self {
            Self::Call(_) => MessageTypeId::Call,
            Self::Result(_) => MessageTypeId::Result,
            Self::Fault(_) => MessageTypeId::Fault,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
