//! ladenetz-protocol – Nachrichtenformat fuer Ladepunkt-Verbindungen
//!
//! Dieses Crate definiert die Nachrichten, die zwischen Gateway und
//! Ladepunkt ausgetauscht werden, sowie den Codec der sie in Frames
//! uebersetzt.
//!
//! - `message`: getaggte Nachricht (Call / Result / Fault) und Fehler-Codes
//! - `action`: geschlossener Aktionskatalog mit typisierten Payloads
//! - `wire`: Encode/Decode im OCPP-J-Array-Format

pub mod action;
pub mod message;
pub mod wire;

pub use action::{Action, Anfrage};
pub use message::{Call, CallError, CallResult, ErrorCode, Message, MessageTypeId};
pub use wire::{decode, encode, DecodeError, EncodeError, WireCodec, DEFAULT_MAX_NACHRICHTENGROESSE};
