//! Call-Handler – beantwortet Anfragen des Ladepunkts
//!
//! Der Gateway kennt nur Transport, Sitzungen und Korrelation. Was eine
//! Anfrage fachlich bedeutet, entscheidet ein `CallHandler`. Jeder
//! eingehende Call laeuft in einem eigenen Task, ein Handler darf also
//! selbst Anfragen an den Ladepunkt senden und auf deren Antwort warten.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use ladenetz_core::ChargePointId;
use ladenetz_protocol::action::{
    AuthorizeRequest, AuthorizeResponse, BootNotificationRequest, BootNotificationResponse,
    DataTransferRequest, DataTransferResponse, DataTransferStatus, HeartbeatResponse, IdTagInfo,
    LeereAntwort, MeterValuesRequest, RegistrationStatus, StartTransactionRequest,
    StartTransactionResponse, StatusNotificationRequest, StopTransactionRequest,
    StopTransactionResponse,
};
use ladenetz_protocol::{Action, Anfrage, Call, ErrorCode};

use crate::correlation::{AnfrageAusgang, Korrelation};
use crate::error::SendeFehler;
use crate::session::Session;

// ---------------------------------------------------------------------------
// Kontext und Fehler
// ---------------------------------------------------------------------------

/// Was ein Handler ueber die aufrufende Verbindung weiss
#[derive(Clone)]
pub struct AufrufKontext {
    pub ladepunkt: ChargePointId,
    pub session: Arc<Session>,
    pub korrelation: Arc<Korrelation>,
    pub standard_timeout: Duration,
}

impl AufrufKontext {
    /// Sendet eine Anfrage an denselben Ladepunkt
    pub async fn senden(&self, action: Action, payload: Value) -> AnfrageAusgang {
        self.korrelation
            .senden(&self.session, action, payload, self.standard_timeout)
            .await
    }

    /// Typisierte Variante von `senden`
    pub async fn anfrage<A: Anfrage>(&self, anfrage: &A) -> Result<A::Antwort, SendeFehler> {
        self.korrelation
            .anfrage(&self.session, anfrage, self.standard_timeout)
            .await
    }
}

/// Fehlerantwort eines Handlers, wird als Fault zurueckgeschickt
#[derive(Debug, Clone, PartialEq)]
pub struct AufrufFehler {
    pub code: ErrorCode,
    pub beschreibung: String,
}

impl AufrufFehler {
    pub fn neu(code: ErrorCode, beschreibung: impl Into<String>) -> Self {
        Self {
            code,
            beschreibung: beschreibung.into(),
        }
    }

    pub fn nicht_implementiert(action: Action) -> Self {
        Self::neu(
            ErrorCode::NotImplemented,
            format!("Aktion {action} wird nicht unterstuetzt"),
        )
    }

    /// Payload passt nicht zum Schema der Aktion
    pub fn schema(e: serde_json::Error) -> Self {
        Self::neu(ErrorCode::TypeConstraintViolation, e.to_string())
    }

    pub fn intern(beschreibung: impl Into<String>) -> Self {
        Self::neu(ErrorCode::InternalError, beschreibung)
    }
}

/// Fachliche Behandlung eingehender Calls
#[async_trait]
pub trait CallHandler: Send + Sync {
    /// Liefert den Payload des Result oder einen Fehler fuer den Fault
    async fn bearbeiten(&self, kontext: &AufrufKontext, call: &Call) -> Result<Value, AufrufFehler>;
}

// ---------------------------------------------------------------------------
// StandardHandler
// ---------------------------------------------------------------------------

/// Minimaler Zentralsystem-Handler
///
/// Nimmt Boot, Heartbeat und Statusmeldungen an und autorisiert jede
/// Karte. Abrechnung und Ladesteuerung gehoeren nicht hierher.
pub struct StandardHandler {
    heartbeat_intervall_sek: u32,
    naechste_transaktion: AtomicI64,
}

impl StandardHandler {
    pub fn neu(heartbeat_intervall_sek: u32) -> Self {
        Self {
            heartbeat_intervall_sek,
            naechste_transaktion: AtomicI64::new(1),
        }
    }
}

impl Default for StandardHandler {
    fn default() -> Self {
        Self::neu(300)
    }
}

fn antwort<T: Serialize>(wert: T) -> Result<Value, AufrufFehler> {
    serde_json::to_value(wert).map_err(|e| AufrufFehler::intern(e.to_string()))
}

#[async_trait]
impl CallHandler for StandardHandler {
    async fn bearbeiten(&self, kontext: &AufrufKontext, call: &Call) -> Result<Value, AufrufFehler> {
        match call.action {
            Action::BootNotification => {
                let boot: BootNotificationRequest =
                    call.parse_payload().map_err(AufrufFehler::schema)?;
                tracing::info!(
                    ladepunkt = %kontext.ladepunkt,
                    hersteller = %boot.charge_point_vendor,
                    modell = %boot.charge_point_model,
                    "BootNotification"
                );
                antwort(BootNotificationResponse {
                    status: RegistrationStatus::Accepted,
                    current_time: Utc::now(),
                    interval: self.heartbeat_intervall_sek,
                })
            }
            Action::Heartbeat => antwort(HeartbeatResponse {
                current_time: Utc::now(),
            }),
            Action::StatusNotification => {
                let status: StatusNotificationRequest =
                    call.parse_payload().map_err(AufrufFehler::schema)?;
                tracing::debug!(
                    ladepunkt = %kontext.ladepunkt,
                    connector = status.connector_id,
                    status = ?status.status,
                    "StatusNotification"
                );
                antwort(LeereAntwort {})
            }
            Action::MeterValues => {
                let _: MeterValuesRequest = call.parse_payload().map_err(AufrufFehler::schema)?;
                antwort(LeereAntwort {})
            }
            Action::Authorize => {
                let _: AuthorizeRequest = call.parse_payload().map_err(AufrufFehler::schema)?;
                antwort(AuthorizeResponse {
                    id_tag_info: IdTagInfo::akzeptiert(),
                })
            }
            Action::StartTransaction => {
                let start: StartTransactionRequest =
                    call.parse_payload().map_err(AufrufFehler::schema)?;
                let transaction_id = self.naechste_transaktion.fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    ladepunkt = %kontext.ladepunkt,
                    connector = start.connector_id,
                    transaction_id,
                    "Transaktion gestartet"
                );
                antwort(StartTransactionResponse {
                    id_tag_info: IdTagInfo::akzeptiert(),
                    transaction_id,
                })
            }
            Action::StopTransaction => {
                let stop: StopTransactionRequest =
                    call.parse_payload().map_err(AufrufFehler::schema)?;
                tracing::info!(
                    ladepunkt = %kontext.ladepunkt,
                    transaction_id = stop.transaction_id,
                    "Transaktion beendet"
                );
                antwort(StopTransactionResponse {
                    id_tag_info: Some(IdTagInfo::akzeptiert()),
                })
            }
            Action::DataTransfer => {
                let _: DataTransferRequest = call.parse_payload().map_err(AufrufFehler::schema)?;
                antwort(DataTransferResponse {
                    status: DataTransferStatus::Rejected,
                    data: None,
                })
            }
            andere => Err(AufrufFehler::nicht_implementiert(andere)),
        }
    }
}
