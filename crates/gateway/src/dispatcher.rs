//! Dispatcher – verteilt eingehende Frames einer Session
//!
//! - `Call`   -> eigener Task mit dem `CallHandler`, Antwort als Result/Fault
//! - `Result` -> `AnfrageTabelle::aufloesen`
//! - `Fault`  -> `AnfrageTabelle::ablehnen`
//!
//! Nicht dekodierbare Frames werden gezaehlt und, ausser bei kaputten
//! Antworten, mit einem Fault beantwortet. Den Fault schreibt der
//! Verbindungs-Task direkt, damit ein voller Ausgangskanal den Lese-Loop
//! nicht blockiert.

use std::sync::Arc;
use std::time::Duration;

use ladenetz_observability::GatewayMetriken;
use ladenetz_protocol::{Call, CallError, CallResult, ErrorCode, Message, WireCodec};

use crate::correlation::Korrelation;
use crate::handler::{AufrufKontext, CallHandler};
use crate::session::Session;

/// Ergebnis der Verarbeitung eines Frames
#[derive(Debug, Clone, PartialEq)]
pub enum Eingang {
    /// Frame wurde zugestellt
    Verarbeitet,
    /// Frame war nicht dekodierbar; optional ein Fault-Frame fuer den Peer
    Fehlerhaft { fault: Option<String> },
}

/// Verteilt Frames an Handler und Korrelation
pub struct Dispatcher {
    handler: Arc<dyn CallHandler>,
    korrelation: Arc<Korrelation>,
    codec: WireCodec,
    anfrage_timeout: Duration,
    metriken: GatewayMetriken,
}

impl Dispatcher {
    pub fn neu(
        handler: Arc<dyn CallHandler>,
        korrelation: Arc<Korrelation>,
        codec: WireCodec,
        anfrage_timeout: Duration,
        metriken: GatewayMetriken,
    ) -> Self {
        Self {
            handler,
            korrelation,
            codec,
            anfrage_timeout,
            metriken,
        }
    }

    /// Verarbeitet einen Frame der Session
    pub fn eingang(&self, session: &Arc<Session>, bytes: &[u8]) -> Eingang {
        session.aktivitaet_melden();

        let nachricht = match self.codec.decode(bytes) {
            Ok(n) => n,
            Err(e) => {
                self.metriken.dekodierfehler_total.inc();
                tracing::warn!(
                    ladepunkt = %session.ladepunkt(),
                    fehler = %e,
                    "Frame nicht dekodierbar"
                );
                let fault = if e.war_antwort() {
                    None
                } else {
                    self.codec.encode(&e.als_fault()).ok()
                };
                return Eingang::Fehlerhaft { fault };
            }
        };

        match nachricht {
            Message::Call(call) => self.call_starten(session, call),
            Message::Result(CallResult {
                message_id,
                payload,
            }) => {
                session.tabelle().aufloesen(&message_id, payload);
            }
            Message::Fault(CallError {
                message_id,
                error_code,
                error_description,
                error_details,
            }) => {
                tracing::debug!(
                    ladepunkt = %session.ladepunkt(),
                    message_id = %message_id,
                    code = %error_code,
                    "Fault vom Ladepunkt"
                );
                session.tabelle().ablehnen(
                    &message_id,
                    error_code,
                    error_description,
                    error_details,
                );
            }
        }
        Eingang::Verarbeitet
    }

    fn call_starten(&self, session: &Arc<Session>, call: Call) {
        let kontext = AufrufKontext {
            ladepunkt: session.ladepunkt().clone(),
            session: Arc::clone(session),
            korrelation: Arc::clone(&self.korrelation),
            standard_timeout: self.anfrage_timeout,
        };
        let handler = Arc::clone(&self.handler);
        let codec = self.codec;

        tokio::spawn(async move {
            tracing::debug!(
                ladepunkt = %kontext.ladepunkt,
                message_id = %call.message_id,
                action = %call.action,
                "Call empfangen"
            );

            let message_id = call.message_id.clone();
            let antwort = match handler.bearbeiten(&kontext, &call).await {
                Ok(payload) => Message::result(call.message_id, payload),
                Err(fehler) => {
                    tracing::debug!(
                        ladepunkt = %kontext.ladepunkt,
                        action = %call.action,
                        code = %fehler.code,
                        "Call mit Fault beantwortet"
                    );
                    Message::fault(call.message_id, fehler.code, fehler.beschreibung)
                }
            };

            let text = match codec.encode(&antwort) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(
                        ladepunkt = %kontext.ladepunkt,
                        fehler = %e,
                        "Antwort des Handlers nicht kodierbar"
                    );
                    let fault = Message::fault(message_id, ErrorCode::InternalError, e.to_string());
                    match codec.encode(&fault) {
                        Ok(text) => text,
                        Err(_) => return,
                    }
                }
            };

            if kontext.session.roh_senden(text).await.is_err() {
                tracing::debug!(
                    ladepunkt = %kontext.ladepunkt,
                    "Antwort verworfen, Verbindung bereits geschlossen"
                );
            }
        });
    }
}
