//! Ladepunkt-Verbindung – verarbeitet eine einzelne WebSocket-Verbindung
//!
//! Jede Verbindung laeuft in einem eigenen tokio-Task. Nur dieser Task
//! schreibt auf den Socket; Antworten und Anfragen anderer Tasks kommen
//! ueber den Ausgangskanal der Session.
//!
//! ## Ablauf
//! ```text
//! Upgrade (Pfad, Authorization, Subprotokoll)
//!     -> Session (Connecting -> Authenticating)
//!     -> Authenticator
//!          |- nicht autorisiert: Close 1008, Session Closed, kein Registry-Eintrag
//!          +- autorisiert: Session Active, Registry-Eintrag
//!     -> Schluessel erneut pruefen (Rotation waehrend der Anmeldung)
//!     -> Lese-Loop bis Peer, Fehler, Ersetzen, Shutdown oder Leerlauf
//!     -> Lebenszyklus::schliessen, Close-Frame
//! ```
//!
//! ## Keepalive
//! - Server sendet alle `keepalive_sek` einen WebSocket-Ping
//! - Kommt `verbindungs_timeout_sek` lang kein Frame, wird getrennt

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{header, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;

use ladenetz_auth::basic_auth_lesen;
use ladenetz_core::ChargePointId;

use crate::dispatcher::Eingang;
use crate::error::{GatewayError, GatewayResult};
use crate::session::{SchliessGrund, Session};
use crate::state::GatewayState;

/// Einziges unterstuetztes Subprotokoll
pub const SUBPROTOKOLL: &str = "ocpp1.6";

/// Groesse des Ausgangskanals pro Session
const AUSGANG_KANAL_GROESSE: usize = 64;

/// Wartezeit auf den Close-Handshake des Peers
const NACHLAUF: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

/// Was der Ladepunkt beim Upgrade mitgeschickt hat
#[derive(Debug, Default, Clone)]
struct UpgradeDaten {
    pfad: String,
    autorisierung: Option<String>,
}

/// Behauptete Identitaet mit vorgelegtem Schluessel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anspruch {
    pub kennung: String,
    pub schluessel: Vec<u8>,
}

/// Letztes nicht-leeres Pfadsegment nach dem Praefix
pub fn kennung_aus_pfad(pfad: &str, praefix: &str) -> Option<String> {
    let pfad = pfad.split('?').next().unwrap_or_default();
    let segmente: Vec<&str> = pfad.split('/').filter(|s| !s.is_empty()).collect();
    let rest = match segmente.split_first() {
        Some((erstes, rest)) if *erstes == praefix => rest,
        _ => segmente.as_slice(),
    };
    rest.last().map(|s| s.to_string())
}

/// Ermittelt den Anspruch aus Pfad-Kennung und Basic-Auth
///
/// Ein Benutzer im Basic-Header muss zur Pfad-Kennung passen. Ohne
/// Pfad-Kennung gilt der Benutzer aus dem Header.
pub fn anspruch_ermitteln(
    pfad_kennung: Option<String>,
    autorisierung: Option<&str>,
) -> Option<Anspruch> {
    let (benutzer, schluessel) = basic_auth_lesen(autorisierung?)?;
    let kennung = match pfad_kennung {
        Some(pfad) if benutzer.is_empty() || benutzer == pfad => pfad,
        Some(_) => return None,
        None if benutzer.is_empty() => return None,
        None => benutzer,
    };
    Some(Anspruch {
        kennung,
        schluessel,
    })
}

fn subprotokoll_angeboten(request: &Request) -> bool {
    request
        .headers()
        .get_all(header::SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|p| p.trim().eq_ignore_ascii_case(SUBPROTOKOLL))
}

/// Authentifiziert den Anspruch und aktiviert die Session
///
/// Nach dem Registry-Eintrag wird der Schluessel ein zweites Mal gelesen.
/// Eine Rotation vor diesem Lesen faellt hier auf, eine spaetere findet die
/// Session in der Registry und trennt sie selbst.
pub(crate) async fn zulassen(
    state: &GatewayState,
    session: &Arc<Session>,
    anspruch: Option<&Anspruch>,
) -> GatewayResult<()> {
    let lebenszyklus = &state.lebenszyklus;
    let Some(anspruch) = anspruch else {
        tracing::debug!(peer = %session.peer(), "Keine verwertbaren Zugangsdaten im Upgrade");
        lebenszyklus.ablehnen(session);
        return Err(GatewayError::Authentifizierung);
    };

    let autorisiert = state
        .authenticator
        .authentifizieren(&anspruch.kennung, &anspruch.schluessel)
        .await
        .ist_autorisiert();
    if !autorisiert || !lebenszyklus.aktivieren(session) {
        lebenszyklus.ablehnen(session);
        return Err(GatewayError::Authentifizierung);
    }

    let noch_gueltig = state
        .authenticator
        .authentifizieren(&anspruch.kennung, &anspruch.schluessel)
        .await
        .ist_autorisiert();
    if !noch_gueltig {
        tracing::info!(
            ladepunkt = %session.ladepunkt(),
            "Zugangsdaten waehrend der Anmeldung geaendert"
        );
        lebenszyklus.schliessen(session, SchliessGrund::ZugangsdatenGeaendert);
        return Err(GatewayError::Authentifizierung);
    }
    Ok(())
}

/// Close-Frame je Schliessgrund; `None` wenn der Transport schon weg ist
fn schliess_frame(grund: SchliessGrund) -> Option<CloseFrame<'static>> {
    let (code, text) = match grund {
        SchliessGrund::PeerGeschlossen | SchliessGrund::Transportfehler => return None,
        SchliessGrund::NichtAutorisiert => (CloseCode::Policy, "Unauthorized"),
        SchliessGrund::Dekodierfehler => (CloseCode::Policy, "Too many malformed messages"),
        SchliessGrund::ZugangsdatenGeaendert => (CloseCode::Policy, "Credentials changed"),
        SchliessGrund::Shutdown => (CloseCode::Away, "Server shutting down"),
        SchliessGrund::Leerlauf => (CloseCode::Away, "Idle timeout"),
        SchliessGrund::Ersetzt => (CloseCode::Normal, "Superseded by new connection"),
        SchliessGrund::ServerInitiiert => (CloseCode::Normal, "Closed by server"),
    };
    Some(CloseFrame {
        code,
        reason: text.into(),
    })
}

// ---------------------------------------------------------------------------
// LadepunktVerbindung
// ---------------------------------------------------------------------------

/// Verarbeitet eine einzelne Ladepunkt-Verbindung
pub struct LadepunktVerbindung {
    state: Arc<GatewayState>,
    peer: SocketAddr,
}

impl LadepunktVerbindung {
    pub fn neu(state: Arc<GatewayState>, peer: SocketAddr) -> Self {
        Self { state, peer }
    }

    /// Fuehrt Handshake, Authentifizierung und Lese-Loop aus
    ///
    /// Laeuft bis die Verbindung getrennt wird oder `shutdown_rx` ein
    /// `true`-Signal empfaengt.
    pub async fn verarbeiten<S>(self, stream: S, shutdown_rx: watch::Receiver<bool>)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let peer = self.peer;
        let handshake_frist = Duration::from_secs(self.state.config.handshake_timeout_sek);

        let mut upgrade = UpgradeDaten::default();
        let rueckruf = |request: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
            upgrade.pfad = request.uri().path().to_string();
            upgrade.autorisierung = request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            if subprotokoll_angeboten(request) {
                response.headers_mut().insert(
                    header::SEC_WEBSOCKET_PROTOCOL,
                    HeaderValue::from_static(SUBPROTOKOLL),
                );
            }
            Ok(response)
        };

        let ws = match tokio::time::timeout(
            handshake_frist,
            tokio_tungstenite::accept_hdr_async_with_config(stream, rueckruf, None),
        )
        .await
        {
            Ok(Ok(ws)) => ws,
            Ok(Err(e)) => {
                tracing::warn!(peer = %peer, fehler = %e, "WebSocket-Handshake fehlgeschlagen");
                return;
            }
            Err(_) => {
                tracing::warn!(peer = %peer, "WebSocket-Handshake Zeitlimit");
                return;
            }
        };

        self.nach_upgrade(ws, upgrade, shutdown_rx).await;
    }

    async fn nach_upgrade<S>(
        self,
        mut ws: WebSocketStream<S>,
        upgrade: UpgradeDaten,
        shutdown_rx: watch::Receiver<bool>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let peer = self.peer;
        let lebenszyklus = &self.state.lebenszyklus;

        let pfad_kennung = kennung_aus_pfad(&upgrade.pfad, &self.state.config.pfad_praefix);
        let anspruch = anspruch_ermitteln(pfad_kennung.clone(), upgrade.autorisierung.as_deref());
        let kennung = anspruch
            .as_ref()
            .map(|a| a.kennung.clone())
            .or(pfad_kennung)
            .unwrap_or_default();

        tracing::info!(peer = %peer, ladepunkt = %kennung, "Neue Verbindung");

        let (ausgang_tx, ausgang_rx) = mpsc::channel::<String>(AUSGANG_KANAL_GROESSE);
        let session = lebenszyklus.session_erstellen(ChargePointId::new(kennung), peer, ausgang_tx);
        let schliess_rx = session.schliess_signal();
        lebenszyklus.authentifizierung_beginnen(&session);

        if let Err(e) = zulassen(&self.state, &session, anspruch.as_ref()).await {
            tracing::warn!(
                peer = %peer,
                ladepunkt = %session.ladepunkt(),
                fehler = %e,
                "Verbindung nicht autorisiert"
            );
            let grund = session
                .schliess_grund()
                .unwrap_or(SchliessGrund::NichtAutorisiert);
            schliessen_mit(&mut ws, grund).await;
            return;
        }

        let grund = self
            .lese_loop(&mut ws, &session, ausgang_rx, schliess_rx, shutdown_rx)
            .await;

        lebenszyklus.schliessen(&session, grund);
        // Wer zuerst geschlossen hat bestimmt den Close-Frame
        let endgueltig = session.schliess_grund().unwrap_or(grund);
        schliessen_mit(&mut ws, endgueltig).await;

        tracing::info!(
            peer = %peer,
            ladepunkt = %session.ladepunkt(),
            grund = %endgueltig,
            "Verbindungs-Task beendet"
        );
    }

    async fn lese_loop<S>(
        &self,
        ws: &mut WebSocketStream<S>,
        session: &Arc<Session>,
        mut ausgang_rx: mpsc::Receiver<String>,
        mut schliess_rx: watch::Receiver<Option<SchliessGrund>>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> SchliessGrund
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let peer = self.peer;
        let config = &self.state.config;
        let keepalive_intervall = Duration::from_secs(config.keepalive_sek);
        let timeout_dauer = Duration::from_secs(config.verbindungs_timeout_sek);

        // Zeitpunkt des letzten empfangenen Frames
        let mut letzter_empfang = Instant::now();
        // Zeitpunkt des naechsten Ping
        let mut naechster_ping = Instant::now() + keepalive_intervall;
        let mut dekodierfehler: u32 = 0;

        // Shutdown vor dem Start schon ausgeloest?
        if *shutdown_rx.borrow() {
            return SchliessGrund::Shutdown;
        }

        loop {
            let jetzt = Instant::now();

            if jetzt.duration_since(letzter_empfang) > timeout_dauer {
                tracing::warn!(peer = %peer, ladepunkt = %session.ladepunkt(), "Verbindungs-Timeout");
                return SchliessGrund::Leerlauf;
            }

            let ping_verzoegerung = if jetzt < naechster_ping {
                naechster_ping.duration_since(jetzt)
            } else {
                Duration::from_millis(1)
            };
            let leerlauf_verzoegerung =
                (letzter_empfang + timeout_dauer).saturating_duration_since(jetzt) + Duration::from_millis(1);

            tokio::select! {
                // Eingehender Frame vom Ladepunkt
                frame = ws.next() => {
                    let bytes = match frame {
                        Some(Ok(WsMessage::Text(text))) => text.into_bytes(),
                        Some(Ok(WsMessage::Binary(bytes))) => bytes,
                        Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_))) => {
                            letzter_empfang = Instant::now();
                            session.aktivitaet_melden();
                            continue;
                        }
                        Some(Ok(WsMessage::Close(frame))) => {
                            tracing::info!(
                                peer = %peer,
                                ladepunkt = %session.ladepunkt(),
                                code = ?frame.as_ref().map(|f| f.code),
                                "Verbindung vom Ladepunkt geschlossen"
                            );
                            return SchliessGrund::PeerGeschlossen;
                        }
                        Some(Err(e)) => {
                            tracing::warn!(peer = %peer, fehler = %e, "WebSocket-Lesefehler");
                            return SchliessGrund::Transportfehler;
                        }
                        None => {
                            tracing::info!(peer = %peer, "Verbindung vom Ladepunkt getrennt");
                            return SchliessGrund::PeerGeschlossen;
                        }
                    };
                    letzter_empfang = Instant::now();

                    if let Eingang::Fehlerhaft { fault } = self.state.dispatcher.eingang(session, &bytes) {
                        dekodierfehler += 1;
                        if let Some(text) = fault {
                            if let Err(e) = ws.send(WsMessage::Text(text)).await {
                                tracing::warn!(peer = %peer, fehler = %e, "Fault-Senden fehlgeschlagen");
                                return SchliessGrund::Transportfehler;
                            }
                        }
                        if dekodierfehler >= config.max_dekodierfehler {
                            tracing::warn!(
                                peer = %peer,
                                ladepunkt = %session.ladepunkt(),
                                dekodierfehler,
                                "Zu viele fehlerhafte Nachrichten, Verbindung wird getrennt"
                            );
                            return SchliessGrund::Dekodierfehler;
                        }
                    }
                }

                // Antworten und Anfragen aus anderen Tasks
                Some(text) = ausgang_rx.recv() => {
                    if let Err(e) = ws.send(WsMessage::Text(text)).await {
                        tracing::warn!(peer = %peer, fehler = %e, "Senden fehlgeschlagen");
                        return SchliessGrund::Transportfehler;
                    }
                }

                // Session wurde von aussen geschlossen (ersetzt, Zugangsdaten, Betreiber)
                Ok(()) = schliess_rx.changed() => {
                    let grund = *schliess_rx.borrow_and_update();
                    if let Some(grund) = grund {
                        return grund;
                    }
                }

                // Keepalive-Ping
                _ = tokio::time::sleep(ping_verzoegerung) => {
                    if Instant::now() >= naechster_ping {
                        if let Err(e) = ws.send(WsMessage::Ping(Vec::new())).await {
                            tracing::warn!(peer = %peer, fehler = %e, "Ping-Senden fehlgeschlagen");
                            return SchliessGrund::Transportfehler;
                        }
                        naechster_ping = Instant::now() + keepalive_intervall;
                    }
                }

                // Leerlauf-Pruefung am Schleifenanfang
                _ = tokio::time::sleep(leerlauf_verzoegerung) => {}

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!(peer = %peer, "Shutdown-Signal, Verbindung wird getrennt");
                        return SchliessGrund::Shutdown;
                    }
                }
            }
        }
    }
}

/// Sendet den passenden Close-Frame und wartet kurz auf die Bestaetigung
async fn schliessen_mit<S>(ws: &mut WebSocketStream<S>, grund: SchliessGrund)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match schliess_frame(grund) {
        Some(frame) => {
            if ws.close(Some(frame)).await.is_err() {
                return;
            }
            let _ = tokio::time::timeout(NACHLAUF, async {
                while let Some(Ok(_)) = ws.next().await {}
            })
            .await;
        }
        None => {
            // Close des Peers bestaetigen, falls noch moeglich
            let _ = ws.close(None).await;
        }
    }
}
