//! Lebenszyklus – fuehrt Sessions durch ihre Zustaende
//!
//! Jede Session wird hier erstellt, aktiviert und geschlossen. Nur so
//! bleiben Registry und Anfrage-Tabellen konsistent.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use ladenetz_core::{ChargePointId, LadenetzEvent};
use ladenetz_observability::GatewayMetriken;

use crate::correlation::Korrelation;
use crate::registry::ConnectionRegistry;
use crate::session::{SchliessGrund, Session, SessionZustand};

/// Session Lifecycle Manager
pub struct Lebenszyklus {
    registry: ConnectionRegistry,
    korrelation: Arc<Korrelation>,
    metriken: GatewayMetriken,
}

impl Lebenszyklus {
    pub fn neu(
        registry: ConnectionRegistry,
        korrelation: Arc<Korrelation>,
        metriken: GatewayMetriken,
    ) -> Self {
        Self {
            registry,
            korrelation,
            metriken,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn korrelation(&self) -> &Arc<Korrelation> {
        &self.korrelation
    }

    /// Neue Session fuer eine angenommene Verbindung (`Connecting`)
    pub fn session_erstellen(
        &self,
        ladepunkt: ChargePointId,
        peer: SocketAddr,
        ausgang: mpsc::Sender<String>,
    ) -> Arc<Session> {
        Session::neu(ladepunkt, peer, ausgang, &self.korrelation)
    }

    /// Identitaet liegt vor, Pruefung beginnt
    pub fn authentifizierung_beginnen(&self, session: &Session) -> bool {
        session.uebergang(SessionZustand::Authenticating)
    }

    /// Authentifiziert: Session wird aktiv und in die Registry eingetragen
    pub fn aktivieren(&self, session: &Arc<Session>) -> bool {
        if !session.uebergang(SessionZustand::Active) {
            return false;
        }
        if let Some(alt) = self.registry.anmelden(Arc::clone(session)) {
            self.metriken.sitzungen_ersetzt_total.inc();
            self.korrelation.tabelle_entfernen(&alt.id());
            tracing::info!(
                ladepunkt = %session.ladepunkt(),
                peer = %session.peer(),
                alter_peer = %alt.peer(),
                "Neue Verbindung ersetzt bestehende Session"
            );
        }
        true
    }

    /// Authentifizierung fehlgeschlagen: direkt nach `Closed`, kein Registry-Eintrag
    pub fn ablehnen(&self, session: &Session) {
        session.beenden(SchliessGrund::NichtAutorisiert);
        self.korrelation.tabelle_entfernen(&session.id());
        self.metriken.authentifizierung_abgelehnt_total.inc();
    }

    /// Schliesst eine Session sofort
    ///
    /// Idempotent. Registry-Eintrag und Anfrage-Tabelle werden in jedem Fall
    /// aufgeraeumt; das Ereignis `LadepunktGetrennt` kommt nur einmal.
    pub fn schliessen(&self, session: &Session, grund: SchliessGrund) -> bool {
        let geschlossen = session.beenden(grund);
        self.registry.abmelden(session.ladepunkt(), session);
        self.korrelation.tabelle_entfernen(&session.id());

        if geschlossen {
            tracing::info!(
                ladepunkt = %session.ladepunkt(),
                session_id = %session.id(),
                grund = %grund,
                "Session beendet"
            );
            self.registry.ereignis_senden(LadenetzEvent::LadepunktGetrennt {
                ladepunkt: session.ladepunkt().clone(),
                session_id: session.id(),
                grund: grund.to_string(),
            });
        }
        geschlossen
    }

    /// Geordnetes Schliessen durch den Server
    ///
    /// Wechselt nach `Draining`, laesst offene Anfragen bis `drain_timeout`
    /// ausklingen und schliesst dann.
    pub async fn beenden_mit_drain(
        &self,
        session: &Session,
        grund: SchliessGrund,
        drain_timeout: Duration,
    ) -> bool {
        if session.wechseln(SessionZustand::Active, SessionZustand::Draining) {
            let offen = session.tabelle().anzahl();
            if offen > 0 {
                tracing::debug!(
                    ladepunkt = %session.ladepunkt(),
                    offen,
                    "Warte auf offene Anfragen vor dem Schliessen"
                );
            }
            if tokio::time::timeout(drain_timeout, session.tabelle().leer_warten())
                .await
                .is_err()
            {
                tracing::debug!(
                    ladepunkt = %session.ladepunkt(),
                    "Drain-Frist abgelaufen, restliche Anfragen werden abgebrochen"
                );
            }
        }
        self.schliessen(session, grund)
    }
}
