//! Connection-Registry – wer ist gerade online?
//!
//! Bildet eine Ladepunkt-Kennung auf ihre aktive Session ab. Pro Kennung
//! gibt es hoechstens einen Eintrag. Eine neue Anmeldung derselben Kennung
//! schliesst die alte Session, bevor die neue eingetragen wird; beides
//! passiert unter der Sperre des DashMap-Eintrags, also atomar gegenueber
//! parallelen Anmeldungen derselben Kennung.
//!
//! Die Registry haelt nur Verweise zum Nachschlagen. Geschlossen wird
//! eine Session immer ueber den Lebenszyklus.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::broadcast;

use ladenetz_core::{ChargePointId, LadenetzEvent};
use ladenetz_observability::GatewayMetriken;

use crate::session::{SchliessGrund, Session};

/// Groesse des Broadcast-Kanals fuer Registry-Ereignisse
const EVENT_KANAL_GROESSE: usize = 256;

/// Registry aller aktiven Sessions
///
/// Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    eintraege: DashMap<ChargePointId, Arc<Session>>,
    event_tx: broadcast::Sender<LadenetzEvent>,
    metriken: GatewayMetriken,
}

impl ConnectionRegistry {
    pub fn neu(metriken: GatewayMetriken) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_KANAL_GROESSE);
        Self {
            inner: Arc::new(RegistryInner {
                eintraege: DashMap::new(),
                event_tx,
                metriken,
            }),
        }
    }

    /// Register: traegt eine aktive Session ein
    ///
    /// Gibt die verdraengte Session zurueck, falls die Kennung schon
    /// belegt war. Die alte Session ist bei Rueckkehr bereits `Closed`.
    pub fn anmelden(&self, session: Arc<Session>) -> Option<Arc<Session>> {
        let ladepunkt = session.ladepunkt().clone();
        let neue_id = session.id();

        let verdraengt = match self.inner.eintraege.entry(ladepunkt.clone()) {
            Entry::Occupied(mut eintrag) => {
                let alt = eintrag.insert(session);
                alt.beenden(SchliessGrund::Ersetzt);
                Some(alt)
            }
            Entry::Vacant(eintrag) => {
                eintrag.insert(session);
                None
            }
        };
        self.gauge_aktualisieren();

        match &verdraengt {
            Some(alt) => {
                tracing::info!(
                    ladepunkt = %ladepunkt,
                    alte_session = %alt.id(),
                    neue_session = %neue_id,
                    "Session ersetzt"
                );
                let _ = self.inner.event_tx.send(LadenetzEvent::SitzungErsetzt {
                    ladepunkt: ladepunkt.clone(),
                    alte_session: alt.id(),
                    neue_session: neue_id,
                });
            }
            None => {
                tracing::info!(ladepunkt = %ladepunkt, session_id = %neue_id, "Ladepunkt online");
            }
        }
        let _ = self.inner.event_tx.send(LadenetzEvent::LadepunktVerbunden {
            ladepunkt,
            session_id: neue_id,
        });

        verdraengt
    }

    /// Lookup: aktive Session einer Kennung
    pub fn nachschlagen(&self, ladepunkt: &ChargePointId) -> Option<Arc<Session>> {
        self.inner
            .eintraege
            .get(ladepunkt)
            .map(|e| Arc::clone(e.value()))
    }

    /// Unregister: entfernt den Eintrag nur wenn er noch auf `session` zeigt
    ///
    /// Eine bereits ersetzte Session verdraengt so nie ihre Nachfolgerin.
    pub fn abmelden(&self, ladepunkt: &ChargePointId, session: &Session) -> bool {
        let entfernt = self
            .inner
            .eintraege
            .remove_if(ladepunkt, |_, aktuell| aktuell.id() == session.id())
            .is_some();
        if entfernt {
            self.gauge_aktualisieren();
            tracing::info!(ladepunkt = %ladepunkt, session_id = %session.id(), "Ladepunkt offline");
        }
        entfernt
    }

    /// Anzahl aktiver Sessions
    pub fn anzahl(&self) -> usize {
        self.inner.eintraege.len()
    }

    /// Momentaufnahme aller aktiven Sessions
    pub fn alle(&self) -> Vec<Arc<Session>> {
        self.inner
            .eintraege
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect()
    }

    /// Abonniert Registry-Ereignisse
    pub fn abonnieren(&self) -> broadcast::Receiver<LadenetzEvent> {
        self.inner.event_tx.subscribe()
    }

    pub(crate) fn ereignis_senden(&self, event: LadenetzEvent) {
        let _ = self.inner.event_tx.send(event);
    }

    fn gauge_aktualisieren(&self) {
        self.inner
            .metriken
            .verbundene_ladepunkte
            .set(self.inner.eintraege.len() as i64);
    }
}
