//! Anfrage-Korrelation – ordnet Antworten ihren ausgehenden Anfragen zu
//!
//! Jede Sitzung hat eine eigene `AnfrageTabelle` mit eigenem Mutex und
//! eigenem ID-Zaehler. Es gibt keine prozessweite Sperre ueber alle
//! Sitzungen.
//!
//! ## Ablauf einer Anfrage
//! ```text
//! senden()  -> ID vergeben -> Eintrag + oneshot -> Call auf den Draht
//!                                  |
//!       +--------------------------+-------------------------+
//!       v                          v                         v
//! aufloesen()/ablehnen()     Sweeper (Frist)         alle_abbrechen()
//!   Result / Fault              Timeout             VerbindungVerloren
//! ```
//!
//! Wer den Eintrag unter dem Mutex aus der Tabelle nimmt, erfuellt den
//! oneshot. Damit gewinnt genau einer von Antwort, Sweeper und Abbruch.
//! Fristen werden nicht pro Anfrage mit eigenem Timer ueberwacht, sondern
//! von einem periodischen Sweeper ueber alle Tabellen.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{oneshot, watch, Notify};
use tokio::time::Instant;

use ladenetz_core::{ChargePointId, SessionId};
use ladenetz_observability::{AnfrageErgebnis, GatewayMetriken};
use ladenetz_protocol::{encode, Action, Anfrage, Call, ErrorCode, Message};

use crate::error::SendeFehler;
use crate::session::Session;

/// Ausgang einer ausgehenden Anfrage
pub type AnfrageAusgang = Result<Value, SendeFehler>;

/// Ersatzfrist wenn `jetzt + timeout` nicht darstellbar ist
const FERNE_FRIST: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

// ---------------------------------------------------------------------------
// AnfrageTabelle
// ---------------------------------------------------------------------------

/// Eine offene Anfrage
struct OffeneAnfrage {
    action: Action,
    gesendet: Instant,
    frist: Instant,
    slot: oneshot::Sender<AnfrageAusgang>,
}

#[derive(Default)]
struct TabellenInhalt {
    offen: HashMap<String, OffeneAnfrage>,
    /// Nach `alle_abbrechen` werden keine Eintraege mehr angenommen
    geschlossen: bool,
}

/// Offene Anfragen einer einzelnen Sitzung
pub struct AnfrageTabelle {
    session_id: SessionId,
    ladepunkt: ChargePointId,
    naechste_id: AtomicU64,
    inhalt: Mutex<TabellenInhalt>,
    leer: Notify,
    metriken: GatewayMetriken,
}

impl AnfrageTabelle {
    pub fn neu(session_id: SessionId, ladepunkt: ChargePointId, metriken: GatewayMetriken) -> Self {
        Self {
            session_id,
            ladepunkt,
            naechste_id: AtomicU64::new(1),
            inhalt: Mutex::new(TabellenInhalt::default()),
            leer: Notify::new(),
            metriken,
        }
    }

    /// Vergibt die naechste Korrelations-ID (streng steigend, nie wiederverwendet)
    pub fn naechste_id(&self) -> String {
        self.naechste_id.fetch_add(1, Ordering::Relaxed).to_string()
    }

    /// Traegt eine Anfrage ein und liefert den Empfaenger fuer ihren Ausgang
    pub fn eintragen(
        &self,
        message_id: String,
        action: Action,
        timeout: Duration,
    ) -> Result<oneshot::Receiver<AnfrageAusgang>, SendeFehler> {
        let (slot, empfaenger) = oneshot::channel();
        let jetzt = Instant::now();

        let mut inhalt = self.inhalt.lock();
        if inhalt.geschlossen {
            return Err(SendeFehler::VerbindungVerloren);
        }
        inhalt.offen.insert(
            message_id,
            OffeneAnfrage {
                action,
                gesendet: jetzt,
                frist: jetzt
                    .checked_add(timeout)
                    .unwrap_or_else(|| jetzt + FERNE_FRIST),
                slot,
            },
        );
        drop(inhalt);

        self.metriken.offene_anfragen.inc();
        Ok(empfaenger)
    }

    /// Nimmt eine Anfrage ohne Ausgang heraus (Call konnte nicht gesendet werden)
    pub fn entfernen(&self, message_id: &str) -> bool {
        let eintrag = self.inhalt.lock().offen.remove(message_id);
        match eintrag {
            Some(_) => {
                self.ausgetragen(1, AnfrageErgebnis::VerbindungVerloren);
                true
            }
            None => false,
        }
    }

    /// Resolve: erfuellt die Anfrage mit dem Payload eines Result
    ///
    /// Unbekannte oder bereits erledigte IDs werden verworfen.
    pub fn aufloesen(&self, message_id: &str, payload: Value) -> bool {
        match self.herausnehmen(message_id) {
            Some(anfrage) => {
                self.metriken
                    .anfrage_dauer_sekunden
                    .observe(anfrage.gesendet.elapsed().as_secs_f64());
                self.ausgetragen(1, AnfrageErgebnis::Result);
                let _ = anfrage.slot.send(Ok(payload));
                true
            }
            None => false,
        }
    }

    /// Reject: erfuellt die Anfrage mit einem Fault
    pub fn ablehnen(
        &self,
        message_id: &str,
        code: ErrorCode,
        beschreibung: String,
        details: Value,
    ) -> bool {
        match self.herausnehmen(message_id) {
            Some(anfrage) => {
                self.metriken
                    .anfrage_dauer_sekunden
                    .observe(anfrage.gesendet.elapsed().as_secs_f64());
                self.ausgetragen(1, AnfrageErgebnis::Fault);
                let _ = anfrage.slot.send(Err(SendeFehler::Fault {
                    code,
                    beschreibung,
                    details,
                }));
                true
            }
            None => false,
        }
    }

    /// CancelAll: loest alle offenen Anfragen mit `VerbindungVerloren` auf
    ///
    /// Danach nimmt die Tabelle keine Eintraege mehr an.
    pub fn alle_abbrechen(&self) -> usize {
        let offen: Vec<OffeneAnfrage> = {
            let mut inhalt = self.inhalt.lock();
            inhalt.geschlossen = true;
            inhalt.offen.drain().map(|(_, a)| a).collect()
        };

        let anzahl = offen.len();
        for anfrage in offen {
            let _ = anfrage.slot.send(Err(SendeFehler::VerbindungVerloren));
        }
        if anzahl > 0 {
            tracing::debug!(
                ladepunkt = %self.ladepunkt,
                session_id = %self.session_id,
                anzahl,
                "Offene Anfragen abgebrochen"
            );
            self.ausgetragen(anzahl, AnfrageErgebnis::VerbindungVerloren);
        } else {
            self.leer.notify_waiters();
        }
        anzahl
    }

    /// Entfernt alle Anfragen deren Frist vor `jetzt` abgelaufen ist
    pub fn abgelaufene_entfernen(&self, jetzt: Instant) -> usize {
        let abgelaufen: Vec<(String, OffeneAnfrage)> = {
            let mut inhalt = self.inhalt.lock();
            let ids: Vec<String> = inhalt
                .offen
                .iter()
                .filter(|(_, a)| a.frist <= jetzt)
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| inhalt.offen.remove(&id).map(|a| (id, a)))
                .collect()
        };

        let anzahl = abgelaufen.len();
        for (id, anfrage) in abgelaufen {
            tracing::info!(
                ladepunkt = %self.ladepunkt,
                message_id = %id,
                action = %anfrage.action,
                "Anfrage ohne Antwort, Frist abgelaufen"
            );
            let _ = anfrage.slot.send(Err(SendeFehler::Timeout));
        }
        if anzahl > 0 {
            self.ausgetragen(anzahl, AnfrageErgebnis::Timeout);
        }
        anzahl
    }

    /// Anzahl offener Anfragen
    pub fn anzahl(&self) -> usize {
        self.inhalt.lock().offen.len()
    }

    pub fn ist_leer(&self) -> bool {
        self.anzahl() == 0
    }

    /// Wartet bis keine Anfrage mehr offen ist
    pub async fn leer_warten(&self) {
        loop {
            let benachrichtigt = self.leer.notified();
            tokio::pin!(benachrichtigt);
            benachrichtigt.as_mut().enable();
            if self.ist_leer() {
                return;
            }
            benachrichtigt.await;
        }
    }

    fn herausnehmen(&self, message_id: &str) -> Option<OffeneAnfrage> {
        let eintrag = self.inhalt.lock().offen.remove(message_id);
        if eintrag.is_none() {
            self.metriken.unbekannte_antworten_total.inc();
            tracing::debug!(
                ladepunkt = %self.ladepunkt,
                message_id = %message_id,
                "Antwort ohne offene Anfrage verworfen"
            );
        }
        eintrag
    }

    fn ausgetragen(&self, anzahl: usize, ergebnis: AnfrageErgebnis) {
        self.metriken.offene_anfragen.sub(anzahl as i64);
        for _ in 0..anzahl {
            self.metriken.anfrage_abgeschlossen(ergebnis);
        }
        if self.ist_leer() {
            self.leer.notify_waiters();
        }
    }
}

// ---------------------------------------------------------------------------
// Korrelation
// ---------------------------------------------------------------------------

/// Kennt alle lebenden Anfrage-Tabellen und ueberwacht ihre Fristen
pub struct Korrelation {
    tabellen: DashMap<SessionId, Arc<AnfrageTabelle>>,
    metriken: GatewayMetriken,
}

impl Korrelation {
    pub fn neu(metriken: GatewayMetriken) -> Self {
        Self {
            tabellen: DashMap::new(),
            metriken,
        }
    }

    /// Legt die Tabelle fuer eine neue Sitzung an
    pub fn tabelle_anlegen(
        &self,
        session_id: SessionId,
        ladepunkt: ChargePointId,
    ) -> Arc<AnfrageTabelle> {
        let tabelle = Arc::new(AnfrageTabelle::neu(
            session_id,
            ladepunkt,
            self.metriken.clone(),
        ));
        self.tabellen.insert(session_id, Arc::clone(&tabelle));
        tabelle
    }

    /// Vergisst die Tabelle einer geschlossenen Sitzung
    pub fn tabelle_entfernen(&self, session_id: &SessionId) {
        self.tabellen.remove(session_id);
    }

    /// Anzahl ueberwachter Tabellen
    pub fn tabellen_anzahl(&self) -> usize {
        self.tabellen.len()
    }

    /// Send: schickt einen Call und wartet auf seinen Ausgang
    ///
    /// Loest immer auf: Result, Fault, Timeout oder VerbindungVerloren.
    /// Eine Sitzung die nicht aktiv ist nimmt keine neuen Anfragen an.
    /// Auch waehrend der Call noch auf Platz im Ausgangskanal wartet,
    /// beenden Frist und Abbruch die Anfrage.
    pub async fn senden(
        &self,
        session: &Session,
        action: Action,
        payload: Value,
        timeout: Duration,
    ) -> AnfrageAusgang {
        if !session.ist_aktiv() {
            return Err(SendeFehler::SessionNichtAktiv);
        }

        let tabelle = session.tabelle();
        let message_id = tabelle.naechste_id();
        let text = encode(&Message::Call(Call {
            message_id: message_id.clone(),
            action,
            payload,
        }))
        .map_err(|e| SendeFehler::Kodierung(e.to_string()))?;

        let mut empfaenger = tabelle.eintragen(message_id.clone(), action, timeout)?;

        tracing::debug!(
            ladepunkt = %session.ladepunkt(),
            message_id = %message_id,
            action = %action,
            "Anfrage gesendet"
        );

        tokio::select! {
            gesendet = session.roh_senden(text) => {
                if gesendet.is_err() {
                    tabelle.entfernen(&message_id);
                    return Err(SendeFehler::VerbindungVerloren);
                }
            }
            ausgang = &mut empfaenger => {
                // Eintrag ist schon ausgetragen, der Call geht nicht mehr raus
                return ausgang.unwrap_or(Err(SendeFehler::VerbindungVerloren));
            }
        }

        empfaenger
            .await
            .unwrap_or(Err(SendeFehler::VerbindungVerloren))
    }

    /// Typisiertes Send mit Schema-Pruefung der Antwort
    pub async fn anfrage<A: Anfrage>(
        &self,
        session: &Session,
        anfrage: &A,
        timeout: Duration,
    ) -> Result<A::Antwort, SendeFehler> {
        let payload =
            serde_json::to_value(anfrage).map_err(|e| SendeFehler::Kodierung(e.to_string()))?;
        let antwort = self.senden(session, A::ACTION, payload, timeout).await?;
        serde_json::from_value(antwort).map_err(|e| SendeFehler::UngueltigeAntwort(e.to_string()))
    }

    /// Ein Durchlauf des Sweepers ueber alle Tabellen
    pub fn sweep(&self) -> usize {
        let jetzt = Instant::now();
        let tabellen: Vec<Arc<AnfrageTabelle>> = self
            .tabellen
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();
        tabellen
            .iter()
            .map(|t| t.abgelaufene_entfernen(jetzt))
            .sum()
    }

    /// Startet den periodischen Sweeper
    ///
    /// Laeuft bis `shutdown_rx` ein `true`-Signal empfaengt.
    pub fn sweeper_starten(
        self: &Arc<Self>,
        intervall: Duration,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let korrelation = Arc::clone(self);
        tokio::spawn(async move {
            let mut takt = tokio::time::interval(intervall);
            takt.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = takt.tick() => {
                        let abgelaufen = korrelation.sweep();
                        if abgelaufen > 0 {
                            tracing::trace!(abgelaufen, "Sweeper-Durchlauf");
                        }
                    }
                    Ok(()) = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("Sweeper gestoppt");
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SchliessGrund, SessionZustand};
    use ladenetz_protocol::{decode, DEFAULT_MAX_NACHRICHTENGROESSE};
    use serde_json::json;
    use tokio::sync::mpsc;

    struct Aufbau {
        korrelation: Arc<Korrelation>,
        session: Arc<Session>,
        ausgang: mpsc::Receiver<String>,
        metriken: GatewayMetriken,
    }

    fn aufbau() -> Aufbau {
        aufbau_mit_kapazitaet(16)
    }

    fn aufbau_mit_kapazitaet(kapazitaet: usize) -> Aufbau {
        let metriken = GatewayMetriken::neu().unwrap();
        let korrelation = Arc::new(Korrelation::neu(metriken.clone()));
        let (tx, ausgang) = mpsc::channel(kapazitaet);
        let session = Session::neu(
            ChargePointId::new("cp-test"),
            "127.0.0.1:40000".parse().unwrap(),
            tx,
            &korrelation,
        );
        assert!(session.uebergang(SessionZustand::Authenticating));
        assert!(session.uebergang(SessionZustand::Active));
        Aufbau {
            korrelation,
            session,
            ausgang,
            metriken,
        }
    }

    fn call_id(text: &str) -> String {
        match decode(text.as_bytes(), DEFAULT_MAX_NACHRICHTENGROESSE).unwrap() {
            Message::Call(c) => c.message_id,
            andere => panic!("Call erwartet, erhalten: {andere:?}"),
        }
    }

    #[tokio::test]
    async fn ids_steigen_streng() {
        let a = aufbau();
        let t = a.session.tabelle();
        assert_eq!(t.naechste_id(), "1");
        assert_eq!(t.naechste_id(), "2");
        assert_eq!(t.naechste_id(), "3");
    }

    #[tokio::test]
    async fn antwort_loest_anfrage_auf() {
        let mut a = aufbau();
        let k = Arc::clone(&a.korrelation);
        let s = Arc::clone(&a.session);
        let anfrage = tokio::spawn(async move {
            k.senden(&s, Action::Reset, json!({"type": "Soft"}), Duration::from_secs(5))
                .await
        });

        let id = call_id(&a.ausgang.recv().await.unwrap());
        assert_eq!(id, "1");
        assert!(a.session.tabelle().aufloesen(&id, json!({"status": "Accepted"})));

        let ergebnis = anfrage.await.unwrap();
        assert_eq!(ergebnis, Ok(json!({"status": "Accepted"})));
        assert_eq!(a.metriken.offene_anfragen.get(), 0);
    }

    #[tokio::test]
    async fn antworten_in_beliebiger_reihenfolge() {
        let mut a = aufbau();
        let mut anfragen = Vec::new();
        for _ in 0..2 {
            let k = Arc::clone(&a.korrelation);
            let s = Arc::clone(&a.session);
            anfragen.push(tokio::spawn(async move {
                k.senden(&s, Action::ClearCache, json!({}), Duration::from_secs(5))
                    .await
            }));
        }
        let erste = call_id(&a.ausgang.recv().await.unwrap());
        let zweite = call_id(&a.ausgang.recv().await.unwrap());

        // Zweite zuerst beantworten
        let t = a.session.tabelle();
        assert!(t.aufloesen(&zweite, json!({"n": zweite.clone()})));
        assert!(t.aufloesen(&erste, json!({"n": erste.clone()})));

        let mut ergebnisse = Vec::new();
        for a in anfragen {
            ergebnisse.push(a.await.unwrap().unwrap());
        }
        let mut ids: Vec<String> = ergebnisse
            .iter()
            .map(|v| v["n"].as_str().unwrap().to_string())
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["1".to_string(), "2".to_string()]);
    }

    #[tokio::test]
    async fn unbekannte_antwort_wird_verworfen() {
        let mut a = aufbau();
        let k = Arc::clone(&a.korrelation);
        let s = Arc::clone(&a.session);
        let anfrage = tokio::spawn(async move {
            k.senden(&s, Action::ClearCache, json!({}), Duration::from_secs(5))
                .await
        });
        let id = call_id(&a.ausgang.recv().await.unwrap());

        let t = a.session.tabelle();
        assert!(!t.aufloesen("999", json!({})));
        assert_eq!(a.metriken.unbekannte_antworten_total.get(), 1);
        assert_eq!(t.anzahl(), 1, "andere Anfrage bleibt offen");

        assert!(t.aufloesen(&id, json!({})));
        assert!(!t.aufloesen(&id, json!({})), "doppelte Antwort wird verworfen");
        assert!(anfrage.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn fault_wird_zum_fehler() {
        let mut a = aufbau();
        let k = Arc::clone(&a.korrelation);
        let s = Arc::clone(&a.session);
        let anfrage = tokio::spawn(async move {
            k.senden(&s, Action::UnlockConnector, json!({}), Duration::from_secs(5))
                .await
        });
        let id = call_id(&a.ausgang.recv().await.unwrap());
        a.session.tabelle().ablehnen(
            &id,
            ErrorCode::NotSupported,
            "geht nicht".into(),
            json!({}),
        );

        match anfrage.await.unwrap() {
            Err(SendeFehler::Fault { code, .. }) => assert_eq!(code, ErrorCode::NotSupported),
            andere => panic!("Fault erwartet: {andere:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_nach_frist_sitzung_bleibt_aktiv() {
        let a = aufbau();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let sweeper = a
            .korrelation
            .sweeper_starten(Duration::from_millis(100), shutdown_rx);

        let start = Instant::now();
        let ergebnis = a
            .korrelation
            .senden(&a.session, Action::Reset, json!({"type": "Hard"}), Duration::from_secs(5))
            .await;
        let dauer = start.elapsed();

        assert_eq!(ergebnis, Err(SendeFehler::Timeout));
        assert!(dauer >= Duration::from_secs(5));
        assert!(dauer <= Duration::from_millis(5200), "Dauer: {dauer:?}");
        assert_eq!(a.session.zustand(), SessionZustand::Active);
        assert_eq!(a.metriken.anfragen_total.with_label_values(&["timeout"]).get(), 1);
        sweeper.abort();
    }

    #[tokio::test]
    async fn schliessen_bricht_alle_offenen_ab() {
        let mut a = aufbau();
        let mut anfragen = Vec::new();
        for _ in 0..2 {
            let k = Arc::clone(&a.korrelation);
            let s = Arc::clone(&a.session);
            anfragen.push(tokio::spawn(async move {
                k.senden(&s, Action::GetConfiguration, json!({}), Duration::from_secs(60))
                    .await
            }));
        }
        a.ausgang.recv().await.unwrap();
        a.ausgang.recv().await.unwrap();

        assert!(a.session.beenden(SchliessGrund::Transportfehler));

        for anfrage in anfragen {
            let ergebnis = tokio::time::timeout(Duration::from_millis(100), anfrage)
                .await
                .expect("Anfrage haengt nach dem Schliessen")
                .unwrap();
            assert_eq!(ergebnis, Err(SendeFehler::VerbindungVerloren));
        }
        assert_eq!(a.metriken.offene_anfragen.get(), 0);
    }

    #[tokio::test]
    async fn nach_schliessen_keine_neuen_anfragen() {
        let a = aufbau();
        a.session.beenden(SchliessGrund::ServerInitiiert);
        let ergebnis = a
            .korrelation
            .senden(&a.session, Action::Reset, json!({}), Duration::from_secs(1))
            .await;
        assert_eq!(ergebnis, Err(SendeFehler::SessionNichtAktiv));

        let spaet = a
            .session
            .tabelle()
            .eintragen("77".into(), Action::Reset, Duration::from_secs(1));
        assert!(matches!(spaet, Err(SendeFehler::VerbindungVerloren)));
    }

    #[tokio::test]
    async fn typisierte_anfrage_prueft_antwort() {
        use ladenetz_protocol::action::{ResetRequest, ResetType};

        let mut a = aufbau();
        let k = Arc::clone(&a.korrelation);
        let s = Arc::clone(&a.session);
        let anfrage = tokio::spawn(async move {
            k.anfrage(&s, &ResetRequest { typ: ResetType::Soft }, Duration::from_secs(5))
                .await
        });
        let id = call_id(&a.ausgang.recv().await.unwrap());
        a.session.tabelle().aufloesen(&id, json!({"status": "Vielleicht"}));

        assert!(matches!(
            anfrage.await.unwrap(),
            Err(SendeFehler::UngueltigeAntwort(_))
        ));
    }

    #[tokio::test]
    async fn leer_warten_kehrt_zurueck() {
        let mut a = aufbau();
        let k = Arc::clone(&a.korrelation);
        let s = Arc::clone(&a.session);
        tokio::spawn(async move {
            let _ = k
                .senden(&s, Action::ClearCache, json!({}), Duration::from_secs(5))
                .await;
        });
        let id = call_id(&a.ausgang.recv().await.unwrap());

        let t = Arc::clone(a.session.tabelle());
        let warten = tokio::spawn(async move { t.leer_warten().await });
        tokio::task::yield_now().await;
        assert!(!warten.is_finished());

        a.session.tabelle().aufloesen(&id, json!({}));
        tokio::time::timeout(Duration::from_millis(200), warten)
            .await
            .expect("leer_warten kehrt nicht zurueck")
            .unwrap();
    }

    /// Kanal mit einem Platz, der schon belegt ist und nie geleert wird
    async fn verstopfter_ausgang() -> Aufbau {
        let a = aufbau_mit_kapazitaet(1);
        a.session.roh_senden("belegt".into()).await.unwrap();
        a
    }

    #[tokio::test(start_paused = true)]
    async fn voller_ausgang_endet_mit_timeout() {
        let mut a = verstopfter_ausgang().await;
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let sweeper = a
            .korrelation
            .sweeper_starten(Duration::from_millis(20), shutdown_rx);

        let ergebnis = tokio::time::timeout(
            Duration::from_secs(2),
            a.korrelation
                .senden(&a.session, Action::Reset, json!({}), Duration::from_millis(200)),
        )
        .await
        .expect("Anfrage haengt am vollen Ausgang");

        assert_eq!(ergebnis, Err(SendeFehler::Timeout));
        assert!(a.session.tabelle().ist_leer());
        assert_eq!(a.metriken.offene_anfragen.get(), 0);
        assert_eq!(a.ausgang.try_recv().unwrap(), "belegt");
        assert!(a.ausgang.try_recv().is_err(), "Call darf nicht nachtraeglich rausgehen");
        sweeper.abort();
    }

    #[tokio::test]
    async fn voller_ausgang_endet_beim_schliessen() {
        let a = verstopfter_ausgang().await;
        let k = Arc::clone(&a.korrelation);
        let s = Arc::clone(&a.session);
        let anfrage = tokio::spawn(async move {
            k.senden(&s, Action::GetConfiguration, json!({}), Duration::from_secs(60))
                .await
        });
        while a.session.tabelle().ist_leer() {
            tokio::task::yield_now().await;
        }

        assert!(a.session.beenden(SchliessGrund::Transportfehler));
        let ergebnis = tokio::time::timeout(Duration::from_millis(500), anfrage)
            .await
            .expect("Anfrage haengt nach dem Schliessen")
            .unwrap();
        assert_eq!(ergebnis, Err(SendeFehler::VerbindungVerloren));
    }

    #[tokio::test]
    async fn riesige_frist_laeuft_nicht_ueber() {
        let a = aufbau();
        let t = a.session.tabelle();
        let _empfaenger = t.eintragen("1".into(), Action::Reset, Duration::MAX).unwrap();
        assert_eq!(t.abgelaufene_entfernen(Instant::now()), 0);
        assert_eq!(t.anzahl(), 1);
    }

    #[tokio::test]
    async fn nicht_objekt_payload_wird_abgelehnt() {
        let mut a = aufbau();
        let ergebnis = a
            .korrelation
            .senden(&a.session, Action::Reset, Value::Null, Duration::from_secs(1))
            .await;
        assert!(matches!(ergebnis, Err(SendeFehler::Kodierung(_))));
        assert!(a.session.tabelle().ist_leer());
        assert!(a.ausgang.try_recv().is_err());
    }
}
