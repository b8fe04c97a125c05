//! Session – eine Transportverbindung eines Ladepunkts
//!
//! ## Zustandsautomat
//! ```text
//! Connecting -> Authenticating -> Active -> Draining -> Closed
//!      |              |
//!      +--------------+----------------------------------> Closed
//! ```
//! Zustaende bewegen sich nur vorwaerts. `Closed` ist endgueltig.
//! Ein aktiver Ladepunkt geht immer ueber `Draining` nach `Closed`.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use ladenetz_core::{ChargePointId, SessionId};

use crate::correlation::{AnfrageTabelle, Korrelation};

// ---------------------------------------------------------------------------
// Zustand
// ---------------------------------------------------------------------------

/// Lebenszyklus-Zustand einer Session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum SessionZustand {
    Connecting = 0,
    Authenticating = 1,
    Active = 2,
    Draining = 3,
    Closed = 4,
}

impl SessionZustand {
    fn aus_u8(wert: u8) -> Self {
        match wert {
            0 => Self::Connecting,
            1 => Self::Authenticating,
            2 => Self::Active,
            3 => Self::Draining,
            _ => Self::Closed,
        }
    }

    /// Ist der Uebergang `self -> nach` erlaubt?
    pub fn erlaubt(self, nach: SessionZustand) -> bool {
        if nach as u8 == self as u8 + 1 {
            return true;
        }
        nach == SessionZustand::Closed
            && self != SessionZustand::Active
            && self != SessionZustand::Closed
    }

    pub fn als_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Active => "active",
            Self::Draining => "draining",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionZustand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.als_str())
    }
}

/// Warum eine Session geschlossen wurde
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchliessGrund {
    /// Ladepunkt hat die Verbindung geschlossen
    PeerGeschlossen,
    /// Lese- oder Schreibfehler auf dem Transport
    Transportfehler,
    /// Neue Verbindung derselben Identitaet
    Ersetzt,
    /// Betreiber hat die Trennung verlangt
    ServerInitiiert,
    /// Schluessel rotiert, Ladepunkt umbenannt oder geloescht
    ZugangsdatenGeaendert,
    /// Zu viele nicht dekodierbare Frames
    Dekodierfehler,
    /// Keine Aktivitaet innerhalb des Verbindungs-Timeouts
    Leerlauf,
    /// Prozess wird beendet
    Shutdown,
    /// Authentifizierung fehlgeschlagen
    NichtAutorisiert,
}

impl SchliessGrund {
    pub fn als_str(&self) -> &'static str {
        match self {
            Self::PeerGeschlossen => "peer_geschlossen",
            Self::Transportfehler => "transportfehler",
            Self::Ersetzt => "ersetzt",
            Self::ServerInitiiert => "server_initiiert",
            Self::ZugangsdatenGeaendert => "zugangsdaten_geaendert",
            Self::Dekodierfehler => "dekodierfehler",
            Self::Leerlauf => "leerlauf",
            Self::Shutdown => "shutdown",
            Self::NichtAutorisiert => "nicht_autorisiert",
        }
    }
}

impl fmt::Display for SchliessGrund {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.als_str())
    }
}

/// Ausgehender Kanal ist zu (Schreib-Task beendet)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AusgangGeschlossen;

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Eine Transportverbindung eines Ladepunkts
///
/// Wird von Verbindungs-Task, Registry und Anfrage-Aufrufern geteilt
/// (`Arc<Session>`). Nur der Verbindungs-Task schreibt auf den Socket;
/// alle anderen reichen Text-Frames ueber `ausgang` durch.
pub struct Session {
    id: SessionId,
    ladepunkt: ChargePointId,
    peer: SocketAddr,
    erstellt: DateTime<Utc>,
    letzte_aktivitaet: Mutex<DateTime<Utc>>,
    zustand: AtomicU8,
    ausgang: mpsc::Sender<String>,
    tabelle: Arc<AnfrageTabelle>,
    schliessen_tx: watch::Sender<Option<SchliessGrund>>,
    grund: Mutex<Option<SchliessGrund>>,
}

impl Session {
    /// Erstellt eine Session im Zustand `Connecting`
    pub fn neu(
        ladepunkt: ChargePointId,
        peer: SocketAddr,
        ausgang: mpsc::Sender<String>,
        korrelation: &Korrelation,
    ) -> Arc<Self> {
        let id = SessionId::new();
        let tabelle = korrelation.tabelle_anlegen(id, ladepunkt.clone());
        let (schliessen_tx, _) = watch::channel(None);
        let jetzt = Utc::now();

        Arc::new(Self {
            id,
            ladepunkt,
            peer,
            erstellt: jetzt,
            letzte_aktivitaet: Mutex::new(jetzt),
            zustand: AtomicU8::new(SessionZustand::Connecting as u8),
            ausgang,
            tabelle,
            schliessen_tx,
            grund: Mutex::new(None),
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn ladepunkt(&self) -> &ChargePointId {
        &self.ladepunkt
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn erstellt(&self) -> DateTime<Utc> {
        self.erstellt
    }

    pub fn letzte_aktivitaet(&self) -> DateTime<Utc> {
        *self.letzte_aktivitaet.lock()
    }

    pub fn zustand(&self) -> SessionZustand {
        SessionZustand::aus_u8(self.zustand.load(Ordering::Acquire))
    }

    pub fn ist_aktiv(&self) -> bool {
        self.zustand() == SessionZustand::Active
    }

    /// Grund des Schliessens, sobald die Session `Closed` ist
    pub fn schliess_grund(&self) -> Option<SchliessGrund> {
        *self.grund.lock()
    }

    pub(crate) fn tabelle(&self) -> &Arc<AnfrageTabelle> {
        &self.tabelle
    }

    /// Vermerkt eingehenden Verkehr; nach `Closed` eingefroren
    pub fn aktivitaet_melden(&self) {
        if self.zustand() != SessionZustand::Closed {
            *self.letzte_aktivitaet.lock() = Utc::now();
        }
    }

    /// Fuehrt einen erlaubten Uebergang aus
    ///
    /// Unerlaubte Uebergaenge werden protokolliert und nicht angewendet.
    pub fn uebergang(&self, nach: SessionZustand) -> bool {
        let mut aktuell = self.zustand.load(Ordering::Acquire);
        loop {
            let von = SessionZustand::aus_u8(aktuell);
            if !von.erlaubt(nach) {
                tracing::warn!(
                    ladepunkt = %self.ladepunkt,
                    session_id = %self.id,
                    von = %von,
                    nach = %nach,
                    "Unerlaubter Zustandsuebergang ignoriert"
                );
                return false;
            }
            match self.zustand.compare_exchange(
                aktuell,
                nach as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(neu) => aktuell = neu,
            }
        }
    }

    /// Wechselt nur wenn die Session genau in `von` steht
    pub fn wechseln(&self, von: SessionZustand, nach: SessionZustand) -> bool {
        von.erlaubt(nach)
            && self
                .zustand
                .compare_exchange(von as u8, nach as u8, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
    }

    /// Reicht einen fertigen Text-Frame an den Schreib-Task weiter
    pub async fn roh_senden(&self, text: String) -> Result<(), AusgangGeschlossen> {
        self.ausgang.send(text).await.map_err(|_| AusgangGeschlossen)
    }

    /// Empfaenger fuer das Schliess-Signal (fuer den Verbindungs-Task)
    pub fn schliess_signal(&self) -> watch::Receiver<Option<SchliessGrund>> {
        self.schliessen_tx.subscribe()
    }

    /// Schliesst die Session
    ///
    /// Bricht alle offenen Anfragen mit `VerbindungVerloren` ab und weckt
    /// den Verbindungs-Task. Liefert `false` wenn die Session schon
    /// geschlossen war.
    pub fn beenden(&self, grund: SchliessGrund) -> bool {
        self.wechseln(SessionZustand::Active, SessionZustand::Draining);
        if !self.uebergang(SessionZustand::Closed) {
            return false;
        }

        *self.grund.lock() = Some(grund);
        self.tabelle.alle_abbrechen();
        self.schliessen_tx.send_replace(Some(grund));

        tracing::debug!(
            ladepunkt = %self.ladepunkt,
            session_id = %self.id,
            grund = %grund,
            "Session geschlossen"
        );
        true
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("ladepunkt", &self.ladepunkt)
            .field("peer", &self.peer)
            .field("zustand", &self.zustand())
            .finish()
    }
}
