//! Systemweite Ereignisse
//!
//! Die Connection-Registry veroeffentlicht diese Ereignisse ueber einen
//! tokio-Broadcast-Kanal. Abonnenten (Logging, Verwaltung, Tests) bekommen
//! mit, wer online geht, wer ersetzt wird und wer die Verbindung verliert.

use crate::types::{ChargePointId, SessionId};
use serde::{Deserialize, Serialize};

/// Alle Ereignisse, die der Gateway ueber verbundene Ladepunkte meldet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LadenetzEvent {
    /// Ein Ladepunkt ist authentifiziert und aktiv
    LadepunktVerbunden {
        ladepunkt: ChargePointId,
        session_id: SessionId,
    },
    /// Eine aeltere Session wurde durch eine neue Verbindung ersetzt
    SitzungErsetzt {
        ladepunkt: ChargePointId,
        alte_session: SessionId,
        neue_session: SessionId,
    },
    /// Eine Session wurde geschlossen
    LadepunktGetrennt {
        ladepunkt: ChargePointId,
        session_id: SessionId,
        grund: String,
    },
}

impl LadenetzEvent {
    /// Gibt die betroffene Ladepunkt-Kennung zurueck
    pub fn ladepunkt(&self) -> &ChargePointId {
        match self {
            Self::LadepunktVerbunden { ladepunkt, .. }
            | Self::SitzungErsetzt { ladepunkt, .. }
            | Self::LadepunktGetrennt { ladepunkt, .. } => ladepunkt,
        }
    }
}
