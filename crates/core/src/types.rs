//! Gemeinsame Identifikationstypen fuer Ladenetz
//!
//! Newtype-Pattern um Ladepunkt-Kennungen und Session-IDs zur Compilezeit
//! auseinanderzuhalten.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stabile Kennung eines Ladepunkts (abgeleiteter Benutzername)
///
/// Wird vom Ladepunkt im Upgrade-Pfad (`/ocpp/<kennung>`) behauptet und
/// ist der Schluessel in der Connection-Registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChargePointId(String);

impl ChargePointId {
    /// Erstellt eine Kennung aus einem beliebigen String
    pub fn new(kennung: impl Into<String>) -> Self {
        Self(kennung.into())
    }

    /// Gibt die Kennung als String-Slice zurueck
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChargePointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChargePointId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ChargePointId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Eindeutige ID einer einzelnen Transport-Session
///
/// Jede neue Verbindung bekommt eine neue SessionId, auch wenn sich
/// derselbe Ladepunkt erneut verbindet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Erstellt eine neue zufaellige SessionId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_eindeutig() {
        let a = SessionId::new();
        let b = SessionId::new();
        assert_ne!(a, b, "Zwei neue SessionIds muessen verschieden sein");
    }

    #[test]
    fn session_id_display() {
        let id = SessionId(Uuid::nil());
        assert!(id.to_string().starts_with("session:"));
    }

    #[test]
    fn charge_point_id_ist_transparent_serialisiert() {
        let id = ChargePointId::new("cp-nord-01");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"cp-nord-01\"");
        let zurueck: ChargePointId = serde_json::from_str(&json).unwrap();
        assert_eq!(zurueck, id);
    }

    #[test]
    fn charge_point_id_display() {
        assert_eq!(ChargePointId::from("cp1").to_string(), "cp1");
    }
}
