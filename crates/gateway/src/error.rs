//! Fehlertypen fuer den Gateway

use ladenetz_protocol::ErrorCode;
use serde_json::Value;
use thiserror::Error;

/// Fehlertyp fuer den Gateway
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Listener nicht verfuegbar (Bind, Accept)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// TLS-Konfiguration unbrauchbar
    #[error("TLS-Fehler: {0}")]
    Tls(String),

    /// Identitaet unbekannt, Schluessel falsch oder waehrend der Anmeldung rotiert
    #[error("Authentifizierung fehlgeschlagen")]
    Authentifizierung,
}

impl From<GatewayError> for ladenetz_core::LadenetzError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Authentifizierung => ladenetz_core::LadenetzError::Authentifizierung,
            GatewayError::Io(io) => ladenetz_core::LadenetzError::Verbindung(io.to_string()),
            GatewayError::Tls(text) => {
                ladenetz_core::LadenetzError::Konfiguration(format!("TLS: {text}"))
            }
        }
    }
}

/// Result-Alias fuer den Gateway
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Ausgang einer ausgehenden Anfrage, die nicht mit einem Result endete
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SendeFehler {
    /// Der Ladepunkt hat mit einem Fault geantwortet
    #[error("Fault vom Ladepunkt: {code} ({beschreibung})")]
    Fault {
        code: ErrorCode,
        beschreibung: String,
        details: Value,
    },

    /// Keine Antwort innerhalb der Frist; die Sitzung bleibt offen
    #[error("Zeitlimit ueberschritten")]
    Timeout,

    /// Sitzung wurde geschlossen bevor eine Antwort kam
    #[error("Verbindung verloren")]
    VerbindungVerloren,

    /// Sitzung nimmt keine neuen Anfragen an (nicht aktiv oder im Abbau)
    #[error("Sitzung nicht aktiv")]
    SessionNichtAktiv,

    /// Fuer diese Identitaet ist keine Sitzung registriert
    #[error("Ladepunkt nicht verbunden: {0}")]
    NichtVerbunden(String),

    /// Anfrage liess sich nicht serialisieren
    #[error("Anfrage nicht kodierbar: {0}")]
    Kodierung(String),

    /// Antwort passt nicht zum erwarteten Schema
    #[error("Ungueltige Antwort: {0}")]
    UngueltigeAntwort(String),
}

impl From<SendeFehler> for ladenetz_core::LadenetzError {
    fn from(e: SendeFehler) -> Self {
        match e {
            SendeFehler::Timeout => ladenetz_core::LadenetzError::Zeitlimit(e.to_string()),
            SendeFehler::VerbindungVerloren | SendeFehler::SessionNichtAktiv => {
                ladenetz_core::LadenetzError::VerbindungVerloren(e.to_string())
            }
            andere => ladenetz_core::LadenetzError::UngueltigeNachricht(andere.to_string()),
        }
    }
}
