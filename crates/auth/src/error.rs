//! Fehlertypen fuer Authentifizierung und Ladepunkt-Verwaltung

use thiserror::Error;

/// Alle moeglichen Fehler im Auth-Crate
#[derive(Debug, Error)]
pub enum AuthError {
    // --- Authentifizierung ---
    #[error("Ladepunkt oder Schluessel ungueltig")]
    UngueltigeAnmeldedaten,

    // --- Verwaltung ---
    #[error("Aus dem Namen '{0}' laesst sich kein Benutzername ableiten")]
    BenutzernameUngueltig(String),

    #[error("Benutzername bereits vergeben: {0}")]
    BenutzernameVergeben(String),

    #[error("Ladepunkt nicht gefunden: {0}")]
    LadepunktNichtGefunden(i64),

    // --- Datenbank ---
    #[error("Datenbankfehler: {0}")]
    Datenbank(#[from] ladenetz_db::DbError),

    // --- Intern ---
    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl AuthError {
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }
}

impl From<AuthError> for ladenetz_core::LadenetzError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::UngueltigeAnmeldedaten => ladenetz_core::LadenetzError::Authentifizierung,
            AuthError::Datenbank(db) => db.into(),
            other => ladenetz_core::LadenetzError::Intern(other.to_string()),
        }
    }
}

/// Result-Alias fuer das Auth-Crate
pub type AuthResult<T> = Result<T, AuthError>;
