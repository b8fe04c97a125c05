//! ladenetz-auth – Authentifizierung und Zugangsdaten
//!
//! Dieses Crate implementiert:
//! - Authenticator (Identitaet + Schluessel gegen das Repository, konstante Zeit)
//! - Schluesselerzeugung aus dem OS-Zufallsgenerator, Basic-Auth-Parser
//! - LadepunktService (Anlegen, Aendern, Loeschen, Schluesselrotation)
//! - Betriebsadressen fuer Bediener

pub mod adressen;
pub mod authenticator;
pub mod credentials;
pub mod error;
pub mod service;

// Bequeme Re-Exporte
pub use adressen::{AdressBasis, Betriebsadressen};
pub use authenticator::{AuthErgebnis, Authenticator};
pub use credentials::{basic_auth_lesen, benutzername_ableiten, schluessel_generieren};
pub use error::{AuthError, AuthResult};
pub use service::{LadepunktAenderung, LadepunktService, NeuerLadepunktEingabe};
