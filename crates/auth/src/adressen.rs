//! Betriebsadressen fuer Bediener
//!
//! Reine Anzeigewerte: unter welcher Adresse die Verwaltung erreichbar ist
//! und welche Verbindungs-URL ein Ladepunkt eintragen muss. Sie werden aus
//! Host und TLS-Einstellung berechnet und nirgends gespeichert.

use serde::Serialize;

/// Grundlage fuer die Adressberechnung
#[derive(Debug, Clone)]
pub struct AdressBasis {
    /// Oeffentlicher Hostname (ohne Schema)
    pub host: String,
    /// Port der Weboberflaeche, `None` fuer den Standardport
    pub web_port: Option<u16>,
    /// Port fuer Ladepunkt-Verbindungen
    pub ocpp_port: u16,
    /// Pfad-Praefix vor der Identitaet
    pub pfad: String,
    pub tls: bool,
}

/// Berechnete Adressen eines Ladepunkts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Betriebsadressen {
    pub webseite: String,
    pub verbindung: String,
}

impl AdressBasis {
    /// Adresse der Weboberflaeche
    pub fn webseite(&self) -> String {
        let schema = if self.tls { "https" } else { "http" };
        match self.web_port {
            Some(port) => format!("{schema}://{}:{port}", self.host),
            None => format!("{schema}://{}", self.host),
        }
    }

    /// Verbindungs-URL fuer einen Ladepunkt
    pub fn verbindung(&self, username: &str) -> String {
        let schema = if self.tls { "wss" } else { "ws" };
        let pfad = self.pfad.trim_matches('/');
        if pfad.is_empty() {
            format!("{schema}://{}:{}/{username}", self.host, self.ocpp_port)
        } else {
            format!("{schema}://{}:{}/{pfad}/{username}", self.host, self.ocpp_port)
        }
    }

    pub fn fuer(&self, username: &str) -> Betriebsadressen {
        Betriebsadressen {
            webseite: self.webseite(),
            verbindung: self.verbindung(username),
        }
    }
}
