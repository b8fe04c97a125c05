//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Gateway ohne Konfigurationsdatei
//! lauffaehig ist.

use std::net::SocketAddr;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use ladenetz_db::{DatabaseBackend, DatabaseConfig};
use ladenetz_gateway::GatewayConfig;

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Allgemeine Server-Einstellungen
    pub server: ServerEinstellungen,
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Datenbank-Einstellungen
    pub datenbank: DatenbankEinstellungen,
    /// Sitzungen, Fristen und Grenzen des Gateways
    pub gateway: GatewayEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Observability-Einstellungen (Metriken, Health)
    pub observability: ObservabilityEinstellungen,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Gateways
    pub name: String,
    /// Oeffentlicher Hostname, unter dem Ladepunkte den Gateway erreichen
    pub host: String,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "Ladenetz Gateway".into(),
            host: "localhost".into(),
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer alle Listener
    pub bind_adresse: String,
    /// Port fuer Ladepunkt-Verbindungen
    pub ocpp_port: u16,
    /// Erstes Pfadsegment vor der Kennung
    pub pfad_praefix: String,
    /// TLS-Zertifikat-Pfad (leer = `ws://` ohne TLS)
    pub tls_zertifikat: Option<String>,
    /// TLS-Schluessel-Pfad
    pub tls_schluessel: Option<String>,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            ocpp_port: 9000,
            pfad_praefix: "ocpp".into(),
            tls_zertifikat: None,
            tls_schluessel: None,
        }
    }
}

/// Datenbank-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatenbankEinstellungen {
    /// Datenbank-Typ: "sqlite" oder "memory"
    pub typ: String,
    /// Verbindungs-URL
    pub url: String,
    /// Maximale Verbindungspool-Groesse
    pub max_verbindungen: u32,
    pub sqlite_wal: bool,
}

impl Default for DatenbankEinstellungen {
    fn default() -> Self {
        Self {
            typ: "sqlite".into(),
            url: "sqlite://ladenetz.db".into(),
            max_verbindungen: 5,
            sqlite_wal: true,
        }
    }
}

/// Gateway-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayEinstellungen {
    pub anfrage_timeout_sek: u64,
    pub sweep_intervall_ms: u64,
    pub keepalive_sek: u64,
    /// Trennung nach so langer Stille
    pub verbindungs_timeout_sek: u64,
    pub max_dekodierfehler: u32,
    /// Groesste angenommene Nachricht in Bytes
    pub max_nachrichtengroesse: usize,
    pub drain_timeout_sek: u64,
    pub handshake_timeout_sek: u64,
    pub max_ladepunkte: usize,
    /// An Ladepunkte gemeldetes Heartbeat-Intervall
    pub heartbeat_intervall_sek: u32,
}

impl Default for GatewayEinstellungen {
    fn default() -> Self {
        let g = GatewayConfig::default();
        Self {
            anfrage_timeout_sek: g.anfrage_timeout_sek,
            sweep_intervall_ms: g.sweep_intervall_ms,
            keepalive_sek: g.keepalive_sek,
            verbindungs_timeout_sek: g.verbindungs_timeout_sek,
            max_dekodierfehler: g.max_dekodierfehler,
            max_nachrichtengroesse: g.max_nachrichtengroesse,
            drain_timeout_sek: g.drain_timeout_sek,
            handshake_timeout_sek: g.handshake_timeout_sek,
            max_ladepunkte: g.max_ladepunkte,
            heartbeat_intervall_sek: g.heartbeat_intervall_sek,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Observability-Einstellungen (Metriken + Health-Check)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Aktiviert den Observability-Server
    pub aktiviert: bool,
    /// Port fuer Metriken und Health (Standard: 9300)
    pub port: u16,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            port: 9300,
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Bind-Adresse fuer Ladepunkt-Verbindungen
    pub fn ocpp_bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        let text = format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.ocpp_port);
        text.parse()
            .with_context(|| format!("Ungueltige Bind-Adresse '{text}'"))
    }

    /// Bind-Adresse fuer den Observability-Server
    pub fn observability_bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        let text = format!("{}:{}", self.netzwerk.bind_adresse, self.observability.port);
        text.parse()
            .with_context(|| format!("Ungueltige Bind-Adresse '{text}'"))
    }

    /// TLS-Pfade; nur wenn Zertifikat und Schluessel beide gesetzt sind
    pub fn tls_pfade(&self) -> anyhow::Result<Option<(&str, &str)>> {
        match (
            self.netzwerk.tls_zertifikat.as_deref(),
            self.netzwerk.tls_schluessel.as_deref(),
        ) {
            (Some(z), Some(s)) => Ok(Some((z, s))),
            (None, None) => Ok(None),
            _ => anyhow::bail!("TLS braucht tls_zertifikat und tls_schluessel"),
        }
    }

    pub fn datenbank_config(&self) -> anyhow::Result<DatabaseConfig> {
        let backend = match self.datenbank.typ.as_str() {
            "sqlite" => DatabaseBackend::Sqlite,
            "memory" => DatabaseBackend::Memory,
            anderes => anyhow::bail!("Unbekannter Datenbank-Typ '{anderes}'"),
        };
        Ok(DatabaseConfig {
            backend,
            url: self.datenbank.url.clone(),
            max_verbindungen: self.datenbank.max_verbindungen,
            sqlite_wal: self.datenbank.sqlite_wal,
        })
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        let g = &self.gateway;
        GatewayConfig {
            pfad_praefix: self.netzwerk.pfad_praefix.clone(),
            anfrage_timeout_sek: g.anfrage_timeout_sek,
            sweep_intervall_ms: g.sweep_intervall_ms,
            keepalive_sek: g.keepalive_sek,
            verbindungs_timeout_sek: g.verbindungs_timeout_sek,
            max_dekodierfehler: g.max_dekodierfehler,
            max_nachrichtengroesse: g.max_nachrichtengroesse,
            drain_timeout_sek: g.drain_timeout_sek,
            handshake_timeout_sek: g.handshake_timeout_sek,
            max_ladepunkte: g.max_ladepunkte,
            heartbeat_intervall_sek: g.heartbeat_intervall_sek,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.netzwerk.ocpp_port, 9000);
        assert_eq!(cfg.datenbank.typ, "sqlite");
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.tls_pfade().unwrap().is_none());
    }

    #[test]
    fn bind_adressen() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.ocpp_bind_adresse().unwrap().to_string(), "0.0.0.0:9000");
        assert_eq!(
            cfg.observability_bind_adresse().unwrap().to_string(),
            "0.0.0.0:9300"
        );
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [server]
            name = "Depot Sued"

            [netzwerk]
            ocpp_port = 9100
            pfad_praefix = "steve/websocket"

            [gateway]
            anfrage_timeout_sek = 5
        "#;
        let cfg: ServerConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.server.name, "Depot Sued");
        assert_eq!(cfg.netzwerk.ocpp_port, 9100);

        let g = cfg.gateway_config();
        assert_eq!(g.anfrage_timeout_sek, 5);
        assert_eq!(g.pfad_praefix, "steve/websocket");
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(g.max_dekodierfehler, GatewayConfig::default().max_dekodierfehler);
    }

    #[test]
    fn unbekannter_datenbank_typ() {
        let mut cfg = ServerConfig::default();
        cfg.datenbank.typ = "postgres".into();
        assert!(cfg.datenbank_config().is_err());

        cfg.datenbank.typ = "memory".into();
        assert_eq!(cfg.datenbank_config().unwrap().backend, DatabaseBackend::Memory);
    }

    #[test]
    fn halbe_tls_konfiguration_ist_fehler() {
        let mut cfg = ServerConfig::default();
        cfg.netzwerk.tls_zertifikat = Some("cert.pem".into());
        assert!(cfg.tls_pfade().is_err());

        cfg.netzwerk.tls_schluessel = Some("key.pem".into());
        assert_eq!(cfg.tls_pfade().unwrap(), Some(("cert.pem", "key.pem")));
    }

    #[test]
    fn fehlende_datei_liefert_standard() {
        let cfg = ServerConfig::laden("/nicht/vorhanden/ladenetz.toml").unwrap();
        assert_eq!(cfg.netzwerk.ocpp_port, 9000);
    }
}
