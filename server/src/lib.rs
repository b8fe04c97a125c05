//! ladenetz-server – Bibliotheks-Root
//!
//! Verdrahtet Konfiguration, Repository, Gateway und Observability zu
//! einem lauffaehigen Prozess.

pub mod config;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use config::ServerConfig;
use ladenetz_db::{ChargePointRepository, DatabaseBackend, MemoryRepository, SqliteDb};
use ladenetz_gateway::{tls_acceptor_laden, GatewayServer, GatewayState, StandardHandler};
use ladenetz_observability::{observability_server_starten, GatewayMetriken, HealthState};

/// Abstand der Datenbank-Pruefungen fuer `/health`
const DB_PRUEF_INTERVALL: Duration = Duration::from_secs(10);

/// Geoeffnetes Repository; SQLite behaelt den Pool zum Schliessen
enum Repository {
    Sqlite(Arc<SqliteDb>),
    Memory(Arc<MemoryRepository>),
}

impl Repository {
    async fn oeffnen(config: &ServerConfig) -> Result<Self> {
        let db_config = config.datenbank_config()?;
        tracing::info!(
            backend = %db_config.backend,
            url = %db_config.url,
            "Datenbankverbindung wird hergestellt"
        );
        match db_config.backend {
            DatabaseBackend::Sqlite => {
                let db = SqliteDb::oeffnen(&db_config)
                    .await
                    .context("SQLite konnte nicht geoeffnet werden")?;
                Ok(Self::Sqlite(Arc::new(db)))
            }
            DatabaseBackend::Memory => {
                tracing::warn!("In-Memory-Repository: Ladepunkte gehen beim Beenden verloren");
                Ok(Self::Memory(Arc::new(MemoryRepository::new())))
            }
        }
    }

    fn als_dyn(&self) -> Arc<dyn ChargePointRepository> {
        match self {
            Self::Sqlite(db) => db.clone() as Arc<dyn ChargePointRepository>,
            Self::Memory(m) => m.clone() as Arc<dyn ChargePointRepository>,
        }
    }

    async fn schliessen(&self) {
        if let Self::Sqlite(db) = self {
            db.schliessen().await;
        }
    }
}

/// Prueft das Repository periodisch und spiegelt das Ergebnis in `health`
fn db_ueberwachung_starten(
    repo: Arc<dyn ChargePointRepository>,
    health: HealthState,
    intervall: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut takt = tokio::time::interval(intervall);
        takt.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = takt.tick() => {
                    let vorher = health.db_verbunden();
                    match repo.ping().await {
                        Ok(()) => {
                            if !vorher {
                                tracing::info!("Datenbank wieder erreichbar");
                            }
                            health.db_status_setzen(true);
                        }
                        Err(e) => {
                            if vorher {
                                tracing::warn!(fehler = %e, "Datenbank nicht erreichbar");
                            }
                            health.db_status_setzen(false);
                        }
                    }
                }
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("Datenbank-Ueberwachung gestoppt");
    })
}

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet alle Subsysteme und laeuft bis Ctrl-C
    pub async fn starten(self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("Shutdown-Signal empfangen, Gateway wird beendet"),
                Err(e) => tracing::error!(fehler = %e, "Signal-Handler fehlgeschlagen, beende"),
            }
            let _ = shutdown_tx.send(true);
        });

        self.laufen(shutdown_rx).await
    }

    /// Startreihenfolge: TLS, Repository, Gateway-Zustand, Sweeper,
    /// Observability mit Datenbank-Ueberwachung, Listener. Das Repository
    /// schliesst zuletzt.
    pub async fn laufen(self, shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        let config = self.config;
        let ocpp_addr = config.ocpp_bind_adresse()?;

        tracing::info!(
            server_name = %config.server.name,
            ocpp = %ocpp_addr,
            "Gateway startet"
        );

        let tls = match config.tls_pfade()? {
            Some((zertifikat, schluessel)) => Some(
                tls_acceptor_laden(Path::new(zertifikat), Path::new(schluessel))
                    .context("TLS konnte nicht eingerichtet werden")?,
            ),
            None => None,
        };

        let repository = Repository::oeffnen(&config).await?;

        let metriken = GatewayMetriken::neu().context("Metriken konnten nicht registriert werden")?;
        let gateway_config = config.gateway_config();
        let sweep_intervall = Duration::from_millis(gateway_config.sweep_intervall_ms);
        let state = GatewayState::neu(
            gateway_config,
            repository.als_dyn(),
            Arc::new(StandardHandler::neu(config.gateway.heartbeat_intervall_sek)),
            metriken.clone(),
        );

        let sweeper = state
            .korrelation()
            .sweeper_starten(sweep_intervall, shutdown_rx.clone());

        let mut hintergrund = vec![sweeper];
        if config.observability.aktiviert {
            let addr = config.observability_bind_adresse()?;
            let health = HealthState::neu(metriken.verbundene_ladepunkte.clone());
            hintergrund.push(db_ueberwachung_starten(
                repository.als_dyn(),
                health.clone(),
                DB_PRUEF_INTERVALL,
                shutdown_rx.clone(),
            ));
            let rx = shutdown_rx.clone();
            hintergrund.push(tokio::spawn(async move {
                if let Err(e) = observability_server_starten(addr, metriken, health, rx).await {
                    tracing::error!(fehler = %e, "Observability-Server beendet");
                }
            }));
        }

        let server = GatewayServer::binden(Arc::clone(&state), ocpp_addr, tls)
            .await
            .with_context(|| format!("Listener auf {ocpp_addr} nicht verfuegbar"))?;
        let ergebnis = server.starten(shutdown_rx).await;

        for handle in hintergrund {
            let _ = handle.await;
        }
        repository.schliessen().await;
        tracing::info!("Gateway beendet");

        ergebnis.context("Gateway-Listener fehlgeschlagen")
    }
}
