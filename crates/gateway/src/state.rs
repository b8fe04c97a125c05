//! Gemeinsamer Gateway-Zustand
//!
//! Haelt alle geteilten Dienste als Arc-Referenzen, die sicher zwischen
//! tokio-Tasks geteilt werden koennen.

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;

use ladenetz_auth::Authenticator;
use ladenetz_core::ChargePointId;
use ladenetz_db::ChargePointRepository;
use ladenetz_observability::GatewayMetriken;
use ladenetz_protocol::{Action, Anfrage, WireCodec, DEFAULT_MAX_NACHRICHTENGROESSE};

use crate::correlation::{AnfrageAusgang, Korrelation};
use crate::dispatcher::Dispatcher;
use crate::error::SendeFehler;
use crate::handler::CallHandler;
use crate::lifecycle::Lebenszyklus;
use crate::registry::ConnectionRegistry;

/// Laufzeit-Parameter des Gateways
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Erstes Pfadsegment vor der Kennung (`/ocpp/<kennung>`)
    pub pfad_praefix: String,
    /// Standard-Frist fuer ausgehende Anfragen
    pub anfrage_timeout_sek: u64,
    /// Takt des Fristen-Sweepers
    pub sweep_intervall_ms: u64,
    /// Abstand der Keepalive-Pings
    pub keepalive_sek: u64,
    /// Trennung nach so langer Stille
    pub verbindungs_timeout_sek: u64,
    /// Dekodierfehler pro Session bis zur Trennung
    pub max_dekodierfehler: u32,
    pub max_nachrichtengroesse: usize,
    /// Frist fuer Drain beim geordneten Schliessen und beim Shutdown
    pub drain_timeout_sek: u64,
    /// Frist fuer TLS- und WebSocket-Handshake
    pub handshake_timeout_sek: u64,
    /// Gleichzeitige Verbindungen
    pub max_ladepunkte: usize,
    /// Heartbeat-Intervall das Ladepunkte bei BootNotification erhalten
    pub heartbeat_intervall_sek: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            pfad_praefix: "ocpp".into(),
            anfrage_timeout_sek: 30,
            sweep_intervall_ms: 100,
            keepalive_sek: 30,
            verbindungs_timeout_sek: 90,
            max_dekodierfehler: 5,
            max_nachrichtengroesse: DEFAULT_MAX_NACHRICHTENGROESSE,
            drain_timeout_sek: 10,
            handshake_timeout_sek: 10,
            max_ladepunkte: 1000,
            heartbeat_intervall_sek: 300,
        }
    }
}

impl GatewayConfig {
    pub fn anfrage_timeout(&self) -> Duration {
        Duration::from_secs(self.anfrage_timeout_sek)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_sek)
    }
}

/// Geteilter Zustand aller Verbindungs-Tasks
pub struct GatewayState {
    pub config: GatewayConfig,
    pub authenticator: Authenticator,
    pub lebenszyklus: Lebenszyklus,
    pub dispatcher: Dispatcher,
    pub metriken: GatewayMetriken,
    pub codec: WireCodec,
    /// Offene Transportverbindungen (auch noch nicht authentifizierte)
    pub offene_verbindungen: AtomicUsize,
    pub start_time: Instant,
}

impl GatewayState {
    pub fn neu(
        config: GatewayConfig,
        repo: Arc<dyn ChargePointRepository>,
        handler: Arc<dyn CallHandler>,
        metriken: GatewayMetriken,
    ) -> Arc<Self> {
        let korrelation = Arc::new(Korrelation::neu(metriken.clone()));
        let registry = ConnectionRegistry::neu(metriken.clone());
        let codec = WireCodec::new(config.max_nachrichtengroesse);
        let dispatcher = Dispatcher::neu(
            handler,
            Arc::clone(&korrelation),
            codec,
            config.anfrage_timeout(),
            metriken.clone(),
        );

        Arc::new(Self {
            authenticator: Authenticator::neu(repo),
            lebenszyklus: Lebenszyklus::neu(registry, korrelation, metriken.clone()),
            dispatcher,
            metriken,
            codec,
            offene_verbindungen: AtomicUsize::new(0),
            start_time: Instant::now(),
            config,
        })
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        self.lebenszyklus.registry()
    }

    pub fn korrelation(&self) -> &Arc<Korrelation> {
        self.lebenszyklus.korrelation()
    }

    /// Gibt die Uptime in Sekunden zurueck
    pub fn uptime_sek(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Sendet eine Anfrage an einen verbundenen Ladepunkt
    ///
    /// Ohne `timeout` gilt `anfrage_timeout_sek`.
    pub async fn anfrage_an(
        &self,
        ladepunkt: &ChargePointId,
        action: Action,
        payload: Value,
        timeout: Option<Duration>,
    ) -> AnfrageAusgang {
        let session = self
            .registry()
            .nachschlagen(ladepunkt)
            .ok_or_else(|| SendeFehler::NichtVerbunden(ladepunkt.to_string()))?;
        self.korrelation()
            .senden(
                &session,
                action,
                payload,
                timeout.unwrap_or_else(|| self.config.anfrage_timeout()),
            )
            .await
    }

    /// Typisierte Variante von `anfrage_an`
    pub async fn anfrage_senden<A: Anfrage>(
        &self,
        ladepunkt: &ChargePointId,
        anfrage: &A,
        timeout: Option<Duration>,
    ) -> Result<A::Antwort, SendeFehler> {
        let session = self
            .registry()
            .nachschlagen(ladepunkt)
            .ok_or_else(|| SendeFehler::NichtVerbunden(ladepunkt.to_string()))?;
        self.korrelation()
            .anfrage(
                &session,
                anfrage,
                timeout.unwrap_or_else(|| self.config.anfrage_timeout()),
            )
            .await
    }
}
