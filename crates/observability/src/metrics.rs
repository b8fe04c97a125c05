//! Prometheus-kompatible Metriken fuer den Ladepunkt-Gateway
//!
//! Registrierte Metriken:
//! - `ladenetz_verbundene_ladepunkte` – Gauge: aktive Sitzungen
//! - `ladenetz_offene_anfragen` – Gauge: Anfragen die auf Antwort warten
//! - `ladenetz_anfragen_total` – Counter: abgeschlossene Anfragen (ergebnis)
//! - `ladenetz_anfrage_dauer_sekunden` – Histogram: Zeit bis zur Antwort
//! - `ladenetz_dekodierfehler_total` – Counter: nicht dekodierbare Frames
//! - `ladenetz_sitzungen_ersetzt_total` – Counter: verdraengte Sitzungen
//! - `ladenetz_authentifizierung_abgelehnt_total` – Counter: abgelehnte Anmeldungen
//! - `ladenetz_unbekannte_antworten_total` – Counter: Antworten ohne offene Anfrage

use anyhow::Result;
use axum::{response::IntoResponse, routing::get, Router};
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Ergebnis einer ausgehenden Anfrage (Label fuer `ladenetz_anfragen_total`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnfrageErgebnis {
    Result,
    Fault,
    Timeout,
    VerbindungVerloren,
}

impl AnfrageErgebnis {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Result => "result",
            Self::Fault => "fault",
            Self::Timeout => "timeout",
            Self::VerbindungVerloren => "verbindung_verloren",
        }
    }
}

/// Alle Gateway-Metriken
///
/// Clone teilt dieselbe Registry und dieselben Zaehler.
#[derive(Clone)]
pub struct GatewayMetriken {
    pub registry: Arc<Registry>,

    pub verbundene_ladepunkte: IntGauge,
    pub offene_anfragen: IntGauge,
    pub anfragen_total: IntCounterVec,
    pub anfrage_dauer_sekunden: Histogram,
    pub dekodierfehler_total: IntCounter,
    pub sitzungen_ersetzt_total: IntCounter,
    pub authentifizierung_abgelehnt_total: IntCounter,
    pub unbekannte_antworten_total: IntCounter,
}

impl GatewayMetriken {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        // --- Sitzungen ---
        let verbundene_ladepunkte = IntGauge::with_opts(Opts::new(
            "ladenetz_verbundene_ladepunkte",
            "Anzahl aktiver Ladepunkt-Sitzungen",
        ))?;
        registry.register(Box::new(verbundene_ladepunkte.clone()))?;

        let sitzungen_ersetzt_total = IntCounter::with_opts(Opts::new(
            "ladenetz_sitzungen_ersetzt_total",
            "Sitzungen die durch eine neue Verbindung derselben Identitaet ersetzt wurden",
        ))?;
        registry.register(Box::new(sitzungen_ersetzt_total.clone()))?;

        let authentifizierung_abgelehnt_total = IntCounter::with_opts(Opts::new(
            "ladenetz_authentifizierung_abgelehnt_total",
            "Abgelehnte Anmeldeversuche",
        ))?;
        registry.register(Box::new(authentifizierung_abgelehnt_total.clone()))?;

        // --- Anfragen ---
        let offene_anfragen = IntGauge::with_opts(Opts::new(
            "ladenetz_offene_anfragen",
            "Ausgehende Anfragen die auf eine Antwort warten",
        ))?;
        registry.register(Box::new(offene_anfragen.clone()))?;

        let anfragen_total = IntCounterVec::new(
            Opts::new(
                "ladenetz_anfragen_total",
                "Abgeschlossene ausgehende Anfragen nach Ergebnis",
            ),
            &["ergebnis"],
        )?;
        registry.register(Box::new(anfragen_total.clone()))?;

        let anfrage_dauer_sekunden = Histogram::with_opts(
            HistogramOpts::new(
                "ladenetz_anfrage_dauer_sekunden",
                "Zeit zwischen Anfrage und Antwort in Sekunden",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        )?;
        registry.register(Box::new(anfrage_dauer_sekunden.clone()))?;

        let unbekannte_antworten_total = IntCounter::with_opts(Opts::new(
            "ladenetz_unbekannte_antworten_total",
            "Antworten ohne passende offene Anfrage",
        ))?;
        registry.register(Box::new(unbekannte_antworten_total.clone()))?;

        // --- Protokoll ---
        let dekodierfehler_total = IntCounter::with_opts(Opts::new(
            "ladenetz_dekodierfehler_total",
            "Frames die nicht dekodiert werden konnten",
        ))?;
        registry.register(Box::new(dekodierfehler_total.clone()))?;

        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        Ok(Self {
            registry: Arc::new(registry),
            verbundene_ladepunkte,
            offene_anfragen,
            anfragen_total,
            anfrage_dauer_sekunden,
            dekodierfehler_total,
            sitzungen_ersetzt_total,
            authentifizierung_abgelehnt_total,
            unbekannte_antworten_total,
        })
    }

    /// Zaehlt eine abgeschlossene Anfrage
    pub fn anfrage_abgeschlossen(&self, ergebnis: AnfrageErgebnis) {
        self.anfragen_total
            .with_label_values(&[ergebnis.label()])
            .inc();
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: GatewayMetriken) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(
    axum::extract::State(metriken): axum::extract::State<GatewayMetriken>,
) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            axum::http::StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4",
            )],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
