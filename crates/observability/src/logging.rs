//! Structured Logging Setup via tracing-subscriber
//!
//! Der Gateway loggt auf dem konfigurierten Level, Abhaengigkeiten wie
//! sqlx, tungstenite oder hyper hoechstens auf `warn`. Ueberschreibbar per
//! Umgebungsvariable:
//! - `LN_LOG_LEVEL`: ein Level (`debug`) oder vollstaendige Direktiven
//!   (`ladenetz_gateway=trace,sqlx=info`)
//! - `LN_LOG_FORMAT`: Format (text/json)
//!
//! Sitzungs- und Ladepunkt-IDs werden als strukturierte Felder geloggt
//! (`ladepunkt`, `session_id`, `peer`).

use tracing_subscriber::{fmt, EnvFilter};

/// Crates des Gateways
const LADENETZ_TARGETS: [&str; 6] = [
    "ladenetz_server",
    "ladenetz_gateway",
    "ladenetz_auth",
    "ladenetz_db",
    "ladenetz_protocol",
    "ladenetz_observability",
];

/// Initialisiert das Logging-System.
///
/// Mehrfacher Aufruf ist unschaedlich; nur der erste setzt den Subscriber.
pub fn logging_initialisieren(level: &str, format: &str) {
    let filter = filter_bauen(std::env::var("LN_LOG_LEVEL").ok().as_deref(), level);

    let format = std::env::var("LN_LOG_FORMAT").unwrap_or_else(|_| format.to_string());
    let format = if log_format_gueltig(&format) {
        format
    } else {
        "text".to_string()
    };

    match format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .with_current_span(true)
                .try_init()
                .ok();
        }
        _ => {
            fmt()
                .with_env_filter(filter)
                .with_target(true)
                .try_init()
                .ok();
        }
    }
}

/// Filter-Direktiven fuer `level`
///
/// Ungueltige Level gelten als `info`. Fremde Crates bleiben bei `warn`,
/// ausser `level` ist `error`.
pub fn filter_direktiven(level: &str) -> String {
    let level = if log_level_gueltig(level) { level } else { "info" };
    let fremd = if level == "error" { "error" } else { "warn" };

    let mut direktiven = vec![fremd.to_string()];
    direktiven.extend(LADENETZ_TARGETS.iter().map(|t| format!("{t}={level}")));
    direktiven.join(",")
}

/// Baut den Filter; `env` hat Vorrang vor dem konfigurierten Level
fn filter_bauen(env: Option<&str>, level: &str) -> EnvFilter {
    let direktiven = match env {
        Some(roh) if roh.contains('=') => roh.to_string(),
        Some(env_level) => filter_direktiven(env_level),
        None => filter_direktiven(level),
    };
    EnvFilter::try_new(&direktiven).unwrap_or_else(|_| EnvFilter::new(filter_direktiven("info")))
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}
