//! ladenetz-gateway – WebSocket-Gateway fuer Ladepunkte
//!
//! Dieser Crate nimmt Verbindungen von Ladepunkten an, authentifiziert
//! sie, fuehrt pro Ladepunkt genau eine aktive Sitzung und ordnet Antworten
//! ihren Anfragen zu.
//!
//! ## Architektur
//!
//! ```text
//! TCP/TLS Listener (GatewayServer)
//!     |
//!     v
//! LadepunktVerbindung (pro Verbindung ein Task)
//!     |  Upgrade -> Authenticator -> Lebenszyklus
//!     |  Session: Connecting -> Authenticating -> Active -> Draining -> Closed
//!     |
//!     v
//! Dispatcher
//!     +-- Call          -> CallHandler (eigener Task)
//!     +-- Result/Fault  -> AnfrageTabelle der Session
//!
//! ConnectionRegistry – Kennung -> aktive Session
//! Korrelation        – offene Anfragen, Fristen-Sweeper
//! Verwaltung         – Stammdaten, trennt Sitzungen bei neuen Zugangsdaten
//! ```

pub mod connection;
pub mod correlation;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod lifecycle;
pub mod registry;
pub mod server;
pub mod session;
pub mod state;
pub mod tls;
pub mod verwaltung;

// Bequeme Re-Exporte
pub use connection::LadepunktVerbindung;
pub use correlation::{AnfrageAusgang, AnfrageTabelle, Korrelation};
pub use dispatcher::{Dispatcher, Eingang};
pub use error::{GatewayError, GatewayResult, SendeFehler};
pub use handler::{AufrufFehler, AufrufKontext, CallHandler, StandardHandler};
pub use lifecycle::Lebenszyklus;
pub use registry::ConnectionRegistry;
pub use server::GatewayServer;
pub use session::{SchliessGrund, Session, SessionZustand};
pub use state::{GatewayConfig, GatewayState};
pub use tls::{krypto_provider_installieren, tls_acceptor_aus_pem, tls_acceptor_laden};
pub use verwaltung::{LadepunktUebersicht, Verwaltung};
