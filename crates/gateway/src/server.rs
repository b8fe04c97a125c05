//! Gateway-Server – bindet den Socket und nimmt Verbindungen an
//!
//! Fuer jede angenommene TCP-Verbindung startet ein eigener tokio-Task
//! mit einer `LadepunktVerbindung` (optional hinter TLS). Die Tasks
//! laufen parallel auf dem Multi-Thread-Runtime; es gibt keine Sperre
//! ueber alle Verbindungen.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;

use crate::connection::LadepunktVerbindung;
use crate::error::GatewayResult;
use crate::state::GatewayState;

/// Zaehlt eine offene Verbindung bis zum Drop
struct VerbindungsPlatz {
    state: Arc<GatewayState>,
}

impl VerbindungsPlatz {
    /// Reserviert einen Platz; `None` wenn `max_ladepunkte` erreicht ist
    fn reservieren(state: &Arc<GatewayState>) -> Option<Self> {
        let maximum = state.config.max_ladepunkte;
        state
            .offene_verbindungen
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < maximum).then_some(n + 1)
            })
            .ok()
            .map(|_| Self {
                state: Arc::clone(state),
            })
    }
}

impl Drop for VerbindungsPlatz {
    fn drop(&mut self) {
        self.state.offene_verbindungen.fetch_sub(1, Ordering::AcqRel);
    }
}

/// WebSocket-Server fuer Ladepunkte
pub struct GatewayServer {
    state: Arc<GatewayState>,
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
}

impl GatewayServer {
    /// Bindet den Listener
    ///
    /// Mit Port 0 waehlt das System einen freien Port, siehe `lokale_adresse`.
    pub async fn binden(
        state: Arc<GatewayState>,
        bind_addr: SocketAddr,
        tls: Option<TlsAcceptor>,
    ) -> GatewayResult<Self> {
        let listener = TcpListener::bind(bind_addr).await?;
        Ok(Self {
            state,
            listener,
            tls,
        })
    }

    pub fn lokale_adresse(&self) -> GatewayResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept-Loop
    ///
    /// Laeuft bis `shutdown_rx` ein `true`-Signal empfaengt. Danach wird
    /// auf die Verbindungs-Tasks gewartet, hoechstens `drain_timeout_sek`.
    pub async fn starten(self, mut shutdown_rx: watch::Receiver<bool>) -> GatewayResult<()> {
        let lokale_addr = self.listener.local_addr()?;
        let handshake_frist = Duration::from_secs(self.state.config.handshake_timeout_sek);
        let mut verbindungen = JoinSet::new();

        tracing::info!(
            adresse = %lokale_addr,
            tls = self.tls.is_some(),
            "Ladepunkt-Gateway gestartet"
        );

        loop {
            tokio::select! {
                // Neue eingehende Verbindung
                ergebnis = self.listener.accept() => {
                    match ergebnis {
                        Ok((stream, peer)) => {
                            let Some(platz) = VerbindungsPlatz::reservieren(&self.state) else {
                                tracing::warn!(
                                    peer = %peer,
                                    max = self.state.config.max_ladepunkte,
                                    "Gateway voll, Verbindung abgelehnt"
                                );
                                drop(stream);
                                continue;
                            };

                            tracing::debug!(peer = %peer, "Verbindung akzeptiert");
                            let _ = stream.set_nodelay(true);

                            let verbindung = LadepunktVerbindung::neu(Arc::clone(&self.state), peer);
                            let shutdown_rx_clone = shutdown_rx.clone();
                            let tls = self.tls.clone();

                            verbindungen.spawn(async move {
                                let _platz = platz;
                                match tls {
                                    Some(acceptor) => {
                                        match tokio::time::timeout(handshake_frist, acceptor.accept(stream)).await {
                                            Ok(Ok(tls_stream)) => {
                                                verbindung.verarbeiten(tls_stream, shutdown_rx_clone).await;
                                            }
                                            Ok(Err(e)) => {
                                                tracing::warn!(peer = %peer, fehler = %e, "TLS-Handshake fehlgeschlagen");
                                            }
                                            Err(_) => {
                                                tracing::warn!(peer = %peer, "TLS-Handshake Zeitlimit");
                                            }
                                        }
                                    }
                                    None => verbindung.verarbeiten(stream, shutdown_rx_clone).await,
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!(fehler = %e, "TCP-Accept-Fehler");
                            tokio::time::sleep(Duration::from_millis(10)).await;
                        }
                    }
                }

                // Beendete Verbindungs-Tasks einsammeln
                Some(beendet) = verbindungen.join_next() => {
                    if let Err(e) = beendet {
                        if e.is_panic() {
                            tracing::error!(fehler = %e, "Verbindungs-Task abgestuerzt");
                        }
                    }
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Gateway: Shutdown-Signal empfangen");
                        break;
                    }
                }
            }
        }

        drop(self.listener);
        let offen = verbindungen.len();
        if offen > 0 {
            tracing::info!(offen, "Warte auf Verbindungs-Tasks");
            let frist = self.state.config.drain_timeout();
            let alle_beendet = tokio::time::timeout(frist, async {
                while verbindungen.join_next().await.is_some() {}
            })
            .await;
            if alle_beendet.is_err() {
                tracing::warn!(
                    offen = verbindungen.len(),
                    "Verbindungs-Tasks nach Frist abgebrochen"
                );
                verbindungen.abort_all();
            }
        }

        tracing::info!("Ladepunkt-Gateway gestoppt");
        Ok(())
    }
}
