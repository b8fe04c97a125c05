//! Verwaltung – Ladepunkt-Stammdaten mit Blick auf laufende Sitzungen
//!
//! Legt Ladepunkte ueber den `LadepunktService` an und aendert sie. Wird
//! der Schluessel rotiert, der Ladepunkt umbenannt oder geloescht, endet
//! eine bestehende Sitzung mit `ZugangsdatenGeaendert`; sie hat sich mit
//! den alten Zugangsdaten angemeldet.

use std::sync::Arc;

use serde::Serialize;

use ladenetz_auth::{
    AdressBasis, AuthResult, Betriebsadressen, LadepunktAenderung, LadepunktService,
    NeuerLadepunktEingabe,
};
use ladenetz_core::ChargePointId;
use ladenetz_db::LadepunktRecord;

use crate::session::SchliessGrund;
use crate::state::GatewayState;

/// Ladepunkt mit Adressen und Online-Status
#[derive(Debug, Clone, Serialize)]
pub struct LadepunktUebersicht {
    #[serde(flatten)]
    pub record: LadepunktRecord,
    pub adressen: Betriebsadressen,
    pub verbunden: bool,
}

/// Verwaltungsschnittstelle fuer Ladepunkte
#[derive(Clone)]
pub struct Verwaltung {
    service: LadepunktService,
    state: Arc<GatewayState>,
    adressen: AdressBasis,
}

impl Verwaltung {
    pub fn neu(service: LadepunktService, state: Arc<GatewayState>, adressen: AdressBasis) -> Self {
        Self {
            service,
            state,
            adressen,
        }
    }

    fn uebersicht(&self, record: LadepunktRecord) -> LadepunktUebersicht {
        let verbunden = self
            .state
            .registry()
            .nachschlagen(&ChargePointId::new(record.username.as_str()))
            .is_some();
        LadepunktUebersicht {
            adressen: self.adressen.fuer(&record.username),
            record,
            verbunden,
        }
    }

    pub async fn anlegen(&self, eingabe: NeuerLadepunktEingabe) -> AuthResult<LadepunktUebersicht> {
        let record = self.service.anlegen(eingabe).await?;
        Ok(self.uebersicht(record))
    }

    pub async fn liste(&self) -> AuthResult<Vec<LadepunktUebersicht>> {
        let records = self.service.liste().await?;
        Ok(records.into_iter().map(|r| self.uebersicht(r)).collect())
    }

    pub async fn laden(&self, id: i64) -> AuthResult<LadepunktUebersicht> {
        let record = self.service.laden(id).await?;
        Ok(self.uebersicht(record))
    }

    /// Aendert Stammdaten; bei neuem Benutzernamen endet die alte Sitzung
    pub async fn aktualisieren(
        &self,
        id: i64,
        aenderung: LadepunktAenderung,
    ) -> AuthResult<LadepunktUebersicht> {
        let vorher = self.service.laden(id).await?;
        let record = self.service.aktualisieren(id, aenderung).await?;
        if record.username != vorher.username {
            self.sitzung_beenden(&vorher.username, SchliessGrund::ZugangsdatenGeaendert);
        }
        Ok(self.uebersicht(record))
    }

    /// Loescht einen Ladepunkt und trennt seine Sitzung
    pub async fn loeschen(&self, id: i64) -> AuthResult<bool> {
        let vorher = match self.service.laden(id).await {
            Ok(r) => r,
            Err(ladenetz_auth::AuthError::LadepunktNichtGefunden(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        let geloescht = self.service.loeschen(id).await?;
        if geloescht {
            self.sitzung_beenden(&vorher.username, SchliessGrund::ZugangsdatenGeaendert);
        }
        Ok(geloescht)
    }

    /// Neuer Schluessel; die laufende Sitzung wird getrennt
    pub async fn schluessel_rotieren(&self, id: i64) -> AuthResult<LadepunktUebersicht> {
        let record = self.service.schluessel_rotieren(id).await?;
        self.sitzung_beenden(&record.username, SchliessGrund::ZugangsdatenGeaendert);
        Ok(self.uebersicht(record))
    }

    /// Trennt einen Ladepunkt geordnet; offene Anfragen duerfen ausklingen
    ///
    /// `false` wenn keine Sitzung bestand.
    pub async fn trennen(&self, username: &str) -> bool {
        let Some(session) = self
            .state
            .registry()
            .nachschlagen(&ChargePointId::new(username))
        else {
            return false;
        };
        self.state
            .lebenszyklus
            .beenden_mit_drain(
                &session,
                SchliessGrund::ServerInitiiert,
                self.state.config.drain_timeout(),
            )
            .await
    }

    fn sitzung_beenden(&self, username: &str, grund: SchliessGrund) {
        if let Some(session) = self
            .state
            .registry()
            .nachschlagen(&ChargePointId::new(username))
        {
            tracing::info!(ladepunkt = %username, grund = %grund, "Sitzung wegen geaenderter Zugangsdaten getrennt");
            self.state.lebenszyklus.schliessen(&session, grund);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::StandardHandler;
    use crate::session::{Session, SessionZustand};
    use crate::state::GatewayConfig;
    use ladenetz_db::MemoryRepository;
    use ladenetz_observability::GatewayMetriken;
    use tokio::sync::mpsc;

    fn verwaltung() -> Verwaltung {
        let repo = Arc::new(MemoryRepository::new());
        let state = GatewayState::neu(
            GatewayConfig::default(),
            repo.clone(),
            Arc::new(StandardHandler::default()),
            GatewayMetriken::neu().unwrap(),
        );
        Verwaltung::neu(
            LadepunktService::neu(repo),
            state,
            AdressBasis {
                host: "localhost".into(),
                web_port: Some(8080),
                ocpp_port: 9000,
                pfad: "ocpp".into(),
                tls: false,
            },
        )
    }

    fn online(v: &Verwaltung, username: &str) -> (Arc<Session>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(4);
        let lz = &v.state.lebenszyklus;
        let s = lz.session_erstellen(ChargePointId::new(username), "127.0.0.1:3".parse().unwrap(), tx);
        lz.authentifizierung_beginnen(&s);
        lz.aktivieren(&s);
        (s, rx)
    }

    fn eingabe(name: &str) -> NeuerLadepunktEingabe {
        NeuerLadepunktEingabe {
            name: name.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn anlegen_liefert_adressen() {
        let v = verwaltung();
        let lp = v.anlegen(eingabe("Hof Nord")).await.unwrap();
        assert_eq!(lp.record.username, "hof-nord");
        assert_eq!(lp.adressen.verbindung, "ws://localhost:9000/ocpp/hof-nord");
        assert_eq!(lp.adressen.webseite, "http://localhost:8080");
        assert!(!lp.verbunden);
    }

    #[tokio::test]
    async fn rotation_trennt_sitzung() {
        let v = verwaltung();
        let lp = v.anlegen(eingabe("Rotor")).await.unwrap();
        let (s, _rx) = online(&v, "rotor");
        assert!(v.laden(lp.record.id).await.unwrap().verbunden);

        let neu = v.schluessel_rotieren(lp.record.id).await.unwrap();
        assert!(!neu.verbunden);
        assert_eq!(s.zustand(), SessionZustand::Closed);
        assert_eq!(s.schliess_grund(), Some(SchliessGrund::ZugangsdatenGeaendert));
    }

    #[tokio::test]
    async fn umbenennen_trennt_alte_kennung() {
        let v = verwaltung();
        let lp = v.anlegen(eingabe("Alt")).await.unwrap();
        let (s, _rx) = online(&v, "alt");

        v.aktualisieren(
            lp.record.id,
            LadepunktAenderung {
                name: Some("Neu".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(s.schliess_grund(), Some(SchliessGrund::ZugangsdatenGeaendert));
    }

    #[tokio::test]
    async fn adresse_aendern_laesst_sitzung_bestehen() {
        let v = verwaltung();
        let lp = v.anlegen(eingabe("Bleibt")).await.unwrap();
        let (s, _rx) = online(&v, "bleibt");

        v.aktualisieren(
            lp.record.id,
            LadepunktAenderung {
                address: Some("Neue Strasse 1".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(s.ist_aktiv());
    }

    #[tokio::test]
    async fn loeschen_trennt_sitzung() {
        let v = verwaltung();
        let lp = v.anlegen(eingabe("Weg")).await.unwrap();
        let (s, _rx) = online(&v, "weg");

        assert!(v.loeschen(lp.record.id).await.unwrap());
        assert_eq!(s.zustand(), SessionZustand::Closed);
        assert!(!v.loeschen(lp.record.id).await.unwrap());
    }

    #[tokio::test]
    async fn trennen_ohne_sitzung() {
        let v = verwaltung();
        assert!(!v.trennen("niemand").await);
    }

    #[tokio::test]
    async fn trennen_schliesst_geordnet() {
        let v = verwaltung();
        let (s, _rx) = online(&v, "cp-t");
        assert!(v.trennen("cp-t").await);
        assert_eq!(s.schliess_grund(), Some(SchliessGrund::ServerInitiiert));
        assert!(v.liste().await.unwrap().is_empty());
    }
}
