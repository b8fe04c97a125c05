//! End-to-End-Tests ueber echte WebSocket-Verbindungen auf Loopback

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use ladenetz_auth::{AdressBasis, LadepunktService, NeuerLadepunktEingabe};
use ladenetz_core::ChargePointId;
use ladenetz_db::MemoryRepository;
use ladenetz_gateway::{
    GatewayConfig, GatewayError, GatewayServer, GatewayState, SendeFehler, StandardHandler, Verwaltung,
};
use ladenetz_observability::GatewayMetriken;
use ladenetz_protocol::action::{ResetRequest, ResetType};
use ladenetz_protocol::{decode, encode, Action, ErrorCode, Message, DEFAULT_MAX_NACHRICHTENGROESSE};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ---------------------------------------------------------------------------
// Testumgebung
// ---------------------------------------------------------------------------

struct Testgateway {
    state: Arc<GatewayState>,
    verwaltung: Verwaltung,
    addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    server: JoinHandle<Result<(), GatewayError>>,
}

impl Testgateway {
    async fn starten() -> Self {
        Self::mit_config(GatewayConfig::default()).await
    }

    async fn mit_config(config: GatewayConfig) -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let repo = Arc::new(MemoryRepository::new());
        let metriken = GatewayMetriken::neu().unwrap();
        let state = GatewayState::neu(
            config,
            repo.clone(),
            Arc::new(StandardHandler::default()),
            metriken,
        );
        let verwaltung = Verwaltung::neu(
            LadepunktService::neu(repo),
            Arc::clone(&state),
            AdressBasis {
                host: "127.0.0.1".into(),
                web_port: None,
                ocpp_port: 0,
                pfad: "ocpp".into(),
                tls: false,
            },
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        state
            .korrelation()
            .sweeper_starten(Duration::from_millis(20), shutdown_rx.clone());

        let server = GatewayServer::binden(Arc::clone(&state), "127.0.0.1:0".parse().unwrap(), None)
            .await
            .unwrap();
        let addr = server.lokale_adresse().unwrap();
        let server = tokio::spawn(server.starten(shutdown_rx));

        Self {
            state,
            verwaltung,
            addr,
            shutdown_tx,
            server,
        }
    }

    /// Legt einen Ladepunkt an und gibt (Benutzername, Schluessel) zurueck
    async fn ladepunkt(&self, name: &str) -> (String, String) {
        let lp = self
            .verwaltung
            .anlegen(NeuerLadepunktEingabe {
                name: name.into(),
                ..Default::default()
            })
            .await
            .unwrap();
        (lp.record.username, lp.record.authorization_key)
    }

    async fn verbinden(&self, kennung: &str, schluessel: &str) -> Client {
        let mut request = format!("ws://{}/ocpp/{kennung}", self.addr)
            .into_client_request()
            .unwrap();
        let basic = format!("Basic {}", STANDARD.encode(format!("{kennung}:{schluessel}")));
        request
            .headers_mut()
            .insert("Authorization", HeaderValue::from_str(&basic).unwrap());
        request
            .headers_mut()
            .insert("Sec-WebSocket-Protocol", HeaderValue::from_static("ocpp1.6"));

        let (ws, antwort) = tokio_tungstenite::connect_async(request).await.unwrap();
        assert_eq!(
            antwort
                .headers()
                .get("sec-websocket-protocol")
                .and_then(|v| v.to_str().ok()),
            Some("ocpp1.6")
        );
        ws
    }

    /// Verbindet und wartet bis die Session aktiv in der Registry steht
    async fn aktiv_verbinden(&self, kennung: &str, schluessel: &str) -> Client {
        let ws = self.verbinden(kennung, schluessel).await;
        let id = ChargePointId::new(kennung);
        warten_bis(|| self.state.registry().nachschlagen(&id).is_some()).await;
        ws
    }
}

async fn warten_bis(mut bedingung: impl FnMut() -> bool) {
    for _ in 0..200 {
        if bedingung() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Bedingung nicht erfuellt");
}

/// Naechster Frame ohne Ping/Pong
async fn naechster_frame(ws: &mut Client) -> WsMessage {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("kein Frame innerhalb der Frist")
            .expect("Stream beendet")
            .expect("Lesefehler");
        match frame {
            WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
            andere => return andere,
        }
    }
}

async fn naechste_nachricht(ws: &mut Client) -> Message {
    match naechster_frame(ws).await {
        WsMessage::Text(text) => decode(text.as_bytes(), DEFAULT_MAX_NACHRICHTENGROESSE).unwrap(),
        andere => panic!("Text-Frame erwartet, erhalten: {andere:?}"),
    }
}

async fn close_code(ws: &mut Client) -> CloseCode {
    match naechster_frame(ws).await {
        WsMessage::Close(Some(frame)) => frame.code,
        andere => panic!("Close-Frame erwartet, erhalten: {andere:?}"),
    }
}

async fn senden(ws: &mut Client, nachricht: &Message) {
    ws.send(WsMessage::Text(encode(nachricht).unwrap())).await.unwrap();
}

// ---------------------------------------------------------------------------
// Anmeldung
// ---------------------------------------------------------------------------

#[tokio::test]
async fn richtiger_schluessel_wird_aktiv() {
    let gw = Testgateway::starten().await;
    let (kennung, schluessel) = gw.ladepunkt("Parkhaus Sued").await;

    let _ws = gw.aktiv_verbinden(&kennung, &schluessel).await;

    let session = gw
        .state
        .registry()
        .nachschlagen(&ChargePointId::new(kennung.as_str()))
        .unwrap();
    assert!(session.ist_aktiv());
    assert_eq!(gw.state.metriken.verbundene_ladepunkte.get(), 1);
}

#[tokio::test]
async fn falscher_schluessel_wird_mit_1008_geschlossen() {
    let gw = Testgateway::starten().await;
    let (kennung, _) = gw.ladepunkt("Halle").await;

    let mut ws = gw.verbinden(&kennung, "falsch").await;
    assert_eq!(close_code(&mut ws).await, CloseCode::Policy);

    assert_eq!(gw.state.registry().anzahl(), 0);
    assert_eq!(gw.state.metriken.authentifizierung_abgelehnt_total.get(), 1);
}

#[tokio::test]
async fn unbekannte_kennung_wird_mit_1008_geschlossen() {
    let gw = Testgateway::starten().await;
    let mut ws = gw.verbinden("gibt-es-nicht", "egal").await;
    assert_eq!(close_code(&mut ws).await, CloseCode::Policy);
    assert_eq!(gw.state.registry().anzahl(), 0);
}

#[tokio::test]
async fn zweite_verbindung_ersetzt_erste() {
    let gw = Testgateway::starten().await;
    let (kennung, schluessel) = gw.ladepunkt("X").await;
    let id = ChargePointId::new(kennung.as_str());

    let mut a = gw.aktiv_verbinden(&kennung, &schluessel).await;
    let erste = gw.state.registry().nachschlagen(&id).unwrap();

    let _b = gw.verbinden(&kennung, &schluessel).await;
    warten_bis(|| {
        gw.state
            .registry()
            .nachschlagen(&id)
            .is_some_and(|s| s.id() != erste.id())
    })
    .await;

    assert_eq!(close_code(&mut a).await, CloseCode::Normal);
    assert!(!erste.ist_aktiv());
    assert_eq!(gw.state.registry().anzahl(), 1);
    assert!(gw.state.registry().nachschlagen(&id).unwrap().ist_aktiv());
    assert_eq!(gw.state.metriken.sitzungen_ersetzt_total.get(), 1);
}

// ---------------------------------------------------------------------------
// Anfragen des Ladepunkts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn heartbeat_wird_beantwortet() {
    let gw = Testgateway::starten().await;
    let (kennung, schluessel) = gw.ladepunkt("Takt").await;
    let mut ws = gw.aktiv_verbinden(&kennung, &schluessel).await;

    ws.send(WsMessage::Text(r#"[2,"hb-1","Heartbeat",{}]"#.into()))
        .await
        .unwrap();

    match naechste_nachricht(&mut ws).await {
        Message::Result(r) => {
            assert_eq!(r.message_id, "hb-1");
            assert!(r.payload["currentTime"].is_string());
        }
        andere => panic!("Result erwartet: {andere:?}"),
    }
}

#[tokio::test]
async fn kaputter_frame_gibt_fault_und_wiederholung_trennt() {
    let gw = Testgateway::mit_config(GatewayConfig {
        max_dekodierfehler: 3,
        ..Default::default()
    })
    .await;
    let (kennung, schluessel) = gw.ladepunkt("Wackel").await;
    let mut ws = gw.aktiv_verbinden(&kennung, &schluessel).await;

    for _ in 0..3 {
        ws.send(WsMessage::Text("{kaputt".into())).await.unwrap();
        match naechste_nachricht(&mut ws).await {
            Message::Fault(f) => {
                assert_eq!(f.message_id, "-1");
                assert_eq!(f.error_code, ErrorCode::FormationViolation);
            }
            andere => panic!("Fault erwartet: {andere:?}"),
        }
    }
    assert_eq!(close_code(&mut ws).await, CloseCode::Policy);
    warten_bis(|| gw.state.registry().anzahl() == 0).await;
}

#[tokio::test]
async fn einzelner_fehler_laesst_verbindung_offen() {
    let gw = Testgateway::starten().await;
    let (kennung, schluessel) = gw.ladepunkt("Robust").await;
    let mut ws = gw.aktiv_verbinden(&kennung, &schluessel).await;

    ws.send(WsMessage::Text(r#"[2,"q","Zapfen",{}]"#.into()))
        .await
        .unwrap();
    match naechste_nachricht(&mut ws).await {
        Message::Fault(f) => {
            assert_eq!(f.message_id, "q");
            assert_eq!(f.error_code, ErrorCode::NotImplemented);
        }
        andere => panic!("Fault erwartet: {andere:?}"),
    }

    ws.send(WsMessage::Text(r#"[2,"hb","Heartbeat",{}]"#.into()))
        .await
        .unwrap();
    assert!(matches!(naechste_nachricht(&mut ws).await, Message::Result(_)));
}

// ---------------------------------------------------------------------------
// Anfragen an den Ladepunkt
// ---------------------------------------------------------------------------

#[tokio::test]
async fn server_anfrage_wird_zugeordnet() {
    let gw = Testgateway::starten().await;
    let (kennung, schluessel) = gw.ladepunkt("Ziel").await;
    let mut ws = gw.aktiv_verbinden(&kennung, &schluessel).await;

    let state = Arc::clone(&gw.state);
    let id = ChargePointId::new(kennung.as_str());
    let anfrage = tokio::spawn(async move {
        state
            .anfrage_senden(&id, &ResetRequest { typ: ResetType::Soft }, None)
            .await
    });

    let call = match naechste_nachricht(&mut ws).await {
        Message::Call(c) => c,
        andere => panic!("Call erwartet: {andere:?}"),
    };
    assert_eq!(call.action, Action::Reset);
    assert_eq!(call.payload, json!({"type": "Soft"}));

    senden(&mut ws, &Message::result(call.message_id, json!({"status": "Accepted"}))).await;

    let antwort = anfrage.await.unwrap().unwrap();
    assert_eq!(
        antwort.status,
        ladenetz_protocol::action::GenericStatus::Accepted
    );
}

#[tokio::test]
async fn call_waehrend_offener_server_anfrage() {
    let gw = Testgateway::starten().await;
    let (kennung, schluessel) = gw.ladepunkt("Parallel").await;
    let mut ws = gw.aktiv_verbinden(&kennung, &schluessel).await;

    let state = Arc::clone(&gw.state);
    let id = ChargePointId::new(kennung.as_str());
    let anfrage = tokio::spawn(async move {
        state
            .anfrage_an(&id, Action::ClearCache, json!({}), None)
            .await
    });
    let call = match naechste_nachricht(&mut ws).await {
        Message::Call(c) => c,
        andere => panic!("Call erwartet: {andere:?}"),
    };

    // Ladepunkt fragt selbst, bevor er antwortet
    ws.send(WsMessage::Text(r#"[2,"hb","Heartbeat",{}]"#.into()))
        .await
        .unwrap();
    match naechste_nachricht(&mut ws).await {
        Message::Result(r) => assert_eq!(r.message_id, "hb"),
        andere => panic!("Result erwartet: {andere:?}"),
    }

    senden(&mut ws, &Message::result(call.message_id, json!({"status": "Accepted"}))).await;
    assert_eq!(anfrage.await.unwrap(), Ok(json!({"status": "Accepted"})));
}

#[tokio::test]
async fn ohne_antwort_timeout_sitzung_bleibt() {
    let gw = Testgateway::starten().await;
    let (kennung, schluessel) = gw.ladepunkt("Stumm").await;
    let mut ws = gw.aktiv_verbinden(&kennung, &schluessel).await;
    let id = ChargePointId::new(kennung.as_str());

    let start = std::time::Instant::now();
    let ergebnis = gw
        .state
        .anfrage_an(&id, Action::GetConfiguration, json!({}), Some(Duration::from_millis(300)))
        .await;
    assert_eq!(ergebnis, Err(SendeFehler::Timeout));
    assert!(start.elapsed() >= Duration::from_millis(300));

    // Verspaetete Antwort wird verworfen, Sitzung bleibt aktiv
    let call = match naechste_nachricht(&mut ws).await {
        Message::Call(c) => c,
        andere => panic!("Call erwartet: {andere:?}"),
    };
    senden(&mut ws, &Message::result(call.message_id, json!({}))).await;
    warten_bis(|| gw.state.metriken.unbekannte_antworten_total.get() == 1).await;
    assert!(gw.state.registry().nachschlagen(&id).unwrap().ist_aktiv());
}

#[tokio::test]
async fn fault_des_ladepunkts_erreicht_aufrufer() {
    let gw = Testgateway::starten().await;
    let (kennung, schluessel) = gw.ladepunkt("Nein").await;
    let mut ws = gw.aktiv_verbinden(&kennung, &schluessel).await;

    let state = Arc::clone(&gw.state);
    let id = ChargePointId::new(kennung.as_str());
    let anfrage = tokio::spawn(async move {
        state
            .anfrage_an(&id, Action::UnlockConnector, json!({"connectorId": 1}), None)
            .await
    });
    let call = match naechste_nachricht(&mut ws).await {
        Message::Call(c) => c,
        andere => panic!("Call erwartet: {andere:?}"),
    };
    senden(
        &mut ws,
        &Message::fault(call.message_id, ErrorCode::NotSupported, "kein Aktor"),
    )
    .await;

    match anfrage.await.unwrap() {
        Err(SendeFehler::Fault { code, beschreibung, .. }) => {
            assert_eq!(code, ErrorCode::NotSupported);
            assert_eq!(beschreibung, "kein Aktor");
        }
        andere => panic!("Fault erwartet: {andere:?}"),
    }
}

#[tokio::test]
async fn verbindungsabbruch_loest_offene_anfragen() {
    let gw = Testgateway::starten().await;
    let (kennung, schluessel) = gw.ladepunkt("Abbruch").await;
    let mut ws = gw.aktiv_verbinden(&kennung, &schluessel).await;

    let mut anfragen = Vec::new();
    for _ in 0..2 {
        let state = Arc::clone(&gw.state);
        let id = ChargePointId::new(kennung.as_str());
        anfragen.push(tokio::spawn(async move {
            state
                .anfrage_an(&id, Action::ClearCache, json!({}), Some(Duration::from_secs(60)))
                .await
        }));
    }
    naechste_nachricht(&mut ws).await;
    naechste_nachricht(&mut ws).await;

    drop(ws);

    for anfrage in anfragen {
        let ergebnis = tokio::time::timeout(Duration::from_secs(2), anfrage)
            .await
            .expect("Anfrage haengt nach Verbindungsabbruch")
            .unwrap();
        assert_eq!(ergebnis, Err(SendeFehler::VerbindungVerloren));
    }
    warten_bis(|| gw.state.registry().anzahl() == 0).await;
    assert_eq!(gw.state.metriken.offene_anfragen.get(), 0);
}

// ---------------------------------------------------------------------------
// Verwaltung und Shutdown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn schluesselrotation_trennt_und_alter_schluessel_gilt_nicht() {
    let gw = Testgateway::starten().await;
    let lp = gw
        .verwaltung
        .anlegen(NeuerLadepunktEingabe {
            name: "Rotation".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    let kennung = lp.record.username.clone();
    let alter_schluessel = lp.record.authorization_key.clone();
    let mut ws = gw.aktiv_verbinden(&kennung, &alter_schluessel).await;

    let neu = gw.verwaltung.schluessel_rotieren(lp.record.id).await.unwrap();
    assert_eq!(close_code(&mut ws).await, CloseCode::Policy);

    let mut alt = gw.verbinden(&kennung, &alter_schluessel).await;
    assert_eq!(close_code(&mut alt).await, CloseCode::Policy);

    let _ws = gw
        .aktiv_verbinden(&kennung, &neu.record.authorization_key)
        .await;
}

#[tokio::test]
async fn shutdown_schliesst_verbindungen() {
    let gw = Testgateway::starten().await;
    let (kennung, schluessel) = gw.ladepunkt("Ende").await;
    let mut ws = gw.aktiv_verbinden(&kennung, &schluessel).await;

    let state = Arc::clone(&gw.state);
    let id = ChargePointId::new(kennung.as_str());
    let anfrage = tokio::spawn(async move {
        state
            .anfrage_an(&id, Action::ClearCache, json!({}), Some(Duration::from_secs(60)))
            .await
    });
    naechste_nachricht(&mut ws).await;

    gw.shutdown_tx.send(true).unwrap();
    assert_eq!(close_code(&mut ws).await, CloseCode::Away);
    assert_eq!(anfrage.await.unwrap(), Err(SendeFehler::VerbindungVerloren));

    tokio::time::timeout(Duration::from_secs(5), gw.server)
        .await
        .expect("Server stoppt nicht")
        .unwrap()
        .unwrap();
}
