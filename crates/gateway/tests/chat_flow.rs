#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use {
    futures::{SinkExt, StreamExt},
    serde_json::{Value, json},
    tokio::net::TcpStream,
    tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message},
};

use {
    clinic_config::ClinicConfig,
    clinic_gateway::{ChatService, GatewayState, auth::resolve_auth, build_gateway_app},
    clinic_media::UploadStore,
    clinic_protocol::ClientFrame,
    clinic_store::MemoryMessageStore,
};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    addr: SocketAddr,
    _dir: tempfile::TempDir,
}

impl TestServer {
    async fn start(config: ClinicConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let uploads = Arc::new(UploadStore::new(
            dir.path().join("uploads"),
            config.uploads.max_bytes,
            config.uploads.allowed_mime.clone(),
        ));
        uploads.ensure_dir().await.unwrap();

        let state = GatewayState::new(resolve_auth(config.auth.token.clone(), None));
        let chat = Arc::new(
            ChatService::new(Arc::new(MemoryMessageStore::new()), state)
                .with_error_events(config.chat.error_events),
        );
        let app = build_gateway_app(chat, uploads, &config);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });
        Self { addr, _dir: dir }
    }

    fn http(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    async fn ws(&self) -> Ws {
        self.ws_with_query("").await
    }

    async fn ws_with_query(&self, query: &str) -> Ws {
        let (ws, _) = connect_async(format!("ws://{}/ws{query}", self.addr))
            .await
            .unwrap();
        ws
    }
}

async fn emit(ws: &mut Ws, event: &str, data: Value) {
    let frame = ClientFrame::new(event, data).to_text().unwrap();
    ws.send(Message::text(frame)).await.unwrap();
}

async fn recv(ws: &mut Ws) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream closed")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn assert_silent(ws: &mut Ws) {
    let next = tokio::time::timeout(Duration::from_millis(300), ws.next()).await;
    assert!(next.is_err(), "unexpected frame: {next:?}");
}

async fn join(ws: &mut Ws, consultation: &str) -> Vec<Value> {
    emit(ws, "entrarConsulta", json!(consultation)).await;
    let frame = recv(ws).await;
    assert_eq!(frame["event"], "historicoMensagens");
    frame["data"].as_array().cloned().unwrap()
}

fn text_message(consultation: &str, texto: &str) -> Value {
    json!({
        "consultaId": consultation,
        "texto": texto,
        "autorId": "p1",
        "autorNome": "Ana",
        "tipo": "paciente",
    })
}

#[tokio::test]
async fn join_send_and_replay() {
    let server = TestServer::start(ClinicConfig::default()).await;
    let mut a = server.ws().await;
    let mut b = server.ws().await;

    assert!(join(&mut a, "c1").await.is_empty());
    assert!(join(&mut b, "c1").await.is_empty());

    emit(&mut a, "enviarMensagem", text_message("c1", "Olá, doutor")).await;

    let from_a = recv(&mut a).await;
    let from_b = recv(&mut b).await;
    assert_eq!(from_a["event"], "novaMensagem");
    assert_eq!(from_a["data"], from_b["data"]);
    assert_eq!(from_a["data"]["texto"], "Olá, doutor");
    assert_eq!(from_a["data"]["tipo"], "paciente");
    assert!(from_a["data"]["_id"].is_string());

    let mut c = server.ws().await;
    let history = join(&mut c, "c1").await;
    assert_eq!(history, vec![from_a["data"].clone()]);

    let over_http: Vec<Value> = reqwest::get(server.http("/api/chat/c1"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(over_http, history);
}

#[tokio::test]
async fn rooms_are_isolated() {
    let server = TestServer::start(ClinicConfig::default()).await;
    let mut a = server.ws().await;
    let mut other = server.ws().await;
    join(&mut a, "c1").await;
    join(&mut other, "c2").await;

    emit(&mut a, "enviarMensagem", text_message("c1", "só para c1")).await;
    assert_eq!(recv(&mut a).await["event"], "novaMensagem");
    assert_silent(&mut other).await;

    // Switching rooms stops delivery from the old one.
    join(&mut other, "c1").await;
    join(&mut other, "c3").await;
    emit(&mut a, "enviarMensagem", text_message("c1", "de novo")).await;
    recv(&mut a).await;
    assert_silent(&mut other).await;
}

#[tokio::test]
async fn closed_member_does_not_block_the_room() {
    let server = TestServer::start(ClinicConfig::default()).await;
    let mut a = server.ws().await;
    let mut b = server.ws().await;
    let mut c = server.ws().await;
    join(&mut a, "c1").await;
    join(&mut b, "c1").await;
    join(&mut c, "c1").await;

    b.close(None).await.unwrap();
    drop(b);

    emit(&mut a, "enviarMensagem", text_message("c1", "ainda aqui?")).await;
    assert_eq!(recv(&mut a).await["data"]["texto"], "ainda aqui?");
    assert_eq!(recv(&mut c).await["data"]["texto"], "ainda aqui?");

    // The closed connection is eventually dropped from the gateway.
    let mut connections = Value::Null;
    for _ in 0..50 {
        let health: Value = reqwest::get(server.http("/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        connections = health["connections"].clone();
        if connections == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(connections, 2);
}

#[tokio::test]
async fn numeric_ids_are_accepted() {
    let server = TestServer::start(ClinicConfig::default()).await;
    let mut a = server.ws().await;

    emit(&mut a, "entrarConsulta", json!(42)).await;
    assert_eq!(recv(&mut a).await["event"], "historicoMensagens");

    emit(
        &mut a,
        "enviarMensagem",
        json!({"consultaId": 42, "texto": "oi", "autorId": 7, "autorNome": "Ana"}),
    )
    .await;
    let frame = recv(&mut a).await;
    assert_eq!(frame["data"]["consultaId"], "42");
    assert_eq!(frame["data"]["autorId"], "7");
}

#[tokio::test]
async fn invalid_messages_are_dropped() {
    let server = TestServer::start(ClinicConfig::default()).await;
    let mut a = server.ws().await;
    join(&mut a, "c1").await;

    emit(&mut a, "enviarMensagem", text_message("c1", "   ")).await;
    emit(
        &mut a,
        "enviarMensagem",
        json!({"consultaId": "c1", "arquivo": true, "autorId": "p1", "autorNome": "Ana"}),
    )
    .await;
    assert_silent(&mut a).await;

    let history: Vec<Value> = reqwest::get(server.http("/api/chat/c1"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(history.is_empty());
}

#[tokio::test]
async fn error_events_reach_only_the_sender() {
    let mut config = ClinicConfig::default();
    config.chat.error_events = true;
    let server = TestServer::start(config).await;
    let mut a = server.ws().await;
    let mut b = server.ws().await;
    join(&mut a, "c1").await;
    join(&mut b, "c1").await;

    emit(&mut a, "enviarMensagem", text_message("c1", "")).await;
    let frame = recv(&mut a).await;
    assert_eq!(frame["event"], "erroMensagem");
    assert_eq!(frame["data"]["code"], "INVALID_MESSAGE");
    assert_silent(&mut b).await;
}

#[tokio::test]
async fn upload_then_send_attachment() {
    let server = TestServer::start(ClinicConfig::default()).await;
    let client = reqwest::Client::new();

    let part = reqwest::multipart::Part::bytes(b"%PDF-1.4 exame".to_vec())
        .file_name("exame.pdf")
        .mime_str("application/pdf")
        .unwrap();
    let resp = client
        .post(server.http("/api/upload"))
        .multipart(reqwest::multipart::Form::new().part("arquivo", part))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["ok"], true);
    assert_eq!(body["mime"], "application/pdf");
    assert_eq!(body["nomeArquivo"], "exame.pdf");
    assert_eq!(body["tamanho"], 14);
    let path = body["path"].as_str().unwrap().to_string();
    assert!(path.starts_with("/uploads/") && path.ends_with(".pdf"));

    let served = reqwest::get(server.http(&path)).await.unwrap();
    assert_eq!(served.status(), 200);
    assert_eq!(served.bytes().await.unwrap().as_ref(), b"%PDF-1.4 exame");

    let mut doctor = server.ws().await;
    join(&mut doctor, "c1").await;
    emit(
        &mut doctor,
        "enviarMensagem",
        json!({
            "consultaId": "c1", "autorId": "d1", "autorNome": "Dr. Rui", "tipo": "medico",
            "arquivo": true, "arquivoUrl": body["url"], "arquivoTipo": body["mime"],
            "nomeArquivo": body["nomeArquivo"], "tamanho": body["tamanho"],
        }),
    )
    .await;
    let frame = recv(&mut doctor).await;
    assert_eq!(frame["data"]["arquivo"], true);
    assert_eq!(frame["data"]["arquivoUrl"], path);
    assert_eq!(frame["data"]["tipo"], "medico");
}

#[tokio::test]
async fn upload_rejections() {
    let mut config = ClinicConfig::default();
    config.uploads.max_bytes = 1024;
    let server = TestServer::start(config).await;
    let client = reqwest::Client::new();

    let post = |part: reqwest::multipart::Part, field: &'static str| {
        client
            .post(server.http("/api/upload"))
            .multipart(reqwest::multipart::Form::new().part(field, part))
            .send()
    };

    let exe = reqwest::multipart::Part::bytes(vec![0u8; 8])
        .file_name("virus.exe")
        .mime_str("application/x-msdownload")
        .unwrap();
    assert_eq!(post(exe, "arquivo").await.unwrap().status(), 400);

    let wrong_field = reqwest::multipart::Part::bytes(vec![0u8; 8])
        .file_name("a.txt")
        .mime_str("text/plain")
        .unwrap();
    assert_eq!(post(wrong_field, "file").await.unwrap().status(), 400);

    let big = reqwest::multipart::Part::bytes(vec![b'a'; 4096])
        .file_name("big.txt")
        .mime_str("text/plain")
        .unwrap();
    assert_eq!(post(big, "arquivo").await.unwrap().status(), 413);
}

#[tokio::test]
async fn token_gate() {
    let mut config = ClinicConfig::default();
    config.auth.token = Some("segredo".into());
    let server = TestServer::start(config).await;

    assert!(
        connect_async(format!("ws://{}/ws", server.addr))
            .await
            .is_err()
    );
    assert!(
        connect_async(format!("ws://{}/ws?token=errado", server.addr))
            .await
            .is_err()
    );

    let mut ws = server.ws_with_query("?token=segredo").await;
    assert!(join(&mut ws, "c1").await.is_empty());

    let health: Value = reqwest::get(server.http("/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["connections"], 1);
    assert_eq!(health["rooms"], 1);
}
