use anyhow::Result;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::StatusCode;
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use futures_util::StreamExt;
use sovereign_relay::auth::FeedAuthenticator;
use sovereign_relay::config::{Config, PrivacyMode, SovereignConfig};
use sovereign_relay::context::RelayContext;
use sovereign_relay::event::StreamEvent;
use sovereign_relay::feeds::RouteTable;
use sovereign_relay::metrics::SovereigntyMetrics;

pub const TEST_SECRET: &str = "integration-test-secret-0123456789abcdef";
pub const TEST_ISSUER: &str = "sovereign-relay";

pub struct TestApp {
    pub feed_address: String,
    pub http_address: String,
    pub ctx: RelayContext,
    pub metrics: Arc<SovereigntyMetrics>,
    pub authenticator: Arc<FeedAuthenticator>,
}

pub async fn spawn_app(sovereign_enabled: bool) -> TestApp {
    let feed_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let feed_address = format!("127.0.0.1:{}", feed_listener.local_addr().unwrap().port());
    let http_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let http_address = format!("127.0.0.1:{}", http_listener.local_addr().unwrap().port());

    let config = Arc::new(Config {
        port: 0,
        metrics_port: 0,
        upstream_url: None,
        feed_auth_secret: TEST_SECRET.to_string(),
        feed_auth_issuer: TEST_ISSUER.to_string(),
        sovereign: SovereignConfig {
            enabled: sovereign_enabled,
            country_code: "CA".to_string(),
            data_retention_days: 30,
            privacy_mode: PrivacyMode::Strict,
            overrides_path: None,
        },
        rust_log: "info".to_string(),
    });

    // Each app owns its metrics instance so tests never share counters.
    let metrics = Arc::new(SovereigntyMetrics::new().unwrap());
    let (filter, sovereign_active) =
        sovereign_relay::build_sovereign_filter(&config.sovereign, metrics.clone());

    let mut effective = config.sovereign.clone();
    effective.enabled = sovereign_active;
    let routes = Arc::new(RouteTable::new(&effective));

    let authenticator = Arc::new(FeedAuthenticator::new(TEST_SECRET, TEST_ISSUER));
    let ctx = RelayContext::new(
        config,
        filter,
        authenticator.clone(),
        metrics.clone(),
        routes,
    );

    tokio::spawn(sovereign_relay::run_feed_server(ctx.clone(), feed_listener));
    tokio::spawn(sovereign_relay::run_http_server(
        metrics.clone(),
        http_listener,
    ));

    TestApp {
        feed_address,
        http_address,
        ctx,
        metrics,
        authenticator,
    }
}

pub type ClientWs = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestSubscriber {
    pub ws: ClientWs,
}

impl TestSubscriber {
    /// Connect without credentials
    pub async fn connect(feed_address: &str, path: &str) -> Result<Self> {
        let url = format!("ws://{feed_address}{path}");
        let (ws, _) = connect_async(url.as_str()).await?;
        Ok(Self { ws })
    }

    /// Connect with a bearer credential on the upgrade request
    pub async fn connect_with_token(feed_address: &str, path: &str, token: &str) -> Result<Self> {
        let url = format!("ws://{feed_address}{path}");
        let mut request = url.as_str().into_client_request()?;
        request
            .headers_mut()
            .insert("Authorization", format!("Bearer {token}").parse()?);
        let (ws, _) = connect_async(request).await?;
        Ok(Self { ws })
    }

    /// Next event frame, or a panic after the timeout
    pub async fn recv_event(&mut self) -> StreamEvent {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), self.ws.next())
                .await
                .expect("timed out waiting for feed event")
                .expect("feed stream ended unexpectedly")
                .expect("websocket error while waiting for feed event");

            if let WsMessage::Binary(data) = msg {
                return rmp_serde::from_slice(&data).expect("invalid event frame");
            }
        }
    }

    /// Asserts that no event frame arrives within the window
    pub async fn expect_silence(&mut self, window: Duration) {
        let outcome = tokio::time::timeout(window, self.ws.next()).await;
        if let Ok(Some(Ok(WsMessage::Binary(_)))) = outcome {
            panic!("received an event frame while expecting silence");
        }
    }
}

/// Manual HTTP GET against the observability server
pub async fn http_get(addr: &str, path: &str) -> (StatusCode, String) {
    let stream = TcpStream::connect(addr).await.unwrap();
    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await.unwrap();
    tokio::spawn(conn);

    let request = hyper::Request::builder()
        .uri(format!("http://{addr}{path}"))
        .header(hyper::header::HOST, addr)
        .body(Full::<Bytes>::new(Bytes::new()))
        .unwrap();

    let response = sender.send_request(request).await.unwrap();
    let status = response.status();
    let body = response.collect().await.unwrap().to_bytes();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

/// Status code of a rejected websocket upgrade
pub fn rejection_status(err: &anyhow::Error) -> Option<u16> {
    match err.downcast_ref::<tokio_tungstenite::tungstenite::Error>() {
        Some(tokio_tungstenite::tungstenite::Error::Http(response)) => {
            Some(response.status().as_u16())
        }
        _ => None,
    }
}
