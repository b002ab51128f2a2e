//! # sovereign-relay
//!
//! A jurisdiction-aware dual-feed layer over a federated firehose relay.
//! One shared event source feeds two subscription surfaces: a standard feed
//! that rebroadcasts every repository-change event, and a sovereign feed
//! that requires a bearer credential and forwards only events whose subject
//! the geographic classifier places inside the configured jurisdiction.
//!
//! The relay consumes its event sequence from an upstream collaborator; it
//! owns no sequencing, persistence, or crawling. Filtering decisions are
//! pure in-memory computation and fail closed: a missing subject, an
//! unknown event kind, or an unwired classifier always excludes.

use anyhow::Result;
use bytes::Bytes;
use http_body_util::Full;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::signal;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode as WsStatusCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{body::Incoming as IncomingBody, Request as HttpRequest, Response as HttpResponse};
use hyper_util::rt::TokioIo;

pub mod auth;
pub mod classifier;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod feeds;
pub mod filter;
pub mod handlers;
pub mod metrics;
pub mod upstream;

use auth::FeedAuthenticator;
use classifier::GeographicClassifier;
use config::{Config, SovereignConfig};
use context::RelayContext;
use feeds::{ConnectionState, FeedKind, RouteTable};
use filter::SovereignEventFilter;
use metrics::SovereigntyMetrics;

type HttpResult = Result<HttpResponse<Full<Bytes>>, Infallible>;

async fn http_handler(
    req: HttpRequest<IncomingBody>,
    metrics: Arc<SovereigntyMetrics>,
) -> HttpResult {
    let response = match req.uri().path() {
        "/health" => HttpResponse::new(Full::new(Bytes::from("OK"))),
        "/metrics" => match metrics.gather() {
            Ok(metrics_data) => {
                let mut res = HttpResponse::new(Full::new(Bytes::from(metrics_data)));
                res.headers_mut()
                    .insert("Content-Type", "text/plain; version=0.0.4".parse().unwrap());
                res
            }
            Err(e) => {
                tracing::error!("Failed to gather metrics: {}", e);
                let mut res = HttpResponse::new(Full::new(Bytes::from("Internal Server Error")));
                *res.status_mut() = hyper::StatusCode::INTERNAL_SERVER_ERROR;
                res
            }
        },
        _ => {
            let mut not_found = HttpResponse::new(Full::new(Bytes::from("Not Found")));
            *not_found.status_mut() = hyper::StatusCode::NOT_FOUND;
            not_found
        }
    };
    Ok(response)
}

/// Serves `/health` and `/metrics` for external collection
pub async fn run_http_server(
    metrics: Arc<SovereigntyMetrics>,
    listener: TcpListener,
) -> Result<()> {
    tracing::info!(
        "Observability server listening on http://{}",
        listener.local_addr()?
    );

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let metrics = metrics.clone();

        tokio::task::spawn(async move {
            let service = service_fn(move |req| http_handler(req, metrics.clone()));

            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                tracing::error!("Error serving HTTP connection: {:?}", err);
            }
        });
    }
}

fn upgrade_rejection(status: WsStatusCode, reason: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason.to_string()));
    *response.status_mut() = status;
    response
}

/// Resolves the upgrade request against the routing table and, for the
/// sovereign feed, checks the bearer credential. Rejections happen here,
/// before any transport upgrade, and allocate no streaming resources.
async fn accept_feed_connection(socket: TcpStream, addr: SocketAddr, ctx: RelayContext) {
    let routes = ctx.routes.clone();
    let authenticator = ctx.authenticator.clone();
    let mut selected: Option<FeedKind> = None;

    let callback = |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let path = req.uri().path();
        let Some(route) = routes.match_path(path) else {
            tracing::debug!(addr = %addr, path, "Rejected upgrade for unregistered path");
            return Err(upgrade_rejection(WsStatusCode::NOT_FOUND, "unknown feed path"));
        };

        match route.kind {
            FeedKind::Standard => {
                selected = Some(FeedKind::Standard);
                Ok(response)
            }
            FeedKind::Sovereign => {
                tracing::debug!(
                    addr = %addr,
                    state = %ConnectionState::AwaitingAuth,
                    "Inspecting sovereign feed credential"
                );
                let auth_header = req
                    .headers()
                    .get("authorization")
                    .and_then(|value| value.to_str().ok());

                match authenticator.authorize(auth_header) {
                    Ok(claims) => {
                        tracing::info!(
                            addr = %addr,
                            subscriber = %claims.sub,
                            state = %ConnectionState::Upgrading,
                            "Sovereign feed credential accepted"
                        );
                        selected = Some(FeedKind::Sovereign);
                        Ok(response)
                    }
                    Err(e) => {
                        tracing::warn!(addr = %addr, error = %e, "Rejected sovereign feed upgrade");
                        Err(upgrade_rejection(
                            WsStatusCode::UNAUTHORIZED,
                            "invalid or missing bearer credential",
                        ))
                    }
                }
            }
        }
    };

    // Bound separately so the handshake future releases its borrow of
    // `selected` before the routing decision is read.
    let upgraded = tokio_tungstenite::accept_hdr_async(socket, callback).await;

    match upgraded {
        Ok(ws_stream) => {
            if let Some(kind) = selected {
                handlers::stream_feed(ws_stream, addr, ctx, kind).await;
            }
        }
        Err(e) => {
            tracing::debug!(addr = %addr, error = %e, "WebSocket upgrade failed");
        }
    }
}

/// Accepts feed connections and spawns one streaming task per client
pub async fn run_feed_server(ctx: RelayContext, listener: TcpListener) {
    loop {
        let (socket, addr) = match listener.accept().await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Failed to accept socket: {}", e);
                continue;
            }
        };

        let ctx = ctx.clone();
        tokio::spawn(async move {
            accept_feed_connection(socket, addr, ctx).await;
        });
    }
}

/// Wires the sovereign filter, or falls back to the fail-closed unwired
/// filter when sovereignty is disabled or its startup fails.
///
/// Returns whether the sovereign endpoint should be registered. A broken
/// sovereign configuration never takes the standard feed down.
pub fn build_sovereign_filter(
    sovereign: &SovereignConfig,
    metrics: Arc<SovereigntyMetrics>,
) -> (Arc<SovereignEventFilter>, bool) {
    if !sovereign.enabled {
        return (Arc::new(SovereignEventFilter::unwired(metrics)), false);
    }

    if let Err(e) = sovereign.validate() {
        tracing::error!(error = %e, "Invalid sovereignty configuration, sovereign feed disabled");
        return (Arc::new(SovereignEventFilter::unwired(metrics)), false);
    }

    let geographic_classifier = GeographicClassifier::new(sovereign);
    if let Err(e) = geographic_classifier.initialize() {
        tracing::error!(error = %e, "Geographic classifier initialization failed, sovereign feed disabled");
        return (Arc::new(SovereignEventFilter::unwired(metrics)), false);
    }

    tracing::info!(
        jurisdiction = %sovereign.jurisdiction(),
        retention_days = sovereign.data_retention_days,
        privacy_mode = %sovereign.privacy_mode,
        "Sovereign feed enabled"
    );
    (
        Arc::new(SovereignEventFilter::new(
            Arc::new(geographic_classifier),
            metrics,
            sovereign.jurisdiction(),
        )),
        true,
    )
}

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration once; immutable afterward
    let config = Arc::new(Config::from_env()?);

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.rust_log))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let metrics = SovereigntyMetrics::shared();

    let (filter, sovereign_active) = build_sovereign_filter(&config.sovereign, metrics.clone());

    // The routing table reflects what actually came up, not what was asked for.
    let mut effective = config.sovereign.clone();
    effective.enabled = sovereign_active;
    let routes = Arc::new(RouteTable::new(&effective));
    for route in routes.routes() {
        tracing::info!(path = %route.path, endpoint = route.kind.endpoint_label(), "Registered feed endpoint");
    }

    let authenticator = Arc::new(FeedAuthenticator::new(
        &config.feed_auth_secret,
        &config.feed_auth_issuer,
    ));

    let ctx = RelayContext::new(
        config.clone(),
        filter,
        authenticator,
        metrics.clone(),
        routes,
    );

    let feed_listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!(
        "Relay feed server listening on {} (WebSocket)",
        feed_listener.local_addr()?
    );
    let http_listener = TcpListener::bind(format!("0.0.0.0:{}", config.metrics_port)).await?;

    if let Some(url) = config.upstream_url.clone() {
        tokio::spawn(upstream::run_upstream_subscriber(ctx.clone(), url));
    }

    let feed_server = run_feed_server(ctx, feed_listener);
    let http_server = run_http_server(metrics, http_listener);

    tokio::select! {
        _ = feed_server => {
            tracing::info!("Feed server shut down.");
        },
        res = http_server => {
            if let Err(e) = res {
                tracing::error!("Observability server failed: {}", e);
            }
        },
        _ = signal::ctrl_c() => {
            tracing::info!("Shutdown signal received. Shutting down...");
        }
    }

    Ok(())
}
