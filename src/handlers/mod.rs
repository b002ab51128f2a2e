use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio::sync::broadcast::error::RecvError;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;

use crate::context::RelayContext;
use crate::error::{RelayError, RelayResult};
use crate::event::StreamEvent;
use crate::feeds::{ConnectionState, FeedKind};

pub type WebSocketStreamType = WebSocketStream<TcpStream>;

async fn forward_event(
    ws_sender: &mut SplitSink<WebSocketStreamType, WsMessage>,
    event: &StreamEvent,
) -> RelayResult<()> {
    let bytes = rmp_serde::to_vec(event)?;
    ws_sender.send(WsMessage::Binary(bytes)).await?;
    Ok(())
}

/// Drives one feed connection from upgrade to close.
///
/// Every connection owns its broadcast receiver and send path, so a stalled
/// subscriber lags and drops only its own backlog. Sovereign connections
/// consult the event filter per event; standard connections forward
/// everything.
pub async fn stream_feed(
    ws_stream: WebSocketStreamType,
    addr: SocketAddr,
    ctx: RelayContext,
    kind: FeedKind,
) {
    let endpoint = kind.endpoint_label();
    ctx.metrics
        .active_connections
        .with_label_values(&[endpoint])
        .inc();
    tracing::info!(
        addr = %addr,
        endpoint,
        state = %ConnectionState::Streaming,
        "Feed connection established"
    );

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let mut feed_rx = ctx.subscribe();

    loop {
        tokio::select! {
            event = feed_rx.recv() => {
                match event {
                    Ok(event) => {
                        let forward = match kind {
                            FeedKind::Standard => true,
                            FeedKind::Sovereign => ctx.filter.decide(Some(event.as_ref())),
                        };
                        if !forward {
                            continue;
                        }

                        match forward_event(&mut ws_sender, event.as_ref()).await {
                            Ok(()) => {}
                            Err(RelayError::Encode(e)) => {
                                tracing::error!(error = %e, seq = event.seq, "Failed to serialize event");
                            }
                            Err(e) => {
                                tracing::debug!(addr = %addr, endpoint, error = %e, "Send failed");
                                break;
                            }
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(addr = %addr, endpoint, skipped, "Slow feed consumer dropped events");
                    }
                    Err(RecvError::Closed) => {
                        tracing::info!(addr = %addr, endpoint, "Event source closed");
                        break;
                    }
                }
            }

            msg = ws_receiver.next() => {
                match msg {
                    Some(Ok(WsMessage::Close(_))) => {
                        tracing::info!(addr = %addr, endpoint, "Connection closed by client");
                        break;
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = ws_sender.send(WsMessage::Pong(data)).await;
                    }
                    Some(Err(e)) => {
                        tracing::debug!(addr = %addr, endpoint, error = %e, "WebSocket error");
                        break;
                    }
                    None => break,
                    _ => {}
                }
            }
        }
    }

    ctx.metrics
        .active_connections
        .with_label_values(&[endpoint])
        .dec();
    tracing::info!(
        addr = %addr,
        endpoint,
        state = %ConnectionState::Closed,
        "Feed connection closed"
    );
}
