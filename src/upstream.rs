use futures_util::StreamExt;
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::context::RelayContext;
use crate::event::StreamEvent;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Consumes the upstream firehose and republishes its events locally.
///
/// The upstream owns sequencing and connection acceptance; this task only
/// decodes frames and hands them to the shared event source. Runs until the
/// process shuts down, reconnecting with a fixed delay.
pub async fn run_upstream_subscriber(ctx: RelayContext, url: String) {
    loop {
        match connect_async(url.as_str()).await {
            Ok((ws_stream, _)) => {
                tracing::info!(url = %url, "Connected to upstream firehose");
                let (_, mut ws_receiver) = ws_stream.split();

                while let Some(msg) = ws_receiver.next().await {
                    match msg {
                        Ok(WsMessage::Binary(data)) => {
                            match rmp_serde::from_slice::<StreamEvent>(&data) {
                                Ok(event) => {
                                    ctx.publish(event);
                                }
                                Err(e) => {
                                    tracing::warn!(error = %e, "Failed to decode upstream frame");
                                }
                            }
                        }
                        Ok(WsMessage::Close(_)) => break,
                        Err(e) => {
                            tracing::warn!(url = %url, error = %e, "Upstream stream error");
                            break;
                        }
                        _ => {}
                    }
                }
                tracing::warn!(url = %url, "Upstream connection ended, reconnecting");
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Failed to connect to upstream firehose");
            }
        }

        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}
