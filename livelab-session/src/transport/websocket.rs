use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};
use url::Url;

use super::{Connection, Connector};
use crate::{
    error::{Error, Result},
    message::{Inbound, Outbound},
};

/// Connects to the backend over a WebSocket carrying JSON text messages.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: Url,
}

impl WebSocketConnector {
    pub fn new(url: Url) -> Result<Self> {
        match url.scheme() {
            "ws" | "wss" => Ok(Self { url }),
            scheme => Err(Error::SessionSetup(format!(
                "unsupported WebSocket scheme {scheme} in {url}"
            ))),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> Result<Connection> {
        debug!("connecting to {}", self.url);
        let (stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| Error::transport(format!("{}: {e}", self.url)))?;
        let (mut sink, mut source) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Outbound>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    message = outbound_rx.recv() => {
                        let Some(message) = message else { break };
                        let text = match message.encode() {
                            Ok(text) => text,
                            Err(e) => {
                                warn!("{e}");
                                continue;
                            }
                        };
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            debug!("websocket send failed: {e}");
                            break;
                        }
                    }
                    frame = source.next() => {
                        match frame {
                            Some(Ok(Message::Text(text))) => match Inbound::parse(&text) {
                                Ok(message) => {
                                    if inbound_tx.send(message).is_err() {
                                        break;
                                    }
                                }
                                Err(e) => warn!("ignore inbound message: {e}"),
                            },
                            Some(Ok(Message::Close(_))) | None => break,
                            Some(Err(e)) => {
                                debug!("websocket receive failed: {e}");
                                break;
                            }
                            Some(Ok(_)) => {}
                        }
                    }
                }
            }
            if let Err(e) = sink.close().await {
                debug!("websocket close failed: {e}");
            }
        });

        Ok(Connection::new(outbound_tx, inbound_rx)
            .with_task(task.abort_handle(), Some(shutdown_tx)))
    }
}
