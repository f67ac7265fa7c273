//! WebSocket transport to a speech-to-speech relay.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::ModelError;
use crate::settings::ModelSettings;
use crate::transport::{ModelConnector, ModelTransport};

const WS_BUFFER: usize = 1600;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSender = SplitSink<WsStream, Message>;

pub struct WsTransport {
    sender: Mutex<WsSender>,
    receiver: Mutex<mpsc::Receiver<Result<Bytes, ModelError>>>,
    reader: JoinHandle<()>,
}

impl WsTransport {
    pub async fn connect(settings: &ModelSettings) -> Result<Self, ModelError> {
        let mut request = settings
            .endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| ModelError::Transport(format!("invalid model endpoint: {e}")))?;
        if let Some(key) = settings.api_key.as_deref().filter(|k| !k.is_empty()) {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {key}")) {
                request.headers_mut().insert(header::AUTHORIZATION, value);
            }
        }
        if let Ok(value) = HeaderValue::from_str(&settings.model_id) {
            request.headers_mut().insert("X-Model-Id", value);
        }

        info!(endpoint = %settings.endpoint, model = %settings.model_id, "Connecting to model service");
        let (stream, _response) = connect_async(request)
            .await
            .map_err(|e| ModelError::Transport(format!("websocket connect failed: {e}")))?;
        let (sender, mut receiver) = stream.split();
        let (tx, rx) = mpsc::channel(WS_BUFFER);

        let reader = tokio::spawn(async move {
            while let Some(message) = receiver.next().await {
                let frame = match message {
                    Ok(Message::Text(text)) => Bytes::copy_from_slice(text.as_bytes()),
                    Ok(Message::Binary(bin)) => Bytes::copy_from_slice(&bin),
                    Ok(Message::Close(frame)) => {
                        debug!(?frame, "Model service closed the websocket");
                        return;
                    }
                    Ok(_) => continue,
                    Err(err) => {
                        let _ = tx
                            .send(Err(ModelError::Transport(format!("websocket error: {err}"))))
                            .await;
                        return;
                    }
                };
                if tx.send(Ok(frame)).await.is_err() {
                    return;
                }
            }
        });

        Ok(Self {
            sender: Mutex::new(sender),
            receiver: Mutex::new(rx),
            reader,
        })
    }
}

#[async_trait]
impl ModelTransport for WsTransport {
    async fn send(&self, frame: String) -> Result<(), ModelError> {
        let mut sender = self.sender.lock().await;
        sender
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| ModelError::Transport(format!("websocket send failed: {e}")))
    }

    async fn recv(&self) -> Result<Option<Bytes>, ModelError> {
        match self.receiver.lock().await.recv().await {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(err)) => Err(err),
            None => Ok(None),
        }
    }

    async fn close(&self) -> Result<(), ModelError> {
        let mut sender = self.sender.lock().await;
        if let Err(e) = sender.close().await {
            warn!(error = %e, "Error closing model websocket");
            return Err(ModelError::Transport(format!("websocket close failed: {e}")));
        }
        Ok(())
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Opens a [`WsTransport`] per session.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl ModelConnector for WsConnector {
    async fn connect(&self, settings: &ModelSettings) -> Result<Arc<dyn ModelTransport>, ModelError> {
        let transport = WsTransport::connect(settings).await?;
        Ok(Arc::new(transport) as Arc<dyn ModelTransport>)
    }
}
