//! WebSocket terminal endpoint

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};

use bastion_core::traits::{ClientSink, ClientSource};
use bastion_core::CredentialBundle;
use bastion_protocol::{BootstrapRecord, InboundFrame, OutboundFrame};

use super::params::ConnectParams;
use crate::bridge::SessionBridge;
use crate::state::GatewayState;

/// Upgrade to a WebSocket and bridge it to a remote shell
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
    Query(params): Query<ConnectParams>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, params))
}

async fn handle_socket(socket: WebSocket, state: Arc<GatewayState>, params: ConnectParams) {
    let (sink, stream) = socket.split();
    let mut sink = WsSink(sink);
    let mut source = WsSource(stream);

    let credentials = match credentials_for(&mut source, &state, &params).await {
        Ok(credentials) => credentials,
        Err(reason) => {
            tracing::warn!("Rejecting terminal connection: {}", reason);
            reject(&mut sink, reason).await;
            return;
        }
    };

    let connection = match state.connector.connect(&credentials).await {
        Ok(connection) => connection,
        Err(e) => {
            tracing::warn!(
                "Connection to {} as {} failed: {}",
                credentials.host,
                credentials.user,
                e
            );
            reject(&mut sink, e.to_string()).await;
            return;
        }
    };

    let bridge = SessionBridge::new(connection, &credentials, state.bridge_settings());
    let _registration = state.sessions.register(bridge.session(), bridge.cancel_token());
    let outcome = bridge.run(source, sink).await;
    tracing::debug!("Terminal connection finished: {:?}", outcome);
}

async fn reject(sink: &mut WsSink, reason: String) {
    let _ = sink.send(OutboundFrame::error(reason)).await;
    sink.close().await;
}

/// Credentials from the query string, or from the first frame when the
/// query carries none
async fn credentials_for(
    source: &mut WsSource,
    state: &GatewayState,
    params: &ConnectParams,
) -> Result<CredentialBundle, String> {
    if !params.is_empty() {
        return params
            .resolve(state.tokens.as_ref())
            .map_err(|e| e.to_string());
    }

    let frame = match source.recv().await {
        Some(Ok(frame)) => frame,
        Some(Err(e)) => return Err(format!("Failed to read connection info: {}", e)),
        None => return Err("Connection closed before credentials were sent".to_string()),
    };
    let record = frame
        .into_text()
        .and_then(|text| BootstrapRecord::parse(&text))
        .map_err(|e| e.to_string())?;
    Ok(CredentialBundle::from(record))
}

/// Writing half of an upgraded socket
pub struct WsSink(SplitSink<WebSocket, Message>);

#[async_trait]
impl ClientSink for WsSink {
    async fn send(&mut self, frame: OutboundFrame) -> io::Result<()> {
        let message = match frame {
            OutboundFrame::Binary(data) => Message::Binary(data.to_vec()),
            OutboundFrame::Text(text) => Message::Text(text),
        };
        self.0.send(message).await.map_err(io::Error::other)
    }

    async fn close(&mut self) {
        let _ = self.0.close().await;
    }
}

/// Reading half of an upgraded socket
pub struct WsSource(SplitStream<WebSocket>);

#[async_trait]
impl ClientSource for WsSource {
    async fn recv(&mut self) -> Option<io::Result<InboundFrame>> {
        loop {
            let message = match self.0.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(io::Error::other(e))),
            };
            match message {
                Message::Text(text) => return Some(Ok(InboundFrame::Text(text))),
                Message::Binary(data) => return Some(Ok(InboundFrame::Binary(Bytes::from(data)))),
                Message::Close(_) => return None,
                // Pings are answered by the socket itself.
                Message::Ping(_) | Message::Pong(_) => {}
            }
        }
    }
}
