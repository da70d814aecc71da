//! A single JSON-RPC websocket connection. Owned by exactly one task, so no
//! splitting or locking; requests and subscription traffic share the socket.

use crate::error::TransportError;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<Value>,
}

pub struct FeedConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    next_id: u64,
}

impl FeedConnection {
    /// Connect, optionally attaching an authorization header (gateway
    /// endpoints require one, plain nodes do not).
    pub async fn open(uri: &str, auth_header: Option<&str>) -> Result<Self, TransportError> {
        let mut request = uri
            .into_client_request()
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        if let Some(auth) = auth_header {
            let value = HeaderValue::from_str(auth)
                .map_err(|e| TransportError::Connect(format!("bad authorization header: {}", e)))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (stream, _) = connect_async(request)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        log::info!("connected to {}", uri);

        Ok(Self { stream, next_id: 1 })
    }

    /// Issue a request and return the next response frame. Only valid on
    /// connections without an active subscription; otherwise notification
    /// frames could arrive in between.
    pub async fn call(&mut self, method: &str, params: Value) -> Result<Vec<u8>, TransportError> {
        self.send_request(method, params).await?;
        self.next_message().await
    }

    /// Subscribe and return the server-assigned subscription id, needed for
    /// the unsubscribe on shutdown.
    pub async fn subscribe(&mut self, method: &str, params: Value) -> Result<String, TransportError> {
        let raw = self.call(method, params).await?;
        let response: RpcResponse = serde_json::from_slice(&raw)
            .map_err(|e| TransportError::Subscribe(e.to_string()))?;

        if let Some(error) = response.error {
            return Err(TransportError::Subscribe(error.to_string()));
        }
        match response.result.as_ref().and_then(Value::as_str) {
            Some(id) => Ok(id.to_string()),
            None => Err(TransportError::Subscribe(
                "response carries no subscription id".to_string(),
            )),
        }
    }

    /// Fire the unsubscribe request without waiting for a response; used on
    /// the way out, when the peer may already be gone.
    pub async fn unsubscribe(
        &mut self,
        method: &str,
        subscription_id: &str,
    ) -> Result<(), TransportError> {
        self.send_request(method, json!([subscription_id])).await
    }

    async fn send_request(&mut self, method: &str, params: Value) -> Result<(), TransportError> {
        let id = self.next_id;
        self.next_id += 1;

        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        })
        .to_string();

        self.stream.send(Message::Text(body.into())).await?;
        Ok(())
    }

    /// Next data frame. Pings are answered inline; a close frame or EOF
    /// surfaces as `TransportError::Closed`.
    pub async fn next_message(&mut self) -> Result<Vec<u8>, TransportError> {
        loop {
            let msg = match self.stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => return Err(e.into()),
                None => return Err(TransportError::Closed),
            };

            match msg {
                Message::Text(text) => return Ok(text.as_str().as_bytes().to_vec()),
                Message::Binary(data) => return Ok(data.to_vec()),
                Message::Ping(payload) => self.stream.send(Message::Pong(payload)).await?,
                Message::Pong(_) | Message::Frame(_) => {}
                Message::Close(_) => return Err(TransportError::Closed),
            }
        }
    }
}
