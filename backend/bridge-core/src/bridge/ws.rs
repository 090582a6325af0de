//! WebSocket transport for the bridge.
//!
//! # Security
//!
//! - Binds to `127.0.0.1` only and rejects non-loopback peers
//! - The first frame must be `{"token": "..."}`; it is answered with
//!   `{"authenticated": bool}` and a wrong token closes the connection
//!
//! # Protocol
//!
//! After the handshake the UI sends text frames
//! `{"hook": <name>, "id": <string|number>, "request": <object|string>}`,
//! which are routed to the callback bound under `hook`.
//!
//! Each connection gets its own id namespace: the correlation id handed to
//! the hook is `<client uuid>|<id>`. A response script is sent only to the
//! client owning that prefix, with the prefix stripped again, so two clients
//! may reuse the same ids. Every other `eval` (events) is broadcast to all
//! authenticated clients.

use crate::bridge::connection_state::ConnectionState;
use crate::bridge::{Bridge, HookCallback};
use crate::error::bridge::BridgeError;
use crate::ipc::protocol::{CorrelationId, Response, parse_response_script, response_script};

use common::ErrorLocation;

use std::net::SocketAddr;
use std::panic::Location;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::spawn as TokioSpawn;
use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_async};
use uuid::Uuid;

/// Separates the client uuid from the client-chosen id.
const CLIENT_ID_SEPARATOR: char = '|';

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsSource = SplitStream<WebSocketStream<TcpStream>>;

#[derive(Deserialize)]
struct AuthFrame {
    token: String,
}

#[derive(Serialize)]
struct AuthReply<'a> {
    authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

#[derive(Deserialize)]
struct InvokeFrame {
    hook: String,
    id: Value,
    request: Value,
}

struct WsShared {
    hooks: DashMap<String, HookCallback>,
    clients: DashMap<Uuid, UnboundedSender<Message>>,
}

/// Localhost WebSocket bridge.
pub struct WsBridge {
    shared: Arc<WsShared>,
    auth_token: String,
    local_addr: SocketAddr,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl WsBridge {
    /// Binds `127.0.0.1:<port>` and starts accepting connections in the background.
    ///
    /// Port `0` picks a free port; see [`WsBridge::local_addr`]. Without an
    /// `auth_token` a random one is generated.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Io`] if the port cannot be bound.
    pub async fn start(port: u16, auth_token: Option<String>) -> Result<Self, BridgeError> {
        let auth_token = auth_token.unwrap_or_else(|| {
            let token = Uuid::new_v4().to_string();
            info!("Generated bridge auth token");
            token
        });

        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        let local_addr = listener.local_addr()?;
        info!("Bridge listening on ws://{local_addr}");

        let shared = Arc::new(WsShared {
            hooks: DashMap::new(),
            clients: DashMap::new(),
        });

        let accept_shared = Arc::clone(&shared);
        let token = auth_token.clone();
        let accept_task = TokioSpawn(async move {
            while let Ok((stream, addr)) = listener.accept().await {
                debug!("Client connecting from {addr}");
                let shared = Arc::clone(&accept_shared);
                let token = token.clone();
                TokioSpawn(async move {
                    if let Err(e) = handle_connection(stream, addr, token, shared).await {
                        error!("Connection {addr} ended with error: {e}");
                    }
                });
            }
        });

        Ok(Self {
            shared,
            auth_token,
            local_addr,
            accept_task: Mutex::new(Some(accept_task)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn auth_token(&self) -> &str {
        &self.auth_token
    }

    /// Number of authenticated clients currently connected.
    pub fn client_count(&self) -> usize {
        self.shared.clients.len()
    }

    /// Stops accepting connections and disconnects every client.
    pub fn shutdown(&self) {
        if let Some(task) = self.accept_task.lock().take() {
            task.abort();
        }
        self.shared.clients.clear();
        info!("Bridge on {} shut down", self.local_addr);
    }
}

impl Bridge for WsBridge {
    #[track_caller]
    fn bind(&self, name: &str, callback: HookCallback) -> Result<(), BridgeError> {
        match self.shared.hooks.entry(name.to_string()) {
            Entry::Occupied(_) => Err(BridgeError::Bind {
                message: format!("hook '{name}' is already bound"),
                location: ErrorLocation::from(Location::caller()),
            }),
            Entry::Vacant(slot) => {
                slot.insert(callback);
                Ok(())
            }
        }
    }

    fn eval(&self, script: &str) -> Result<(), BridgeError> {
        match parse_response_script(script) {
            Some(response) => self.shared.reply(response),
            None => {
                self.shared.broadcast(script);
                Ok(())
            }
        }
    }
}

impl WsShared {
    fn broadcast(&self, script: &str) {
        let frame = Message::Text(script.to_string().into());
        self.clients
            .retain(|id, client| match client.send(frame.clone()) {
                Ok(()) => true,
                Err(_) => {
                    debug!("Dropping disconnected client {id}");
                    false
                }
            });
    }

    /// Sends `response` to the client whose namespace its correlation id carries.
    #[track_caller]
    fn reply(&self, mut response: Response) -> Result<(), BridgeError> {
        let location = ErrorLocation::from(Location::caller());
        let namespaced = response.correlation_id.clone();

        let Some((client_id, id)) = split_client_id(&namespaced) else {
            return Err(BridgeError::Eval {
                message: format!("response '{namespaced}' does not belong to any client"),
                location,
            });
        };

        response.correlation_id = CorrelationId::from(id);
        let script = response_script(&response).map_err(|e| BridgeError::Eval {
            message: format!("Failed to render response '{namespaced}': {e}"),
            location,
        })?;

        let sent = self
            .clients
            .get(&client_id)
            .map(|client| client.send(Message::Text(script.into())).is_ok());
        match sent {
            Some(true) => Ok(()),
            Some(false) => {
                self.clients.remove(&client_id);
                Err(BridgeError::Eval {
                    message: format!("client {client_id} disconnected before response '{id}'"),
                    location,
                })
            }
            None => Err(BridgeError::Eval {
                message: format!("client {client_id} is gone, response '{id}' dropped"),
                location,
            }),
        }
    }
}

fn namespaced_id(client_id: Uuid, id: &str) -> CorrelationId {
    CorrelationId::from(format!("{client_id}{CLIENT_ID_SEPARATOR}{id}"))
}

fn split_client_id(id: &CorrelationId) -> Option<(Uuid, &str)> {
    let (client, id) = id.as_str().split_once(CLIENT_ID_SEPARATOR)?;
    Some((Uuid::parse_str(client).ok()?, id))
}

/// Runs one client connection until it disconnects.
///
/// 1. Rejects non-loopback peers
/// 2. Performs the WebSocket upgrade
/// 3. Requires the token handshake as the first frame
/// 4. Routes invoke frames to bound hooks while a writer task forwards
///    scripts addressed to this client
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    auth_token: String,
    shared: Arc<WsShared>,
) -> Result<(), BridgeError> {
    if !addr.ip().is_loopback() {
        warn!("Rejected non-loopback connection from {addr}");
        return Ok(());
    }

    let ws_stream = accept_async(stream)
        .await
        .map_err(|e| BridgeError::Handshake {
            message: format!("WebSocket handshake failed: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?;

    let (mut write, mut read) = ws_stream.split();
    let mut state = ConnectionState::new(auth_token);

    let token = match read.next().await {
        Some(Ok(Message::Text(text))) => match serde_json::from_str::<AuthFrame>(text.as_str()) {
            Ok(frame) => frame.token,
            Err(_) => {
                warn!("Client {addr} auth failed: first frame was not a handshake");
                return Ok(());
            }
        },
        Some(Ok(_)) => {
            warn!("Client {addr} sent a non-text first frame");
            return Ok(());
        }
        Some(Err(e)) => {
            return Err(BridgeError::Read {
                message: format!("Error reading handshake: {e}"),
                location: ErrorLocation::from(Location::caller()),
            });
        }
        None => {
            debug!("Client {addr} disconnected before the handshake");
            return Ok(());
        }
    };

    if !state.validate_token(&token) {
        send_auth_reply(&mut write, false, Some("Invalid authentication token")).await?;
        warn!("Client {addr} auth failed: invalid token");
        return Ok(());
    }

    // Registered before the reply so no broadcast after the handshake is missed.
    let client_id = Uuid::new_v4();
    let (outbound, mut outbound_rx) = unbounded_channel::<Message>();
    shared.clients.insert(client_id, outbound);

    if let Err(e) = send_auth_reply(&mut write, true, None).await {
        shared.clients.remove(&client_id);
        return Err(e);
    }
    info!("Client {addr} authenticated");

    let writer = TokioSpawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if let Err(e) = write.send(frame).await {
                debug!("Write to client failed: {e}");
                break;
            }
        }
        let _ = write.close().await;
    });

    let result = read_loop(&mut read, addr, client_id, &shared).await;

    shared.clients.remove(&client_id);
    writer.abort();
    info!("Client {addr} disconnected");
    result
}

async fn read_loop(
    read: &mut WsSource,
    addr: SocketAddr,
    client_id: Uuid,
    shared: &WsShared,
) -> Result<(), BridgeError> {
    while let Some(frame) = read.next().await {
        match frame {
            Ok(Message::Text(text)) => route_frame(text.as_str(), addr, client_id, shared),
            Ok(Message::Close(_)) => break,
            Ok(_) => debug!("Ignoring non-text frame from {addr}"),
            Err(e) => {
                return Err(BridgeError::Read {
                    message: format!("Error reading frame: {e}"),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
        }
    }
    Ok(())
}

fn route_frame(text: &str, addr: SocketAddr, client_id: Uuid, shared: &WsShared) {
    let frame: InvokeFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Client {addr} sent an invalid frame: {e}");
            return;
        }
    };

    let id = match frame.id {
        Value::String(id) => namespaced_id(client_id, &id),
        Value::Number(id) => namespaced_id(client_id, &id.to_string()),
        other => {
            warn!("Client {addr} sent a frame with an invalid id: {other}");
            return;
        }
    };

    let raw = match frame.request {
        Value::String(raw) => raw,
        other => other.to_string(),
    };

    let Some(callback) = shared.hooks.get(&frame.hook).map(|hook| Arc::clone(hook.value())) else {
        warn!("Client {addr} called unbound hook '{}'", frame.hook);
        return;
    };
    callback(id, raw);
}

async fn send_auth_reply(
    write: &mut WsSink,
    authenticated: bool,
    error: Option<&str>,
) -> Result<(), BridgeError> {
    let reply = serde_json::to_string(&AuthReply {
        authenticated,
        error,
    })
    .map_err(|e| BridgeError::Send {
        message: format!("Failed to encode auth reply: {e}"),
        location: ErrorLocation::from(Location::caller()),
    })?;

    write
        .send(Message::Text(reply.into()))
        .await
        .map_err(|e| BridgeError::Send {
            message: format!("Failed to send auth reply: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })
}
