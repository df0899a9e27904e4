//! WebSocket connection handler
//!
//! Handles individual client connections: WebSocket handshake,
//! message parsing, and bidirectional communication with the Coordinator.
//!
//! A connection follows at most one session. Creating or joining a session
//! subscribes the connection to that session's updates, which a forwarder
//! task relays into the connection's outgoing queue.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::coordinator::Coordinator;
use crate::error::{AppError, SendError};
use crate::message::{ClientMessage, ServerMessage};
use crate::types::{ClientId, Points, SessionCode};
use crate::worker::Joined;

/// Outgoing queue size per connection
const CLIENT_BUFFER_SIZE: usize = 32;

/// Handle a new TCP connection
///
/// Performs WebSocket handshake, sets up bidirectional communication,
/// and manages the connection lifecycle.
pub async fn handle_connection(
    stream: TcpStream,
    coordinator: Coordinator,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    // WebSocket handshake
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Generate client ID
    let client_id = ClientId::new();
    info!("Client {} connected from {}", client_id, peer_addr);

    // Create channel for server -> client messages
    let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(CLIENT_BUFFER_SIZE);

    // Send connection success message
    let connected_msg = ServerMessage::Connected {
        client_id: client_id.to_string(),
    };
    let json = serde_json::to_string(&connected_msg)?;
    ws_sender.send(Message::Text(json.into())).await?;

    let mut connection = Connection::new(client_id, coordinator, msg_tx);

    // Spawn read task (WebSocket -> Coordinator)
    let mut read_task = tokio::spawn(async move {
        while let Some(msg_result) = ws_receiver.next().await {
            match msg_result {
                Ok(Message::Text(text)) => {
                    let result = match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(client_msg) => connection.dispatch(client_msg).await,
                        Err(e) => {
                            warn!("Invalid JSON from {}: {}", client_id, e);
                            Err(AppError::Json(e))
                        }
                    };
                    if let Err(e) = result {
                        debug!("Command from {} failed: {}", client_id, e);
                        if connection.deliver(e.into()).await.is_err() {
                            break;
                        }
                    }
                }
                Ok(Message::Close(_)) => {
                    debug!("Client {} sent close frame", client_id);
                    break;
                }
                Ok(Message::Ping(_)) => {
                    // Pong is handled automatically by tungstenite
                    debug!("Ping from {}", client_id);
                }
                Ok(Message::Pong(_)) => {
                    debug!("Pong from {}", client_id);
                }
                Ok(_) => {
                    // Binary or other message types - ignore
                }
                Err(e) => {
                    error!("WebSocket error for {}: {}", client_id, e);
                    break;
                }
            }
        }
        debug!("Read task ended for {}", client_id);
    });

    // Spawn write task (ServerMessage -> WebSocket)
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = msg_rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, ending write task");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                    // Continue - don't break on serialization errors
                }
            }
        }
        debug!("Write task ended for client");

        // Send close frame when done
        let _ = ws_sender.close().await;
    });

    // Wait for either task to complete, then stop the other
    tokio::select! {
        _ = &mut read_task => {
            debug!("Read task completed for {}", client_id);
        }
        _ = &mut write_task => {
            debug!("Write task completed for {}", client_id);
        }
    }
    read_task.abort();
    write_task.abort();

    info!("Client {} disconnected", client_id);

    Ok(())
}

/// Per-connection state owned by the read task
struct Connection {
    client_id: ClientId,
    coordinator: Coordinator,
    sender: mpsc::Sender<ServerMessage>,
    /// Session this connection follows
    session: Option<SessionCode>,
    /// Task relaying session updates into `sender`
    forwarder: Option<JoinHandle<()>>,
}

impl Connection {
    fn new(client_id: ClientId, coordinator: Coordinator, sender: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            client_id,
            coordinator,
            sender,
            session: None,
            forwarder: None,
        }
    }

    /// Run one client message against the coordinator
    ///
    /// Results of game commands reach the client through the session
    /// broadcast; only create/join answer the requester directly.
    async fn dispatch(&mut self, msg: ClientMessage) -> Result<(), AppError> {
        match msg {
            ClientMessage::CreateSession {
                player_names,
                starting_score,
            } => {
                let joined = self.coordinator.create(player_names, starting_score).await?;
                let code = SessionCode(joined.snapshot.session_code.clone());
                info!("Client {} created session {}", self.client_id, code);
                self.follow(code, joined).await?;
            }
            ClientMessage::JoinSession { session_code } => {
                let code = SessionCode::from_string(session_code);
                let joined = self.coordinator.join(&code).await?;
                info!("Client {} joined session {}", self.client_id, code);
                self.follow(code, joined).await?;
            }
            ClientMessage::StartGame { expected_version } => {
                let code = self.current()?;
                self.coordinator.start(&code, expected_version).await?;
            }
            ClientMessage::Throw {
                points,
                expected_version,
            } => {
                let points = Points::new(points)?;
                let code = self.current()?;
                debug!("Throw from {} for session {}: {} points", self.client_id, code, points);
                self.coordinator.throw(&code, points, expected_version).await?;
            }
            ClientMessage::Undo { expected_version } => {
                let code = self.current()?;
                self.coordinator.undo(&code, expected_version).await?;
            }
            ClientMessage::NextPlayer { expected_version } => {
                let code = self.current()?;
                self.coordinator.next_player(&code, expected_version).await?;
            }
            ClientMessage::ResetGame { expected_version } => {
                let code = self.current()?;
                self.coordinator.reset(&code, expected_version).await?;
            }
            ClientMessage::Sync => {
                let code = self.current()?;
                self.coordinator.sync(&code).await?;
            }
            ClientMessage::DeleteSession => {
                let code = self.current()?;
                self.coordinator.delete(&code).await?;
                // The forwarder delivers the deletion notice, then ends
                self.session = None;
                self.forwarder = None;
            }
            ClientMessage::LeaveSession => {
                let code = self.current()?;
                self.unfollow();
                info!("Client {} left session {}", self.client_id, code);
                self.deliver(ServerMessage::SessionLeft).await?;
            }
        }
        Ok(())
    }

    /// Send a message to this client
    async fn deliver(&self, msg: ServerMessage) -> Result<(), SendError> {
        self.sender
            .send(msg)
            .await
            .map_err(|_| SendError::ChannelClosed)
    }

    fn current(&self) -> Result<SessionCode, AppError> {
        self.session.clone().ok_or(AppError::NotInSession)
    }

    /// Switch this connection to a new session
    async fn follow(&mut self, code: SessionCode, joined: Joined) -> Result<(), AppError> {
        self.unfollow();
        self.deliver(ServerMessage::SessionJoined(joined.snapshot)).await?;

        let forwarder = tokio::spawn(forward_updates(
            self.client_id,
            code.clone(),
            joined.updates,
            self.sender.clone(),
        ));
        self.session = Some(code);
        self.forwarder = Some(forwarder);
        Ok(())
    }

    fn unfollow(&mut self) {
        self.session = None;
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.unfollow();
    }
}

/// Relay session updates to one client until the session or client is gone
async fn forward_updates(
    client_id: ClientId,
    code: SessionCode,
    mut updates: broadcast::Receiver<ServerMessage>,
    sender: mpsc::Sender<ServerMessage>,
) {
    loop {
        match updates.recv().await {
            Ok(msg) => {
                if sender.send(msg).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(
                    "Client {} skipped {} updates of session {}",
                    client_id, skipped, code
                );
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    debug!("Stopped forwarding session {} to {}", code, client_id);
}
