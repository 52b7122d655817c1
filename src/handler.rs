//! WebSocket connection handler
//!
//! Handles individual client connections: WebSocket handshake, envelope
//! decoding, and bidirectional communication with the registry actor.
//! Each frame carries exactly one serialized envelope.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::envelope::Envelope;
use crate::error::AppError;
use crate::registry::RegistryCommand;
use crate::types::SessionId;

/// Handle a new TCP connection
///
/// Performs the WebSocket handshake, registers the session with the
/// registry, and pumps frames in both directions until either side goes
/// away. The registry answers malformed frames; a bad frame here never
/// takes down the process or any other connection.
pub async fn handle_connection(
    stream: TcpStream,
    cmd_tx: mpsc::Sender<RegistryCommand>,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    // WebSocket handshake
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let session_id = SessionId::new();
    info!("Session {} connected from {}", session_id, peer_addr);

    // Channel for registry -> client envelopes
    let (msg_tx, mut msg_rx) = mpsc::channel::<Envelope>(32);

    // Register with the registry; this also arms the logon-grace timer
    if cmd_tx
        .send(RegistryCommand::Connect {
            session_id,
            sender: msg_tx,
        })
        .await
        .is_err()
    {
        error!("Failed to register session {} - registry closed", session_id);
        return Err(AppError::RegistryClosed);
    }

    // Clone cmd_tx for the read task
    let cmd_tx_read = cmd_tx.clone();

    // Spawn read task (WebSocket frame -> RegistryCommand)
    let read_task = tokio::spawn(async move {
        while let Some(msg_result) = ws_receiver.next().await {
            match msg_result {
                Ok(Message::Text(text)) => {
                    let cmd = match Envelope::read(&text) {
                        Ok(envelope) => RegistryCommand::Incoming {
                            session_id,
                            envelope,
                        },
                        Err(e) => {
                            warn!("Undecodable frame from {}: {}", session_id, e);
                            RegistryCommand::Malformed {
                                session_id,
                                detail: e.to_string(),
                            }
                        }
                    };
                    if cmd_tx_read.send(cmd).await.is_err() {
                        debug!("Registry closed, ending read task for {}", session_id);
                        break;
                    }
                }
                Ok(Message::Close(_)) => {
                    debug!("Session {} sent close frame", session_id);
                    break;
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                    // Pong is handled automatically by tungstenite
                }
                Ok(_) => {
                    // Binary or other frame types - ignore
                }
                Err(e) => {
                    error!("WebSocket error for {}: {}", session_id, e);
                    break;
                }
            }
        }
        debug!("Read task ended for {}", session_id);
    });

    // Spawn write task (Envelope -> WebSocket frame). The task ends when
    // the registry drops this session's sender, which is how the server
    // closes a connection.
    let write_task = tokio::spawn(async move {
        while let Some(envelope) = msg_rx.recv().await {
            match serde_json::to_string(&envelope) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, ending write task");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize envelope: {}", e);
                    // Continue - don't break on serialization errors
                }
            }
        }
        debug!("Write task ended for session");

        // Send close frame when done
        let _ = ws_sender.close().await;
    });

    // Wait for either task to complete
    tokio::select! {
        _ = read_task => {
            debug!("Read task completed for {}", session_id);
        }
        _ = write_task => {
            debug!("Write task completed for {}", session_id);
        }
    }

    // Funnel into the registry's idempotent close path
    let _ = cmd_tx
        .send(RegistryCommand::Disconnect { session_id })
        .await;

    info!("Session {} disconnected", session_id);

    Ok(())
}
