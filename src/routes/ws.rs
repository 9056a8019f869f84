//! WebSocket upgrade + message loop. Each client message is parsed as JSON.
//! `ping` gets one reply; `subscribe` and `start_generation` stream progress
//! snapshots until the run reaches a terminal stage, answering pings meanwhile.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{debug, error, info, instrument, warn};

use crate::error::StartError;
use crate::protocol::{to_snapshot, ClientWsMessage, GenerateIn, ServerWsMessage};
use crate::session::{PipelineStage, SessionHandle};
use crate::state::AppState;

#[instrument(level = "info", skip(ws, state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "scantest_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "scantest_backend", "WebSocket connected");
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        let result = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "scantest_backend", "WS received: {:?}", &incoming);
            handle_client_ws(&mut socket, incoming, &state).await
          }
          Err(e) => send(&mut socket, &ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) }).await,
        };
        if let Err(e) = result {
          error!(target: "scantest_backend", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "scantest_backend", "WebSocket disconnected");
}

async fn handle_client_ws(socket: &mut WebSocket, msg: ClientWsMessage, state: &AppState) -> Result<(), axum::Error> {
  match msg {
    ClientWsMessage::Ping => send(socket, &ServerWsMessage::Pong).await,

    ClientWsMessage::Subscribe { session_id } => match state.session(&session_id).await {
      Some(session) => stream_progress(socket, &session).await,
      None => send(socket, &unknown_session(&session_id)).await,
    },

    ClientWsMessage::StartGeneration { session_id, image_data_uri, image_base64, mime } => {
      let Some(session) = state.session(&session_id).await else {
        return send(socket, &unknown_session(&session_id)).await;
      };
      let upload = GenerateIn { image_data_uri, image_base64, mime };
      let begun = upload
        .into_image()
        .map_err(StartError::from)
        .and_then(|image| state.pipeline().begin(&session, image));
      match begun {
        Ok(run) => {
          info!(target: "pipeline", session = %session_id, run = run.run_id(), "WS start_generation accepted");
          tokio::spawn(async move {
            let outcome = run.execute().await;
            debug!(target: "pipeline", ?outcome, "WS-started generation finished");
          });
          stream_progress(socket, &session).await
        }
        Err(e) => {
          warn!(target: "pipeline", session = %session_id, error = %e, "WS start_generation rejected");
          send(socket, &ServerWsMessage::Error { message: e.to_string() }).await
        }
      }
    }
  }
}

/// Push a snapshot on every session change while a run is in flight. Sessions
/// that are idle get a single snapshot; terminal ones are followed by
/// `generation_finished`. Client frames keep being read meanwhile: `ping` is
/// answered, other requests are refused until the stream ends.
async fn stream_progress(socket: &mut WebSocket, session: &SessionHandle) -> Result<(), axum::Error> {
  let mut rx = session.subscribe();
  loop {
    let snap = rx.borrow_and_update().clone();
    send(socket, &ServerWsMessage::Progress(to_snapshot(session.id(), &snap))).await?;
    if !snap.stage.is_running() {
      if snap.stage.is_terminal() {
        let finished = ServerWsMessage::GenerationFinished {
          ok: snap.stage == PipelineStage::Succeeded,
          stage: snap.stage,
          error: snap.error.clone(),
        };
        send(socket, &finished).await?;
      }
      return Ok(());
    }
    loop {
      tokio::select! {
        changed = rx.changed() => {
          if changed.is_err() {
            return Ok(());
          }
          break;
        }
        incoming = socket.recv() => match incoming {
          Some(Ok(Message::Text(txt))) => send(socket, &reply_while_streaming(&txt)).await?,
          Some(Ok(Message::Ping(payload))) => { let _ = socket.send(Message::Pong(payload)).await; }
          Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return Ok(()),
          Some(Ok(_)) => {}
        },
      }
    }
  }
}

/// Reply to a client frame that arrives while progress is being streamed.
fn reply_while_streaming(txt: &str) -> ServerWsMessage {
  match serde_json::from_str::<ClientWsMessage>(txt) {
    Ok(ClientWsMessage::Ping) => ServerWsMessage::Pong,
    Ok(_) => ServerWsMessage::Error {
      message: "A generation progress stream is already active on this connection.".into(),
    },
    Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) },
  }
}

fn unknown_session(id: &str) -> ServerWsMessage {
  ServerWsMessage::Error { message: format!("Unknown session: {id}") }
}

async fn send(socket: &mut WebSocket, msg: &ServerWsMessage) -> Result<(), axum::Error> {
  let out = serde_json::to_string(msg).unwrap_or_else(|e| {
    serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
  });
  socket.send(Message::Text(out)).await
}
