//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::ImageInput;
use crate::error::PipelineError;
use crate::session::{PipelineStage, QuizSession};

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    Subscribe {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    StartGeneration {
        #[serde(rename = "sessionId")]
        session_id: String,
        #[serde(default, rename = "imageDataUri")]
        image_data_uri: Option<String>,
        #[serde(default, rename = "imageBase64")]
        image_base64: Option<String>,
        #[serde(default)]
        mime: Option<String>,
    },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Progress(SessionSnapshotOut),
    GenerationFinished {
        ok: bool,
        stage: PipelineStage,
        error: Option<String>,
    },
    Error {
        message: String,
    },
}

/// Generation progress and quiz bookkeeping for one session.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshotOut {
    pub session_id: String,
    pub run: u64,
    pub stage: PipelineStage,
    pub progress: u8,
    pub status: String,
    pub error: Option<String>,
    pub image_preview: Option<String>,
    pub question_count: usize,
    pub answered_count: usize,
    pub current_index: usize,
    pub started_at: Option<u64>,
    pub ended_at: Option<u64>,
    pub submitted: bool,
}

/// Convert the internal session state to the public snapshot.
pub fn to_snapshot(session_id: &str, s: &QuizSession) -> SessionSnapshotOut {
    SessionSnapshotOut {
        session_id: session_id.to_string(),
        run: s.run,
        stage: s.stage,
        progress: s.progress,
        status: s.status.clone(),
        error: s.error.clone(),
        image_preview: s.image_preview.clone(),
        question_count: s.questions.len(),
        answered_count: s.answered_count(),
        current_index: s.current_index,
        started_at: s.started_at_ms,
        ended_at: s.ended_at_ms,
        submitted: s.is_submitted(),
    }
}

//
// HTTP request/response DTOs
//

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionOut {
    pub session_id: String,
}

/// Image upload: either a full data URI or raw base64 plus mime type.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateIn {
    #[serde(default)]
    pub image_data_uri: Option<String>,
    #[serde(default)]
    pub image_base64: Option<String>,
    #[serde(default)]
    pub mime: Option<String>,
}

impl GenerateIn {
    /// Decode the uploaded image; `Ok(None)` when nothing was sent.
    pub fn into_image(self) -> Result<Option<ImageInput>, PipelineError> {
        if let Some(uri) = self.image_data_uri.filter(|u| !u.trim().is_empty()) {
            return ImageInput::from_data_uri(&uri).map(Some);
        }
        match self.image_base64.filter(|b| !b.trim().is_empty()) {
            Some(b64) => {
                let mime = self.mime.unwrap_or_else(|| "image/jpeg".into());
                ImageInput::from_base64(&b64, &mime).map(Some)
            }
            None => Ok(None),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateOut {
    pub session_id: String,
    pub run: u64,
    pub stage: PipelineStage,
}

#[derive(Deserialize)]
pub struct GotoIn {
    pub index: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerIn {
    #[serde(default)]
    pub question_index: Option<usize>,
    pub option_index: usize,
}

#[derive(Serialize)]
pub struct ErrorOut {
    pub error: String,
    pub kind: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthOut {
    pub ok: bool,
    pub prompt_service: String,
    pub exam: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_generation_message_carries_image_fields() {
        let msg: ClientWsMessage = serde_json::from_str(
            r#"{"type":"start_generation","sessionId":"s","imageBase64":"AQID","mime":"image/png"}"#,
        )
        .unwrap();
        match msg {
            ClientWsMessage::StartGeneration { session_id, image_data_uri, image_base64, mime } => {
                assert_eq!(session_id, "s");
                let upload = GenerateIn { image_data_uri, image_base64, mime };
                let img = upload.into_image().unwrap().unwrap();
                assert_eq!(img.bytes, vec![1, 2, 3]);
                assert_eq!(img.mime, "image/png");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn empty_upload_decodes_to_none() {
        assert_eq!(GenerateIn::default().into_image(), Ok(None));
        let blank = GenerateIn { image_data_uri: Some("  ".into()), ..Default::default() };
        assert_eq!(blank.into_image(), Ok(None));
    }

    #[test]
    fn progress_message_is_tagged() {
        let snap = to_snapshot("s", &QuizSession::default());
        let v = serde_json::to_value(ServerWsMessage::Progress(snap)).unwrap();
        assert_eq!(v["type"], "progress");
        assert_eq!(v["stage"], "idle");
        assert_eq!(v["questionCount"], 0);
    }
}
