//! Application state: the in-memory session registry, the prompt service and config.
//!
//! This module owns:
//!   - quiz sessions by id (one per browser tab, never persisted, evicted once idle)
//!   - the agent config (exam profile + prompts, from TOML or defaults)
//!   - the prompt service (OpenAI when configured, otherwise a stand-in that fails every call)

use std::{collections::HashMap, fmt::Display, sync::Arc, time::Duration};
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::{load_agent_config_from_env, AgentConfig};
use crate::openai::OpenAI;
use crate::pipeline::GenerationPipeline;
use crate::quiz::QuizRunner;
use crate::service::{PromptService, Unconfigured};
use crate::session::SessionHandle;
use crate::util::now_ms;

/// Request bodies carry the page photo as base64, so allow well above a phone picture.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<RwLock<HashMap<String, SessionHandle>>>,
    pub service: Arc<dyn PromptService>,
    pub config: AgentConfig,
    pub static_dir: String,
    pub max_upload_bytes: usize,
    /// Sessions untouched for this long are dropped by the sweeper.
    pub session_ttl: Duration,
    pub sweep_interval: Duration,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

/// Pick the prompt service from the outcome of building the OpenAI client.
pub fn select_service<E: Display>(built: Result<Option<OpenAI>, E>, config: &AgentConfig) -> Arc<dyn PromptService> {
    match built {
        Ok(Some(oa)) => {
            info!(target: "scantest_backend", base_url = %oa.base_url, vision_model = %oa.vision_model, text_model = %oa.text_model, exam = %config.exam.name, "OpenAI enabled.");
            Arc::new(oa)
        }
        Ok(None) => {
            warn!(target: "scantest_backend", "OpenAI disabled (no OPENAI_API_KEY). Test generation will fail until it is set.");
            Arc::new(Unconfigured)
        }
        Err(e) => {
            error!(target: "scantest_backend", error = %e, "OpenAI disabled: HTTP client could not be built. Test generation will fail.");
            Arc::new(Unconfigured)
        }
    }
}

impl AppState {
    /// Build state from env: load config, init the OpenAI client.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let config = load_agent_config_from_env().unwrap_or_default();
        let service = select_service(OpenAI::from_env(&config), &config);

        let static_dir = std::env::var("STATIC_DIR").unwrap_or_else(|_| "./static".into());
        let mut state = Self::with_service(config, service, static_dir);
        if let Some(bytes) = env_parse::<usize>("MAX_UPLOAD_BYTES") {
            state.max_upload_bytes = bytes;
        }
        if let Some(secs) = env_parse::<u64>("SESSION_TTL_SECS") {
            state.session_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("SESSION_SWEEP_SECS").filter(|s| *s > 0) {
            state.sweep_interval = Duration::from_secs(secs);
        }
        info!(
            target: "scantest_backend",
            max_upload_bytes = state.max_upload_bytes,
            session_ttl_secs = state.session_ttl.as_secs(),
            sweep_secs = state.sweep_interval.as_secs(),
            "Session limits configured"
        );
        state
    }

    pub fn with_service(config: AgentConfig, service: Arc<dyn PromptService>, static_dir: String) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            service,
            config,
            static_dir,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            session_ttl: DEFAULT_SESSION_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    pub fn pipeline(&self) -> GenerationPipeline {
        GenerationPipeline::new(Arc::clone(&self.service))
    }

    /// Register a fresh, empty session.
    #[instrument(level = "info", skip(self))]
    pub async fn create_session(&self) -> SessionHandle {
        let id = Uuid::new_v4().to_string();
        let handle = SessionHandle::new(id.clone());
        let total = {
            let mut sessions = self.sessions.write().await;
            sessions.insert(id.clone(), handle.clone());
            sessions.len()
        };
        info!(target: "scantest_backend", session = %id, total, "Session created");
        handle
    }

    /// Look up a session and mark it as active.
    #[instrument(level = "debug", skip(self), fields(%id))]
    pub async fn session(&self, id: &str) -> Option<SessionHandle> {
        let handle = self.sessions.read().await.get(id).cloned()?;
        handle.touch(now_ms());
        Some(handle)
    }

    pub async fn quiz(&self, id: &str) -> Option<QuizRunner> {
        self.session(id).await.map(QuizRunner::new)
    }

    /// Drop a session (tab closed / navigated away). Returns whether it existed.
    #[instrument(level = "info", skip(self), fields(%id))]
    pub async fn remove_session(&self, id: &str) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    /// Drop sessions idle for at least `session_ttl` as of `now_ms`.
    /// Sessions with a generation run in flight are kept. Returns how many were dropped.
    pub async fn evict_idle(&self, now_ms: u64) -> usize {
        let ttl_ms = u64::try_from(self.session_ttl.as_millis()).unwrap_or(u64::MAX);
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, handle| {
            now_ms.saturating_sub(handle.last_seen_ms()) < ttl_ms || handle.snapshot().stage.is_running()
        });
        let evicted = before - sessions.len();
        if evicted > 0 {
            info!(target: "scantest_backend", evicted, remaining = sessions.len(), "Idle sessions evicted");
        }
        evicted
    }

    /// Background loop evicting idle sessions every `sweep_interval`.
    pub async fn run_session_sweeper(self: Arc<Self>) {
        info!(
            target: "scantest_backend",
            "Starting session sweeper (interval {}s, ttl {}s)",
            self.sweep_interval.as_secs(),
            self.session_ttl.as_secs()
        );
        loop {
            sleep(self.sweep_interval).await;
            let evicted = self.evict_idle(now_ms()).await;
            debug!(target: "scantest_backend", evicted, "Session sweep completed");
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
