use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// The interchangeable completion services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendId {
    Claude,
    OpenAI,
    Gemini,
}

impl BackendId {
    pub const ALL: [BackendId; 3] = [BackendId::Claude, BackendId::OpenAI, BackendId::Gemini];

    pub fn as_str(self) -> &'static str {
        match self {
            BackendId::Claude => "claude",
            BackendId::OpenAI => "openai",
            BackendId::Gemini => "gemini",
        }
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "claude" | "anthropic" => Ok(BackendId::Claude),
            "openai" | "gpt" => Ok(BackendId::OpenAI),
            "gemini" | "google" => Ok(BackendId::Gemini),
            other => Err(format!("unknown backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// Timeout, network failure or malformed response. Worth retrying.
    #[error("transient failure: {0}")]
    Transient(String),
    /// Missing or rejected credentials, unknown model. Retrying will not help.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// A text-completion capability. Implemented over HTTP in [`crate::llm`] and by
/// scripted doubles in tests.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, BackendError>;
}

/// Snapshot of which backends can be called during a run.
///
/// Availability is decided once when the registry is built: a backend is available
/// exactly when an implementation has been registered for it.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: BTreeMap<BackendId, Arc<dyn Backend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: BackendId, backend: Arc<dyn Backend>) -> Self {
        self.backends.insert(id, backend);
        self
    }

    pub fn is_available(&self, id: BackendId) -> bool {
        self.backends.contains_key(&id)
    }

    pub fn get(&self, id: BackendId) -> Option<&Arc<dyn Backend>> {
        self.backends.get(&id)
    }

    pub fn available(&self) -> Vec<BackendId> {
        self.backends.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("available", &self.available())
            .finish()
    }
}

/// Preferred alternate for each backend once its retry budget is spent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackTable {
    preferred: BTreeMap<BackendId, BackendId>,
}

impl Default for FallbackTable {
    fn default() -> Self {
        Self::new([
            (BackendId::Claude, BackendId::OpenAI),
            (BackendId::OpenAI, BackendId::Gemini),
            (BackendId::Gemini, BackendId::Claude),
        ])
    }
}

impl FallbackTable {
    pub fn new(edges: impl IntoIterator<Item = (BackendId, BackendId)>) -> Self {
        Self {
            preferred: edges.into_iter().collect(),
        }
    }

    pub fn preferred(&self, from: BackendId) -> Option<BackendId> {
        self.preferred.get(&from).copied()
    }

    /// Picks the alternate for `exhausted`: its preferred neighbour when that one is
    /// available, otherwise the first other available backend.
    pub fn resolve(&self, exhausted: BackendId, registry: &BackendRegistry) -> Option<BackendId> {
        self.preferred(exhausted)
            .filter(|alt| *alt != exhausted && registry.is_available(*alt))
            .or_else(|| {
                BackendId::ALL
                    .into_iter()
                    .find(|id| *id != exhausted && registry.is_available(*id))
            })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays a fixed list of outcomes, then repeats the last one.
    pub struct ScriptedBackend {
        script: Mutex<VecDeque<Result<String, BackendError>>>,
        last: Mutex<Option<Result<String, BackendError>>>,
        calls: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedBackend {
        pub fn new(script: Vec<Result<String, BackendError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                last: Mutex::new(None),
                calls: Mutex::new(Vec::new()),
            })
        }

        pub fn always(text: &str) -> Arc<Self> {
            Self::new(vec![Ok(text.to_string())])
        }

        pub fn failing() -> Arc<Self> {
            Self::new(vec![Err(BackendError::Transient("connection reset".into()))])
        }

        pub fn failing_then(failures: usize, text: &str) -> Arc<Self> {
            let mut script: Vec<_> = (0..failures)
                .map(|_| Err(BackendError::Transient("timeout".into())))
                .collect();
            script.push(Ok(text.to_string()));
            Self::new(script)
        }

        pub fn calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub fn requests(&self) -> Vec<CompletionRequest> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Backend for ScriptedBackend {
        async fn complete(&self, request: &CompletionRequest) -> Result<String, BackendError> {
            self.calls.lock().unwrap().push(request.clone());
            let next = self.script.lock().unwrap().pop_front();
            let mut last = self.last.lock().unwrap();
            match next {
                Some(outcome) => {
                    *last = Some(outcome.clone());
                    outcome
                }
                None => last
                    .clone()
                    .unwrap_or_else(|| Err(BackendError::Transient("empty script".into()))),
            }
        }
    }
}
