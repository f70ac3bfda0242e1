use crate::backend::{BackendError, BackendId, BackendRegistry, CompletionRequest, FallbackTable};
use crate::error::AnalysisError;
use crate::stats::{CallAttempt, RunStatistics};
use crate::word_count::truncate_chars;
use chrono::Utc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
    pub timeout: Duration,
    pub fallback_enabled: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(3),
            timeout: Duration::from_secs(120),
            fallback_enabled: true,
        }
    }
}

/// Why a backend produced nothing.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Exhaustion {
    /// Not registered, or rejected the request as unauthorised. No retry budget spent
    /// beyond the rejected attempt.
    Unavailable,
    /// Every attempt failed transiently.
    Exhausted,
}

/// Uniform entry point to the backends.
///
/// Each logical call makes up to `max_attempts` attempts on the requested backend,
/// then at most one hop to an alternate chosen by the [`FallbackTable`], with its own
/// full attempt budget and no further fallback.
#[derive(Debug, Clone)]
pub struct CompletionGateway {
    registry: BackendRegistry,
    fallback: FallbackTable,
    policy: RetryPolicy,
}

impl CompletionGateway {
    pub fn new(registry: BackendRegistry, fallback: FallbackTable, policy: RetryPolicy) -> Self {
        Self {
            registry,
            fallback,
            policy,
        }
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn invoke(
        &self,
        request: &CompletionRequest,
        backend: BackendId,
        stats: &mut RunStatistics,
    ) -> Result<String, AnalysisError> {
        let primary_failure = match self.attempt_backend(request, backend, stats).await {
            Ok(text) => return Ok(text),
            Err(failure) => failure,
        };

        let no_output = |fallback: Option<BackendId>| match primary_failure {
            Exhaustion::Unavailable if fallback.is_none() => AnalysisError::BackendUnavailable(backend),
            _ => AnalysisError::NoOutput {
                primary: backend,
                fallback,
            },
        };

        if !self.policy.fallback_enabled {
            return Err(no_output(None));
        }

        let Some(alternate) = self.fallback.resolve(backend, &self.registry) else {
            warn!(backend = %backend, "no alternate backend available");
            return Err(no_output(None));
        };

        warn!(from = %backend, to = %alternate, "falling back");
        stats.record_fallback();

        match self.attempt_backend(request, alternate, stats).await {
            Ok(text) => Ok(text),
            Err(_) => Err(no_output(Some(alternate))),
        }
    }

    async fn attempt_backend(
        &self,
        request: &CompletionRequest,
        backend: BackendId,
        stats: &mut RunStatistics,
    ) -> Result<String, Exhaustion> {
        let Some(client) = self.registry.get(backend) else {
            debug!(backend = %backend, "backend not configured, skipping retries");
            return Err(Exhaustion::Unavailable);
        };

        let max_attempts = self.policy.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            let started_at = Utc::now();
            let clock = Instant::now();

            let outcome = match tokio::time::timeout(self.policy.timeout, client.complete(request)).await {
                Ok(Ok(text)) if !text.trim().is_empty() => Ok(text),
                Ok(Ok(_)) => Err(BackendError::Transient("empty response".to_string())),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(BackendError::Transient(format!(
                    "timed out after {}s",
                    self.policy.timeout.as_secs_f64()
                ))),
            };

            stats.record_attempt(&CallAttempt {
                backend,
                started_at,
                duration: clock.elapsed(),
                succeeded: outcome.is_ok(),
            });

            match outcome {
                Ok(text) => return Ok(text),
                Err(BackendError::Unavailable(reason)) => {
                    warn!(backend = %backend, "backend rejected the request: {}", truncate_chars(&reason, 120));
                    return Err(Exhaustion::Unavailable);
                }
                Err(BackendError::Transient(reason)) => {
                    warn!(
                        backend = %backend,
                        "attempt {}/{} failed: {}",
                        attempt,
                        max_attempts,
                        truncate_chars(&reason, 120)
                    );
                    if attempt < max_attempts && !self.policy.backoff.is_zero() {
                        tokio::time::sleep(self.policy.backoff).await;
                    }
                }
            }
        }

        warn!(backend = %backend, "giving up after {} attempts", max_attempts);
        Err(Exhaustion::Exhausted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::test_support::ScriptedBackend;
    use async_trait::async_trait;
    use std::sync::Arc;

    fn request() -> CompletionRequest {
        CompletionRequest {
            system_prompt: "You review physics.".to_string(),
            user_prompt: "Check this derivation.".to_string(),
            temperature: 0.25,
            max_tokens: 4000,
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            backoff: Duration::ZERO,
            timeout: Duration::from_secs(5),
            fallback_enabled: true,
        }
    }

    fn gateway(registry: BackendRegistry) -> CompletionGateway {
        CompletionGateway::new(registry, FallbackTable::default(), policy())
    }

    #[tokio::test]
    async fn retries_until_success_without_fallback() {
        let claude = ScriptedBackend::failing_then(2, "rigorous");
        let openai = ScriptedBackend::always("unused");
        let gw = gateway(
            BackendRegistry::new()
                .with(BackendId::Claude, claude.clone())
                .with(BackendId::OpenAI, openai.clone()),
        );
        let mut stats = RunStatistics::new();

        let text = gw.invoke(&request(), BackendId::Claude, &mut stats).await.unwrap();

        assert_eq!(text, "rigorous");
        assert_eq!(claude.calls(), 3);
        assert_eq!(openai.calls(), 0);
        assert_eq!(stats.total_calls, 3);
        assert_eq!(stats.total_errors, 2);
        assert_eq!(stats.total_fallbacks, 0);
        assert_eq!(stats.durations[&BackendId::Claude].len(), 1);
    }

    #[tokio::test]
    async fn falls_back_once_after_exhaustion() {
        let claude = ScriptedBackend::failing();
        let openai = ScriptedBackend::always("from openai");
        let gw = gateway(
            BackendRegistry::new()
                .with(BackendId::Claude, claude.clone())
                .with(BackendId::OpenAI, openai.clone()),
        );
        let mut stats = RunStatistics::new();

        let text = gw.invoke(&request(), BackendId::Claude, &mut stats).await.unwrap();

        assert_eq!(text, "from openai");
        assert_eq!(claude.calls(), 3);
        assert_eq!(stats.total_fallbacks, 1);
        assert_eq!(stats.total_calls, 4);
        assert_eq!(stats.errors[&BackendId::Claude], 3);
        assert_eq!(openai.requests()[0], request());
    }

    #[tokio::test]
    async fn no_fallback_chain_beyond_one_hop() {
        let claude = ScriptedBackend::failing();
        let openai = ScriptedBackend::failing();
        let gemini = ScriptedBackend::always("never reached");
        let gw = gateway(
            BackendRegistry::new()
                .with(BackendId::Claude, claude.clone())
                .with(BackendId::OpenAI, openai.clone())
                .with(BackendId::Gemini, gemini.clone()),
        );
        let mut stats = RunStatistics::new();

        let err = gw.invoke(&request(), BackendId::Claude, &mut stats).await.unwrap_err();

        assert_eq!(
            err,
            AnalysisError::NoOutput {
                primary: BackendId::Claude,
                fallback: Some(BackendId::OpenAI),
            }
        );
        assert!(err.is_no_output());
        assert_eq!(gemini.calls(), 0);
        assert_eq!(stats.total_calls, 6);
        assert_eq!(stats.total_errors, 6);
        assert_eq!(stats.total_fallbacks, 1);
    }

    #[tokio::test]
    async fn unregistered_backend_skips_straight_to_fallback() {
        let gemini = ScriptedBackend::always("style notes");
        let gw = gateway(BackendRegistry::new().with(BackendId::Gemini, gemini.clone()));
        let mut stats = RunStatistics::new();

        let text = gw.invoke(&request(), BackendId::OpenAI, &mut stats).await.unwrap();

        assert_eq!(text, "style notes");
        assert_eq!(stats.total_calls, 1);
        assert_eq!(stats.total_errors, 0);
        assert_eq!(stats.total_fallbacks, 1);
    }

    #[tokio::test]
    async fn unavailable_without_alternate_is_reported_as_such() {
        let gw = gateway(BackendRegistry::new());
        let mut stats = RunStatistics::new();

        let err = gw.invoke(&request(), BackendId::Claude, &mut stats).await.unwrap_err();

        assert_eq!(err, AnalysisError::BackendUnavailable(BackendId::Claude));
        assert_eq!(stats.total_calls, 0);
        assert_eq!(stats.total_fallbacks, 0);
    }

    #[tokio::test]
    async fn rejected_credentials_stop_retrying() {
        let claude = ScriptedBackend::new(vec![Err(BackendError::Unavailable("401".into()))]);
        let gemini = ScriptedBackend::always("gemini answer");
        let gw = gateway(
            BackendRegistry::new()
                .with(BackendId::Claude, claude.clone())
                .with(BackendId::Gemini, gemini),
        );
        let mut stats = RunStatistics::new();

        let text = gw.invoke(&request(), BackendId::Claude, &mut stats).await.unwrap();

        assert_eq!(text, "gemini answer");
        assert_eq!(claude.calls(), 1);
        assert_eq!(stats.total_calls, 2);
        assert_eq!(stats.total_fallbacks, 1);
    }

    #[tokio::test]
    async fn disabled_fallback_fails_after_primary() {
        let claude = ScriptedBackend::failing();
        let openai = ScriptedBackend::always("unused");
        let gw = CompletionGateway::new(
            BackendRegistry::new()
                .with(BackendId::Claude, claude)
                .with(BackendId::OpenAI, openai.clone()),
            FallbackTable::default(),
            RetryPolicy {
                fallback_enabled: false,
                ..policy()
            },
        );
        let mut stats = RunStatistics::new();

        let err = gw.invoke(&request(), BackendId::Claude, &mut stats).await.unwrap_err();

        assert_eq!(
            err,
            AnalysisError::NoOutput {
                primary: BackendId::Claude,
                fallback: None
            }
        );
        assert_eq!(openai.calls(), 0);
        assert_eq!(stats.total_calls, 3);
        assert_eq!(stats.total_fallbacks, 0);
    }

    #[tokio::test]
    async fn blank_text_is_treated_as_a_failed_attempt() {
        let claude = ScriptedBackend::new(vec![Ok("   ".to_string()), Ok("real text".to_string())]);
        let gw = gateway(BackendRegistry::new().with(BackendId::Claude, claude.clone()));
        let mut stats = RunStatistics::new();

        let text = gw.invoke(&request(), BackendId::Claude, &mut stats).await.unwrap();

        assert_eq!(text, "real text");
        assert_eq!(stats.total_errors, 1);
    }

    struct Stalled;

    #[async_trait]
    impl crate::backend::Backend for Stalled {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, BackendError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("too late".to_string())
        }
    }

    #[tokio::test]
    async fn slow_backend_times_out_and_falls_back() {
        let openai = ScriptedBackend::always("on time");
        let gw = CompletionGateway::new(
            BackendRegistry::new()
                .with(BackendId::Claude, Arc::new(Stalled))
                .with(BackendId::OpenAI, openai),
            FallbackTable::default(),
            RetryPolicy {
                max_attempts: 2,
                timeout: Duration::from_millis(20),
                ..policy()
            },
        );
        let mut stats = RunStatistics::new();

        let text = gw.invoke(&request(), BackendId::Claude, &mut stats).await.unwrap();

        assert_eq!(text, "on time");
        assert_eq!(stats.errors[&BackendId::Claude], 2);
        assert_eq!(stats.total_fallbacks, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_waits_between_attempts_only() {
        let claude = ScriptedBackend::failing();
        let backoff = Duration::from_secs(3);
        let gw = CompletionGateway::new(
            BackendRegistry::new().with(BackendId::Claude, claude.clone()),
            FallbackTable::default(),
            RetryPolicy {
                max_attempts: 3,
                backoff,
                ..policy()
            },
        );
        let mut stats = RunStatistics::new();

        let started = tokio::time::Instant::now();
        let err = gw
            .invoke(&request(), BackendId::Claude, &mut stats)
            .await
            .unwrap_err();

        assert!(err.is_no_output());
        assert_eq!(claude.calls(), 3);
        assert_eq!(started.elapsed(), backoff * 2);
    }
}
