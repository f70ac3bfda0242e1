use crate::backend::{BackendId, CompletionRequest};
use crate::error::AnalysisError;
use crate::gateway::CompletionGateway;
use crate::router::{AnalysisRouter, TaskConfig, OUTLINE, SCIENTIFIC, STYLE, SYNTHESIS};
use crate::stats::{RunStatistics, UnitResult};
use crate::structure::{outline, StructuralUnit};
use crate::word_count::truncate_chars;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Prompt and sampling settings for one analysis task.
#[derive(Debug, Clone, Copy)]
pub struct TaskProfile {
    pub name: &'static str,
    pub system_prompt: &'static str,
    pub instruction: &'static str,
    pub temperature: f32,
    /// Longest prefix of the task input, in characters, embedded in the prompt.
    pub input_limit: usize,
    pub placeholder: &'static str,
}

pub const SCIENTIFIC_PROFILE: TaskProfile = TaskProfile {
    name: SCIENTIFIC,
    system_prompt: "You are an expert in applied mathematics and numerical modelling \
                    reviewing a doctoral manuscript.",
    instruction: "Assess the scientific rigour of the following text: soundness of the \
                  reasoning, precision of definitions, justification of hypotheses and \
                  consistency of notation.",
    temperature: 0.25,
    input_limit: 4000,
    placeholder: "Scientific analysis unavailable.",
};

pub const STYLE_PROFILE: TaskProfile = TaskProfile {
    name: STYLE,
    system_prompt: "You are an academic copy editor specialised in scientific writing.",
    instruction: "Improve the style and clarity of the following text. Point out awkward \
                  sentences, repetitions and ambiguous phrasing, and suggest rewrites.",
    temperature: 0.4,
    input_limit: 4000,
    placeholder: "Style review unavailable.",
};

pub const SYNTHESIS_PROFILE: TaskProfile = TaskProfile {
    name: SYNTHESIS,
    system_prompt: "You are a thesis examiner writing a critical report.",
    instruction: "Summarise the key points of the reviews below into a short, prioritised \
                  list of recommendations for this part of the manuscript.",
    temperature: 0.4,
    input_limit: 8000,
    placeholder: "Synthesis unavailable.",
};

pub const OUTLINE_PROFILE: TaskProfile = TaskProfile {
    name: OUTLINE,
    system_prompt: "You are a thesis referee with expertise in structuring academic work.",
    instruction: "Review the outline below. Identify redundancies, imbalanced parts and \
                  missing transitions, then propose a restructured outline.",
    temperature: 0.3,
    input_limit: 4000,
    placeholder: "Outline review unavailable.",
};

impl TaskProfile {
    pub fn request(&self, user_prompt: String, max_tokens: u32) -> CompletionRequest {
        CompletionRequest {
            system_prompt: self.system_prompt.to_string(),
            user_prompt,
            temperature: self.temperature,
            max_tokens,
        }
    }
}

/// Drives every unit through the scientific, style and synthesis tasks, strictly in
/// order, and optionally reviews the overall outline at the end.
pub struct AnalysisOrchestrator {
    gateway: CompletionGateway,
    max_output_tokens: u32,
    outline_review: bool,
}

/// Backends resolved once, before the first call of a run.
struct RunRoutes {
    scientific: BackendId,
    style: BackendId,
    synthesis: BackendId,
    outline: Option<BackendId>,
}

impl AnalysisOrchestrator {
    pub fn new(gateway: CompletionGateway, max_output_tokens: u32) -> Self {
        Self {
            gateway,
            max_output_tokens,
            outline_review: false,
        }
    }

    pub fn with_outline_review(mut self, enabled: bool) -> Self {
        self.outline_review = enabled;
        self
    }

    pub fn gateway(&self) -> &CompletionGateway {
        &self.gateway
    }

    /// Analyses `units` of `document` in order.
    ///
    /// Only a task missing from `tasks` aborts the run, and it does so before any backend
    /// is called. Backend failures become placeholder text for the affected task.
    pub async fn run(
        &self,
        units: &[StructuralUnit],
        tasks: &TaskConfig,
        document: &str,
    ) -> Result<RunStatistics, AnalysisError> {
        let router = AnalysisRouter::new(tasks.clone());
        let routes = self.resolve_routes(&router)?;
        let mut stats = RunStatistics::new();

        for (i, unit) in units.iter().enumerate() {
            info!(
                "analysing {}/{}: {} ({} words)",
                i + 1,
                units.len(),
                unit.title,
                unit.word_count
            );

            let text = unit.text(document);
            let scientific = self
                .run_task(&SCIENTIFIC_PROFILE, routes.scientific, text, &mut stats)
                .await?;
            let style = self
                .run_task(&STYLE_PROFILE, routes.style, text, &mut stats)
                .await?;

            let reviews = format!(
                "Part: {}\n\nScientific review:\n{}\n\nStyle review:\n{}",
                unit.title, scientific, style
            );
            let synthesis = self
                .run_task(&SYNTHESIS_PROFILE, routes.synthesis, &reviews, &mut stats)
                .await?;

            let outputs = BTreeMap::from([
                (SCIENTIFIC.to_string(), scientific),
                (STYLE.to_string(), style),
                (SYNTHESIS.to_string(), synthesis),
            ]);
            stats.record_unit(UnitResult {
                title: unit.title.clone(),
                level: unit.level,
                word_count: unit.word_count,
                outputs,
            });

            info!("finished {}/{}", i + 1, units.len());
        }

        if let Some(backend) = routes.outline {
            if !units.is_empty() {
                info!("reviewing the outline of {} units", units.len());
                let review = self
                    .run_task(&OUTLINE_PROFILE, backend, &outline(units), &mut stats)
                    .await?;
                stats.outline_review = Some(review);
            }
        }

        Ok(stats)
    }

    fn resolve_routes(&self, router: &AnalysisRouter) -> Result<RunRoutes, AnalysisError> {
        Ok(RunRoutes {
            scientific: router.resolve_backend(SCIENTIFIC)?,
            style: router.resolve_backend(STYLE)?,
            synthesis: router.resolve_backend(SYNTHESIS)?,
            outline: if self.outline_review {
                Some(router.resolve_backend(OUTLINE)?)
            } else {
                None
            },
        })
    }

    async fn run_task(
        &self,
        profile: &TaskProfile,
        backend: BackendId,
        input: &str,
        stats: &mut RunStatistics,
    ) -> Result<String, AnalysisError> {
        let prompt = format!(
            "{}\n\n{}",
            profile.instruction,
            truncate_chars(input, profile.input_limit)
        );
        let request = profile.request(prompt, self.max_output_tokens);

        match self.gateway.invoke(&request, backend, stats).await {
            Ok(text) => Ok(text),
            Err(e) if e.is_no_output() => {
                warn!(task = profile.name, "{}, using placeholder", e);
                Ok(profile.placeholder.to_string())
            }
            Err(e) => Err(e),
        }
    }
}
