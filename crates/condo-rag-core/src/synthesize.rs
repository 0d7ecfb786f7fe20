//! Answer synthesis.
//!
//! Builds a context block from ranked candidates, picks a system prompt
//! from the question class and search mode, and makes exactly one call to
//! a [`GenerationBackend`]. A failed or empty generation becomes an
//! unsuccessful [`AnswerResult`] with a fixed fallback message; backend
//! errors are logged and never surface in the answer text.

use async_trait::async_trait;
use tracing::{error, warn};

use crate::models::{AnswerResult, AnswerStatus, QueryClass, RetrievalCandidate, SearchMode};

/// Chat-style text generation.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Return the assistant reply for a system and user message.
    async fn complete(&self, system: &str, user: &str) -> anyhow::Result<String>;
}

/// Distinct source titles reported per answer.
pub const MAX_SOURCES: usize = 5;

pub const FALLBACK_ANSWER: &str =
    "Sorry, I could not put together an answer right now. Please try again in a moment.";

pub const NO_CONTENT_ANSWER: &str =
    "I could not find relevant information in the indexed documents to answer this question.";

pub const BELOW_THRESHOLD_ANSWER: &str =
    "I found related passages in the indexed documents, but none were relevant enough to answer \
     this question reliably. Try rephrasing it or naming the rule or article you mean.";

const BASE_PROMPT: &str = "You answer questions about condominium regulations using only the \
context provided. Never invent rules, numbers or deadlines that the context does not state. If \
the context does not answer the question, say so plainly.";

/// System prompt for a question class under a search mode.
pub fn system_prompt(class: QueryClass, mode: SearchMode) -> String {
    let style = match class {
        QueryClass::Lookup => {
            "Quote the exact article, section or clause that answers the question, citing its \
             number and the document title."
        }
        QueryClass::Interpretative => {
            "Explain in plain language what the rules allow or forbid and under which \
             conditions, citing the supporting article when the context gives one."
        }
        QueryClass::Comparative
        | QueryClass::Procedural
        | QueryClass::Temporal
        | QueryClass::General => {
            "Give a balanced, concise answer grounded in the context and mention which document \
             each point comes from."
        }
    };
    let scope = match mode {
        SearchMode::CondoOnly => {
            "The context comes from this building's own documents and is binding for its residents."
        }
        SearchMode::KbOnly => {
            "The context is general reference material about condominium law and practice, not \
             this building's rules. Make that clear in the answer."
        }
        SearchMode::Hybrid => {
            "The context has two labeled sections. BUILDING RULES are binding and take precedence. \
             GENERAL REFERENCE is background only; present anything taken from it as general \
             guidance, never as this building's rule."
        }
    };
    format!("{}\n\n{}\n\n{}", BASE_PROMPT, style, scope)
}

fn render_block(n: usize, c: &RetrievalCandidate) -> String {
    let md = &c.metadata;
    match &md.article {
        Some(article) => format!("[{}] {} (Art. {})\n{}", n, md.title, article, md.body()),
        None => format!("[{}] {}\n{}", n, md.title, md.body()),
    }
}

/// Positions in `ranked` rendered into the context, in rank order.
///
/// At most `max_chunks` per origin in hybrid mode, `max_chunks` overall
/// otherwise.
pub fn context_indices(
    ranked: &[RetrievalCandidate],
    mode: SearchMode,
    max_chunks: usize,
) -> Vec<usize> {
    let max_chunks = max_chunks.max(1);
    match mode {
        SearchMode::CondoOnly | SearchMode::KbOnly => (0..ranked.len().min(max_chunks)).collect(),
        SearchMode::Hybrid => {
            let (mut tenant, mut general) = (0, 0);
            ranked
                .iter()
                .enumerate()
                .filter(|(_, c)| {
                    let taken = if c.origin.is_general() { &mut general } else { &mut tenant };
                    *taken += 1;
                    *taken <= max_chunks
                })
                .map(|(i, _)| i)
                .collect()
        }
    }
}

/// Context text from the top `max_chunks` candidates of each origin.
///
/// In hybrid mode tenant and general candidates are rendered under
/// separate headings; otherwise they are numbered in rank order.
pub fn build_context(
    ranked: &[RetrievalCandidate],
    mode: SearchMode,
    max_chunks: usize,
) -> String {
    let selected: Vec<&RetrievalCandidate> = context_indices(ranked, mode, max_chunks)
        .into_iter()
        .map(|i| &ranked[i])
        .collect();
    match mode {
        SearchMode::CondoOnly | SearchMode::KbOnly => selected
            .iter()
            .enumerate()
            .map(|(i, c)| render_block(i + 1, c))
            .collect::<Vec<_>>()
            .join("\n\n"),
        SearchMode::Hybrid => {
            let (general, tenant): (Vec<&RetrievalCandidate>, Vec<&RetrievalCandidate>) =
                selected.into_iter().partition(|c| c.origin.is_general());
            let mut sections = Vec::new();
            let mut n = 0;
            for (heading, group) in [("BUILDING RULES", tenant), ("GENERAL REFERENCE", general)] {
                if group.is_empty() {
                    continue;
                }
                let blocks: Vec<String> = group
                    .into_iter()
                    .map(|c| {
                        n += 1;
                        render_block(n, c)
                    })
                    .collect();
                sections.push(format!("=== {} ===\n{}", heading, blocks.join("\n\n")));
            }
            sections.join("\n\n")
        }
    }
}

/// Distinct titles of the rendered candidates, in rank order, capped.
pub fn collect_sources(
    ranked: &[RetrievalCandidate],
    mode: SearchMode,
    max_chunks: usize,
) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for i in context_indices(ranked, mode, max_chunks) {
        if sources.len() >= MAX_SOURCES {
            break;
        }
        let title = &ranked[i].metadata.title;
        if !sources.iter().any(|t| t == title) {
            sources.push(title.clone());
        }
    }
    sources
}

/// Best tenant score when any tenant candidate exists, else best overall.
pub fn confidence(ranked: &[RetrievalCandidate]) -> f32 {
    let best = |general: bool| {
        ranked
            .iter()
            .filter(|c| c.origin.is_general() == general)
            .map(|c| c.score)
            .fold(None, |acc: Option<f32>, s| Some(acc.map_or(s, |a| a.max(s))))
    };
    best(false).or_else(|| best(true)).unwrap_or(0.0)
}

pub struct Synthesizer<'a> {
    generator: &'a dyn GenerationBackend,
    context_chunks: usize,
}

impl<'a> Synthesizer<'a> {
    pub fn new(generator: &'a dyn GenerationBackend, context_chunks: usize) -> Self {
        Self {
            generator,
            context_chunks,
        }
    }

    pub async fn synthesize(
        &self,
        question: &str,
        ranked: &[RetrievalCandidate],
        class: QueryClass,
        mode: SearchMode,
    ) -> AnswerResult {
        if ranked.is_empty() {
            return AnswerResult::failure(AnswerStatus::NoCandidates, NO_CONTENT_ANSWER);
        }

        let system = system_prompt(class, mode);
        let context = build_context(ranked, mode, self.context_chunks);
        let user = format!(
            "Context:\n{}\n\nQuestion: {}\n\nAnswer using only the context above.",
            context, question
        );

        match self.generator.complete(&system, &user).await {
            Ok(answer) if !answer.trim().is_empty() => AnswerResult {
                answer: answer.trim().to_string(),
                sources: collect_sources(ranked, mode, self.context_chunks),
                confidence: confidence(ranked),
                success: true,
                status: AnswerStatus::Answered,
            },
            Ok(_) => {
                warn!(class = %class, mode = %mode, "generation returned an empty answer");
                AnswerResult::failure(AnswerStatus::Unavailable, FALLBACK_ANSWER)
            }
            Err(e) => {
                error!(class = %class, mode = %mode, error = %e, "generation failed");
                AnswerResult::failure(AnswerStatus::Unavailable, FALLBACK_ANSWER)
            }
        }
    }
}
