//! Strategy providers — pluggable, trait-based pattern choice.
//!
//! Default: `HeuristicStrategyProvider` (pure Rust, deterministic, fully testable).
//! Optional: `LlmStrategyProvider` (asks Claude; enabled when an API key is configured).
//!
//! `AppState` holds an `Arc<dyn StrategyProvider>`, chosen at startup from config.
//! Whatever a provider returns is re-checked by `resolve_choice`, and any provider
//! error falls back to the heuristic selector inside the engine.

use async_trait::async_trait;
use serde::Deserialize;

use crate::errors::AppError;
use crate::layout::pattern::{select_pattern, ChoiceSource, Pattern, PatternChoice};
use crate::layout::prompts::{STRATEGY_PROMPT_TEMPLATE, STRATEGY_SYSTEM};
use crate::llm_client::{LlmClient, LlmError};
use crate::models::slide::{ContentDensity, SlideInput};

// ────────────────────────────────────────────────────────────────────────────
// Trait definition
// ────────────────────────────────────────────────────────────────────────────

/// Implement this to swap pattern-choice backends without touching the engine or handlers.
#[async_trait]
pub trait StrategyProvider: Send + Sync {
    /// Backend name, reported for transparency ("heuristic" | "llm").
    fn name(&self) -> &'static str;

    async fn choose(&self, input: &SlideInput) -> Result<PatternChoice, AppError>;
}

// ────────────────────────────────────────────────────────────────────────────
// HeuristicStrategyProvider
// ────────────────────────────────────────────────────────────────────────────

/// Count/role/density rules from the pattern selector. Never fails.
pub struct HeuristicStrategyProvider;

#[async_trait]
impl StrategyProvider for HeuristicStrategyProvider {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    async fn choose(&self, input: &SlideInput) -> Result<PatternChoice, AppError> {
        Ok(select_pattern(&input.containers, &input.hints))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// LlmStrategyProvider
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StrategyReply {
    pattern: String,
    #[serde(default)]
    split_ratios: Vec<f64>,
}

pub struct LlmStrategyProvider {
    llm: LlmClient,
}

impl LlmStrategyProvider {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl StrategyProvider for LlmStrategyProvider {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn choose(&self, input: &SlideInput) -> Result<PatternChoice, AppError> {
        // Nothing to decide for trivial slides.
        if input.containers.len() <= 1 {
            return Ok(select_pattern(&input.containers, &input.hints));
        }

        let prompt = build_strategy_prompt(input);
        let reply: StrategyReply = self.llm.call_json(&prompt, STRATEGY_SYSTEM).await?;
        parse_reply(reply)
    }
}

fn parse_reply(reply: StrategyReply) -> Result<PatternChoice, AppError> {
    let pattern = Pattern::from_name(&reply.pattern).ok_or_else(|| {
        LlmError::UnexpectedReply(format!("unknown pattern '{}'", reply.pattern))
    })?;
    Ok(PatternChoice {
        pattern,
        split_ratios: reply.split_ratios,
        source: ChoiceSource::Strategy,
    })
}

pub fn build_strategy_prompt(input: &SlideInput) -> String {
    let containers = input
        .containers
        .iter()
        .map(|c| {
            format!(
                "- id={} role={:?} hierarchy={} importance={:?} weight={:.2}",
                c.id, c.role, c.hierarchy_level, c.importance, c.visual_weight
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    let density = match input.hints.content_density {
        ContentDensity::High => "high",
        ContentDensity::Medium => "medium",
        ContentDensity::Low => "low",
    };
    let hint = input
        .hints
        .structure_preference
        .map(|p| Pattern::from(p).name())
        .unwrap_or("none");

    STRATEGY_PROMPT_TEMPLATE
        .replace("{count}", &input.containers.len().to_string())
        .replace("{containers}", &containers)
        .replace("{density}", density)
        .replace("{hint}", hint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::slide::{
        ContainerRole, Importance, SemanticContainer, SlideHints, StructurePreference,
    };
    use std::collections::BTreeMap;

    fn slide(n: usize) -> SlideInput {
        SlideInput {
            slide_id: "s1".into(),
            containers: (0..n)
                .map(|i| SemanticContainer {
                    id: format!("c{i}"),
                    role: ContainerRole::MainPoint,
                    hierarchy_level: 2,
                    importance: Importance::High,
                    visual_weight: 0.5,
                })
                .collect(),
            hints: SlideHints {
                structure_preference: Some(StructurePreference::ZPattern),
                content_density: ContentDensity::High,
            },
            base_text: BTreeMap::new(),
            theme: None,
        }
    }

    #[tokio::test]
    async fn test_heuristic_provider_matches_selector() {
        let input = slide(4);
        let choice = HeuristicStrategyProvider.choose(&input).await.unwrap();
        assert_eq!(choice, select_pattern(&input.containers, &input.hints));
        assert_eq!(choice.pattern, Pattern::ZPattern);
    }

    #[test]
    fn test_prompt_lists_every_container() {
        let prompt = build_strategy_prompt(&slide(3));
        assert!(prompt.contains("CONTAINERS (3)"));
        assert!(prompt.contains("id=c0"));
        assert!(prompt.contains("id=c2"));
        assert!(prompt.contains("CONTENT DENSITY: high"));
        assert!(prompt.contains("STRUCTURE HINT: z_pattern"));
        assert!(!prompt.contains("{count}"));
    }

    #[test]
    fn test_reply_parsing_accepts_loose_names() {
        let reply: StrategyReply =
            serde_json::from_str(r#"{"pattern": "Rule-Of-Thirds", "splitRatios": [2, 1]}"#).unwrap();
        let choice = parse_reply(reply).unwrap();
        assert_eq!(choice.pattern, Pattern::RuleOfThirds);
        assert_eq!(choice.source, ChoiceSource::Strategy);
        assert_eq!(choice.split_ratios, vec![2.0, 1.0]);
    }

    #[test]
    fn test_reply_with_unknown_pattern_is_llm_error() {
        let reply: StrategyReply = serde_json::from_str(r#"{"pattern": "diagonal"}"#).unwrap();
        assert!(matches!(parse_reply(reply), Err(AppError::Llm(_))));
    }

    #[tokio::test]
    async fn test_llm_provider_short_circuits_single_container() {
        let llm = LlmClient::with_endpoint("k".into(), "http://127.0.0.1:9/unused".into()).unwrap();
        let provider = LlmStrategyProvider::new(llm);
        let choice = provider.choose(&slide(1)).await.unwrap();
        assert_eq!(choice.pattern, Pattern::SingleFocal);
    }
}
