//! LLM prompt constants for pattern selection.
//!
//! The model must reply with `{"pattern": "...", "splitRatios": [...]}`.
//! Callers deserialize via `llm.call_json::<StrategyReply>()`.

pub const STRATEGY_SYSTEM: &str = "\
You are a presentation layout designer. Given the semantic containers of one slide, \
choose the arrangement archetype that best expresses their hierarchy.\n\
\n\
Respond with valid JSON only: {\"pattern\": \"...\", \"splitRatios\": [..]}\n\
Do NOT use markdown code fences. Do NOT add any explanation outside the JSON object.";

pub const STRATEGY_PROMPT_TEMPLATE: &str = "\
Choose a layout pattern for a slide on a 160x90 grid.\n\
\n\
CONTAINERS ({count}):\n\
{containers}\n\
CONTENT DENSITY: {density}\n\
STRUCTURE HINT: {hint}\n\
\n\
ALLOWED PATTERNS (and how many containers each can hold):\n\
- single_focal (1)\n\
- vertical_stack (1-6)\n\
- horizontal_split (2-4)\n\
- grid (2+)\n\
- golden_ratio (2-4), splitRatios like [0.618, 0.382]\n\
- rule_of_thirds (2-3), splitRatios like [0.667, 0.333]\n\
- z_pattern (3-4), splitRatios like [0.618, 0.382]\n\
- symmetrical (2-7)\n\
\n\
RULES:\n\
1. The pattern MUST be able to hold exactly {count} containers\n\
2. Give critical and high-importance containers the dominant region\n\
3. splitRatios are only needed for golden_ratio, rule_of_thirds and z_pattern; otherwise send []\n\
\n\
Return JSON: {\"pattern\": \"<name>\", \"splitRatios\": [<major>, <minor>]}";
