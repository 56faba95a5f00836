//! Token estimation utilities.
//!
//! Mixed-script aware: CJK characters cost more per character than Latin
//! script under typical BPE tokenizers, so the estimator weights them
//! differently rather than using a single chars-per-token ratio.

use crate::message::{Message, Role};
use crate::provider::ToolDefinition;

/// Returns true if `c` falls in one of the common CJK unicode blocks
/// (CJK Unified Ideographs, Hiragana/Katakana, Hangul).
fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x4E00..=0x9FFF   // CJK Unified Ideographs
        | 0x3400..=0x4DBF // CJK Unified Ideographs Extension A
        | 0x3040..=0x309F // Hiragana
        | 0x30A0..=0x30FF // Katakana
        | 0xAC00..=0xD7A3 // Hangul Syllables
        | 0xF900..=0xFAFF // CJK Compatibility Ideographs
    )
}

/// Estimate the token count for a string.
///
/// `tokens ≈ 1.5 × |CJK chars| + 0.25 × |non-CJK chars|`, rounded to the
/// nearest integer. This is an estimator for budget decisions, not an exact
/// tokenizer count.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    let mut weighted = 0.0_f64;
    for c in text.chars() {
        weighted += if is_cjk(c) { 1.5 } else { 0.25 };
    }
    weighted.round() as usize
}

/// Estimate tokens for a single message (no per-message overhead — the
/// estimator only prices content; callers that need wire-format overhead
/// add it explicitly).
pub fn estimate_message_tokens(message: &Message) -> usize {
    estimate_tokens(&message.content)
}

/// Estimate tokens for a slice of messages.
pub fn estimate_messages_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}

/// Estimate tokens for a tool definition (serialized as JSON).
pub fn estimate_tool_tokens(tool: &ToolDefinition) -> usize {
    let json = serde_json::to_string(tool).unwrap_or_default();
    estimate_tokens(&json)
}

/// Estimate tokens for a slice of tool definitions.
pub fn estimate_tools_tokens(tools: &[ToolDefinition]) -> usize {
    tools.iter().map(estimate_tool_tokens).sum()
}

/// Truncate a message history to fit `budget` estimated tokens.
///
/// Keeps every `role=system` message. From the remaining messages, greedily
/// keeps the newest ones whose cumulative estimate — together with the
/// systems' estimate — does not exceed `budget`. Returns
/// `systems ++ keptRest` in original relative order (§4.2, §8 invariant 2).
pub fn truncate(messages: &[Message], budget: usize) -> Vec<Message> {
    let (systems, rest): (Vec<&Message>, Vec<&Message>) =
        messages.iter().partition(|m| m.role == Role::System);

    let systems_tokens: usize = systems.iter().map(|m| estimate_message_tokens(m)).sum();
    let mut remaining_budget = budget.saturating_sub(systems_tokens);

    // Walk `rest` from newest to oldest, keeping while it still fits.
    let mut kept_rest_rev: Vec<&Message> = Vec::new();
    for m in rest.iter().rev() {
        let cost = estimate_message_tokens(m);
        if cost <= remaining_budget {
            remaining_budget -= cost;
            kept_rest_rev.push(m);
        } else {
            break;
        }
    }
    kept_rest_rev.reverse();

    // Restore original relative order across both groups.
    let kept_rest_ids: std::collections::HashSet<&str> =
        kept_rest_rev.iter().map(|m| m.id.as_str()).collect();
    messages
        .iter()
        .filter(|m| m.role == Role::System || kept_rest_ids.contains(m.id.as_str()))
        .cloned()
        .collect()
}
