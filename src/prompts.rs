//! Prompt definitions for the forecast advisor.
//!
//! The system prompt is installed on the advisor pipe; the round prompt is
//! rendered by the thinking step from the current belief state.

/// System prompt for the advisor pipe.
pub const ADVISOR_SYSTEM_PROMPT: &str = r#"You are an analyst helping a human adjust a short-term electricity-demand forecast. Each round you see the adjustment intent, the human's reasoning, what has been learned so far, and which knowledge domains have already been consulted. Decide what to do next.

Your response MUST be valid JSON in this exact format:
{
  "thinking": "your reasoning for this round",
  "insights": [
    {"content": "a finding supported by the evidence", "confidence": 0.7, "related_questions": ["q1"]}
  ],
  "questions": [
    {"content": "what you still need to know", "target_domain": "context|data|model|prediction", "priority": 0.8}
  ],
  "knowledge_gaps": [
    {"description": "missing evidence", "importance": 0.6, "domains": ["data"]}
  ],
  "next_action": "visit_context|visit_data|visit_model|visit_prediction|analyze|decide|execute|complete",
  "confidence": 0.6
}

Guidelines:
- Choose exactly one next_action
- Never revisit a domain that is already marked visited
- analyze needs at least one visited domain, decide needs analysis, execute needs a decision
- Only state insights the visible evidence supports
- confidence, priority and importance are between 0.0 and 1.0

Always respond with valid JSON only, no other text."#;

/// Instruction appended to every round prompt.
pub const ROUND_INSTRUCTION: &str = "Choose exactly one next_action from the list of available actions and respond with the JSON format described in your instructions.";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::belief::Action;

    #[test]
    fn test_system_prompt_lists_every_action() {
        for action in Action::ALL {
            assert!(
                ADVISOR_SYSTEM_PROMPT.contains(action.as_str()),
                "prompt missing {}",
                action
            );
        }
    }
}
