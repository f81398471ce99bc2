//! Unit tests for the advisor response parser.

use pretty_assertions::assert_eq;

use super::*;

#[test]
fn test_parse_empty_returns_defaults() {
    let parsed = parse("");
    assert_eq!(parsed.confidence, DEFAULT_SCORE);
    assert!(parsed.insights.is_empty());
    assert!(parsed.questions.is_empty());
    assert!(parsed.knowledge_gaps.is_empty());
    assert!(parsed.action.is_none());
    assert_eq!(parsed.warnings.len(), 1);
}

#[test]
fn test_parse_whitespace_only_returns_defaults() {
    let parsed = parse("   \n\t ");
    assert_eq!(parsed.confidence, DEFAULT_SCORE);
    assert!(parsed.action.is_none());
}

#[test]
fn test_parse_garbage_returns_defaults() {
    let parsed = parse("garbage");
    assert_eq!(parsed.confidence, DEFAULT_SCORE);
    assert!(parsed.insights.is_empty());
    assert!(parsed.questions.is_empty());
    assert!(parsed.action.is_none());
    assert_eq!(parsed.thinking, "garbage");
    assert!(!parsed.warnings.is_empty());
}

#[test]
fn test_parse_well_formed_json() {
    let raw = r#"{
        "thinking": "Cold weather pushes heating load up.",
        "insights": [
            {"content": "Morning ramp is temperature driven", "confidence": 0.8, "related_questions": ["q1"]}
        ],
        "questions": [
            {"content": "How volatile is hour 8?", "target_domain": "data", "priority": 0.9}
        ],
        "knowledge_gaps": [
            {"description": "No view of model error", "importance": 0.6, "domains": ["model"]}
        ],
        "next_action": "visit_data",
        "confidence": 0.65
    }"#;
    let parsed = parse(raw);

    assert_eq!(parsed.thinking, "Cold weather pushes heating load up.");
    assert_eq!(
        parsed.insights,
        vec![InsightDraft {
            content: "Morning ramp is temperature driven".to_string(),
            confidence: 0.8,
            related_question_ids: vec!["q1".to_string()],
        }]
    );
    assert_eq!(parsed.questions[0].target_domain, Some(KnowledgeDomain::Data));
    assert_eq!(parsed.questions[0].priority, 0.9);
    assert_eq!(parsed.knowledge_gaps[0].candidate_domains, vec![KnowledgeDomain::Model]);
    assert_eq!(parsed.action, Some(Action::VisitData));
    assert_eq!(parsed.confidence, 0.65);
    assert!(parsed.warnings.is_empty(), "{:?}", parsed.warnings);
}

#[test]
fn test_parse_fenced_json_with_prose() {
    let raw = "Sure, here you go:\n```json\n{\"next_action\": \"analyze\", \"confidence\": \"70%\"}\n```\nThanks!";
    let parsed = parse(raw);
    assert_eq!(parsed.action, Some(Action::Analyze));
    assert!((parsed.confidence - 0.7).abs() < 1e-9);
}

#[test]
fn test_parse_embedded_json_without_fence() {
    let raw = "My answer is {\"next_action\": \"decide\"} as requested.";
    let parsed = parse(raw);
    assert_eq!(parsed.action, Some(Action::Decide));
}

#[test]
fn test_parse_loosely_typed_json_fields() {
    let raw = r#"{
        "insights": ["Plain string insight", 42, {"content": ""}],
        "questions": "Which hours peak?",
        "knowledge_gaps": [{"description": "Need the baseline", "importance": "high"}],
        "action": "Visit Prediction",
        "confidence": "very sure"
    }"#;
    let parsed = parse(raw);
    assert_eq!(parsed.insights.len(), 1);
    assert_eq!(parsed.insights[0].content, "Plain string insight");
    assert_eq!(parsed.insights[0].confidence, DEFAULT_SCORE);
    assert_eq!(parsed.questions.len(), 1);
    assert_eq!(parsed.knowledge_gaps[0].importance, 0.8);
    assert_eq!(
        parsed.knowledge_gaps[0].candidate_domains,
        vec![KnowledgeDomain::Prediction]
    );
    assert_eq!(parsed.action, Some(Action::VisitPrediction));
    assert_eq!(parsed.confidence, DEFAULT_SCORE);
    assert!(parsed.warnings.iter().any(|w| w.contains("confidence")));
}

#[test]
fn test_parse_out_of_enumeration_action() {
    let parsed = parse(r#"{"next_action": "call_the_operator", "confidence": 0.9}"#);
    assert!(parsed.action.is_none());
    assert_eq!(parsed.confidence, 0.9);
    assert!(parsed.warnings.iter().any(|w| w.contains("unrecognized action")));
}

#[test]
fn test_parse_missing_action_is_warned() {
    let parsed = parse(r#"{"thinking": "hmm"}"#);
    assert!(parsed.action.is_none());
    assert!(parsed.warnings.iter().any(|w| w.contains("no action")));
}

#[test]
fn test_parse_out_of_range_scores_are_clamped() {
    let parsed = parse(r#"{"confidence": 4.2, "questions": [{"content": "x", "priority": -1}]}"#);
    assert_eq!(parsed.confidence, 1.0);
    assert_eq!(parsed.questions[0].priority, 0.0);
}

#[test]
fn test_parse_malformed_json_falls_back_to_text() {
    let raw = "{\"thinking\": \"cut off\", \"next_action\": \"visit_mo";
    let parsed = parse(raw);
    assert!(parsed.action.is_none());
    assert!(parsed.warnings.iter().any(|w| w.contains("malformed")));
}

#[test]
fn test_parse_sectioned_text() {
    let raw = "\
Some opening remarks.
THINKING: Temperatures are far below normal.
INSIGHTS:
- Heating load dominates mornings (confidence: 0.75) (related: q1, q2)
- Weekend profile differs
QUESTIONS:
1. [data] How large is hour-8 variance? (priority: 0.9)
2) Were there similar past events?
KNOWLEDGE GAPS:
* Model error by hour unknown (importance: 0.4; domains: model, data)
**Action:** visit_data because statistics come first
Confidence: 0.6";
    let parsed = parse(raw);

    assert_eq!(
        parsed.thinking,
        "Some opening remarks.\nTemperatures are far below normal."
    );
    assert_eq!(parsed.insights.len(), 2);
    assert_eq!(parsed.insights[0].content, "Heating load dominates mornings");
    assert_eq!(parsed.insights[0].confidence, 0.75);
    assert_eq!(
        parsed.insights[0].related_question_ids,
        vec!["q1".to_string(), "q2".to_string()]
    );
    assert_eq!(parsed.insights[1].confidence, DEFAULT_SCORE);

    assert_eq!(parsed.questions.len(), 2);
    assert_eq!(parsed.questions[0].content, "How large is hour-8 variance?");
    assert_eq!(parsed.questions[0].target_domain, Some(KnowledgeDomain::Data));
    assert_eq!(parsed.questions[0].priority, 0.9);
    // Inferred from wording.
    assert_eq!(parsed.questions[1].target_domain, Some(KnowledgeDomain::Context));

    assert_eq!(
        parsed.knowledge_gaps[0].candidate_domains,
        vec![KnowledgeDomain::Model, KnowledgeDomain::Data]
    );
    assert_eq!(parsed.knowledge_gaps[0].importance, 0.4);

    assert_eq!(parsed.action, Some(Action::VisitData));
    assert_eq!(parsed.confidence, 0.6);
}

#[test]
fn test_parse_partial_list_items() {
    let raw = "INSIGHTS:\n- \n- (confidence: 0.9)\n- real insight (confidence: abc\nACTION: analyze";
    let parsed = parse(raw);
    // Empty and annotation-only items are dropped; the unterminated
    // annotation stays part of the text.
    assert_eq!(parsed.insights.len(), 1);
    assert_eq!(parsed.insights[0].content, "real insight (confidence: abc");
    assert_eq!(parsed.action, Some(Action::Analyze));
}

#[test]
fn test_parse_section_bad_confidence_defaults() {
    let parsed = parse("ACTION: execute\nCONFIDENCE: unsure");
    assert_eq!(parsed.action, Some(Action::Execute));
    assert_eq!(parsed.confidence, DEFAULT_SCORE);
    assert!(parsed.warnings.iter().any(|w| w.contains("not a number")));
}

#[test]
fn test_parse_unknown_domain_tag_is_warned() {
    let parsed = parse(r#"{"questions": [{"content": "?", "domain": "weather"}]}"#);
    assert_eq!(parsed.questions[0].target_domain, None);
    assert!(parsed.warnings.iter().any(|w| w.contains("unrecognized domain")));
}

#[test]
fn test_extract_json_raw_object() {
    let result = extract_json_from_completion(r#"{"key": "value"}"#);
    assert_eq!(result.unwrap(), r#"{"key": "value"}"#);
}

#[test]
fn test_extract_json_empty_json_block() {
    let result = extract_json_from_completion("```json\n\n```");
    assert!(result.unwrap_err().contains("empty or malformed"));
}

#[test]
fn test_extract_json_no_json_found() {
    let result = extract_json_from_completion("This is just plain text.");
    assert!(result.unwrap_err().contains("No JSON found"));
}
