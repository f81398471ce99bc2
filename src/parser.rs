//! Advisor response parser.
//!
//! Turns one round of advisor text into structured drafts and a proposed
//! action. The advisor is asked for JSON but the parser does not rely on
//! it: fenced or embedded JSON, loosely typed fields, sectioned plain text
//! and bare prose are all accepted. Nothing here fails; unreadable pieces
//! default (scores to 0.5, action to `None`) and are reported as warnings.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use crate::belief::{Action, GapDraft, InsightDraft, QuestionDraft};
use crate::knowledge::KnowledgeDomain;

/// Score used whenever a numeric field is missing or unreadable.
pub const DEFAULT_SCORE: f64 = 0.5;

/// Structured view of one advisor reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    pub thinking: String,
    pub insights: Vec<InsightDraft>,
    pub questions: Vec<QuestionDraft>,
    pub knowledge_gaps: Vec<GapDraft>,
    /// `None` when absent or not one of the known actions.
    pub action: Option<Action>,
    pub confidence: f64,
    /// Recoverable problems met while parsing.
    pub warnings: Vec<String>,
}

impl Default for ParsedResponse {
    fn default() -> Self {
        Self {
            thinking: String::new(),
            insights: Vec::new(),
            questions: Vec::new(),
            knowledge_gaps: Vec::new(),
            action: None,
            confidence: DEFAULT_SCORE,
            warnings: Vec::new(),
        }
    }
}

/// Parse raw advisor text. Never fails.
pub fn parse(raw: &str) -> ParsedResponse {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        let mut parsed = ParsedResponse::default();
        parsed.warnings.push("advisor returned an empty response".to_string());
        return parsed;
    }

    let mut warnings = Vec::new();
    if let Some(object) = find_json_object(trimmed, &mut warnings) {
        let mut parsed = parse_json(&object);
        warnings.append(&mut parsed.warnings);
        parsed.warnings = warnings;
        debug!(
            insights = parsed.insights.len(),
            questions = parsed.questions.len(),
            action = ?parsed.action,
            "Parsed structured advisor response"
        );
        return parsed;
    }

    let mut parsed = parse_sections(trimmed);
    warnings.append(&mut parsed.warnings);
    parsed.warnings = warnings;
    parsed
}

// ============================================================================
// JSON
// ============================================================================

/// Extract JSON from a completion string, handling markdown code blocks.
pub(crate) fn extract_json_from_completion(completion: &str) -> Result<&str, String> {
    let trimmed = completion.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Ok(trimmed);
    }

    if completion.contains("```json") {
        return completion
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "Found ```json block but content was empty or malformed".to_string());
    }

    if completion.contains("```") {
        return completion
            .split("```")
            .nth(1)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "Found ``` block but content was empty or malformed".to_string());
    }

    Err(format!(
        "No JSON found in response. First 100 chars: '{}'",
        completion.chars().take(100).collect::<String>()
    ))
}

fn find_json_object(text: &str, warnings: &mut Vec<String>) -> Option<serde_json::Map<String, Value>> {
    let mut candidates: Vec<&str> = Vec::new();
    if let Ok(block) = extract_json_from_completion(text) {
        candidates.push(block);
    }
    // JSON embedded in prose without a fence.
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            candidates.push(&text[start..=end]);
        }
    }

    let mut saw_json_attempt = false;
    for candidate in candidates {
        if !candidate.starts_with('{') {
            continue;
        }
        saw_json_attempt = true;
        match serde_json::from_str::<Value>(candidate) {
            Ok(Value::Object(map)) => return Some(map),
            Ok(_) => {}
            Err(e) => debug!(error = %e, "Advisor JSON candidate rejected"),
        }
    }
    if saw_json_attempt {
        warnings.push("advisor JSON was malformed; fell back to text parsing".to_string());
    }
    None
}

fn field<'a>(map: &'a serde_json::Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|n| map.get(*n)).filter(|v| !v.is_null())
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn parse_json(map: &serde_json::Map<String, Value>) -> ParsedResponse {
    let mut parsed = ParsedResponse::default();
    let warnings = &mut parsed.warnings;

    parsed.thinking = field(map, &["thinking", "thought", "reasoning", "analysis"])
        .and_then(text_of)
        .unwrap_or_default();

    if let Some(items) = field(map, &["insights", "findings"]) {
        for item in list_items(items, "insights", warnings) {
            if let Some(draft) = json_insight(item, warnings) {
                parsed.insights.push(draft);
            }
        }
    }

    if let Some(items) = field(map, &["questions", "open_questions"]) {
        for item in list_items(items, "questions", warnings) {
            if let Some(draft) = json_question(item, warnings) {
                parsed.questions.push(draft);
            }
        }
    }

    if let Some(items) = field(map, &["knowledge_gaps", "gaps", "knowledgeGaps"]) {
        for item in list_items(items, "knowledge_gaps", warnings) {
            if let Some(draft) = json_gap(item, warnings) {
                parsed.knowledge_gaps.push(draft);
            }
        }
    }

    match field(map, &["next_action", "action", "chosen_action", "nextAction"]) {
        Some(value) => match text_of(value) {
            Some(name) => parsed.action = parse_action(&name, warnings),
            None => warnings.push("next_action is not a string".to_string()),
        },
        None => warnings.push("advisor response names no action".to_string()),
    }

    parsed.confidence = score(field(map, &["confidence"]), "confidence", warnings);
    parsed
}

fn list_items<'a>(value: &'a Value, name: &str, warnings: &mut Vec<String>) -> Vec<&'a Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        Value::String(_) | Value::Object(_) => vec![value],
        _ => {
            warnings.push(format!("{} is not a list", name));
            Vec::new()
        }
    }
}

fn json_insight(item: &Value, warnings: &mut Vec<String>) -> Option<InsightDraft> {
    match item {
        Value::String(s) => Some(text_insight(s, warnings)),
        Value::Object(obj) => {
            let content = field(obj, &["content", "insight", "text", "description"])
                .and_then(text_of)
                .filter(|c| !c.is_empty())?;
            let related = field(obj, &["related_questions", "related_question_ids", "questions"])
                .map(string_list)
                .unwrap_or_default();
            Some(InsightDraft {
                content,
                confidence: score(field(obj, &["confidence"]), "insight confidence", warnings),
                related_question_ids: related,
            })
        }
        _ => {
            warnings.push("skipped an insight that is neither text nor object".to_string());
            None
        }
    }
}

fn json_question(item: &Value, warnings: &mut Vec<String>) -> Option<QuestionDraft> {
    match item {
        Value::String(s) => Some(text_question(s, warnings)),
        Value::Object(obj) => {
            let content = field(obj, &["content", "question", "text"])
                .and_then(text_of)
                .filter(|c| !c.is_empty())?;
            let target_domain = match field(obj, &["target_domain", "domain", "target"]).and_then(text_of) {
                Some(name) => parse_domain(&name, warnings),
                None => infer_domain(&content),
            };
            Some(QuestionDraft {
                target_domain,
                priority: score(field(obj, &["priority", "importance"]), "question priority", warnings),
                content,
            })
        }
        _ => {
            warnings.push("skipped a question that is neither text nor object".to_string());
            None
        }
    }
}

fn json_gap(item: &Value, warnings: &mut Vec<String>) -> Option<GapDraft> {
    match item {
        Value::String(s) => Some(text_gap(s, warnings)),
        Value::Object(obj) => {
            let description = field(obj, &["description", "gap", "content", "text"])
                .and_then(text_of)
                .filter(|c| !c.is_empty())?;
            let mut domains: Vec<KnowledgeDomain> =
                field(obj, &["domains", "candidate_domains", "target_domains", "domain"])
                    .map(string_list)
                    .unwrap_or_default()
                    .iter()
                    .filter_map(|name| parse_domain(name, warnings))
                    .collect();
            if domains.is_empty() {
                domains.extend(infer_domain(&description));
            }
            dedup_domains(&mut domains);
            Some(GapDraft {
                importance: score(field(obj, &["importance", "priority"]), "gap importance", warnings),
                description,
                candidate_domains: domains,
            })
        }
        _ => {
            warnings.push("skipped a knowledge gap that is neither text nor object".to_string());
            None
        }
    }
}

fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(text_of).collect(),
        Value::String(s) => split_list(s),
        _ => Vec::new(),
    }
}

// ============================================================================
// Sectioned text
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum Section {
    Preamble,
    Thinking,
    Insights,
    Questions,
    Gaps,
    Action,
    Confidence,
}

fn section_header(line: &str) -> Option<(Section, String)> {
    let stripped = line
        .trim()
        .trim_start_matches(['#', '*', '_', ' '])
        .to_string();
    let lower = stripped.to_lowercase();
    const HEADERS: &[(&str, Section)] = &[
        ("knowledge gaps", Section::Gaps),
        ("knowledge_gaps", Section::Gaps),
        ("next action", Section::Action),
        ("next_action", Section::Action),
        ("chosen action", Section::Action),
        ("thinking", Section::Thinking),
        ("thoughts", Section::Thinking),
        ("reasoning", Section::Thinking),
        ("insights", Section::Insights),
        ("questions", Section::Questions),
        ("gaps", Section::Gaps),
        ("action", Section::Action),
        ("confidence", Section::Confidence),
    ];
    for (name, section) in HEADERS {
        if !lower.starts_with(name) {
            continue;
        }
        // Inline remainder keeps its original casing.
        let Some(after) = stripped.get(name.len()..) else {
            continue;
        };
        let after = after.trim_start_matches(['*', '_', ' ']);
        if after.is_empty() || after.starts_with(':') {
            let inline = after
                .trim_start_matches(':')
                .trim_start_matches(['*', '_'])
                .trim()
                .to_string();
            return Some((*section, inline));
        }
    }
    None
}

fn strip_bullet(line: &str) -> &str {
    let trimmed = line.trim();
    if let Some(rest) = trimmed
        .strip_prefix("- ")
        .or_else(|| trimmed.strip_prefix("* "))
        .or_else(|| trimmed.strip_prefix("• "))
    {
        return rest.trim();
    }
    let digits = trimmed.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &trimmed[digits..];
        if let Some(rest) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            return rest.trim();
        }
    }
    trimmed.trim_start_matches(['-', '*', '•']).trim()
}

fn parse_sections(text: &str) -> ParsedResponse {
    let mut parsed = ParsedResponse::default();
    let mut thinking: Vec<String> = Vec::new();
    let mut current = Section::Preamble;
    let mut saw_header = false;
    let mut saw_action = false;
    let mut saw_confidence = false;

    for line in text.lines() {
        let (section, content) = match section_header(line) {
            Some((section, inline)) => {
                saw_header = true;
                current = section;
                (section, inline)
            }
            None => (current, line.trim().to_string()),
        };
        if content.is_empty() {
            continue;
        }

        let warnings = &mut parsed.warnings;
        match section {
            Section::Preamble | Section::Thinking => thinking.push(content),
            Section::Insights => parsed.insights.push(text_insight(strip_bullet(&content), warnings)),
            Section::Questions => parsed.questions.push(text_question(strip_bullet(&content), warnings)),
            Section::Gaps => parsed.knowledge_gaps.push(text_gap(strip_bullet(&content), warnings)),
            Section::Action => {
                if !saw_action {
                    saw_action = true;
                    parsed.action = parse_action(strip_bullet(&content), warnings);
                }
            }
            Section::Confidence => {
                if !saw_confidence {
                    saw_confidence = true;
                    parsed.confidence = score_text(strip_bullet(&content), "confidence", warnings);
                }
            }
        }
    }

    parsed.insights.retain(|i| !i.content.is_empty());
    parsed.questions.retain(|q| !q.content.is_empty());
    parsed.knowledge_gaps.retain(|g| !g.description.is_empty());
    parsed.thinking = thinking.join("\n");

    if !saw_header {
        parsed
            .warnings
            .push("advisor response had no recognizable structure".to_string());
    } else if !saw_action {
        parsed
            .warnings
            .push("advisor response names no action".to_string());
    }
    parsed
}

/// Split `(key: value)` / `[key=value]` / `[domain]` annotations out of a list item.
fn annotations(item: &str) -> (String, HashMap<String, String>) {
    let mut notes = HashMap::new();
    let mut clean = String::new();
    let mut rest = item;

    while let Some(open) = rest.find(['(', '[']) {
        let close_char = if rest[open..].starts_with('(') { ')' } else { ']' };
        let Some(close_rel) = rest[open + 1..].find(close_char) else {
            break;
        };
        let close = open + 1 + close_rel;
        let inner = rest[open + 1..close].trim();

        let mut consumed = false;
        for part in inner.split([';', '|']) {
            let part = part.trim();
            if let Some(idx) = part.find([':', '=']) {
                let key = part[..idx].trim().to_lowercase();
                let value = part[idx + 1..].trim().to_string();
                if is_annotation_key(&key) {
                    notes.insert(key, value);
                    consumed = true;
                }
            } else if part.parse::<KnowledgeDomain>().is_ok() {
                notes.insert("domain".to_string(), part.to_string());
                consumed = true;
            }
        }

        clean.push_str(&rest[..open]);
        if !consumed {
            clean.push_str(&rest[open..=close]);
        }
        rest = &rest[close + 1..];
    }
    clean.push_str(rest);

    let clean = clean.split_whitespace().collect::<Vec<_>>().join(" ");
    (clean, notes)
}

fn is_annotation_key(key: &str) -> bool {
    matches!(
        key,
        "confidence"
            | "priority"
            | "importance"
            | "domain"
            | "domains"
            | "target"
            | "target_domain"
            | "related"
            | "related_questions"
    )
}

fn note<'a>(notes: &'a HashMap<String, String>, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| notes.get(*k)).map(String::as_str)
}

fn text_insight(item: &str, warnings: &mut Vec<String>) -> InsightDraft {
    let (content, notes) = annotations(item);
    InsightDraft {
        confidence: note(&notes, &["confidence"])
            .map(|v| score_text(v, "insight confidence", warnings))
            .unwrap_or(DEFAULT_SCORE),
        related_question_ids: note(&notes, &["related", "related_questions"])
            .map(split_list)
            .unwrap_or_default(),
        content,
    }
}

fn text_question(item: &str, warnings: &mut Vec<String>) -> QuestionDraft {
    let (content, notes) = annotations(item);
    let target_domain = match note(&notes, &["domain", "target", "target_domain"]) {
        Some(name) => parse_domain(name, warnings),
        None => infer_domain(&content),
    };
    QuestionDraft {
        priority: note(&notes, &["priority", "importance"])
            .map(|v| score_text(v, "question priority", warnings))
            .unwrap_or(DEFAULT_SCORE),
        target_domain,
        content,
    }
}

fn text_gap(item: &str, warnings: &mut Vec<String>) -> GapDraft {
    let (description, notes) = annotations(item);
    let mut domains: Vec<KnowledgeDomain> = note(&notes, &["domains", "domain", "target"])
        .map(split_list)
        .unwrap_or_default()
        .iter()
        .filter_map(|name| parse_domain(name, warnings))
        .collect();
    if domains.is_empty() {
        domains.extend(infer_domain(&description));
    }
    dedup_domains(&mut domains);
    GapDraft {
        importance: note(&notes, &["importance", "priority"])
            .map(|v| score_text(v, "gap importance", warnings))
            .unwrap_or(DEFAULT_SCORE),
        description,
        candidate_domains: domains,
    }
}

// ============================================================================
// Scalars
// ============================================================================

fn split_list(text: &str) -> Vec<String> {
    text.split([',', ' ', '/'])
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn dedup_domains(domains: &mut Vec<KnowledgeDomain>) {
    let mut seen = [false; 4];
    domains.retain(|d| !std::mem::replace(&mut seen[d.index()], true));
}

fn parse_action(text: &str, warnings: &mut Vec<String>) -> Option<Action> {
    let candidate = text.split_whitespace().next().unwrap_or_default();
    match text.parse::<Action>().or_else(|_| candidate.parse::<Action>()) {
        Ok(action) => Some(action),
        Err(_) => {
            warnings.push(format!(
                "unrecognized action '{}'",
                text.chars().take(40).collect::<String>()
            ));
            None
        }
    }
}

fn parse_domain(text: &str, warnings: &mut Vec<String>) -> Option<KnowledgeDomain> {
    match text.parse::<KnowledgeDomain>() {
        Ok(domain) => Some(domain),
        Err(_) => {
            warnings.push(format!("unrecognized domain '{}'", text));
            None
        }
    }
}

/// Guess a domain from wording when none was named.
fn infer_domain(text: &str) -> Option<KnowledgeDomain> {
    let lower = text.to_lowercase();
    const HINTS: &[(&str, KnowledgeDomain)] = &[
        ("baseline", KnowledgeDomain::Prediction),
        ("predicted", KnowledgeDomain::Prediction),
        ("forecast value", KnowledgeDomain::Prediction),
        ("feature", KnowledgeDomain::Model),
        ("shap", KnowledgeDomain::Model),
        ("model error", KnowledgeDomain::Model),
        ("interpretab", KnowledgeDomain::Model),
        ("statistic", KnowledgeDomain::Data),
        ("volatil", KnowledgeDomain::Data),
        ("trend", KnowledgeDomain::Data),
        ("variance", KnowledgeDomain::Data),
        ("historical", KnowledgeDomain::Context),
        ("past event", KnowledgeDomain::Context),
        ("similar day", KnowledgeDomain::Context),
        ("holiday", KnowledgeDomain::Context),
    ];
    HINTS
        .iter()
        .find(|(hint, _)| lower.contains(hint))
        .map(|(_, domain)| *domain)
}

fn score(value: Option<&Value>, name: &str, warnings: &mut Vec<String>) -> f64 {
    match value {
        None => DEFAULT_SCORE,
        Some(Value::Number(n)) => match n.as_f64() {
            Some(v) if v.is_finite() => v.clamp(0.0, 1.0),
            _ => {
                warnings.push(format!("{} is not a finite number", name));
                DEFAULT_SCORE
            }
        },
        Some(Value::String(s)) => score_text(s, name, warnings),
        Some(_) => {
            warnings.push(format!("{} has an unreadable value", name));
            DEFAULT_SCORE
        }
    }
}

fn score_text(text: &str, name: &str, warnings: &mut Vec<String>) -> f64 {
    let cleaned = text
        .trim()
        .trim_end_matches(['.', ',', ')', ']'])
        .trim()
        .to_lowercase();
    match cleaned.as_str() {
        "high" | "very high" => return 0.8,
        "medium" | "moderate" => return 0.5,
        "low" | "very low" => return 0.2,
        _ => {}
    }
    let (number, percent) = match cleaned.strip_suffix('%') {
        Some(n) => (n.trim(), true),
        None => (cleaned.as_str(), false),
    };
    match number.parse::<f64>() {
        Ok(v) if v.is_finite() => {
            let v = if percent { v / 100.0 } else { v };
            v.clamp(0.0, 1.0)
        }
        _ => {
            warnings.push(format!("{} '{}' is not a number", name, text.trim()));
            DEFAULT_SCORE
        }
    }
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod parser_tests;
