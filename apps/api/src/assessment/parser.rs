//! Verdict parsing: turns raw model output into a `Verdict`.
//!
//! The matching strategy sits behind `VerdictParser` so it can be swapped
//! (strict schema, structured-output mode) without touching the orchestrator.
//! Parsing is a pure function of the raw text.

use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::models::verdict::{Decision, Verdict, VerdictAttributes};

const EXCERPT_CHARS: usize = 120;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no decision token recoverable from model output: {excerpt:?}")]
pub struct AssessmentParseError {
    pub excerpt: String,
}

impl AssessmentParseError {
    fn from_raw(raw: &str) -> Self {
        Self {
            excerpt: raw.trim().chars().take(EXCERPT_CHARS).collect(),
        }
    }
}

pub trait VerdictParser: Send + Sync {
    fn parse(&self, raw: &str) -> Result<Verdict, AssessmentParseError>;
}

/// Default parser. Accepts the JSON object the prompt asks for (with or without
/// code fences or surrounding chatter) and falls back to scanning free text for
/// a `SELECTED` / `REJECTED` token.
#[derive(Debug, Default, Clone, Copy)]
pub struct TolerantVerdictParser;

impl VerdictParser for TolerantVerdictParser {
    fn parse(&self, raw: &str) -> Result<Verdict, AssessmentParseError> {
        let text = strip_code_fences(raw);
        let verdict = match object_span(text) {
            // Keys like "selected" must never be read as a decision token, so
            // free text is only scanned outside the object.
            Some(span) => parse_json_object(&text[span.clone()])
                .or_else(|| recover_json_fields(&text[span.clone()]))
                .or_else(|| {
                    let outside = format!("{}\n{}", &text[..span.start], &text[span.end..]);
                    parse_free_text(&outside)
                }),
            None => parse_free_text(text),
        };
        verdict.ok_or_else(|| AssessmentParseError::from_raw(raw))
    }
}

/// Negated forms are listed before the bare word so the longest reading wins.
const DECISION_TOKEN: &str = r"(\bnot[\s_-]+(?:(?:yet|been|be|being)\s+)*selected|n't\s+(?:(?:yet|been|be|being)\s+)*selected|\bselected|\brejected)\b";

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(&format!("(?i){DECISION_TOKEN}")).expect("valid token regex"))
}

fn labelled_decision_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(?im)^[\s*#>\-]*(?:decision|verdict|result|status)\s*[*:=\-]+\s*\**\s*{DECISION_TOKEN}"
        ))
        .expect("valid decision regex")
    })
}

/// Any negation earlier in the same clause as a bare "selected".
fn negation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:not|never|no\s+longer|cannot|unable)\b|n't\b").expect("valid negation regex")
    })
}

fn json_selected_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)"(?:is_)?selected"\s*:\s*"?(true|false)\b"#).expect("valid selected regex")
    })
}

fn json_decision_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)"decision"\s*:\s*"([^"]*)""#).expect("valid decision field regex")
    })
}

fn json_rationale_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)"(?:feedback|rationale|reason)"\s*:\s*"((?:[^"\\]|\\.)*)""#)
            .expect("valid rationale field regex")
    })
}

fn labelled_rationale_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?im)^[\s*#>\-]*(?:rationale|feedback|reason)\s*[*:=\-]+\s*\**\s*(.+?)\s*$")
            .expect("valid rationale regex")
    })
}

fn negated(before: &str) -> bool {
    let clause_start = before
        .rfind(|c: char| matches!(c, '.' | '!' | '?' | ';' | '\n'))
        .map_or(0, |i| i + 1);
    negation_re().is_match(&before[clause_start..])
}

fn token_to_decision(token: &str) -> Decision {
    if token.eq_ignore_ascii_case("selected") {
        Decision::Selected
    } else {
        // "rejected" and every "not selected" spelling
        Decision::Rejected
    }
}

/// Strips a surrounding ```json ... ``` or ``` ... ``` fence.
fn strip_code_fences(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest).trim_start();
    rest.strip_suffix("```").map(str::trim).unwrap_or(rest)
}

/// Byte range of the outermost `{...}` when it looks like a JSON object.
fn object_span(text: &str) -> Option<Range<usize>> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    let body = &text[start..=end];
    (body.contains('"') && body.contains(':')).then_some(start..end + 1)
}

fn parse_json_object(object_text: &str) -> Option<Verdict> {
    let value: Value = serde_json::from_str(object_text).ok()?;
    let object = value.as_object()?;

    let decision = match object.get("selected").or_else(|| object.get("is_selected")) {
        Some(Value::Bool(selected)) => Some(if *selected {
            Decision::Selected
        } else {
            Decision::Rejected
        }),
        Some(Value::String(s)) if s.eq_ignore_ascii_case("true") => Some(Decision::Selected),
        Some(Value::String(s)) if s.eq_ignore_ascii_case("false") => Some(Decision::Rejected),
        _ => None,
    }
    .or_else(|| {
        object
            .get("decision")
            .and_then(Value::as_str)
            .and_then(|s| token_re().captures(s))
            .map(|caps| token_to_decision(&caps[1]))
    })?;

    let rationale = ["feedback", "rationale", "reason"]
        .iter()
        .find_map(|key| object.get(*key).and_then(Value::as_str))
        .unwrap_or_default()
        .trim()
        .to_string();

    let attributes = VerdictAttributes {
        matching_skills: string_list(object.get("matching_skills")),
        missing_skills: string_list(object.get("missing_skills")),
        experience_level: object
            .get("experience_level")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty()),
    };

    Some(Verdict {
        decision,
        rationale,
        attributes,
    })
}

/// Field-level recovery for an object that does not deserialize (trailing
/// commas, raw newlines in strings). Only explicit decision fields count.
fn recover_json_fields(object_text: &str) -> Option<Verdict> {
    let decision = match json_selected_re().captures(object_text) {
        Some(caps) if caps[1].eq_ignore_ascii_case("true") => Decision::Selected,
        Some(_) => Decision::Rejected,
        None => {
            let caps = json_decision_re().captures(object_text)?;
            let token = token_re().captures(&caps[1])?;
            token_to_decision(&token[1])
        }
    };

    let rationale = json_rationale_re()
        .captures(object_text)
        .map(|caps| {
            let escaped = &caps[1];
            serde_json::from_str::<String>(&format!("\"{escaped}\""))
                .unwrap_or_else(|_| escaped.replace("\\\"", "\""))
        })
        .unwrap_or_default()
        .trim()
        .to_string();

    Some(Verdict {
        decision,
        rationale,
        attributes: VerdictAttributes::default(),
    })
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn parse_free_text(text: &str) -> Option<Verdict> {
    // A labelled "Decision: X" line wins over tokens mentioned elsewhere.
    let decision_match = match labelled_decision_re().captures(text).and_then(|caps| caps.get(1)) {
        Some(labelled) => labelled,
        None => {
            let token = token_re().captures(text).and_then(|caps| caps.get(1))?;
            if token.as_str().eq_ignore_ascii_case("selected") && negated(&text[..token.start()]) {
                return None;
            }
            token
        }
    };
    let decision = token_to_decision(decision_match.as_str());

    let rationale = match labelled_rationale_re().captures(text) {
        Some(caps) => caps[1].trim().to_string(),
        None => {
            let mut rest = String::with_capacity(text.len());
            rest.push_str(&text[..decision_match.start()]);
            rest.push_str(&text[decision_match.end()..]);
            rest.trim_matches(|c: char| c.is_whitespace() || matches!(c, ',' | '.' | ':' | '-' | '*'))
                .to_string()
        }
    };

    Some(Verdict {
        decision,
        rationale,
        attributes: VerdictAttributes::default(),
    })
}
