use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::models::GeneratedPost;
use crate::topics::Topic;

/// Reading time given to posts built from unparsed text.
pub const DEGRADED_READING_TIME: u32 = 5;
const WORDS_PER_MINUTE: usize = 200;

/// Turns raw model output into a [`GeneratedPost`], degrading to a raw-text record when the
/// structured payload cannot be recovered.
#[derive(Debug, Clone)]
pub struct ResponseExtractor {
    min_content_length: usize,
}

impl ResponseExtractor {
    pub fn new(min_content_length: usize) -> Self {
        Self { min_content_length }
    }

    /// Never fails. `provider` is left empty for the caller to fill in.
    pub fn extract(&self, raw: &str, topic: &Topic) -> GeneratedPost {
        match self.parse_structured(raw, topic) {
            Ok(post) => {
                debug!(topic = %topic.id, "parsed structured response");
                post
            }
            Err(reason) => {
                warn!(topic = %topic.id, reason = %reason, "structured parse failed, falling back to raw text");
                degraded(raw, topic)
            }
        }
    }

    fn parse_structured(&self, raw: &str, topic: &Topic) -> Result<GeneratedPost, String> {
        let candidate = isolate_json(raw);
        let value: Value = serde_json::from_str(&candidate).map_err(|e| format!("invalid JSON: {e}"))?;
        let Value::Object(fields) = value else {
            return Err("response is not a JSON object".to_string());
        };

        let content = fields
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| "content missing".to_string())?;
        let length = content.chars().count();
        if length < self.min_content_length {
            return Err(format!(
                "content too short ({length} < {} characters)",
                self.min_content_length
            ));
        }

        let meta_description = text_field(&fields, "metaDescription");
        let excerpt = text_field(&fields, "excerpt")
            .or_else(|| meta_description.clone())
            .unwrap_or_else(|| synthesized_excerpt(topic));
        let reading_time = reading_time_field(&fields).unwrap_or_else(|| estimate_reading_time(content));

        Ok(GeneratedPost {
            title: text_field(&fields, "title").unwrap_or_else(|| synthesized_title(topic)),
            content: content.to_string(),
            excerpt,
            meta_title: text_field(&fields, "metaTitle"),
            meta_description,
            keywords: list_field(&fields, "keywords"),
            tags: list_field(&fields, "tags")
                .into_iter()
                .map(|t| t.trim_start_matches('#').to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            category: topic.id.clone(),
            reading_time,
            ai_generated: true,
            provider: String::new(),
        })
    }
}

/// Strip code fences, cut to the outermost brace span, and drop control characters other than
/// newline, tab and carriage return.
pub fn isolate_json(raw: &str) -> String {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}'))
        && start < end
    {
        text = &text[start..=end];
    }

    text.chars()
        .filter(|c| !is_stray_control(*c))
        .collect()
}

fn is_stray_control(c: char) -> bool {
    matches!(c, '\u{0}'..='\u{1f}' | '\u{7f}') && !matches!(c, '\n' | '\t' | '\r')
}

/// Record wrapping the raw text verbatim.
pub fn degraded(raw: &str, topic: &Topic) -> GeneratedPost {
    GeneratedPost {
        title: synthesized_title(topic),
        content: raw.to_string(),
        excerpt: synthesized_excerpt(topic),
        meta_title: None,
        meta_description: Some(format!("Deep dive into {}", topic.name)),
        keywords: Vec::new(),
        tags: Vec::new(),
        category: topic.id.clone(),
        reading_time: DEGRADED_READING_TIME,
        ai_generated: true,
        provider: String::new(),
    }
}

fn synthesized_title(topic: &Topic) -> String {
    format!("{} (AI Generated)", topic.name)
}

fn synthesized_excerpt(topic: &Topic) -> String {
    format!("A comprehensive guide about {}.", topic.name)
}

fn text_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Accepts `["a", "b"]` or `"a, b"`.
fn list_field(fields: &Map<String, Value>, key: &str) -> Vec<String> {
    let items: Vec<String> = match fields.get(key) {
        Some(Value::Array(values)) => values
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(joined)) => joined.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    };
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Accepts `7`, `7.4`, `"7"` or `"7 min"`. Zero counts as absent.
fn reading_time_field(fields: &Map<String, Value>) -> Option<u32> {
    let minutes = match fields.get("readingTime")? {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f.round().max(0.0) as u64))?,
        Value::String(s) => {
            let digits: String = s.trim().chars().take_while(char::is_ascii_digit).collect();
            digits.parse().ok()?
        }
        _ => return None,
    };
    u32::try_from(minutes).ok().filter(|m| *m > 0)
}

fn estimate_reading_time(content: &str) -> u32 {
    let words = content.split_whitespace().count();
    words.div_ceil(WORDS_PER_MINUTE).max(1) as u32
}
