use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A named subject for a generated post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Only set for topics persisted by an admin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Topic {
    pub fn new(id: &str, name: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            created_at: None,
        }
    }

    /// A topic outside the catalog: the raw string doubles as name and description.
    pub fn ad_hoc(raw: &str) -> Self {
        Self::new(raw, raw, raw)
    }
}

const BUILTIN: &[(&str, &str, &str)] = &[
    ("web-development", "Web Development", "HTML, CSS, JavaScript, frameworks"),
    ("productivity", "Productivity Tools", "Tips and tools for better workflow"),
    ("programming", "Programming", "Coding tutorials and best practices"),
    ("design", "Design", "UI/UX, graphics, and visual design"),
    ("seo", "SEO & Marketing", "Search optimization and digital marketing"),
    ("ai-tools", "AI Tools", "Artificial intelligence and automation"),
    ("security", "Cybersecurity", "Online safety and data protection"),
    ("tutorials", "Tutorials", "Step-by-step guides and how-tos"),
];

pub fn list_topics() -> Vec<Topic> {
    BUILTIN
        .iter()
        .map(|(id, name, description)| Topic::new(id, name, description))
        .collect()
}

/// Resolve a topic id against `catalog`, falling back to an ad hoc topic.
pub fn resolve(catalog: &[Topic], topic: &str) -> Topic {
    catalog
        .iter()
        .find(|t| t.id == topic)
        .cloned()
        .unwrap_or_else(|| Topic::ad_hoc(topic))
}

/// Built-in topics first, then persisted ones. A persisted topic replaces a built-in with the same id
/// in place; new ones are appended in the order given.
pub fn merge_catalog(builtin: Vec<Topic>, custom: Vec<Topic>) -> Vec<Topic> {
    let mut merged = builtin;
    for topic in custom {
        match merged.iter_mut().find(|t| t.id == topic.id) {
            Some(existing) => *existing = topic,
            None => merged.push(topic),
        }
    }
    merged
}
