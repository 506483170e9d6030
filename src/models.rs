use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use sqlx::FromRow;

use crate::error::GenerationError;

// ── Generation ─────────────────────────────────────────────────────────

/// Anchor/URL pair the model may weave into the post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalLink {
    pub anchor: String,
    pub url: String,
}

/// Caller-supplied request to generate `count` posts about `topic`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    #[serde(default)]
    pub topic: String,
    #[serde(default = "default_count")]
    pub count: u32,
    #[serde(default)]
    pub internal_links: Vec<InternalLink>,
}

fn default_count() -> u32 {
    1
}

impl GenerationRequest {
    pub fn new(topic: impl Into<String>, count: u32) -> Self {
        Self {
            topic: topic.into(),
            count,
            internal_links: Vec::new(),
        }
    }

    pub fn validate(&self, max_count: u32) -> Result<(), GenerationError> {
        if self.topic.trim().is_empty() {
            return Err(GenerationError::EmptyTopic);
        }
        if self.count < 1 || self.count > max_count {
            return Err(GenerationError::CountOutOfRange {
                count: self.count,
                max: max_count,
            });
        }
        if let Some(index) = self
            .internal_links
            .iter()
            .position(|l| l.anchor.trim().is_empty() || l.url.trim().is_empty())
        {
            return Err(GenerationError::InvalidLink { index });
        }
        Ok(())
    }
}

/// A post recovered from a provider response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedPost {
    pub title: String,
    pub content: String,
    pub excerpt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_description: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub category: String,
    pub reading_time: u32,
    pub ai_generated: bool,
    /// Display name of the provider that produced the post.
    pub provider: String,
}

/// Result of one generation attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    Success(GeneratedPost),
    Failure(String),
}

impl GenerationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, GenerationOutcome::Success(_))
    }
}

impl Serialize for GenerationOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("GenerationOutcome", 2)?;
        match self {
            GenerationOutcome::Success(post) => {
                state.serialize_field("success", &true)?;
                state.serialize_field("post", post)?;
            }
            GenerationOutcome::Failure(error) => {
                state.serialize_field("success", &false)?;
                state.serialize_field("error", error)?;
            }
        }
        state.end()
    }
}

// ── Blog posts ─────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    #[default]
    Draft,
    Published,
    Archived,
}

impl PostStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Published => "published",
            PostStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(PostStatus::Draft),
            "published" => Ok(PostStatus::Published),
            "archived" => Ok(PostStatus::Archived),
            other => Err(format!("unknown post status '{other}'")),
        }
    }
}

/// Row as stored; list columns are JSON-encoded text.
#[derive(Debug, Clone, FromRow)]
pub struct BlogPostRow {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: Option<String>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub keywords: String,
    pub featured_image: Option<String>,
    pub category: String,
    pub tags: String,
    pub status: String,
    pub author_id: String,
    pub reading_time: i64,
    pub ai_generated: bool,
    pub views: i64,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogPost {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: Option<String>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub keywords: Vec<String>,
    pub featured_image: Option<String>,
    pub category: String,
    pub tags: Vec<String>,
    pub status: String,
    pub author_id: String,
    pub reading_time: i64,
    pub ai_generated: bool,
    pub views: i64,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<BlogPostRow> for BlogPost {
    fn from(row: BlogPostRow) -> Self {
        Self {
            keywords: serde_json::from_str(&row.keywords).unwrap_or_default(),
            tags: serde_json::from_str(&row.tags).unwrap_or_default(),
            id: row.id,
            title: row.title,
            slug: row.slug,
            content: row.content,
            excerpt: row.excerpt,
            meta_title: row.meta_title,
            meta_description: row.meta_description,
            featured_image: row.featured_image,
            category: row.category,
            status: row.status,
            author_id: row.author_id,
            reading_time: row.reading_time,
            ai_generated: row.ai_generated,
            views: row.views,
            published_at: row.published_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Listing shape for the public blog index (no body).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostSummary {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub featured_image: Option<String>,
    pub category: String,
    pub tags: Vec<String>,
    pub reading_time: i64,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<BlogPost> for PostSummary {
    fn from(post: BlogPost) -> Self {
        Self {
            id: post.id,
            title: post.title,
            slug: post.slug,
            excerpt: post.excerpt,
            featured_image: post.featured_image,
            category: post.category,
            tags: post.tags,
            reading_time: post.reading_time,
            published_at: post.published_at,
            created_at: post.created_at,
        }
    }
}

/// Input for creating a post; also the admin create-post body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPost {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub excerpt: Option<String>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub featured_image: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub status: PostStatus,
    #[serde(default = "default_author")]
    pub author_id: String,
    pub reading_time: Option<u32>,
    #[serde(default)]
    pub ai_generated: bool,
}

fn default_author() -> String {
    "admin".to_string()
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub excerpt: Option<String>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub featured_image: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub status: Option<PostStatus>,
    pub reading_time: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PostCounts {
    pub total: i64,
    pub drafts: i64,
    pub published: i64,
}

// ── Connections (contact / newsletter) ─────────────────────────────────

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    #[default]
    Contact,
    Newsletter,
}

impl ConnectionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionKind::Contact => "contact",
            ConnectionKind::Newsletter => "newsletter",
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: String,
    pub email: String,
    pub name: Option<String>,
    pub message: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewConnection {
    #[serde(rename = "type", default)]
    pub kind: ConnectionKind,
    #[serde(default)]
    pub email: String,
    pub name: Option<String>,
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_validation() {
        assert!(GenerationRequest::new("seo", 3).validate(10).is_ok());
        assert!(matches!(
            GenerationRequest::new("  ", 1).validate(10),
            Err(GenerationError::EmptyTopic)
        ));
        assert!(matches!(
            GenerationRequest::new("seo", 0).validate(10),
            Err(GenerationError::CountOutOfRange { count: 0, max: 10 })
        ));
        assert!(GenerationRequest::new("seo", 11).validate(10).is_err());

        let mut request = GenerationRequest::new("seo", 1);
        request.internal_links.push(InternalLink {
            anchor: "Docs".to_string(),
            url: String::new(),
        });
        assert!(matches!(request.validate(10), Err(GenerationError::InvalidLink { index: 0 })));
    }

    #[test]
    fn request_body_defaults() {
        let request: GenerationRequest = serde_json::from_str(r#"{"topic":"design"}"#).unwrap();
        assert_eq!(request.count, 1);
        assert!(request.internal_links.is_empty());

        let request: GenerationRequest = serde_json::from_str(
            r#"{"topic":"design","count":2,"internalLinks":[{"anchor":"Tools","url":"/tools"}]}"#,
        )
        .unwrap();
        assert_eq!(request.internal_links[0].url, "/tools");
    }

    #[test]
    fn outcome_serializes_as_envelope() {
        let failure = serde_json::to_value(GenerationOutcome::Failure("boom".to_string())).unwrap();
        assert_eq!(failure, serde_json::json!({"success": false, "error": "boom"}));

        let post = GeneratedPost {
            title: "T".to_string(),
            content: "C".to_string(),
            excerpt: "E".to_string(),
            meta_title: None,
            meta_description: None,
            keywords: vec![],
            tags: vec![],
            category: "seo".to_string(),
            reading_time: 5,
            ai_generated: true,
            provider: "Gemini".to_string(),
        };
        let success = serde_json::to_value(GenerationOutcome::Success(post)).unwrap();
        assert_eq!(success["success"], true);
        assert_eq!(success["post"]["aiGenerated"], true);
        assert_eq!(success["post"]["readingTime"], 5);
        assert!(success["post"].get("metaTitle").is_none());
    }

    #[test]
    fn status_round_trips_through_str() {
        assert_eq!("published".parse::<PostStatus>().unwrap(), PostStatus::Published);
        assert!("live".parse::<PostStatus>().is_err());
        assert_eq!(PostStatus::Archived.to_string(), "archived");
    }
}
