use std::sync::LazyLock;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    BlogPost, BlogPostRow, Connection, NewConnection, NewPost, PostCounts, PostPatch, PostStatus, PostSummary,
};
use crate::topics::{self, Topic};

/// Storage limits, in characters.
pub const MAX_TITLE: usize = 255;
pub const MAX_EXCERPT: usize = 500;
pub const MAX_META_TITLE: usize = 100;
pub const MAX_META_DESCRIPTION: usize = 200;

/// All post columns in SELECT order (must match BlogPostRow field order).
const POST_COLUMNS: &str = "id, title, slug, content, excerpt, meta_title, meta_description, keywords,
    featured_image, category, tags, status, author_id, reading_time, ai_generated, views,
    published_at, created_at, updated_at";

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\w+([.-]?\w+)*@\w+([.-]?\w+)*(\.\w{2,3})+$").unwrap_or_else(|e| panic!("invalid email pattern: {e}"))
});

/// Lowercase, collapse every run of characters outside `[a-z0-9]` into `-`, trim dashes.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for c in title.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// Persistence port used when saving generated posts.
#[async_trait]
pub trait PostStore: Send + Sync {
    async fn slug_exists(&self, slug: &str) -> Result<bool>;
    async fn create_post(&self, post: NewPost) -> Result<BlogPost>;
}

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PostStore for SqliteStore {
    async fn slug_exists(&self, slug: &str) -> Result<bool> {
        slug_exists(&self.pool, slug).await
    }

    async fn create_post(&self, post: NewPost) -> Result<BlogPost> {
        create_post(&self.pool, post).await
    }
}

// ── Posts ──────────────────────────────────────────────────────────────

pub async fn slug_exists(pool: &SqlitePool, slug: &str) -> Result<bool> {
    let row: Option<(String,)> = sqlx::query_as("SELECT id FROM posts WHERE slug = ?")
        .bind(slug)
        .fetch_optional(pool)
        .await
        .context("checking slug")?;
    Ok(row.is_some())
}

/// Slug for `title` that no stored post uses yet. When posts with the same prefix exist the
/// slug gets a `-N` suffix starting at their count plus one.
pub async fn unique_slug(pool: &SqlitePool, title: &str) -> Result<String> {
    let base = match slugify(title) {
        s if s.is_empty() => "post".to_string(),
        s => s,
    };

    let (existing,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts WHERE slug LIKE ? || '%'")
        .bind(&base)
        .fetch_one(pool)
        .await
        .context("counting slugs")?;
    if existing == 0 {
        return Ok(base);
    }

    let mut n = existing + 1;
    loop {
        let candidate = format!("{base}-{n}");
        if !slug_exists(pool, &candidate).await? {
            return Ok(candidate);
        }
        n += 1;
    }
}

fn validate_lengths(
    title: &str,
    excerpt: Option<&str>,
    meta_title: Option<&str>,
    meta_description: Option<&str>,
) -> Result<(), StoreError> {
    let checks = [
        ("Title", Some(title), MAX_TITLE),
        ("Excerpt", excerpt, MAX_EXCERPT),
        ("Meta title", meta_title, MAX_META_TITLE),
        ("Meta description", meta_description, MAX_META_DESCRIPTION),
    ];
    for (label, value, max) in checks {
        if value.is_some_and(|v| v.chars().count() > max) {
            return Err(StoreError::Validation(format!("{label} cannot exceed {max} characters")));
        }
    }
    Ok(())
}

fn to_json(list: &[String]) -> String {
    serde_json::to_string(list).unwrap_or_else(|_| "[]".to_string())
}

pub async fn create_post(pool: &SqlitePool, post: NewPost) -> Result<BlogPost> {
    let title = post.title.trim();
    if title.is_empty() {
        return Err(StoreError::Validation("Title is required".to_string()).into());
    }
    if post.content.trim().is_empty() {
        return Err(StoreError::Validation("Content is required".to_string()).into());
    }
    validate_lengths(
        title,
        post.excerpt.as_deref(),
        post.meta_title.as_deref(),
        post.meta_description.as_deref(),
    )?;

    let id = Uuid::new_v4().to_string();
    let slug = unique_slug(pool, title).await?;
    let now = Utc::now();
    let published_at = (post.status == PostStatus::Published).then_some(now);
    let category = post
        .category
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or("general");

    sqlx::query(
        "INSERT INTO posts (id, title, slug, content, excerpt, meta_title, meta_description, keywords,
         featured_image, category, tags, status, author_id, reading_time, ai_generated, views,
         published_at, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?)",
    )
    .bind(&id)
    .bind(title)
    .bind(&slug)
    .bind(&post.content)
    .bind(&post.excerpt)
    .bind(&post.meta_title)
    .bind(&post.meta_description)
    .bind(to_json(&post.keywords))
    .bind(&post.featured_image)
    .bind(category)
    .bind(to_json(&post.tags))
    .bind(post.status.as_str())
    .bind(&post.author_id)
    .bind(i64::from(post.reading_time.unwrap_or(5)))
    .bind(post.ai_generated)
    .bind(published_at)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("inserting post")?;

    debug!(id = %id, slug = %slug, "created post");

    get_post(pool, &id)
        .await?
        .ok_or_else(|| StoreError::NotFound("Post").into())
}

pub async fn get_post(pool: &SqlitePool, id: &str) -> Result<Option<BlogPost>> {
    let row: Option<BlogPostRow> = sqlx::query_as(&format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("fetching post")?;
    Ok(row.map(BlogPost::from))
}

/// Admin listing, newest first, optionally filtered by status.
pub async fn list_posts(pool: &SqlitePool, status: Option<PostStatus>) -> Result<Vec<BlogPost>> {
    let rows: Vec<BlogPostRow> = sqlx::query_as(&format!(
        "SELECT {POST_COLUMNS} FROM posts WHERE (?1 IS NULL OR status = ?1)
         ORDER BY created_at DESC, rowid DESC"
    ))
    .bind(status.map(PostStatus::as_str))
    .fetch_all(pool)
    .await
    .context("listing posts")?;
    Ok(rows.into_iter().map(BlogPost::from).collect())
}

/// Published posts, newest first.
pub async fn list_published(pool: &SqlitePool, category: Option<&str>, limit: Option<i64>) -> Result<Vec<PostSummary>> {
    let rows: Vec<BlogPostRow> = sqlx::query_as(&format!(
        "SELECT {POST_COLUMNS} FROM posts WHERE status = 'published' AND (?1 IS NULL OR category = ?1)
         ORDER BY created_at DESC, rowid DESC LIMIT ?2"
    ))
    .bind(category)
    .bind(limit.filter(|l| *l > 0).unwrap_or(-1))
    .fetch_all(pool)
    .await
    .context("listing published posts")?;
    Ok(rows.into_iter().map(|r| PostSummary::from(BlogPost::from(r))).collect())
}

/// Fetch a published post by slug and count the view.
pub async fn view_published(pool: &SqlitePool, slug: &str) -> Result<Option<BlogPost>> {
    let result = sqlx::query("UPDATE posts SET views = views + 1 WHERE slug = ? AND status = 'published'")
        .bind(slug)
        .execute(pool)
        .await
        .context("counting post view")?;
    if result.rows_affected() == 0 {
        return Ok(None);
    }

    let row: Option<BlogPostRow> = sqlx::query_as(&format!("SELECT {POST_COLUMNS} FROM posts WHERE slug = ?"))
        .bind(slug)
        .fetch_optional(pool)
        .await
        .context("fetching post by slug")?;
    Ok(row.map(BlogPost::from))
}

/// Apply `patch` over the stored post. Returns `None` if the post does not exist.
pub async fn update_post(pool: &SqlitePool, id: &str, patch: PostPatch) -> Result<Option<BlogPost>> {
    let Some(mut post) = get_post(pool, id).await? else {
        return Ok(None);
    };

    if let Some(title) = patch.title {
        let title = title.trim().to_string();
        if title.is_empty() {
            return Err(StoreError::Validation("Title is required".to_string()).into());
        }
        post.title = title;
    }
    if let Some(content) = patch.content {
        if content.trim().is_empty() {
            return Err(StoreError::Validation("Content is required".to_string()).into());
        }
        post.content = content;
    }
    if let Some(excerpt) = patch.excerpt {
        post.excerpt = Some(excerpt);
    }
    if let Some(meta_title) = patch.meta_title {
        post.meta_title = Some(meta_title);
    }
    if let Some(meta_description) = patch.meta_description {
        post.meta_description = Some(meta_description);
    }
    if let Some(keywords) = patch.keywords {
        post.keywords = keywords;
    }
    if let Some(featured_image) = patch.featured_image {
        post.featured_image = Some(featured_image).filter(|f| !f.is_empty());
    }
    if let Some(category) = patch.category {
        post.category = category;
    }
    if let Some(tags) = patch.tags {
        post.tags = tags;
    }
    if let Some(reading_time) = patch.reading_time {
        post.reading_time = i64::from(reading_time);
    }
    let now = Utc::now();
    if let Some(status) = patch.status {
        if status == PostStatus::Published && post.published_at.is_none() {
            post.published_at = Some(now);
        }
        post.status = status.as_str().to_string();
    }

    validate_lengths(
        &post.title,
        post.excerpt.as_deref(),
        post.meta_title.as_deref(),
        post.meta_description.as_deref(),
    )?;

    sqlx::query(
        "UPDATE posts SET title = ?, content = ?, excerpt = ?, meta_title = ?, meta_description = ?,
         keywords = ?, featured_image = ?, category = ?, tags = ?, status = ?, reading_time = ?,
         published_at = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(&post.title)
    .bind(&post.content)
    .bind(&post.excerpt)
    .bind(&post.meta_title)
    .bind(&post.meta_description)
    .bind(to_json(&post.keywords))
    .bind(&post.featured_image)
    .bind(&post.category)
    .bind(to_json(&post.tags))
    .bind(&post.status)
    .bind(post.reading_time)
    .bind(post.published_at)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await
    .context("updating post")?;

    get_post(pool, id).await
}

pub async fn delete_post(pool: &SqlitePool, id: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM posts WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("deleting post")?;
    Ok(result.rows_affected() > 0)
}

/// Mark a post published and stamp `published_at` with the current time.
pub async fn publish_post(pool: &SqlitePool, id: &str) -> Result<Option<BlogPost>> {
    let now = Utc::now();
    let result = sqlx::query("UPDATE posts SET status = 'published', published_at = ?, updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await
        .context("publishing post")?;
    if result.rows_affected() == 0 {
        return Ok(None);
    }
    get_post(pool, id).await
}

/// Move a post back to drafts.
pub async fn unpublish_post(pool: &SqlitePool, id: &str) -> Result<Option<BlogPost>> {
    let result = sqlx::query("UPDATE posts SET status = 'draft', updated_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await
        .context("unpublishing post")?;
    if result.rows_affected() == 0 {
        return Ok(None);
    }
    get_post(pool, id).await
}

pub async fn post_counts(pool: &SqlitePool) -> Result<PostCounts> {
    let (total, drafts, published): (i64, i64, i64) = sqlx::query_as(
        "SELECT COUNT(*),
                COALESCE(SUM(status = 'draft'), 0),
                COALESCE(SUM(status = 'published'), 0)
         FROM posts",
    )
    .fetch_one(pool)
    .await
    .context("counting posts")?;
    Ok(PostCounts {
        total,
        drafts,
        published,
    })
}

// ── Topics ─────────────────────────────────────────────────────────────

pub async fn list_custom_topics(pool: &SqlitePool) -> Result<Vec<Topic>> {
    sqlx::query_as("SELECT id, name, description, created_at FROM topics ORDER BY name")
        .fetch_all(pool)
        .await
        .context("listing topics")
}

/// Built-in catalog with stored topics merged over it.
pub async fn topic_catalog(pool: &SqlitePool) -> Result<Vec<Topic>> {
    let custom = list_custom_topics(pool).await?;
    Ok(topics::merge_catalog(topics::list_topics(), custom))
}

async fn get_topic(pool: &SqlitePool, id: &str) -> Result<Option<Topic>> {
    sqlx::query_as("SELECT id, name, description, created_at FROM topics WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("fetching topic")
}

/// Create a topic whose id is derived from its name. The description defaults to the name.
pub async fn create_topic(pool: &SqlitePool, name: &str, description: Option<&str>) -> Result<Topic> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StoreError::Validation("Name is required".to_string()).into());
    }
    let id = slugify(name);
    if id.is_empty() {
        return Err(StoreError::Validation("Name must contain letters or digits".to_string()).into());
    }
    if get_topic(pool, &id).await?.is_some() {
        return Err(StoreError::Conflict("Topic already exists".to_string()).into());
    }

    let description = description.map(str::trim).filter(|d| !d.is_empty()).unwrap_or(name);
    sqlx::query("INSERT INTO topics (id, name, description, created_at) VALUES (?, ?, ?, ?)")
        .bind(&id)
        .bind(name)
        .bind(description)
        .bind(Utc::now())
        .execute(pool)
        .await
        .context("inserting topic")?;

    debug!(id = %id, "created topic");
    get_topic(pool, &id)
        .await?
        .ok_or_else(|| StoreError::NotFound("Topic").into())
}

/// Blank fields leave the stored value untouched.
pub async fn update_topic(
    pool: &SqlitePool,
    id: &str,
    name: Option<&str>,
    description: Option<&str>,
) -> Result<Option<Topic>> {
    let Some(mut topic) = get_topic(pool, id).await? else {
        return Ok(None);
    };
    if let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) {
        topic.name = name.to_string();
    }
    if let Some(description) = description.map(str::trim).filter(|d| !d.is_empty()) {
        topic.description = description.to_string();
    }

    sqlx::query("UPDATE topics SET name = ?, description = ? WHERE id = ?")
        .bind(&topic.name)
        .bind(&topic.description)
        .bind(id)
        .execute(pool)
        .await
        .context("updating topic")?;
    Ok(Some(topic))
}

pub async fn delete_topic(pool: &SqlitePool, id: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM topics WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("deleting topic")?;
    Ok(result.rows_affected() > 0)
}

// ── Connections ────────────────────────────────────────────────────────

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub async fn create_connection(pool: &SqlitePool, input: NewConnection) -> Result<Connection> {
    let email = input.email.trim();
    if email.is_empty() {
        return Err(StoreError::Validation("Email is required".to_string()).into());
    }
    if !is_valid_email(email) {
        return Err(StoreError::Validation("Please provide a valid email".to_string()).into());
    }
    let trimmed = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

    let id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO connections (id, type, email, name, message, status, created_at)
         VALUES (?, ?, ?, ?, ?, 'new', ?)",
    )
    .bind(&id)
    .bind(input.kind.as_str())
    .bind(email)
    .bind(trimmed(input.name))
    .bind(trimmed(input.message))
    .bind(Utc::now())
    .execute(pool)
    .await
    .context("inserting connection")?;

    debug!(id = %id, kind = input.kind.as_str(), "stored connection");

    sqlx::query_as("SELECT id, type, email, name, message, status, created_at FROM connections WHERE id = ?")
        .bind(&id)
        .fetch_one(pool)
        .await
        .context("fetching connection")
}

pub async fn list_connections(pool: &SqlitePool) -> Result<Vec<Connection>> {
    sqlx::query_as(
        "SELECT id, type, email, name, message, status, created_at FROM connections
         ORDER BY created_at DESC, rowid DESC",
    )
    .fetch_all(pool)
    .await
    .context("listing connections")
}

pub async fn delete_connection(pool: &SqlitePool, id: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM connections WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("deleting connection")?;
    Ok(result.rows_affected() > 0)
}

// ── Settings ───────────────────────────────────────────────────────────

/// Read a setting from the settings table.
pub async fn get_setting(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await
        .context("reading setting")?;
    Ok(row.map(|(v,)| v))
}

/// Upsert a setting in the settings table.
pub async fn set_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await
    .context("upserting setting")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use crate::models::ConnectionKind;

    fn new_post(title: &str) -> NewPost {
        serde_json::from_value(serde_json::json!({
            "title": title,
            "content": "Body text",
            "tags": ["rust"],
            "keywords": ["async", "tokio"]
        }))
        .unwrap()
    }

    #[test]
    fn slugify_rules() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  --Rust & Async 2024--  "), "rust-async-2024");
        assert_eq!(slugify("Café au lait"), "caf-au-lait");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn email_pattern() {
        assert!(is_valid_email("jane.doe@example.com"));
        assert!(is_valid_email("a_b-c@mail.example.org"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("x@y"));
        assert!(!is_valid_email("x@example.museum"));
    }

    #[tokio::test]
    async fn create_post_defaults_and_lists() {
        let pool = memory_pool().await;
        let post = create_post(&pool, new_post("Hello World")).await.unwrap();

        assert_eq!(post.slug, "hello-world");
        assert_eq!(post.status, "draft");
        assert_eq!(post.category, "general");
        assert_eq!(post.author_id, "admin");
        assert_eq!(post.reading_time, 5);
        assert_eq!(post.keywords, vec!["async".to_string(), "tokio".to_string()]);
        assert!(post.published_at.is_none());
        assert!(!post.ai_generated);

        let fetched = get_post(&pool, &post.id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "Hello World");
        assert_eq!(list_posts(&pool, None).await.unwrap().len(), 1);
        assert!(list_posts(&pool, Some(PostStatus::Published)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn slugs_stay_unique() {
        let pool = memory_pool().await;
        let slugs = [
            create_post(&pool, new_post("Hello World")).await.unwrap().slug,
            create_post(&pool, new_post("Hello World")).await.unwrap().slug,
            create_post(&pool, new_post("Hello World!")).await.unwrap().slug,
            create_post(&pool, new_post("???")).await.unwrap().slug,
        ];
        assert_eq!(slugs, ["hello-world", "hello-world-2", "hello-world-3", "post"]);

        // A freed suffix is skipped over when the count collides with a live slug
        let second = list_posts(&pool, None)
            .await
            .unwrap()
            .into_iter()
            .find(|p| p.slug == "hello-world-2")
            .unwrap();
        delete_post(&pool, &second.id).await.unwrap();
        assert_eq!(unique_slug(&pool, "Hello World").await.unwrap(), "hello-world-4");
        create_post(&pool, new_post("Hello World")).await.unwrap();
        assert_eq!(unique_slug(&pool, "Hello World").await.unwrap(), "hello-world-5");
    }

    #[tokio::test]
    async fn create_post_validates() {
        let pool = memory_pool().await;

        let err = create_post(&pool, new_post("  ")).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<StoreError>(), Some(StoreError::Validation(_))));

        let mut long = new_post("Fine");
        long.meta_title = Some("m".repeat(MAX_META_TITLE + 1));
        let err = create_post(&pool, long).await.unwrap_err();
        assert_eq!(err.to_string(), "Meta title cannot exceed 100 characters");
    }

    #[tokio::test]
    async fn publish_flow_and_public_reads() {
        let pool = memory_pool().await;
        let draft = create_post(&pool, new_post("Draft Only")).await.unwrap();
        let mut other = new_post("Going Live");
        other.category = Some("seo".to_string());
        let live = create_post(&pool, other).await.unwrap();

        let published = publish_post(&pool, &live.id).await.unwrap().unwrap();
        assert_eq!(published.status, "published");
        assert!(published.published_at.is_some());

        let public = list_published(&pool, None, None).await.unwrap();
        assert_eq!(public.len(), 1);
        assert_eq!(public[0].slug, "going-live");
        assert!(list_published(&pool, Some("design"), None).await.unwrap().is_empty());
        assert_eq!(list_published(&pool, Some("seo"), Some(5)).await.unwrap().len(), 1);

        assert!(view_published(&pool, &draft.slug).await.unwrap().is_none());
        view_published(&pool, "going-live").await.unwrap().unwrap();
        let viewed = view_published(&pool, "going-live").await.unwrap().unwrap();
        assert_eq!(viewed.views, 2);

        let counts = post_counts(&pool).await.unwrap();
        assert_eq!(
            counts,
            PostCounts {
                total: 2,
                drafts: 1,
                published: 1
            }
        );

        let back = unpublish_post(&pool, &live.id).await.unwrap().unwrap();
        assert_eq!(back.status, "draft");
        assert!(list_published(&pool, None, None).await.unwrap().is_empty());
        assert!(publish_post(&pool, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_applies_only_given_fields() {
        let pool = memory_pool().await;
        let post = create_post(&pool, new_post("Original")).await.unwrap();

        let patch = PostPatch {
            excerpt: Some("Short".to_string()),
            tags: Some(vec!["a".to_string(), "b".to_string()]),
            status: Some(PostStatus::Published),
            ..PostPatch::default()
        };
        let updated = update_post(&pool, &post.id, patch).await.unwrap().unwrap();
        assert_eq!(updated.title, "Original");
        assert_eq!(updated.slug, "original");
        assert_eq!(updated.excerpt.as_deref(), Some("Short"));
        assert_eq!(updated.tags.len(), 2);
        assert!(updated.published_at.is_some());

        let bad = PostPatch {
            excerpt: Some("e".repeat(MAX_EXCERPT + 1)),
            ..PostPatch::default()
        };
        assert!(update_post(&pool, &post.id, bad).await.is_err());
        assert!(update_post(&pool, "missing", PostPatch::default()).await.unwrap().is_none());

        assert!(delete_post(&pool, &post.id).await.unwrap());
        assert!(!delete_post(&pool, &post.id).await.unwrap());
    }

    #[tokio::test]
    async fn topic_crud_and_catalog() {
        let pool = memory_pool().await;

        let topic = create_topic(&pool, "Rust Async", None).await.unwrap();
        assert_eq!(topic.id, "rust-async");
        assert_eq!(topic.description, "Rust Async");
        assert!(topic.created_at.is_some());

        let err = create_topic(&pool, "rust async", Some("dup")).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<StoreError>(), Some(StoreError::Conflict(_))));
        assert!(create_topic(&pool, "   ", None).await.is_err());

        create_topic(&pool, "Design", Some("Interfaces people enjoy")).await.unwrap();
        let catalog = topic_catalog(&pool).await.unwrap();
        assert_eq!(catalog.len(), 9);
        assert_eq!(catalog[3].description, "Interfaces people enjoy");
        assert_eq!(catalog[8].id, "rust-async");

        let renamed = update_topic(&pool, "rust-async", Some("Async Rust"), Some(" "))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(renamed.name, "Async Rust");
        assert_eq!(renamed.description, "Rust Async");
        assert!(update_topic(&pool, "nope", Some("x"), None).await.unwrap().is_none());

        assert!(delete_topic(&pool, "rust-async").await.unwrap());
        assert_eq!(list_custom_topics(&pool).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn connections_round_trip() {
        let pool = memory_pool().await;

        let missing = NewConnection {
            kind: ConnectionKind::Contact,
            email: " ".to_string(),
            name: None,
            message: None,
        };
        let err = create_connection(&pool, missing).await.unwrap_err();
        assert_eq!(err.to_string(), "Email is required");

        let input = NewConnection {
            kind: ConnectionKind::Newsletter,
            email: "reader@example.com".to_string(),
            name: Some("  Reader ".to_string()),
            message: Some("   ".to_string()),
        };
        let stored = create_connection(&pool, input).await.unwrap();
        assert_eq!(stored.kind, "newsletter");
        assert_eq!(stored.status, "new");
        assert_eq!(stored.name.as_deref(), Some("Reader"));
        assert!(stored.message.is_none());

        assert_eq!(list_connections(&pool).await.unwrap().len(), 1);
        assert!(delete_connection(&pool, &stored.id).await.unwrap());
        assert!(list_connections(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn settings_upsert() {
        let pool = memory_pool().await;
        assert!(get_setting(&pool, "admin_token").await.unwrap().is_none());
        set_setting(&pool, "admin_token", "one").await.unwrap();
        set_setting(&pool, "admin_token", "two").await.unwrap();
        assert_eq!(get_setting(&pool, "admin_token").await.unwrap().as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn sqlite_store_implements_port() {
        let store = SqliteStore::new(memory_pool().await);
        assert!(!store.slug_exists("hello").await.unwrap());
        let post = store.create_post(new_post("Hello")).await.unwrap();
        assert_eq!(post.slug, "hello");
        assert!(store.slug_exists("hello").await.unwrap());
    }
}
