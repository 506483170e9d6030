use serde::Serialize;
use tracing::{error, info, warn};

use crate::models::{BlogPost, GeneratedPost, GenerationOutcome, NewPost, PostStatus};
use crate::store::{self, MAX_EXCERPT, MAX_META_DESCRIPTION, MAX_META_TITLE, MAX_TITLE, PostStore};

pub const AI_AUTHOR: &str = "ai-generator";

/// A generation or save that did not produce a stored post.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersistError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub error: String,
}

#[derive(Debug, Default, Serialize)]
pub struct PersistSummary {
    pub posts: Vec<BlogPost>,
    pub errors: Vec<PersistError>,
    /// Drafts whose title slug was already taken and got a numbered slug instead.
    pub renamed: usize,
}

/// Save every successful outcome as a draft. Failed generations and failed saves are collected,
/// never propagated.
pub async fn persist_outcomes(store: &dyn PostStore, outcomes: Vec<GenerationOutcome>) -> PersistSummary {
    let mut summary = PersistSummary::default();

    for outcome in outcomes {
        let generated = match outcome {
            GenerationOutcome::Success(post) => post,
            GenerationOutcome::Failure(error) => {
                summary.errors.push(PersistError { title: None, error });
                continue;
            }
        };

        let title = generated.title.clone();
        let draft = draft_from(generated);
        let taken = match store.slug_exists(&store::slugify(draft.title.trim())).await {
            Ok(taken) => taken,
            Err(e) => {
                error!(title = %title, error = %e, "slug lookup failed");
                summary.errors.push(PersistError {
                    title: Some(title),
                    error: e.to_string(),
                });
                continue;
            }
        };

        match store.create_post(draft).await {
            Ok(post) => {
                if taken {
                    warn!(title = %title, slug = %post.slug, "title slug already taken, saved under a numbered slug");
                    summary.renamed += 1;
                }
                info!(id = %post.id, slug = %post.slug, "saved generated draft");
                summary.posts.push(post);
            }
            Err(e) => {
                error!(title = %title, error = %e, "failed to save generated post");
                summary.errors.push(PersistError {
                    title: Some(title),
                    error: e.to_string(),
                });
            }
        }
    }

    summary
}

fn draft_from(post: GeneratedPost) -> NewPost {
    NewPost {
        title: clamp(&post.title, MAX_TITLE),
        content: post.content,
        excerpt: Some(clamp(&post.excerpt, MAX_EXCERPT)),
        meta_title: post.meta_title.map(|t| clamp(&t, MAX_META_TITLE)),
        meta_description: post.meta_description.map(|d| clamp(&d, MAX_META_DESCRIPTION)),
        keywords: post.keywords,
        featured_image: None,
        category: Some(post.category),
        tags: post.tags,
        status: PostStatus::Draft,
        author_id: AI_AUTHOR.to_string(),
        reading_time: Some(post.reading_time),
        ai_generated: true,
    }
}

/// Truncate to at most `max` characters.
fn clamp(value: &str, max: usize) -> String {
    match value.char_indices().nth(max) {
        Some((cut, _)) => value[..cut].to_string(),
        None => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use crate::store::SqliteStore;

    use anyhow::{Result, anyhow};
    use async_trait::async_trait;

    /// Store whose slug lookups always fail.
    struct BrokenLookup;

    #[async_trait]
    impl PostStore for BrokenLookup {
        async fn slug_exists(&self, _slug: &str) -> Result<bool> {
            Err(anyhow!("database is locked"))
        }

        async fn create_post(&self, _post: NewPost) -> Result<BlogPost> {
            panic!("create_post must not run after a failed slug lookup");
        }
    }

    fn generated(title: &str) -> GeneratedPost {
        GeneratedPost {
            title: title.to_string(),
            content: "## Body\n\nText".to_string(),
            excerpt: "Summary".to_string(),
            meta_title: Some("t".repeat(150)),
            meta_description: Some("d".repeat(250)),
            keywords: vec!["k".to_string()],
            tags: vec!["t".to_string()],
            category: "seo".to_string(),
            reading_time: 7,
            ai_generated: true,
            provider: "Gemini".to_string(),
        }
    }

    #[test]
    fn clamp_counts_characters() {
        assert_eq!(clamp("héllo", 2), "hé");
        assert_eq!(clamp("short", 10), "short");
    }

    #[tokio::test]
    async fn successes_become_drafts_and_failures_are_listed() {
        let store = SqliteStore::new(memory_pool().await);
        let outcomes = vec![
            GenerationOutcome::Success(generated("First Post")),
            GenerationOutcome::Failure("All AI providers failed. Last error: boom".to_string()),
            GenerationOutcome::Success(generated(&"x".repeat(300))),
        ];

        let summary = persist_outcomes(&store, outcomes).await;
        assert_eq!(summary.posts.len(), 2);
        assert_eq!(summary.errors.len(), 1);
        assert!(summary.errors[0].title.is_none());

        let first = &summary.posts[0];
        assert_eq!(first.slug, "first-post");
        assert_eq!(first.status, "draft");
        assert_eq!(first.author_id, AI_AUTHOR);
        assert_eq!(first.category, "seo");
        assert_eq!(first.reading_time, 7);
        assert!(first.ai_generated);
        assert_eq!(first.meta_title.as_deref().map(str::len), Some(MAX_META_TITLE));
        assert_eq!(first.meta_description.as_deref().map(str::len), Some(MAX_META_DESCRIPTION));

        assert_eq!(summary.posts[1].title.len(), MAX_TITLE);
    }

    #[tokio::test]
    async fn save_errors_do_not_stop_the_loop() {
        let store = SqliteStore::new(memory_pool().await);
        let mut empty = generated("Nothing Inside");
        empty.content = "   ".to_string();

        let summary = persist_outcomes(
            &store,
            vec![GenerationOutcome::Success(empty), GenerationOutcome::Success(generated("Fine"))],
        )
        .await;

        assert_eq!(summary.posts.len(), 1);
        assert_eq!(
            summary.errors,
            vec![PersistError {
                title: Some("Nothing Inside".to_string()),
                error: "Content is required".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn duplicate_titles_are_counted_as_renamed() {
        let store = SqliteStore::new(memory_pool().await);

        let summary = persist_outcomes(
            &store,
            vec![
                GenerationOutcome::Success(generated("Same Title")),
                GenerationOutcome::Success(generated("Same Title")),
            ],
        )
        .await;

        assert_eq!(summary.posts.len(), 2);
        assert_eq!(summary.posts[0].slug, "same-title");
        assert_eq!(summary.posts[1].slug, "same-title-2");
        assert_eq!(summary.renamed, 1);
    }

    #[tokio::test]
    async fn slug_lookup_errors_are_collected() {
        let summary = persist_outcomes(&BrokenLookup, vec![GenerationOutcome::Success(generated("Any"))]).await;

        assert!(summary.posts.is_empty());
        assert_eq!(
            summary.errors,
            vec![PersistError {
                title: Some("Any".to_string()),
                error: "database is locked".to_string(),
            }]
        );
    }
}
