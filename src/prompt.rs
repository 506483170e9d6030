use crate::models::InternalLink;
use crate::topics::{self, Topic};

const SYSTEM_INSTRUCTION: &str = "You are an expert SEO Content Strategist. Your tone is professional, \
engaging, and human-like. You write for beginners and marketers.";

/// Instruction pair sent to a provider as the system and user messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Builds generation prompts against a topic catalog.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    catalog: Vec<Topic>,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(topics::list_topics())
    }
}

impl PromptBuilder {
    pub fn new(catalog: Vec<Topic>) -> Self {
        Self { catalog }
    }

    pub fn resolve(&self, topic: &str) -> Topic {
        topics::resolve(&self.catalog, topic)
    }

    pub fn build(&self, topic: &str, internal_links: &[InternalLink]) -> Prompt {
        let info = self.resolve(topic);

        let mut user = format!(
            "Write a comprehensive, 1200-word blog post about \"{name}\" ({description}).

**Structure & Requirements:**
1. **Title**: Engaging and SEO-optimized.
2. **Introduction**: Hook the reader immediately.
3. **Headings**: Use Markdown `##` for sections and `###` for subsections. Never use `#` inside the content.
4. **Content**: At least 1000 words. Informative, actionable, and structured with bullet points.
5. **SEO**: Use relevant keywords naturally throughout the text.
6. **Conclusion**: Summarize key takeaways.
7. **CTA**: End with a compelling Call to Action.
8. **Links**: If relevant, mention helpful resources (like official docs or tutorials).
",
            name = info.name,
            description = info.description,
        );

        if !internal_links.is_empty() {
            user.push_str(
                "\n**Internal Links:**\nWeave these links into the content only if natural, never forced:\n",
            );
            for link in internal_links {
                user.push_str(&format!("- [{}]({})\n", link.anchor, link.url));
            }
        }

        user.push_str(
            r###"
**REQUIRED OUTPUT FORMAT:**
Respond with a single JSON object and nothing else:
{
  "title": "The Actual Blog Post Title",
  "excerpt": "A short, engaging summary of the post (max 300 characters)",
  "content": "## Introduction\n\nThe full blog post in Markdown...",
  "metaTitle": "SEO title (max 60 characters, optional)",
  "metaDescription": "SEO meta description (max 160 characters)",
  "keywords": ["keyword one", "keyword two"],
  "tags": ["tag-one", "tag-two"],
  "readingTime": 5
}
Escape newlines inside strings as \n."###,
        );

        Prompt {
            system: SYSTEM_INSTRUCTION.to_string(),
            user,
        }
    }
}
