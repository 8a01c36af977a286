mod frontmatter;
mod layout;

use std::path::PathBuf;

use chrono_tz::Tz;

use crate::config::BlogTemplateConfig;
use crate::digest::render_markdown;
use crate::error::{AppError, Result};
use crate::models::{Blog, DigestDocument, TopicBlogLink};
use crate::util::slugify;

pub use frontmatter::Frontmatter;
pub use layout::{layout_for, HugoLayout, JekyllLayout, LocalLayout, PostLayout, SlugPrefix};

/// Outcome of a publish. With `written == false` nothing touched the disk.
#[derive(Debug, Clone)]
pub struct PublishResult {
    pub blog_name: String,
    pub path: PathBuf,
    pub content: String,
    pub written: bool,
}

/// Renders digests into a blog's post format and writes them.
pub struct Publisher<'a> {
    template: &'a BlogTemplateConfig,
    tz: Tz,
}

impl<'a> Publisher<'a> {
    pub fn new(template: &'a BlogTemplateConfig, tz: Tz) -> Self {
        Self { template, tz }
    }

    /// Target path and full file content for a digest, without side effects.
    pub fn render_post(
        &self,
        doc: &DigestDocument,
        blog: &Blog,
        link: Option<&TopicBlogLink>,
    ) -> Result<(PathBuf, String)> {
        let layout = layout_for(blog.blog_type);
        let prefix = SlugPrefix::parse(link.and_then(|l| l.slug_prefix.as_deref()))?;

        let base_slug = slugify(&format!(
            "{} {} digest",
            doc.topic.name, doc.digest.frequency
        ));
        let slug = match &prefix.file {
            Some(file) => format!("{}-{}", slugify(file), base_slug),
            None => base_slug,
        };

        let local_end = doc.digest.period_end.with_timezone(&self.tz);
        let filename = format!(
            "{}-{}.{}",
            local_end.format("%Y-%m-%d"),
            slug,
            blog.config.extension()
        );

        let mut dir = layout.posts_dir(&blog.config);
        if let Some(sub) = &prefix.dir {
            dir = dir.join(sub);
        }
        let path = dir.join(filename);

        let mut content = String::new();
        if layout.frontmatter() {
            let format = blog
                .config
                .frontmatter_format
                .unwrap_or(self.template.frontmatter_format);
            let tags = if self.template.include_tags {
                vec![
                    doc.topic.name.clone(),
                    "digest".to_string(),
                    doc.digest.frequency.to_string(),
                ]
            } else {
                Vec::new()
            };
            let frontmatter = Frontmatter {
                title: format!("{}: {}", doc.title(), local_end.format("%b %d, %Y")),
                date: local_end.to_rfc3339(),
                slug,
                categories: link.and_then(|l| l.category.clone()).into_iter().collect(),
                tags,
                summary: doc.digest.summary.clone(),
            };
            content.push_str(&frontmatter.render(format)?);
        }
        content.push_str(&render_markdown(doc, self.tz));

        Ok((path, content))
    }

    pub fn publish(
        &self,
        doc: &DigestDocument,
        blog: &Blog,
        link: Option<&TopicBlogLink>,
        dry_run: bool,
    ) -> Result<PublishResult> {
        let (path, content) = self.render_post(doc, blog, link)?;

        if !dry_run {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AppError::Publish(format!("cannot create {}: {}", parent.display(), e))
                })?;
            }
            std::fs::write(&path, &content)
                .map_err(|e| AppError::Publish(format!("cannot write {}: {}", path.display(), e)))?;
            tracing::info!("Wrote digest {} to {}", doc.digest.id, path.display());
        }

        Ok(PublishResult {
            blog_name: blog.name.clone(),
            path,
            content,
            written: !dry_run,
        })
    }
}
