use std::path::{Component, Path, PathBuf};

use crate::error::{AppError, Result};
use crate::models::{BlogConfig, BlogType};

/// Where a blog type keeps its posts and whether they carry frontmatter.
pub trait PostLayout {
    fn posts_dir(&self, config: &BlogConfig) -> PathBuf;

    fn frontmatter(&self) -> bool;
}

pub struct LocalLayout;

pub struct HugoLayout;

pub struct JekyllLayout;

impl PostLayout for LocalLayout {
    fn posts_dir(&self, config: &BlogConfig) -> PathBuf {
        match config.posts_dir.as_deref().filter(|d| !d.is_empty()) {
            Some(dir) => config.root().join(dir),
            None => config.root(),
        }
    }

    fn frontmatter(&self) -> bool {
        false
    }
}

impl PostLayout for HugoLayout {
    fn posts_dir(&self, config: &BlogConfig) -> PathBuf {
        config
            .root()
            .join(config.content_dir.as_deref().unwrap_or("content/posts"))
    }

    fn frontmatter(&self) -> bool {
        true
    }
}

impl PostLayout for JekyllLayout {
    fn posts_dir(&self, config: &BlogConfig) -> PathBuf {
        config
            .root()
            .join(config.posts_dir.as_deref().unwrap_or("_posts"))
    }

    fn frontmatter(&self) -> bool {
        true
    }
}

pub fn layout_for(blog_type: BlogType) -> &'static dyn PostLayout {
    match blog_type {
        BlogType::Local => &LocalLayout,
        BlogType::Hugo => &HugoLayout,
        BlogType::Jekyll => &JekyllLayout,
    }
}

/// A slug prefix split into a sub-directory and a file-name prefix.
/// `"digests/"` is a directory only, `"ai/weekly"` is directory `ai` plus
/// prefix `weekly`, and `"weekly"` is a prefix only.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SlugPrefix {
    pub dir: Option<PathBuf>,
    pub file: Option<String>,
}

impl SlugPrefix {
    pub fn parse(prefix: Option<&str>) -> Result<Self> {
        let prefix = match prefix.map(str::trim).filter(|p| !p.is_empty()) {
            Some(p) => p.trim_start_matches('/'),
            None => return Ok(Self::default()),
        };

        let (dir, file) = if prefix.ends_with('/') {
            (Some(prefix.trim_end_matches('/')), None)
        } else {
            match prefix.rsplit_once('/') {
                Some((dir, file)) => (Some(dir), Some(file)),
                None => (None, Some(prefix)),
            }
        };

        let dir = dir.filter(|d| !d.is_empty()).map(PathBuf::from);
        if let Some(dir) = &dir {
            if !is_plain_relative(dir) {
                return Err(AppError::Publish(format!(
                    "slug prefix must stay inside the blog: {}",
                    dir.display()
                )));
            }
        }

        Ok(Self {
            dir,
            file: file.filter(|f| !f.is_empty()).map(str::to_string),
        })
    }
}

fn is_plain_relative(path: &Path) -> bool {
    path.components().all(|c| matches!(c, Component::Normal(_)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BlogConfig {
        BlogConfig {
            path: "/srv/site".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_post_dirs() {
        let config = config();
        assert_eq!(layout_for(BlogType::Local).posts_dir(&config), PathBuf::from("/srv/site"));
        assert_eq!(
            layout_for(BlogType::Hugo).posts_dir(&config),
            PathBuf::from("/srv/site/content/posts")
        );
        assert_eq!(
            layout_for(BlogType::Jekyll).posts_dir(&config),
            PathBuf::from("/srv/site/_posts")
        );
        assert!(!layout_for(BlogType::Local).frontmatter());
        assert!(layout_for(BlogType::Hugo).frontmatter());
    }

    #[test]
    fn test_configured_post_dirs() {
        let config = BlogConfig {
            content_dir: Some("content/digests".to_string()),
            posts_dir: Some("posts".to_string()),
            ..config()
        };
        assert_eq!(
            layout_for(BlogType::Hugo).posts_dir(&config),
            PathBuf::from("/srv/site/content/digests")
        );
        assert_eq!(
            layout_for(BlogType::Local).posts_dir(&config),
            PathBuf::from("/srv/site/posts")
        );
    }

    #[test]
    fn test_slug_prefix_forms() {
        assert_eq!(SlugPrefix::parse(None).unwrap(), SlugPrefix::default());
        assert_eq!(
            SlugPrefix::parse(Some("digests/")).unwrap(),
            SlugPrefix {
                dir: Some(PathBuf::from("digests")),
                file: None
            }
        );
        assert_eq!(
            SlugPrefix::parse(Some("nested/path/")).unwrap().dir,
            Some(PathBuf::from("nested/path"))
        );
        assert_eq!(
            SlugPrefix::parse(Some("ai/weekly")).unwrap(),
            SlugPrefix {
                dir: Some(PathBuf::from("ai")),
                file: Some("weekly".to_string())
            }
        );
        assert_eq!(
            SlugPrefix::parse(Some("weekly")).unwrap(),
            SlugPrefix {
                dir: None,
                file: Some("weekly".to_string())
            }
        );
    }

    #[test]
    fn test_slug_prefix_cannot_escape() {
        assert!(matches!(
            SlugPrefix::parse(Some("../outside/")),
            Err(AppError::Publish(_))
        ));
    }
}
