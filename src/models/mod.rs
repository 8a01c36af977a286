mod article;
mod blog;
mod digest;
mod source;
mod topic;

pub use article::{Article, NewArticle, RawArticle};
pub use blog::{Blog, BlogConfig, BlogType, FrontmatterFormat, TopicBlogLink};
pub use digest::{Digest, DigestDocument, DigestStatus, Frequency};
pub use source::{Source, SourceType};
pub use topic::Topic;
