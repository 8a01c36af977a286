mod generator;
mod render;

pub use generator::{keep_most_recent, summarize, DigestGenerator, PeriodRequest};
pub use render::{
    parse_markdown_articles, render, render_markdown, render_whatsapp, ExportFormat,
};
