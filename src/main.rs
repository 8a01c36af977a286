use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use digest_tracker::app::{FetchReport, TopicInfo};
use digest_tracker::digest::ExportFormat;
use digest_tracker::models::{Digest, Frequency};
use digest_tracker::util::parse_date_arg;
use digest_tracker::{App, Config, Result};

/// Track topics, collect articles and publish periodic digests.
#[derive(Parser)]
#[command(name = "digest-tracker")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true, env = "DIGEST_TRACKER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage topics
    #[command(subcommand)]
    Topic(TopicCommand),

    /// Manage the sources of a topic
    #[command(subcommand)]
    Source(SourceCommand),

    /// Manage publishing targets
    #[command(subcommand)]
    Blog(BlogCommand),

    /// Fetch new articles for a topic
    Fetch {
        topic: String,

        /// Look back this many days instead of since the last fetch
        #[arg(long)]
        days: Option<i64>,
    },

    /// Generate a digest from stored articles
    Generate {
        topic: String,

        /// daily, weekly or monthly
        frequency: Option<String>,

        /// Period length in days, ending now
        #[arg(long)]
        days: Option<i64>,

        /// Period start (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        from: Option<String>,

        /// Period end (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        to: Option<String>,
    },

    /// List the digests of a topic, most recent first
    History {
        topic: String,

        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Print a stored digest
    View {
        id: String,

        /// markdown, whatsapp or json
        #[arg(long, default_value = "markdown")]
        format: String,
    },

    /// Export a stored digest to stdout or a file
    Export {
        id: String,

        #[arg(long, default_value = "markdown")]
        format: String,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write a digest into a blog
    Publish {
        id: String,

        /// Blog to publish to instead of the topic's linked blog
        #[arg(long)]
        blog: Option<String>,

        /// Show the target path and content without writing
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum TopicCommand {
    /// Create a topic
    Add {
        name: String,

        #[arg(long)]
        desc: Option<String>,
    },
    /// List topics
    List,
    /// Delete a topic with its sources and articles
    Remove {
        name: String,

        /// Also delete the topic's digests
        #[arg(long)]
        force: bool,
    },
    /// Show sources, blog and recent digests of a topic
    Info { name: String },
}

#[derive(Subcommand)]
enum SourceCommand {
    /// Attach a source to a topic
    Add {
        topic: String,
        url: String,

        /// rss, web or youtube
        #[arg(long = "type", default_value = "rss")]
        source_type: String,

        /// Source settings as a JSON object, e.g. '{"max_entries": 20}'
        #[arg(long)]
        config: Option<String>,
    },
    /// List the sources of a topic
    List { topic: String },
    /// Remove a source; its articles are kept
    Remove { id: i64 },
}

#[derive(Subcommand)]
enum BlogCommand {
    /// Register a blog
    Add {
        name: String,

        /// local, hugo or jekyll
        blog_type: String,

        /// Blog settings as JSON, e.g. '{"path": "~/site"}'
        #[arg(long)]
        config: Option<String>,
    },
    /// List blogs
    List,
    /// Publish a topic's digests to a blog by default
    Link {
        topic: String,
        blog: String,

        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        slug_prefix: Option<String>,
    },
    /// Remove a topic's blog link
    Unlink { topic: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("Error: {:#}", e);
        return ExitCode::FAILURE;
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(e.exit_code());
        }
    };

    match run(cli.command, &config).await {
        Ok(code) => code,
        Err(e) => {
            tracing::debug!("Command failed: {:?}", e);
            eprintln!("Error: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_logging(verbose: bool) -> anyhow::Result<()> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) => EnvFilter::try_new(directives).context("invalid RUST_LOG")?,
        Err(_) if verbose => EnvFilter::new("digest_tracker=debug,warn"),
        Err(_) => EnvFilter::new("warn"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
        .context("failed to initialise logging")
}

async fn run(command: Commands, config: &Config) -> Result<ExitCode> {
    let app = App::new(config).await?;

    match command {
        Commands::Topic(cmd) => topic_command(&app, cmd).await?,
        Commands::Source(cmd) => source_command(&app, cmd).await?,
        Commands::Blog(cmd) => blog_command(&app, cmd).await?,
        Commands::Fetch { topic, days } => {
            let report = app.fetch_topic(&topic, days).await?;
            print_fetch_report(&report);
            if report.has_failures() {
                return Ok(ExitCode::from(5));
            }
        }
        Commands::Generate {
            topic,
            frequency,
            days,
            from,
            to,
        } => {
            let frequency = frequency.map(|f| f.parse::<Frequency>()).transpose()?;
            let from = from.map(|d| parse_date_arg(&d, false)).transpose()?;
            let to = to.map(|d| parse_date_arg(&d, true)).transpose()?;

            let doc = app.generate(&topic, frequency, days, from, to).await?;
            let tz = app.timezone();
            println!("Generated digest {}", doc.digest.id);
            println!(
                "Period: {} to {} ({} articles)",
                doc.digest.period_start.with_timezone(&tz).format("%Y-%m-%d %H:%M"),
                doc.digest.period_end.with_timezone(&tz).format("%Y-%m-%d %H:%M"),
                doc.articles.len()
            );
            println!();
            println!("{}", app.render(&doc, ExportFormat::Whatsapp)?);
        }
        Commands::History { topic, limit } => {
            let digests = app.history(&topic, limit).await?;
            if digests.is_empty() {
                println!("No digests for {}", topic);
            }
            for digest in &digests {
                print_digest_line(&app, digest);
            }
        }
        Commands::View { id, format } => {
            print!("{}", app.view(&id, format.parse()?).await?);
        }
        Commands::Export { id, format, output } => {
            let rendered = app.export(&id, format.parse()?, output.as_deref()).await?;
            match output {
                Some(path) => println!("Exported digest {} to {}", id, path.display()),
                None => print!("{}", rendered),
            }
        }
        Commands::Publish { id, blog, dry_run } => {
            let result = app.publish(&id, blog.as_deref(), dry_run).await?;
            if result.written {
                println!(
                    "Published digest {} to {}: {}",
                    id,
                    result.blog_name,
                    result.path.display()
                );
            } else {
                println!("Would write {}", result.path.display());
                println!();
                print!("{}", result.content);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn topic_command(app: &App<'_>, cmd: TopicCommand) -> Result<()> {
    match cmd {
        TopicCommand::Add { name, desc } => {
            let topic = app.add_topic(&name, desc).await?;
            println!("Added topic {} ({})", topic.name, topic.id);
        }
        TopicCommand::List => {
            let topics = app.list_topics().await?;
            if topics.is_empty() {
                println!("No topics");
            }
            for topic in topics {
                match topic.description {
                    Some(desc) => println!("{}  {}", topic.name, desc),
                    None => println!("{}", topic.name),
                }
            }
        }
        TopicCommand::Remove { name, force } => {
            app.remove_topic(&name, force).await?;
            println!("Removed topic {}", name);
        }
        TopicCommand::Info { name } => {
            let info = app.topic_info(&name).await?;
            print_topic_info(app, &info);
        }
    }
    Ok(())
}

async fn source_command(app: &App<'_>, cmd: SourceCommand) -> Result<()> {
    match cmd {
        SourceCommand::Add {
            topic,
            url,
            source_type,
            config,
        } => {
            let source = app
                .add_source(&topic, &url, &source_type, config.as_deref())
                .await?;
            println!("Added {} source {} ({})", source.source_type, source.url, source.id);
        }
        SourceCommand::List { topic } => {
            let sources = app.list_sources(&topic).await?;
            if sources.is_empty() {
                println!("No sources for {}", topic);
            }
            for source in sources {
                let fetched = source
                    .last_fetched_at
                    .map(|at| {
                        at.with_timezone(&app.timezone())
                            .format("%Y-%m-%d %H:%M")
                            .to_string()
                    })
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "{:>4}  {:<8} {}  (last fetched: {})",
                    source.id, source.source_type, source.url, fetched
                );
            }
        }
        SourceCommand::Remove { id } => {
            app.remove_source(id).await?;
            println!("Removed source {}", id);
        }
    }
    Ok(())
}

async fn blog_command(app: &App<'_>, cmd: BlogCommand) -> Result<()> {
    match cmd {
        BlogCommand::Add {
            name,
            blog_type,
            config,
        } => {
            let blog = app.add_blog(&name, &blog_type, config.as_deref()).await?;
            println!("Added {} blog {}", blog.blog_type.as_str(), blog.name);
        }
        BlogCommand::List => {
            let blogs = app.list_blogs().await?;
            if blogs.is_empty() {
                println!("No blogs");
            }
            for blog in blogs {
                println!(
                    "{}  {}  {}",
                    blog.name,
                    blog.blog_type.as_str(),
                    blog.config.root().display()
                );
            }
        }
        BlogCommand::Link {
            topic,
            blog,
            category,
            slug_prefix,
        } => {
            app.link_blog(&topic, &blog, category, slug_prefix).await?;
            println!("Linked {} to {}", topic, blog);
        }
        BlogCommand::Unlink { topic } => {
            app.unlink_blog(&topic).await?;
            println!("Unlinked {}", topic);
        }
    }
    Ok(())
}

fn print_fetch_report(report: &FetchReport) {
    if report.sources.is_empty() {
        println!("No sources for {}", report.topic);
        return;
    }
    for source in &report.sources {
        match &source.result {
            Ok(counts) => println!(
                "  ok    {}: {} fetched, {} new",
                source.url, counts.fetched, counts.new
            ),
            Err(e) => println!("  error {}: {}", source.url, e),
        }
    }
    println!(
        "{}: {} new articles from {} sources ({} failed)",
        report.topic,
        report.new_articles(),
        report.sources.len(),
        report.failures()
    );
}

fn print_digest_line(app: &App<'_>, digest: &Digest) {
    let tz = app.timezone();
    println!(
        "{:<9} {:<7} {} to {}  {:>3} articles  {}",
        digest.status.as_str(),
        digest.frequency.as_str(),
        digest.period_start.with_timezone(&tz).format("%Y-%m-%d"),
        digest.period_end.with_timezone(&tz).format("%Y-%m-%d"),
        digest.article_ids.len(),
        digest.id
    );
}

fn print_topic_info(app: &App<'_>, info: &TopicInfo) {
    println!("{}", info.topic.name);
    if let Some(desc) = &info.topic.description {
        println!("  {}", desc);
    }
    println!("  Articles: {}", info.article_count);

    println!("  Sources:");
    if info.sources.is_empty() {
        println!("    (none)");
    }
    for source in &info.sources {
        println!("    {:>4}  {:<8} {}", source.id, source.source_type, source.url);
    }

    match &info.blog {
        Some((link, blog)) => {
            print!("  Blog: {} ({})", blog.name, blog.blog_type.as_str());
            if let Some(category) = &link.category {
                print!(" category={}", category);
            }
            if let Some(prefix) = &link.slug_prefix {
                print!(" slug_prefix={}", prefix);
            }
            println!();
        }
        None => println!("  Blog: (none)"),
    }

    println!("  Recent digests:");
    if info.recent_digests.is_empty() {
        println!("    (none)");
    }
    for digest in &info.recent_digests {
        print!("    ");
        print_digest_line(app, digest);
    }
}
