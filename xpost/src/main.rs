//! xpost - Compose and publish multi-platform posts
//!
//! Reads post-creation requests as JSON, shows the gateway requests they
//! turn into, and stores posts per account group.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use clap::{Parser, Subcommand};
use libcrosspost::collection::attach;
use libcrosspost::compose::PublishRequestComposer;
use libcrosspost::dispatch::MockDispatcher;
use libcrosspost::logging::LoggingConfig;
use libcrosspost::scheduling::parse_schedule;
use libcrosspost::service::{CrosspostService, PublishReport};
use libcrosspost::{
    build_post, Config, CreatePostRequest, CrosspostError, Database, Post, PostCollection,
    VariantKey,
};

#[derive(Parser, Debug)]
#[command(name = "xpost")]
#[command(version)]
#[command(about = "Compose and publish posts across platforms")]
#[command(long_about = "\
xpost - Compose and publish posts across platforms

DESCRIPTION:
    xpost takes a post-creation request (JSON) with base content, media and
    optional per-platform variants, and turns it into the smallest set of
    publishing-gateway requests. Platforms with their own variant get a
    dedicated request; the rest share one grouped request.

COMMANDS:
    compose   Print the gateway requests for a request file
    attach    Store the request's post in its account group
    show      Show a stored post
    list      List the posts of an account group
    publish   Store and publish a request

USAGE EXAMPLES:
    # See what would be sent
    xpost compose request.json

    # Read the request from stdin and schedule it
    cat request.json | xpost compose - --schedule \"tomorrow 9am\"

    # Store a post, then inspect it
    xpost attach request.json
    xpost show acme 3f1c...

    # Run the full publish flow against the in-process gateway
    xpost publish request.json --dry-run --format json

CONFIGURATION:
    Configuration file: ~/.config/crosspost/config.toml
    Database location: ~/.local/share/crosspost/posts.db

    Override with --config or the CROSSPOST_CONFIG environment variable.

EXIT CODES:
    0 - Success
    1 - Operation failed
    2 - Authentication failed
    3 - Invalid input (bad request JSON, unknown platform, post not found)
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the configuration file
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    #[arg(value_parser = ["text", "json"])]
    format: String,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the gateway requests a request would produce
    Compose {
        /// Request JSON file, or - for stdin
        input: String,

        /// Schedule time (e.g. "2030-01-01T09:00:00Z", "2h", "tomorrow 3pm")
        #[arg(short, long)]
        schedule: Option<String>,
    },

    /// Store the request's post in its account group
    Attach {
        /// Request JSON file, or - for stdin
        input: String,
    },

    /// Show a stored post
    Show {
        /// Account group the post belongs to
        account_group: String,

        post_id: String,
    },

    /// List the posts of an account group, oldest first
    List { account_group: String },

    /// Store and publish a request
    Publish {
        /// Request JSON file, or - for stdin
        input: String,

        /// Schedule time (e.g. "2030-01-01T09:00:00Z", "2h", "tomorrow 3pm")
        #[arg(short, long)]
        schedule: Option<String>,

        /// Send to the in-process gateway instead of a real one
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = LoggingConfig::from_env().with_verbose(cli.verbose).try_init() {
        eprintln!("Warning: logging disabled: {}", e);
    }

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        let code = e
            .downcast_ref::<CrosspostError>()
            .map(CrosspostError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let json = cli.format == "json";

    match cli.command {
        Commands::Compose { input, schedule } => {
            cmd_compose(&config, &input, schedule.as_deref(), json)
        }
        Commands::Attach { input } => cmd_attach(&config, &input, json).await,
        Commands::Show {
            account_group,
            post_id,
        } => cmd_show(&config, &account_group, &post_id, json).await,
        Commands::List { account_group } => cmd_list(&config, &account_group, json).await,
        Commands::Publish {
            input,
            schedule,
            dry_run,
        } => cmd_publish(config, &input, schedule.as_deref(), dry_run, json).await,
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    tracing::debug!("Using database at {}", config.resolve_db_path().display());
    Ok(config)
}

/// Read a request from a file, or from stdin when `input` is `-`
fn read_request(input: &str, schedule: Option<&str>) -> Result<CreatePostRequest> {
    let raw = if input == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read request from stdin")?;
        buffer
    } else {
        std::fs::read_to_string(input).with_context(|| format!("Failed to read {}", input))?
    };

    let mut request: CreatePostRequest = serde_json::from_str(&raw).map_err(|e| {
        CrosspostError::InvalidInput(format!("Request is not valid JSON: {}", e))
    })?;

    if let Some(expr) = schedule {
        let at = parse_schedule(expr, Utc::now())?;
        request.scheduled_date = Some(at.to_rfc3339_opts(SecondsFormat::Secs, true));
    }
    Ok(request)
}

async fn open_database(config: &Config) -> Result<Database> {
    let path = config.resolve_db_path();
    let path = path.to_str().context("Database path is not valid UTF-8")?;
    Ok(Database::new(path).await?)
}

fn cmd_compose(config: &Config, input: &str, schedule: Option<&str>, json: bool) -> Result<()> {
    let request = read_request(input, schedule)?.validate()?;
    let post = build_post(&request);
    let requests = PublishRequestComposer::from_config(config)?.compose(&request, &post);

    if json {
        println!("{}", serde_json::to_string_pretty(&requests)?);
        return Ok(());
    }

    for (i, req) in requests.iter().enumerate() {
        let kind = match req.target {
            VariantKey::Base => "grouped",
            VariantKey::Platform(_) => "dedicated",
        };
        println!(
            "{}. [{}] {} | {} media | {}",
            i + 1,
            kind,
            req.gateway_platforms().join(","),
            req.media_urls.len(),
            truncate_content(&req.content, 50)
        );
    }
    Ok(())
}

async fn cmd_attach(config: &Config, input: &str, json: bool) -> Result<()> {
    let request = read_request(input, None)?.validate()?;
    let db = open_database(config).await?;
    let collection = db.collection(&request.account_group_id);
    let post = attach(&collection, build_post(&request)).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&post)?);
    } else {
        println!("{}", post.id);
    }
    Ok(())
}

async fn cmd_show(config: &Config, account_group: &str, post_id: &str, json: bool) -> Result<()> {
    let db = open_database(config).await?;
    let post = db
        .collection(account_group)
        .find_by_id(post_id)
        .await?
        .ok_or_else(|| {
            CrosspostError::InvalidInput(format!(
                "No post '{}' in account group '{}'",
                post_id, account_group
            ))
        })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&post)?);
    } else {
        print_post(&post);
    }
    Ok(())
}

async fn cmd_list(config: &Config, account_group: &str, json: bool) -> Result<()> {
    let db = open_database(config).await?;
    let posts = db.collection(account_group).list().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&posts)?);
        return Ok(());
    }

    for post in &posts {
        println!(
            "{} | {} | {} variant(s) | {}",
            post.id,
            post.base.status.as_str(),
            post.variants.len(),
            truncate_content(&post.base.text, 50)
        );
    }
    Ok(())
}

async fn cmd_publish(
    config: Config,
    input: &str,
    schedule: Option<&str>,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    if !dry_run {
        return Err(CrosspostError::InvalidInput(
            "No publishing gateway is configured; use --dry-run".to_string(),
        )
        .into());
    }

    let request = read_request(input, schedule)?;
    let service = CrosspostService::from_config(config, Arc::new(MockDispatcher::success())).await?;
    let report = service.publish(request).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if !report.overall_success {
        anyhow::bail!("All platforms failed");
    }
    Ok(())
}

fn print_post(post: &Post) {
    println!("id:       {}", post.id);
    println!("group:    {}", post.account_group_id);
    if let Some(title) = &post.title {
        println!("title:    {}", title);
    }
    for key in post.variant_keys() {
        if let Some(variant) = post.variant(key) {
            println!(
                "{:<9} {} | {} media | {}",
                format!("{}:", key),
                variant.status.as_str(),
                variant.media.len(),
                truncate_content(&variant.text, 50)
            );
        }
    }
}

fn print_report(report: &PublishReport) {
    println!("post {} ({} request(s))", report.post_id, report.requests);
    for result in &report.results {
        if result.success {
            println!(
                "  {}: ok {}",
                result.platform,
                result.post_id.as_deref().unwrap_or("-")
            );
        } else {
            println!(
                "  {}: failed {}",
                result.platform,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
}

/// Truncate to `max_chars` characters with an ellipsis
fn truncate_content(content: &str, max_chars: usize) -> String {
    let line = content.lines().next().unwrap_or("");
    if line.chars().count() <= max_chars {
        line.to_string()
    } else {
        let cut: String = line.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}
