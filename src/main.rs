use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use pagefeed::{
    spawn_update_loop, AppConfig, FeedAggregator, ItemWindow, PageFetcher, SelectorRules,
    SourceKind, Store,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pagefeed", about = "Aggregate RSS feeds and scraped pages into one item stream")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a new source.
    AddSource {
        name: String,
        url: String,
        /// Source kind: feed or scrape.
        #[arg(long, default_value = "feed")]
        kind: String,
        /// Selector rule set as JSON, for scrape sources.
        #[arg(long)]
        rules: Option<String>,
    },
    /// Create an aggregate group.
    AddGroup {
        name: String,
        slug: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Seed membership with every active source flagged for aggregation.
        #[arg(long)]
        seed: bool,
    },
    /// Replace the selector rule set of a source.
    SetRules { source_id: i64, rules: String },
    /// Activate or deactivate a source.
    Activate {
        source_id: i64,
        #[arg(long)]
        off: bool,
    },
    /// Opt a source in or out of the combined aggregate view.
    Aggregate {
        source_id: i64,
        #[arg(long)]
        off: bool,
    },
    /// Delete a source and its items.
    RemoveSource { source_id: i64 },
    /// Delete a group, keeping its member sources.
    RemoveGroup { slug: String },
    /// Add a source to a group.
    Link { slug: String, source_id: i64 },
    /// Remove a source from a group.
    Unlink { slug: String, source_id: i64 },
    /// List sources and groups.
    List,
    /// Update one source or every active source.
    Update {
        #[arg(long)]
        source: Option<i64>,
    },
    /// Run the periodic update loop until interrupted.
    Run,
    /// Auto-detect selectors for a page.
    Detect {
        url: String,
        #[arg(long)]
        rendered: bool,
    },
    /// Test a selector rule set against a page without persisting.
    Preview {
        url: String,
        #[arg(long)]
        rules: String,
    },
    /// Check that a URL serves a parseable feed.
    Validate { url: String },
    /// Show the newest items across all aggregated sources.
    Recent {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Show the merged item view of a group.
    Show {
        slug: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        per_page: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = AppConfig::from_env();

    let store = Store::open(&config.database_url).await?;
    let fetcher = PageFetcher::new(&config.fetch);
    let aggregator = FeedAggregator::new(store, fetcher);

    match cli.command {
        Command::AddSource {
            name,
            url,
            kind,
            rules,
        } => {
            let kind = SourceKind::parse(&kind)
                .with_context(|| format!("unknown source kind: {kind}"))?;
            let rules: Option<SelectorRules> = rules
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .context("invalid selector rules JSON")?;
            let source = aggregator
                .store()
                .add_source(&name, kind, &url, rules.as_ref())
                .await?;
            println!("added source {} ({})", source.id, source.name);
        }
        Command::AddGroup {
            name,
            slug,
            description,
            seed,
        } => {
            let group = aggregator
                .store()
                .add_group(&name, &slug, &description)
                .await?;
            if seed {
                for source in aggregator.store().list_aggregate_sources().await? {
                    aggregator
                        .store()
                        .add_group_member(group.id, source.id)
                        .await?;
                }
            }
            println!("added group {} ({})", group.id, group.slug);
        }
        Command::SetRules { source_id, rules } => {
            let rules: SelectorRules =
                serde_json::from_str(&rules).context("invalid selector rules JSON")?;
            aggregator.store().set_selectors(source_id, &rules).await?;
            println!("updated rules for source {source_id}");
        }
        Command::Activate { source_id, off } => {
            aggregator.store().set_source_active(source_id, !off).await?;
            println!(
                "source {source_id} {}",
                if off { "deactivated" } else { "activated" }
            );
        }
        Command::Aggregate { source_id, off } => {
            aggregator
                .store()
                .set_include_in_aggregate(source_id, !off)
                .await?;
            println!(
                "source {source_id} {} the aggregate view",
                if off { "excluded from" } else { "included in" }
            );
        }
        Command::RemoveSource { source_id } => {
            aggregator.store().delete_source(source_id).await?;
            println!("removed source {source_id}");
        }
        Command::RemoveGroup { slug } => {
            let group = aggregator.store().get_group_by_slug(&slug).await?;
            aggregator.store().delete_group(group.id).await?;
            println!("removed group {slug}");
        }
        Command::Link { slug, source_id } => {
            let group = aggregator.store().get_group_by_slug(&slug).await?;
            aggregator
                .store()
                .add_group_member(group.id, source_id)
                .await?;
            println!("linked source {source_id} to {slug}");
        }
        Command::Unlink { slug, source_id } => {
            let group = aggregator.store().get_group_by_slug(&slug).await?;
            aggregator
                .store()
                .remove_group_member(group.id, source_id)
                .await?;
            println!("unlinked source {source_id} from {slug}");
        }
        Command::List => {
            for source in aggregator.store().list_sources(false).await? {
                println!(
                    "source {} [{}] {} ({}) active={}",
                    source.id, source.kind, source.name, source.url, source.active
                );
            }
            for group in aggregator.store().list_groups(false).await? {
                println!("group {} [{}] {}", group.id, group.slug, group.name);
            }
        }
        Command::Update { source } => match source {
            Some(id) => {
                let created = aggregator.update_source(id).await?;
                println!("source {id}: {created} new items");
            }
            None => {
                let report = aggregator.update_all().await?;
                println!(
                    "updated {} sources ({} failed), {} new items",
                    report.succeeded, report.failed, report.new_items
                );
            }
        },
        Command::Run => {
            let aggregator = Arc::new(aggregator);
            info!(interval = ?config.update_interval, "starting update scheduler");
            let handle = spawn_update_loop(aggregator, config.update_interval);
            tokio::signal::ctrl_c().await?;
            handle.stop().await?;
        }
        Command::Detect { url, rendered } => {
            match aggregator.detect_for_url(&url, rendered).await? {
                Some(rules) => println!("{}", serde_json::to_string_pretty(&rules)?),
                None => bail!("no selectors detected for {url}"),
            }
        }
        Command::Preview { url, rules } => {
            let rules: SelectorRules =
                serde_json::from_str(&rules).context("invalid selector rules JSON")?;
            let preview = aggregator.test_rules(&url, &rules).await?;
            println!("{}", serde_json::to_string_pretty(&preview)?);
        }
        Command::Validate { url } => {
            let preview = aggregator.validate_feed(&url).await?;
            println!("{}", serde_json::to_string_pretty(&preview)?);
        }
        Command::Recent { limit } => {
            let items = aggregator
                .store()
                .recent_items(ItemWindow::Limit(limit))
                .await?;
            for item in items {
                println!("{}  {}  {}", item.published, item.title, item.link);
            }
        }
        Command::Show {
            slug,
            page,
            per_page,
        } => {
            let items = aggregator
                .resolve_group(&slug, ItemWindow::Page { page, per_page })
                .await?;
            for item in items {
                println!("{}  {}  {}", item.published, item.title, item.link);
            }
        }
    }

    Ok(())
}
