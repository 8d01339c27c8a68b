use anyhow::Context;
use clap::Parser;
use feed_aggregator::normalize::{clamp_summary, format_score};
use feed_aggregator::{
    FeedAggregator, FetchConfig, InstanceId, ProjectedView, RecencyWindow, SortKey,
    SourceInstance, SourceParams, SourceType,
};
use std::collections::HashMap;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Fetch news, forum, daily-feature and quote sources into one feed.
#[derive(Debug, Parser)]
#[command(name = "feed-aggregator", version)]
struct Cli {
    /// Activate a news instance with this search query (empty for none)
    #[arg(long = "news", value_name = "QUERY")]
    news: Vec<String>,

    /// Recency window for news instances
    #[arg(long, default_value = "all", value_parser = parse_window)]
    window: RecencyWindow,

    /// Activate a forum instance for this group
    #[arg(long = "forum", value_name = "GROUP")]
    forum: Vec<String>,

    /// Forum instances only keep posts matching this text
    #[arg(long)]
    forum_query: Option<String>,

    /// Activate the daily feature
    #[arg(long)]
    feature: bool,

    /// Activate the quote source
    #[arg(long)]
    quote: bool,

    /// Only show items containing this text
    #[arg(long, default_value = "")]
    filter: String,

    /// feed, newest, score or comments
    #[arg(long, default_value = "feed", value_parser = parse_sort)]
    sort: SortKey,

    /// Extra pages to load after the first refresh
    #[arg(long, default_value_t = 0)]
    pages: u32,

    /// Print the view as JSON
    #[arg(long)]
    json: bool,
}

fn parse_window(s: &str) -> Result<RecencyWindow, String> {
    s.parse().map_err(|e: feed_aggregator::AggregatorError| e.to_string())
}

fn parse_sort(s: &str) -> Result<SortKey, String> {
    s.parse().map_err(|e: feed_aggregator::AggregatorError| e.to_string())
}

impl Cli {
    fn activations(&self) -> Vec<(SourceType, SourceParams)> {
        let mut activations = Vec::new();

        for query in &self.news {
            let mut params = SourceParams::default().with_window(self.window);
            if !query.trim().is_empty() {
                params = params.with_query(query.clone());
            }
            activations.push((SourceType::News, params));
        }
        for group in &self.forum {
            let mut params = SourceParams::default().with_group(group.clone());
            if let Some(query) = &self.forum_query {
                params = params.with_query(query.clone());
            }
            activations.push((SourceType::Forum, params));
        }
        if self.feature {
            activations.push((SourceType::Feature, SourceParams::default()));
        }
        if self.quote {
            activations.push((SourceType::Quote, SourceParams::default()));
        }

        if activations.is_empty() {
            activations = SourceType::ALL
                .into_iter()
                .map(|source_type| (source_type, SourceParams::default().with_window(self.window)))
                .collect();
        }
        activations
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = FetchConfig::from_env().context("invalid FEED_* configuration")?;
    let aggregator = FeedAggregator::from_config(&config).context("failed to build HTTP adapters")?;

    for (source_type, params) in cli.activations() {
        aggregator.activate_source(source_type, params).await?;
    }

    let summary = aggregator.refresh_all().await;
    info!(
        "Initial refresh: {} loaded, {} failed",
        summary.loaded, summary.failed
    );

    for round in 0..cli.pages {
        let ids: Vec<InstanceId> = aggregator
            .snapshot()
            .await
            .into_iter()
            .filter(SourceInstance::can_load_more)
            .map(|instance| instance.id)
            .collect();
        if ids.is_empty() {
            info!("No instance has more pages after round {}", round);
            break;
        }
        let outcomes = futures::future::join_all(ids.iter().map(|id| aggregator.load_more(*id))).await;
        for (id, outcome) in ids.iter().zip(outcomes) {
            if let Err(e) = outcome {
                error!("load_more for instance {} failed: {}", id, e);
            }
        }
    }

    let instances = aggregator.snapshot().await;
    let view = aggregator.view_sorted(&cli.filter, cli.sort).await;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&json_view(&instances, &view))?);
    } else {
        print_view(&instances, &view);
    }
    Ok(())
}

fn json_view(instances: &[SourceInstance], view: &ProjectedView) -> serde_json::Value {
    let columns: Vec<serde_json::Value> = instances
        .iter()
        .map(|instance| {
            serde_json::json!({
                "instance": instance.id.0,
                "source": instance.source_type,
                "params": instance.params,
                "hasMore": instance.has_more,
                "lastError": instance.last_error,
                "items": view.get(&instance.id).cloned().unwrap_or_default(),
            })
        })
        .collect();
    serde_json::Value::Array(columns)
}

fn print_view(instances: &[SourceInstance], view: &ProjectedView) {
    let by_id: HashMap<InstanceId, &SourceInstance> =
        instances.iter().map(|instance| (instance.id, instance)).collect();

    for (id, items) in view {
        let Some(instance) = by_id.get(id) else {
            continue;
        };
        println!(
            "== {} {} ({} shown of {}{})",
            instance.source_type,
            id,
            items.len(),
            instance.items.len(),
            if instance.has_more { ", more available" } else { "" }
        );
        if let Some(error) = &instance.last_error {
            println!("   ! {}", error);
        }
        for item in items {
            let when = item
                .timestamp
                .map(|ts| ts.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "----------------".to_string());
            println!(
                "   {} [{:>5}] {}{}",
                when,
                format_score(item.score),
                item.title,
                if item.author.is_empty() {
                    String::new()
                } else {
                    format!(" ({})", item.author)
                }
            );
            if !item.summary.is_empty() {
                println!("   {:16}         {}", "", clamp_summary(&item.summary, 160));
            }
            if !item.url.is_empty() {
                println!("   {:16}         {}", "", item.url);
            }
        }
    }
}
