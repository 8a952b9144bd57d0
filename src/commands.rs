use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::cache::{CacheManager, LocalCacheBackend};
use crate::config::Config;
use crate::cost::{CostLedger, format_cost};
use crate::external::VideoTranscript;
use crate::retrieval::HashEmbedder;
use crate::router::{ConversationMessage, QueryRouter, RouterContext};
use crate::storage::{KeyValueStore, SqliteStore};

/// Open the persistent store in the configured data directory
async fn open_store(config: &Config) -> Result<Arc<dyn KeyValueStore>> {
    let store = SqliteStore::initialize_from_data_dir(config.get_base_dir())
        .await
        .context("Failed to initialize database")?;
    Ok(Arc::new(store))
}

async fn open_cache(config: &Config, store: &Arc<dyn KeyValueStore>) -> Result<CacheManager> {
    let backend = Arc::new(LocalCacheBackend::new(Arc::clone(store)));
    CacheManager::load(
        backend,
        Arc::clone(store),
        config.cache,
        config.pricing,
    )
    .await
}

/// Build a router over the on-disk cache registry and cost ledger
#[inline]
pub async fn open_router(config: &Config) -> Result<QueryRouter> {
    let store = open_store(config).await?;
    let cache = open_cache(config, &store).await?;
    let ledger = CostLedger::load(Arc::clone(&store), config.pricing).await?;

    Ok(QueryRouter::new(RouterContext {
        config: config.routing,
        chunking: config.chunking,
        cache: Arc::new(cache),
        ledger: Arc::new(Mutex::new(ledger)),
        embedder: Arc::new(HashEmbedder::default()),
    }))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {} file: {}", what, path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {} file: {}", what, path.display()))
}

/// Route one query against a transcript file and print the routed context as JSON
///
/// When `record` is set the query is also priced into the ledger, using
/// `output_tokens` or the configured estimate.
#[inline]
pub async fn route_query(
    config: &Config,
    transcript_path: &Path,
    query: &str,
    history_path: Option<&Path>,
    record: bool,
    output_tokens: Option<usize>,
) -> Result<()> {
    let transcript: VideoTranscript = read_json(transcript_path, "transcript")?;
    let history: Vec<ConversationMessage> = match history_path {
        Some(path) => read_json(path, "history")?,
        None => Vec::new(),
    };

    let mut router = open_router(config).await?;
    let outcome = router.initialize(
        &transcript.video_id,
        &transcript.segments,
        transcript.duration_seconds,
    );
    eprintln!(
        "Strategy: {} (expected savings {})",
        outcome.strategy, outcome.expected_savings_label
    );
    if let Some(reason) = router.strategy_reason() {
        eprintln!("  {}", reason);
    }

    let routed = router.process_query(query, &history).await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&routed).context("Failed to serialize routed query")?
    );

    if record {
        let cost = router.complete(&routed, output_tokens).await?;
        eprintln!(
            "Recorded: cost {}, saved {} ({:.1}%)",
            format_cost(cost.actual_cost),
            format_cost(cost.savings),
            cost.savings_percent
        );
    }

    Ok(())
}

/// Print ledger summaries, trends and recommendations
#[inline]
pub async fn show_stats(config: &Config, days: u32, csv_path: Option<&Path>) -> Result<()> {
    let store = open_store(config).await?;
    let ledger = CostLedger::load(store, config.pricing).await?;

    let session = ledger.session_summary();
    println!("💰 Current Session");
    println!("   Queries: {}", session.queries);
    println!("   Cost: {}", format_cost(session.total_cost));
    println!("   Saved: {}", format_cost(session.total_savings));
    println!("   Avg per query: {}", format_cost(session.avg_cost_per_query));
    println!(
        "   Tokens: {} input, {} cached, {} output",
        session.tokens.input, session.tokens.cached, session.tokens.output
    );
    for record in &session.recent {
        println!(
            "   - {} {} {} min: {} (saved {})",
            record.timestamp.format("%H:%M:%S"),
            record.strategy,
            record.video_length_minutes,
            format_cost(record.actual_cost),
            format_cost(record.savings)
        );
    }

    let lifetime = ledger.lifetime_summary();
    println!();
    println!("📈 Lifetime");
    println!("   Queries: {}", lifetime.total_queries);
    println!("   Cost: {}", format_cost(lifetime.total_cost));
    println!("   Saved: {}", format_cost(lifetime.total_savings));
    println!("   Days in use: {}", lifetime.days_since_first_use);
    println!("   Avg daily cost: {}", format_cost(lifetime.avg_daily_cost));

    let effectiveness = ledger.strategy_effectiveness();
    if !effectiveness.is_empty() {
        println!();
        println!("🧭 Strategies");
        for (strategy, stats) in &effectiveness {
            println!(
                "   {}: {:.1}% of queries, avg cost {}, avg saved {} ({:.1}%)",
                strategy,
                stats.usage_percent,
                format_cost(stats.avg_cost),
                format_cost(stats.avg_savings),
                stats.avg_savings_percent
            );
        }
    }

    println!();
    println!("📅 Last {} days", days);
    for day in ledger.trend(days) {
        println!(
            "   {}: {} queries, {}",
            day.date,
            day.aggregate.queries,
            format_cost(day.aggregate.cost)
        );
    }

    let projections = ledger.projections();
    println!();
    println!("🔮 Projections");
    println!(
        "   Daily {}, weekly {}, monthly {}, yearly {}",
        format_cost(projections.daily),
        format_cost(projections.weekly),
        format_cost(projections.monthly),
        format_cost(projections.yearly)
    );
    println!("   Monthly savings: {}", format_cost(projections.savings_monthly));

    let recommendations = ledger.recommendations();
    if !recommendations.is_empty() {
        println!();
        println!("💡 Recommendations");
        for recommendation in &recommendations {
            println!(
                "   [{:?}] {}",
                recommendation.priority, recommendation.message
            );
        }
    }

    if let Some(path) = csv_path {
        std::fs::write(path, ledger.export_csv())
            .with_context(|| format!("Failed to write CSV export: {}", path.display()))?;
        println!();
        println!("Exported session to {}", path.display());
    }

    Ok(())
}

/// Clear the current session, or the whole ledger when `all` is set
#[inline]
pub async fn reset_stats(config: &Config, all: bool) -> Result<()> {
    let store = open_store(config).await?;
    let mut ledger = CostLedger::load(store, config.pricing).await?;

    if all {
        ledger.reset_all().await?;
        println!("Cost history cleared");
    } else {
        ledger.clear_session().await?;
        println!("Session cleared");
    }

    Ok(())
}

/// Drop expired cache entries
#[inline]
pub async fn sweep_caches(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let cache = open_cache(config, &store).await?;

    let removed = cache.sweep().await?;
    info!("Swept {} expired cache entries", removed);
    println!("Removed {} expired cache entries", removed);

    Ok(())
}

/// Show cache registry statistics
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let cache = open_cache(config, &store).await?;
    let stats = cache.stats().await;

    println!("📊 Transcript Router Status");
    println!("{}", "=".repeat(50));
    println!();
    println!("🗄️  Database: {}", config.database_path().display());
    println!();
    println!("📦 Cache Registry:");
    println!("   Entries: {}/{}", stats.total_entries, stats.capacity);
    println!("   Cached tokens: {}", stats.total_cached_tokens);
    println!("   Total uses: {}", stats.total_usage);
    if let Some(oldest) = stats.oldest_entry {
        println!("   Oldest: {}", oldest.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(key) = &stats.most_used_key {
        println!("   Most used: {} ({} uses)", key, stats.most_used_count);
    }
    if stats.expiring_soon > 0 {
        println!("   ⏳ Expiring within 10 min: {}", stats.expiring_soon);
    }
    println!(
        "   Estimated monthly savings: {}",
        format_cost(stats.estimated_monthly_savings)
    );

    Ok(())
}
