// Configuration management module
// TOML settings for routing thresholds, chunking, caching and pricing

pub mod settings;

#[cfg(test)]
mod tests;

use std::path::PathBuf;

use console::style;

pub use settings::{Config, ConfigError};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<PathBuf, ConfigError> {
    Config::config_dir()
}

/// Print the effective configuration to stderr
#[inline]
pub fn show_config(config: &Config) {
    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    let routing = &config.routing;
    eprintln!("{}", style("Routing:").bold().yellow());
    eprintln!(
        "  Direct cache below: {} min",
        style(routing.direct_cache_max_minutes).cyan()
    );
    eprintln!(
        "  Smart RAG below: {} min",
        style(routing.smart_rag_max_minutes).cyan()
    );
    eprintln!(
        "  Context budgets: {} / {} tokens",
        style(routing.smart_rag_budget_tokens).cyan(),
        style(routing.aggressive_budget_tokens).cyan()
    );
    eprintln!(
        "  History exchanges: {} / {} / {}",
        style(routing.direct_history_turns).cyan(),
        style(routing.smart_rag_history_turns).cyan(),
        style(routing.aggressive_history_turns).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Chunking:").bold().yellow());
    eprintln!(
        "  Target: {} chars, overlap {} chars",
        style(config.chunking.target_chunk_chars).cyan(),
        style(config.chunking.overlap_chars).cyan()
    );

    let cache = &config.cache;
    eprintln!();
    eprintln!("{}", style("Cache:").bold().yellow());
    eprintln!(
        "  TTLs: direct {}s, chunks {}s, queries {}s (max {}s)",
        style(cache.direct_ttl_seconds).cyan(),
        style(cache.chunk_ttl_seconds).cyan(),
        style(cache.query_ttl_seconds).cyan(),
        style(cache.max_ttl_seconds).cyan()
    );
    eprintln!(
        "  Minimum size: {} tokens, registry capacity {}",
        style(cache.min_tokens).cyan(),
        style(cache.registry_capacity).cyan()
    );

    let pricing = &config.pricing;
    eprintln!();
    eprintln!("{}", style("Pricing (per million tokens):").bold().yellow());
    eprintln!(
        "  Input ${}, cached ${}, output ${}",
        style(pricing.input_per_million).cyan(),
        style(pricing.cached_input_per_million).cyan(),
        style(pricing.output_per_million).cyan()
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );
    eprintln!(
        "Database: {}",
        style(config.database_path().display()).dim()
    );
}
