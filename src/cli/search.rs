//! `search` command.

use console::style;

use crate::config::Settings;
use crate::models::MAX_RESULTS;
use crate::resolver::{CandidateResolver, MultiEngineResolver, ResolveStrategy};

pub async fn cmd_search(
    settings: &Settings,
    keyword: &str,
    max_results: usize,
    accumulate: bool,
) -> anyhow::Result<()> {
    if !(1..=MAX_RESULTS).contains(&max_results) {
        anyhow::bail!("--max-results must be between 1 and {}", MAX_RESULTS);
    }

    let mut config = settings.resolver.clone();
    if accumulate {
        config.strategy = ResolveStrategy::Accumulate;
    }
    let resolver = MultiEngineResolver::new(&config, &settings.tor)?;

    println!(
        "{} Searching for '{}' ({})",
        style("→").cyan(),
        keyword,
        resolver.strategy()
    );
    let links = resolver.resolve(keyword, max_results).await?;

    if links.is_empty() {
        println!("{} No onion links found", style("!").yellow());
        return Ok(());
    }
    for link in &links {
        println!("  {}", link);
    }
    println!("{} {} candidates", style("✓").green(), links.len());
    Ok(())
}
