//! Status command: page lifecycle, queue, review, and spend overview.

use console::style;

use super::build_graph;
use crate::config::Settings;
use crate::models::{QualityStatus, QueueStatus};

pub async fn cmd_status(settings: &Settings) -> anyhow::Result<()> {
    let graph = build_graph(settings).await?;

    println!("\n{}", style("Pages").bold());
    println!("{}", "-".repeat(40));
    let counts = graph.pages.counts_by_status().await?;
    let total = graph.pages.count().await?;
    println!("  {:<18} {}", "total", total);
    for status in [
        QualityStatus::Unchecked,
        QualityStatus::NeedsRescan,
        QualityStatus::NeedsCorrection,
        QualityStatus::Acceptable,
        QualityStatus::Failed,
    ] {
        println!(
            "  {:<18} {}",
            status.as_str(),
            counts.get(&status).copied().unwrap_or(0)
        );
    }
    println!(
        "  {:<18} {}",
        "awaiting review",
        graph.pages.count_needing_review().await?
    );

    println!("\n{}", style("Corrections").bold());
    println!("{}", "-".repeat(40));
    println!("  {:<18} {}", "stored", graph.corrections.count().await?);
    println!(
        "  {:<18} {}",
        "flagged",
        graph.corrections.count_needing_review().await?
    );

    println!("\n{}", style("Reprocessing queue").bold());
    println!("{}", "-".repeat(40));
    for status in [
        QueueStatus::Queued,
        QueueStatus::Processing,
        QueueStatus::Completed,
        QueueStatus::Failed,
    ] {
        println!(
            "  {:<18} {}",
            status.as_str(),
            graph.queue.count_with_status(status).await?
        );
    }

    println!("\n{}", style("Spend (rolling 24h)").bold());
    println!("{}", "-".repeat(40));
    let spent = graph.ledger.total_last_day().await?;
    let remaining = graph.governor.remaining_budget().await?;
    println!("  {:<18} ${:.4}", "spent", spent);
    println!("  {:<18} ${:.4}", "remaining", remaining);
    println!(
        "  {:<18} {}",
        "billed calls",
        graph.ledger.count().await?
    );

    Ok(())
}
