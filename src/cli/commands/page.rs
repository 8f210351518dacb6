//! Per-page operator commands: review resolution and failed-page reset.

use console::style;

use super::build_graph;
use crate::config::Settings;

pub async fn cmd_show(settings: &Settings, page_id: &str) -> anyhow::Result<()> {
    let graph = build_graph(settings).await?;

    let Some(page) = graph.pages.get(page_id).await? else {
        anyhow::bail!("unknown page: {}", page_id);
    };

    println!("\n{}", style(&page.id).bold());
    println!("{}", "-".repeat(40));
    println!("  {:<18} {}", "image", page.image_path);
    println!("  {:<18} {}", "status", page.quality_status.as_str());
    println!(
        "  {:<18} {}",
        "score",
        page.quality_score
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    println!("  {:<18} {}", "rescan attempts", page.rescan_attempts);
    println!("  {:<18} {}", "needs review", page.needs_manual_review);
    if let Some(attempt) = page.last_attempt_at {
        println!("  {:<18} {}", "last attempt", attempt.to_rfc3339());
    }

    match graph.corrections.latest_for_page(page_id).await? {
        Some(record) => {
            println!("\n{}", style("Latest correction").bold());
            println!("{}", "-".repeat(40));
            println!("  {:<18} {}", "quality score", record.quality_score);
            println!("  {:<18} {}", "improvement", record.improvement_level.as_str());
            println!("  {:<18} {}", "confidence", record.confidence.as_str());
            println!("  {:<18} {}", "needs review", record.needs_review);
            println!("  {:<18} {}", "model", record.model);
            println!("  {:<18} ${:.4}", "api cost", record.api_cost_usd);
            if !record.major_corrections.is_empty() {
                println!("  {:<18} {}", "corrections", record.major_corrections.join("; "));
            }
        }
        None => println!("\nNo correction recorded"),
    }

    Ok(())
}

pub async fn cmd_review(settings: &Settings, page_id: &str) -> anyhow::Result<()> {
    let graph = build_graph(settings).await?;

    if graph.pages.mark_reviewed(page_id).await? {
        println!("  {} Review resolved for {}", style("✓").green(), page_id);
    } else {
        println!(
            "  {} Page {} was not awaiting review",
            style("!").yellow(),
            page_id
        );
    }

    Ok(())
}

pub async fn cmd_reset(settings: &Settings, page_id: &str) -> anyhow::Result<()> {
    let graph = build_graph(settings).await?;

    if graph.pages.reset_for_retry(page_id).await? {
        println!(
            "  {} Page {} reset; next run will reassess it from scratch",
            style("✓").green(),
            page_id
        );
    } else {
        println!(
            "  {} Page {} is not in the failed state (only failed pages can be reset)",
            style("!").yellow(),
            page_id
        );
    }

    Ok(())
}
