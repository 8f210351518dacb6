//! Reprocessing queue commands.

use console::style;
use tokio::sync::mpsc;

use super::build_graph;
use crate::config::Settings;
use crate::models::QueueStatus;
use crate::pipeline::PipelineEvent;

pub async fn cmd_queue_add(
    settings: &Settings,
    page_id: &str,
    reason: &str,
    priority: i32,
) -> anyhow::Result<()> {
    let graph = build_graph(settings).await?;

    if graph.pages.get(page_id).await?.is_none() {
        anyhow::bail!("unknown page: {}", page_id);
    }

    if graph.queue.enqueue(page_id, reason, priority).await? {
        println!("  {} Enqueued {}", style("✓").green(), page_id);
    } else {
        println!(
            "  {} Page {} already has an active queue entry",
            style("!").yellow(),
            page_id
        );
    }

    Ok(())
}

pub async fn cmd_queue_list(
    settings: &Settings,
    status: Option<&str>,
    limit: usize,
) -> anyhow::Result<()> {
    let status = match status {
        Some(s) => Some(
            QueueStatus::from_str(s)
                .ok_or_else(|| anyhow::anyhow!("unknown queue status: {}", s))?,
        ),
        None => None,
    };

    let graph = build_graph(settings).await?;
    let entries = graph.queue.list(status, limit).await?;

    if entries.is_empty() {
        println!("Queue is empty");
        return Ok(());
    }

    println!(
        "{:<6} {:<38} {:<12} {:<4} {}",
        style("ID").bold(),
        style("PAGE").bold(),
        style("STATUS").bold(),
        style("PRI").bold(),
        style("REASON").bold()
    );
    for entry in entries {
        println!(
            "{:<6} {:<38} {:<12} {:<4} {}",
            entry.id,
            entry.page_id,
            entry.status.as_str(),
            entry.priority,
            entry.reason
        );
        if let Some(error) = entry.error_message {
            println!("       {}", style(error).red());
        }
    }

    Ok(())
}

pub async fn cmd_queue_drain(settings: &Settings, limit: usize) -> anyhow::Result<()> {
    let graph = build_graph(settings).await?;

    let (event_tx, mut event_rx) = mpsc::channel::<PipelineEvent>(64);
    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                PipelineEvent::QueueEntryStarted { page_id, reason } => {
                    println!("  {} reprocessing {} ({})", style("→").cyan(), page_id, reason);
                }
                PipelineEvent::QueueEntryCompleted { page_id } => {
                    println!("  {} {}", style("✓").green(), page_id);
                }
                PipelineEvent::QueueEntryFailed { page_id, error } => {
                    println!("  {} {}: {}", style("✗").red(), page_id, error);
                }
                _ => {}
            }
        }
    });

    let summary = graph.service.drain_queue(limit, event_tx).await?;
    let _ = printer.await;

    println!(
        "\nDrained {} entries: {} completed, {} failed",
        summary.processed, summary.completed, summary.failed
    );

    Ok(())
}

pub async fn cmd_queue_retry(settings: &Settings, id: i64) -> anyhow::Result<()> {
    let graph = build_graph(settings).await?;

    if graph.queue.retry(id).await? {
        println!("  {} Entry {} re-queued", style("✓").green(), id);
    } else {
        println!(
            "  {} Entry {} is not in the failed state",
            style("!").yellow(),
            id
        );
    }

    Ok(())
}
