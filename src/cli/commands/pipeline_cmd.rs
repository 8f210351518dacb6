//! Pipeline run command, shared by `run`, `scan`, and `correct`.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use super::build_graph;
use crate::config::Settings;
use crate::pipeline::{PipelineEvent, PipelineMode};
use crate::rescan::RescanOutcome;

/// Exit code for a graceful rate-limit or budget stop; the scheduler can
/// distinguish "retry later" from real failures.
const EXIT_STOPPED: i32 = 2;

pub async fn cmd_pipeline(
    settings: &Settings,
    mode: PipelineMode,
    workers: Option<usize>,
    limit: usize,
) -> anyhow::Result<()> {
    let mut settings = settings.clone();
    if let Some(workers) = workers {
        settings.workers = workers.max(1);
    }

    let graph = build_graph(&settings).await?;

    let (event_tx, mut event_rx) = mpsc::channel::<PipelineEvent>(256);

    let progress = tokio::spawn(async move {
        let mut bar: Option<ProgressBar> = None;
        while let Some(event) = event_rx.recv().await {
            match event {
                PipelineEvent::RunStarted { total_pages } => {
                    let pb = ProgressBar::new(total_pages);
                    pb.set_style(
                        ProgressStyle::with_template(
                            "{spinner} [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                        )
                        .unwrap()
                        .progress_chars("=>-"),
                    );
                    bar = Some(pb);
                }
                PipelineEvent::PageStarted { page_id } => {
                    if let Some(pb) = &bar {
                        pb.set_message(page_id);
                        pb.inc(1);
                    }
                }
                PipelineEvent::PageAssessed { .. } | PipelineEvent::PageSkipped { .. } => {}
                PipelineEvent::PageRescanned { page_id, outcome } => {
                    if let Some(pb) = &bar {
                        match outcome {
                            RescanOutcome::Accepted { .. } => {
                                pb.println(format!("  {} rescued {}", style("✓").green(), page_id));
                            }
                            RescanOutcome::Exhausted => {
                                pb.println(format!(
                                    "  {} {} failed after all rescan attempts",
                                    style("✗").red(),
                                    page_id
                                ));
                            }
                            RescanOutcome::Skipped => {}
                        }
                    }
                }
                PipelineEvent::PageCorrected {
                    page_id,
                    quality_score,
                    needs_review,
                } => {
                    if let Some(pb) = &bar {
                        let marker = if needs_review {
                            style("needs review").yellow().to_string()
                        } else {
                            format!("score {}", quality_score)
                        };
                        pb.println(format!(
                            "  {} corrected {} ({})",
                            style("✓").green(),
                            page_id,
                            marker
                        ));
                    }
                }
                PipelineEvent::PageDeferred { page_id, reason } => {
                    if let Some(pb) = &bar {
                        pb.println(format!(
                            "  {} deferred {} ({})",
                            style("→").dim(),
                            page_id,
                            reason
                        ));
                    }
                }
                PipelineEvent::PageFailed { page_id, error } => {
                    if let Some(pb) = &bar {
                        pb.println(format!("  {} {}: {}", style("✗").red(), page_id, error));
                    }
                }
                PipelineEvent::RunStopped {
                    reason,
                    in_flight_page,
                } => {
                    if let Some(pb) = &bar {
                        let context = in_flight_page
                            .map(|p| format!(" (in flight: {})", p))
                            .unwrap_or_default();
                        pb.println(format!(
                            "  {} stopping: {}{}",
                            style("■").red(),
                            reason,
                            context
                        ));
                    }
                }
                _ => {}
            }
        }
        if let Some(pb) = bar {
            pb.finish_and_clear();
        }
    });

    let summary = graph.service.run(mode, limit, event_tx).await?;
    let _ = progress.await;

    println!("{}", style("Run complete").bold());
    println!("  processed: {}", summary.processed);
    println!("  accepted:  {}", summary.accepted);
    println!("  corrected: {}", summary.corrected);
    println!("  failed:    {}", summary.rescan_failed);
    println!("  deferred:  {}", summary.deferred);
    println!("  errors:    {}", summary.errors);

    if let Some(reason) = summary.stopped {
        let remaining = graph.governor.remaining_budget().await.unwrap_or(0.0);
        println!(
            "\n{} Stopped early: {} (remaining daily budget: ${:.2})",
            style("⚠").yellow(),
            reason,
            remaining
        );
        println!("Run again later to continue processing.");
        std::process::exit(EXIT_STOPPED);
    }

    Ok(())
}
