//! `crawl` command.

use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use crate::config::Settings;
use crate::crawl::{Cancellation, CrawlEvent, CrawlPhase, Crawler};
use crate::models::{CrawlRequest, SessionReport};

pub async fn cmd_crawl(
    settings: &Settings,
    keyword: &str,
    max_results: usize,
    depth: u8,
    rotate: bool,
    deadline_secs: Option<u64>,
) -> anyhow::Result<()> {
    let request = CrawlRequest::new(keyword)
        .with_max_results(max_results)
        .with_depth(depth)
        .with_rotation(rotate);
    request.validate()?;

    if rotate && !settings.tor.rotation_available() {
        println!(
            "{} --rotate needs a Tor control port (TOR_CONTROL or --control); continuing without rotation",
            style("!").yellow()
        );
    }

    let (cancel_tx, mut cancel) = Cancellation::channel();
    if let Some(secs) = deadline_secs {
        cancel = cancel.with_deadline(Duration::from_secs(secs));
    }
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = cancel_tx.send(true);
        }
    });

    let (event_tx, mut event_rx) = mpsc::channel::<CrawlEvent>(100);
    let crawler = Crawler::from_settings(settings)?.with_events(event_tx);

    println!(
        "{} Crawling '{}' (max {} results, depth {}{})",
        style("→").cyan(),
        keyword,
        max_results,
        depth,
        if rotate { ", rotating identity" } else { "" }
    );

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message("Resolving candidates...");

    let handler_pb = pb.clone();
    let event_handler = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                CrawlEvent::Phase(CrawlPhase::Resolving) => {
                    handler_pb.set_message("Resolving candidates...");
                }
                CrawlEvent::Phase(CrawlPhase::Reporting) => {
                    handler_pb.set_message("Writing report...");
                }
                CrawlEvent::Phase(_) => {}
                CrawlEvent::Resolved { count } => {
                    handler_pb.println(format!(
                        "  {} {} candidate addresses",
                        style("✓").green(),
                        count
                    ));
                }
                CrawlEvent::PageStarted { url, depth } => {
                    handler_pb.set_message(format!("[depth {}] {}", depth, url));
                }
                CrawlEvent::PageFinished {
                    url,
                    depth,
                    ok,
                    error,
                } => {
                    let indent = if depth > 0 { "    " } else { "  " };
                    if ok {
                        handler_pb.println(format!("{}{} {}", indent, style("✓").green(), url));
                    } else {
                        handler_pb.println(format!(
                            "{}{} {} ({})",
                            indent,
                            style("✗").red(),
                            url,
                            error.unwrap_or_default()
                        ));
                    }
                }
                CrawlEvent::Rotated(outcome) => {
                    if !outcome.success {
                        handler_pb.println(format!(
                            "  {} rotation failed: {}",
                            style("!").yellow(),
                            outcome.message
                        ));
                    }
                }
            }
        }
    });

    let result = crawler.run(&request, &cancel).await;
    drop(crawler);
    let _ = event_handler.await;
    pb.finish_and_clear();

    let report = result?;
    print_summary(&report);
    Ok(())
}

fn print_summary(report: &SessionReport) {
    if let Some(error) = &report.error {
        println!("{} {}", style("!").yellow(), error);
    }
    if report.cancelled {
        println!("{} Cancelled; partial report written", style("!").yellow());
    }

    let with_entities = report
        .results
        .iter()
        .filter(|r| !r.entities.is_empty())
        .count();
    println!(
        "{} {} pages ({} ok, {} failed), {} with identifiers",
        style("✓").green(),
        report.scraped_count,
        report.ok_count(),
        report.failed_count(),
        with_entities
    );
    println!(
        "  Report: {}",
        report.session_dir.join(crate::storage::REPORT_FILE).display()
    );
}
