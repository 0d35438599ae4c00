use crate::infra::{instant_for, Services};
use academy_ops::config::AppConfig;
use academy_ops::error::AppError;
use academy_ops::telemetry;
use academy_ops::workflows::dispatch::TickOutcome;
use academy_ops::workflows::sessions::{SessionDetail, SessionId};
use chrono::{NaiveDate, Utc};
use clap::Args;

#[derive(Args, Debug, Default)]
pub(crate) struct TickArgs {}

#[derive(Args, Debug)]
pub(crate) struct SessionReportArgs {
    /// Session identifier
    #[arg(long)]
    pub(crate) id: String,
    /// Evaluation date for statuses (defaults to today)
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
}

pub(crate) async fn run_tick(_args: TickArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry, config.environment)?;
    let services = Services::assemble(&config)?;

    let engine = services.engine.clone();
    let outcome = tokio::task::spawn_blocking(move || engine.tick(Utc::now()))
        .await
        .map_err(|err| AppError::Dispatch(format!("tick aborted: {err}")))?;

    match outcome {
        TickOutcome::Failed(reason) => Err(AppError::Dispatch(reason)),
        outcome => {
            println!("{outcome}");
            Ok(())
        }
    }
}

pub(crate) fn run_session_report(args: SessionReportArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let services = Services::assemble(&config)?;
    let detail = services
        .sessions
        .get_session(&SessionId(args.id), instant_for(args.today))?;
    render_session_report(&detail);
    Ok(())
}

pub(crate) fn render_session_report(detail: &SessionDetail) {
    println!("{} ({})", detail.name, detail.formation);
    println!(
        "Training {} -> exam {}{}",
        detail.start_date.as_deref().unwrap_or("unscheduled"),
        detail.exam_date.as_deref().unwrap_or("unscheduled"),
        if detail.archived { " [archived]" } else { "" }
    );

    let report = &detail.report;
    println!(
        "\nProgress: {}/{} steps completed",
        report.completed, report.total
    );
    for (status, count) in &report.by_status {
        println!("- {status}: {count}");
    }
    match report.next_deadline {
        Some(date) => println!("Next deadline: {date}"),
        None => println!("Next deadline: none"),
    }

    println!("\nChecklist");
    for step in &detail.checklist {
        let due = step
            .deadline
            .date()
            .map_or_else(|| "no date".to_string(), |date| date.to_string());
        let marker = if step.custom_date.is_some() { " (custom)" } else { "" };
        println!(
            "- [{}] {}: due {}{}, {}",
            step.index, step.name, due, marker, step.status_label
        );
    }

    if detail.jurys.is_empty() {
        println!("\nJury: none attached");
    } else {
        println!("\nJury");
        for jury in &detail.jurys {
            let reminded = if jury.reminded_at.is_some() { ", reminded" } else { "" };
            println!("- {}: {}{}", jury.name, jury.status.label(), reminded);
            if let Some(error) = &jury.last_error {
                println!("  last error: {error}");
            }
        }
    }
}
