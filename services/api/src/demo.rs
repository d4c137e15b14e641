use crate::infra::{ApiContext, SimulatedScoringCapability, SimulatedScrapeProvider};
use clap::Args;
use linkmetric::config::PipelineSettings;
use linkmetric::error::AppError;
use linkmetric::pipeline::{AttemptId, IntakeRequest, PipelineRunner, TargetAudience};
use linkmetric::scoring::{compare, ScoreRecord};
use linkmetric::store::{ActivityLog, CustomerIdAllocator, MemorySequence, MemoryStore};
use std::sync::Arc;
use std::time::Duration;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Profile URL to analyze. Defaults to a synthetic profile.
    #[arg(long)]
    pub(crate) profile_url: Option<String>,
    /// Contact email for the demo customer.
    #[arg(long)]
    pub(crate) email: Option<String>,
    /// Audience to optimize for: recruiters, clients, or investors.
    #[arg(long, value_parser = parse_audience)]
    pub(crate) audience: Option<TargetAudience>,
    /// Skip the second run and the run-over-run comparison.
    #[arg(long)]
    pub(crate) skip_comparison: bool,
}

fn parse_audience(raw: &str) -> Result<TargetAudience, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "recruiters" => Ok(TargetAudience::Recruiters),
        "clients" => Ok(TargetAudience::Clients),
        "investors" => Ok(TargetAudience::Investors),
        other => Err(format!(
            "unknown audience '{other}' (expected recruiters, clients, or investors)"
        )),
    }
}

/// Run the full pipeline against the simulated providers and print the
/// resulting report, then run it a second time to demonstrate the
/// returning-user path and attempt comparison.
pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        profile_url,
        email,
        audience,
        skip_comparison,
    } = args;

    let profile_url =
        profile_url.unwrap_or_else(|| "https://www.linkedin.com/in/alex-rivera".to_string());
    let email = email.unwrap_or_else(|| "alex@example.com".to_string());
    let audience = audience.unwrap_or(TargetAudience::Recruiters);

    // Demo cadence: poll fast instead of on the production schedule.
    let settings = PipelineSettings {
        payment_wait: Duration::from_secs(5),
        poll_base_interval: Duration::from_millis(50),
        poll_max_interval: Duration::from_millis(200),
        poll_max_windows: 10,
        ..PipelineSettings::default()
    };
    let runner = PipelineRunner::new(
        Arc::new(MemoryStore::new()),
        Arc::new(SimulatedScrapeProvider::new(2)),
        Arc::new(SimulatedScoringCapability),
        CustomerIdAllocator::new(Arc::new(MemorySequence::new())),
        ActivityLog::new(),
        &settings,
    );
    let context = ApiContext {
        runner,
        auto_confirm_payments: true,
    };

    println!("Profile analysis demo");
    println!("- profile: {profile_url}");
    println!("- audience: {}", audience.describe());

    let first = run_attempt(
        &context,
        IntakeRequest {
            profile_url: profile_url.clone(),
            email,
            phone: None,
            target_audience: audience,
        },
    )
    .await?;
    println!(
        "\nFirst run complete for customer {} (returning user: no)",
        first.1
    );
    render_report(&first.2);

    if skip_comparison {
        return Ok(());
    }

    // Same profile, different email: dedup resolves to the same customer.
    let second = run_attempt(
        &context,
        IntakeRequest {
            profile_url,
            email: "alex.work@example.com".to_string(),
            phone: None,
            target_audience: audience,
        },
    )
    .await?;
    println!(
        "\nSecond run complete for customer {} (returning user: yes)",
        second.1
    );

    let result = compare::compare(context.store().as_ref(), second.0, first.0)?;
    println!(
        "\nRun-over-run comparison: {} -> {} ({:+})",
        result.previous_final_score, result.current_final_score, result.overall_delta
    );
    for delta in &result.sections {
        println!(
            "  - {:<15} {} -> {} ({:?})",
            delta.section.label(),
            delta.previous_score,
            delta.current_score,
            delta.change_direction
        );
    }

    println!("\nActivity trail (last 10 entries):");
    for entry in context.runner.activity_log().recent(10) {
        println!(
            "  [{:?}] {}: {}",
            entry.status, entry.event_type, entry.message
        );
    }

    Ok(())
}

async fn run_attempt(
    context: &ApiContext,
    request: IntakeRequest,
) -> Result<(AttemptId, String, ScoreRecord), AppError> {
    let receipt = context.runner.start(request)?;
    context.confirm_payment(receipt.attempt_id);
    context.runner.run(receipt.attempt_id).await?;

    let record = context
        .store()
        .score_record(&receipt.attempt_id)?
        .ok_or_else(|| AppError::NotFound(format!("report for attempt {}", receipt.attempt_id)))?;
    Ok((receipt.attempt_id, receipt.customer_id.to_string(), record))
}

fn render_report(record: &ScoreRecord) {
    println!(
        "Final score: {}/100 ({})",
        record.final_score, record.grade_label
    );
    println!("Summary: {}", record.executive_summary);
    println!("Sections:");
    for section in &record.sections {
        println!(
            "  - {:<15} {:>2}/{} [{:?}] {}",
            section.section.label(),
            section.score,
            section.max_score,
            section.status,
            section.analysis
        );
    }
    println!("Top priorities:");
    for priority in &record.top_priorities {
        println!("  - {priority}");
    }
}
