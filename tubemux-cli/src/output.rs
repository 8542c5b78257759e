use std::time::Duration;

use tubemux_engine::{JobOutcome, JobStatus, RunReport};

/// Wall-clock time as `HH:MM:SS`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

pub fn describe_outcome(outcome: &JobOutcome) -> String {
    match &outcome.status {
        JobStatus::Completed { path } => format!("Saved {}", path.display()),
        JobStatus::Skipped { path } => format!("Already downloaded: {}", path.display()),
        JobStatus::Failed { step, error } => {
            format!("Failed {} at {step}: {error}", outcome.locator)
        }
    }
}

pub fn print_outcome(outcome: &JobOutcome) {
    println!("{}", describe_outcome(outcome));
}

pub fn print_report(report: &RunReport) {
    println!(
        "{}: {} completed, {} skipped, {} failed",
        report.title,
        report.completed(),
        report.skipped(),
        report.failed()
    );
    for outcome in report.outcomes.iter().filter(|o| o.is_failed()) {
        println!("  #{} {}", outcome.index + 1, describe_outcome(outcome));
    }
}

pub fn print_elapsed(elapsed: Duration) {
    println!("Elapsed time: {}", format_elapsed(elapsed));
}
