//! `schedule` command: show what the refresh strategy would do at a given time.
//!
//! Pure dry run. Nothing is contacted and no state is written.

use std::path::Path;

use chrono::{DateTime, FixedOffset, Local};
use fleetsync::schedule::{decide, RefreshAction, RefreshDecision};

use super::common::{format_duration, load_config, parse_datetime, resolve_policy};
use crate::error::CliError;

/// Arguments for the schedule command.
pub struct ScheduleArgs {
    pub account: Option<String>,
    pub at: Option<String>,
    pub last_cached: Option<String>,
    pub last_forced: Option<String>,
}

pub fn run(args: ScheduleArgs, config_path: &Path) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let policy = resolve_policy(&config, args.account.as_deref())?;

    let now = match &args.at {
        Some(at) => parse_datetime(at)?,
        None => Local::now().fixed_offset(),
    };

    let mut schedule = policy.schedule();
    schedule.last_cached_at = args.last_cached.as_deref().map(parse_datetime).transpose()?;
    schedule.last_force_at = args.last_forced.as_deref().map(parse_datetime).transpose()?;

    let decision = decide(now, &schedule);

    println!("Refresh schedule ({})", args.account.as_deref().unwrap_or("defaults"));
    println!("================");
    println!();
    println!("  At:            {}", now.format("%Y-%m-%d %H:%M:%S"));
    println!(
        "  Quiet hours:   {}",
        policy
            .quiet_hours
            .map(|qh| qh.to_string())
            .unwrap_or_else(|| "off".to_string())
    );
    println!("  Last cached:   {}", format_last(schedule.last_cached_at));
    println!("  Last forced:   {}", format_last(schedule.last_force_at));
    println!();
    println!("  Action:        {}", describe(&decision));
    println!(
        "  Next check in: {} ({})",
        format_duration(decision.next_check),
        next_check_at(now, decision.next_check)
    );

    Ok(())
}

/// Wall-clock time of the next check, or `-` if it falls outside chrono's range.
fn next_check_at(now: DateTime<FixedOffset>, delay: std::time::Duration) -> String {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delay| now.checked_add_signed(delay))
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn format_last(at: Option<DateTime<FixedOffset>>) -> String {
    at.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string())
}

fn describe(decision: &RefreshDecision) -> String {
    let base = match decision.action {
        RefreshAction::None => "nothing due",
        RefreshAction::CachedOnly => "read cached state",
        RefreshAction::ForceWithFallback => "wake vehicles (cached fallback)",
    };
    if decision.force_blocked {
        format!("{}; forced poll held back by quiet hours", base)
    } else {
        base.to_string()
    }
}
