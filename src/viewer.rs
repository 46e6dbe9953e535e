use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use colored::Colorize;

use crate::config::Layout;
use crate::daily::{self, DailyStats};
use crate::timeseries::Timeseries;
use crate::utils::{format_cost, format_tokens, short_project, truncate};

const THROUGHPUT_MINUTES: i64 = 30;

pub fn run(layout: &Layout, date: Option<&str>, format: &str, verbose: u8) -> Result<()> {
    let date = match date {
        Some(d) => {
            NaiveDate::parse_from_str(d, "%Y-%m-%d")
                .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", d))?;
            d.to_string()
        }
        None => daily::today(),
    };
    let path = layout.daily_path(&date);
    if verbose > 0 {
        eprintln!("Reading {}", path.display());
    }

    let stats = DailyStats::read(&path);

    match format {
        "json" => {
            let stats = stats.unwrap_or_else(|| DailyStats::new(&date));
            println!("{}", serde_json::to_string_pretty(&stats)?);
            return Ok(());
        }
        "text" => {}
        other => bail!("Unknown format '{}', expected text or json", other),
    }

    let Some(stats) = stats.filter(|s| !s.sessions.is_empty()) else {
        println!("No token stats for {}.", date);
        let recent = daily::list_days(&layout.stats_dir());
        if let Some(last) = recent.first() {
            println!("Most recent day with data: {}", last);
        } else {
            println!("Stats are recorded by the PostToolUse hook during Claude Code sessions.");
        }
        return Ok(());
    };

    print_summary(&stats);
    print_models(&stats);
    print_sessions(&stats);

    if date == daily::today() {
        print_throughput(&Timeseries::load(&layout.timeseries_path()));
    }
    Ok(())
}

fn print_summary(stats: &DailyStats) {
    let t = &stats.daily_totals;
    println!("{}", format!("📊 Claude Code Token Stats: {}", stats.date).bold());
    println!("════════════════════════════════════════");
    println!("Sessions:          {}", t.session_count);
    println!("Requests:          {}", t.request_count);
    println!("Input tokens:      {}", format_tokens(t.tokens.input_tokens));
    println!("Output tokens:     {}", format_tokens(t.tokens.output_tokens));
    println!("Cache read:        {}", format_tokens(t.tokens.cache_read_tokens));
    println!("Cache write:       {}", format_tokens(t.tokens.cache_creation_tokens));
    println!("Total tokens:      {}", format_tokens(t.total_tokens));
    println!("Est. cost:         {}", format_cost(t.cost).green());
    println!();
}

fn print_models(stats: &DailyStats) {
    if stats.by_model.is_empty() {
        return;
    }
    println!("By Model:");
    println!("────────────────────────────────────────");
    println!(
        "{:<28} {:>6} {:>9} {:>9} {:>10}",
        "Model", "Reqs", "Input", "Output", "Cost"
    );
    let mut models: Vec<_> = stats.by_model.iter().collect();
    models.sort_by(|a, b| b.1.cost.total_cmp(&a.1.cost));
    for (model, usage) in models {
        println!(
            "{:<28} {:>6} {:>9} {:>9} {:>10}",
            truncate(model, 28),
            usage.request_count,
            format_tokens(usage.tokens.input_tokens),
            format_tokens(usage.tokens.output_tokens),
            format_cost(usage.cost)
        );
    }
    println!();
}

fn print_sessions(stats: &DailyStats) {
    println!("Sessions:");
    println!("────────────────────────────────────────");
    let mut sessions: Vec<_> = stats.sessions.iter().collect();
    sessions.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
    for s in sessions.iter().take(10) {
        let time = s.last_updated.get(11..16).unwrap_or("--:--");
        println!(
            "{} {:<20} {:>9} {:>10}",
            time,
            truncate(short_project(&s.project), 20),
            format_tokens(s.totals.total_tokens),
            format_cost(s.totals.cost)
        );
    }
    if sessions.len() > 10 {
        println!("... {} more", sessions.len() - 10);
    }
    println!();
}

fn print_throughput(series: &Timeseries) {
    let recent = series.recent(Local::now(), THROUGHPUT_MINUTES);
    if recent.is_empty() {
        return;
    }
    println!("Throughput (last {} min):", THROUGHPUT_MINUTES);
    println!("────────────────────────────────────────");
    let peak = recent
        .iter()
        .map(|(_, b)| b.output_tps)
        .fold(0.0_f64, f64::max);
    for &(minute, bucket) in &recent {
        let width = if peak > 0.0 {
            ((bucket.output_tps / peak) * 30.0).round() as usize
        } else {
            0
        };
        println!(
            "{} {:<30} {:>6.1} tok/s",
            minute.get(11..).unwrap_or(minute),
            "█".repeat(width).cyan(),
            bucket.output_tps
        );
    }
    println!();
}
