// Human-readable rendering of test reports and profiles

use crate::cache::CacheStats;
use benchbox_common::types::{CaseProfile, TestReport};
use chrono::{DateTime, Local};
use std::time::SystemTime;

/// Format a duration given in milliseconds with the most fitting unit
pub fn format_time(ms: f64) -> String {
    let seconds = ms / 1000.0;
    if seconds < 1e-6 {
        format!("{:.2} ns", seconds * 1e9)
    } else if seconds < 1e-3 {
        format!("{:.2} μs", seconds * 1e6)
    } else if seconds < 1.0 {
        format!("{:.2} ms", seconds * 1e3)
    } else {
        format!("{:.6} s", seconds)
    }
}

pub fn format_memory(bytes: f64) -> String {
    let mut value = bytes;
    for unit in ["B", "KB", "MB"] {
        if value < 1024.0 {
            return format!("{:.2} {}", value, unit);
        }
        value /= 1024.0;
    }
    format!("{:.2} GB", value)
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

pub fn print_test_report(report: &TestReport) {
    println!();
    for result in &report.results {
        let outcome = &result.outcome;
        let mark = if result.passed { "✓" } else { "✗" };
        let time = outcome.time_ms.map(format_time).unwrap_or_else(|| "-".to_string());
        let mem = outcome
            .mem_bytes
            .map(|m| format_memory(m as f64))
            .unwrap_or_else(|| "-".to_string());

        println!("  {} Case {:<3} {:>12} {:>12}", mark, result.case_num, time, mem);

        if !result.passed {
            let input = serde_json::to_string(&result.input).unwrap_or_default();
            println!("      Input:    {}", truncate(&input, 120));
            println!("      Expected: {}", truncate(&result.expected.to_string(), 120));
            match &outcome.error {
                Some(error) => {
                    println!("      Error ({:?}):", outcome.status);
                    for line in error.lines().take(10) {
                        println!("        {}", line);
                    }
                }
                None => println!("      Got:      {}", truncate(&outcome.result.to_string(), 120)),
            }
        }
        if !outcome.stdout.is_empty() {
            println!("      Stdout:");
            for line in outcome.stdout.lines().take(10) {
                println!("        {}", line);
            }
        }
    }

    println!();
    println!(
        "  {} / {} passed in {}",
        report.passed,
        report.total,
        format_time(report.elapsed_ms as f64)
    );
}

pub fn print_profiles(profiles: &[CaseProfile]) {
    println!();
    for profile in profiles {
        match (&profile.stats, &profile.error) {
            (Some(stats), _) => {
                println!("  Case {} ({} runs)", profile.case_num, stats.iterations);
                if let (Some(avg), Some(min), Some(max)) =
                    (stats.avg_time_ms, stats.min_time_ms, stats.max_time_ms)
                {
                    println!(
                        "    Time    avg {:>12}  min {:>12}  max {:>12}",
                        format_time(avg),
                        format_time(min),
                        format_time(max)
                    );
                }
                if let (Some(avg), Some(min), Some(max)) =
                    (stats.avg_mem_bytes, stats.min_mem_bytes, stats.max_mem_bytes)
                {
                    println!(
                        "    Memory  avg {:>12}  min {:>12}  max {:>12}",
                        format_memory(avg),
                        format_memory(min as f64),
                        format_memory(max as f64)
                    );
                }
            }
            (None, Some(error)) => {
                println!("  Case {} ✗", profile.case_num);
                for line in error.lines().take(10) {
                    println!("    {}", line);
                }
            }
            (None, None) => println!("  Case {}: no data", profile.case_num),
        }
    }
    println!();
}

fn format_timestamp(time: SystemTime) -> String {
    DateTime::<Local>::from(time).format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn print_cache_stats(stats: &[CacheStats]) {
    if stats.is_empty() {
        println!("Cache is empty");
        return;
    }

    println!("Cache statistics:");
    for entry in stats {
        println!("\n  {}", entry.name);
        println!("    Total size: {}", format_memory(entry.bytes as f64));
        println!("    File count: {}", entry.files);
        if !entry.extensions.is_empty() {
            println!("    File types:");
            for (ext, count) in &entry.extensions {
                let ext = if ext.is_empty() { "(no extension)" } else { ext.as_str() };
                println!("      {}: {}", ext, count);
            }
        }
        if let (Some(oldest), Some(newest)) = (entry.oldest, entry.newest) {
            println!("    Oldest file: {}", format_timestamp(oldest));
            println!("    Newest file: {}", format_timestamp(newest));
        }
    }
}
