use crate::core::{IndexEntry, SaveResult, UsageReport};
use colored::*;

pub fn print_header(text: &str) {
    println!("\n{}", text.bright_cyan().bold());
    println!("{}", "=".repeat(text.len()).bright_cyan());
}

pub fn print_success(text: &str) {
    println!("{}", text.green());
}

pub fn print_warning(text: &str) {
    println!("{}", text.yellow());
}

pub fn print_error(text: &str) {
    eprintln!("{}", text.red().bold());
}

pub fn print_info(text: &str) {
    println!("{}", text.blue());
}

/// Human readable byte count, e.g. `1.5 KiB`
pub fn format_bytes(bytes: usize) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

pub fn print_save_result(result: &SaveResult) {
    let status = if result.success {
        "saved".green().bold()
    } else {
        "failed".red().bold()
    };
    println!(
        "{} {} ({} msgs, {})",
        status,
        result.key,
        result.final_count,
        format_bytes(result.final_bytes)
    );

    if result.trimmed() {
        print_warning(&format!(
            "  trimmed {} -> {} msgs (count: {}, soft: {}, hard: {})",
            result.original_count,
            result.final_count,
            result.trimmed_by_count,
            result.trimmed_soft,
            result.trimmed_hard
        ));
    }
    if result.soft_trim_relaxed {
        print_info("  soft trim relaxed for link-heavy history");
    }
    for stats in result.eviction.iter().chain(result.retry_eviction.iter()) {
        print_warning(&format!(
            "  evicted {} conversation(s), freed {}",
            stats.evicted_keys.len(),
            format_bytes(stats.freed_bytes)
        ));
    }
    if result.deduplicated {
        print_info("  unchanged, write skipped");
    }
    if let Some(error) = &result.error {
        print_error(&format!("  {}", error));
    }
}

pub fn print_usage(report: &UsageReport, entries: &[IndexEntry], warn_ratio: f64) {
    print_header("Storage Usage");
    let line = format!(
        "{} of {} ({:.1}%)",
        format_bytes(report.rough_usage_bytes),
        format_bytes(report.quota_bytes),
        report.usage_ratio * 100.0
    );
    if report.usage_ratio >= warn_ratio {
        print_warning(&line);
    } else {
        print_success(&line);
    }
    println!(
        "{} conversation(s) indexed, {} recorded\n",
        report.conversations,
        format_bytes(report.indexed_bytes)
    );

    for entry in entries {
        println!(
            "  {:<48} {:>10} {:>6} msgs",
            entry.key,
            format_bytes(entry.size),
            entry
                .count
                .map(|c| c.to_string())
                .unwrap_or_else(|| "?".to_string())
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(2 * 1024 * 1024), "2.0 MiB");
    }
}
