use colored::Colorize;

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Truncate a string for display, keeping the end
pub fn truncate_path(path: &str, max_len: usize) -> String {
    let len = path.chars().count();
    if len <= max_len {
        path.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let tail: String = path.chars().skip(len - (max_len - 3)).collect();
        format!("...{tail}")
    }
}

/// Format a duration in seconds with millisecond precision
pub fn format_elapsed(elapsed: chrono::TimeDelta) -> String {
    let millis = elapsed.num_milliseconds().max(0);
    if millis < 1000 {
        format!("{millis}ms")
    } else {
        format!("{}.{:02}s", millis / 1000, (millis % 1000) / 10)
    }
}
