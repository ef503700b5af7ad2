//! Terminal feedback for source transfers

use indicatif::{ProgressBar, ProgressStyle};

const SIZED_TEMPLATE: &str =
    "{msg} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";
const UNSIZED_TEMPLATE: &str = "{spinner:.green} {msg} [{elapsed_precise}] {bytes} ({bytes_per_sec})";

/// Bar for one unit's transfer.
///
/// Sources that do not declare a length get a spinner with a byte counter.
pub fn transfer_bar(label: &str, expected: Option<u64>) -> ProgressBar {
    let (pb, template) = match expected {
        Some(len) => (ProgressBar::new(len), SIZED_TEMPLATE),
        None => (ProgressBar::new_spinner(), UNSIZED_TEMPLATE),
    };

    if let Ok(style) = ProgressStyle::with_template(template) {
        pb.set_style(style.progress_chars("=> "));
    }
    pb.set_message(label.to_string());
    pb
}

/// Binary-prefixed size, e.g. `1.50 KiB`
pub fn format_bytes(bytes: u64) -> String {
    const SCALES: [(u64, &str); 4] = [
        (1 << 40, "TiB"),
        (1 << 30, "GiB"),
        (1 << 20, "MiB"),
        (1 << 10, "KiB"),
    ];

    SCALES
        .iter()
        .find(|(scale, _)| bytes >= *scale)
        .map(|(scale, suffix)| format!("{:.2} {}", bytes as f64 / *scale as f64, suffix))
        .unwrap_or_else(|| format!("{} B", bytes))
}
