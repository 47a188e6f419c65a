//! Terminal output.

pub mod reporter;

pub use reporter::ConsoleReporter;

/// Format a duration in seconds for display (`4.2s`, `3m 07s`).
pub fn format_elapsed(secs: f64) -> String {
    if secs < 60.0 {
        format!("{secs:.1}s")
    } else {
        let total = secs.round() as u64;
        format!("{}m {:02}s", total / 60, total % 60)
    }
}
