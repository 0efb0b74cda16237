//! cli/src/output.rs
//! Terminal output for the CLI: styled messages, the job progress bar and
//! the metrics table. Everything here writes to stderr so stdout carries
//! only program text, dumps and listings.

use comfy_table::{CellAlignment, ContentArrangement, Table, presets};
use console::Style;
use indicatif::{ProgressBar, ProgressStyle};
use shroud_core::{
    Metrics, ShroudErrorExt, generate_error_report,
    progress::{Phase, Progress},
};

/// Styles for the different kinds of message.
pub struct FormatStyle {
    pub info: Style,
    pub warning: Style,
    pub error: Style,
    pub success: Style,
}

impl Default for FormatStyle {
    fn default() -> Self {
        FormatStyle {
            info: Style::new().cyan(),
            warning: Style::new().yellow(),
            error: Style::new().red().bold(),
            success: Style::new().green().bold(),
        }
    }
}

impl FormatStyle {
    pub fn info(&self, text: &str) {
        eprintln!("{}", self.info.apply_to(text));
    }

    pub fn warning(&self, text: &str) {
        eprintln!("{}", self.warning.apply_to(text));
    }

    pub fn success(&self, text: &str) {
        eprintln!("{}", self.success.apply_to(text));
    }

    pub fn error(&self, error: &dyn ShroudErrorExt) {
        eprintln!("{}", self.error.apply_to(generate_error_report(error)));
    }
}

/// A 0..=100 bar for one job. Hidden automatically when stderr is not a
/// terminal.
pub fn progress_bar(name: &str) -> ProgressBar {
    let bar = ProgressBar::new(100);
    let style = ProgressStyle::with_template("{prefix:.bold} [{bar:32.cyan/blue}] {pos:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▒░");
    bar.set_style(style);
    bar.set_prefix(name.to_string());
    bar
}

pub fn update_bar(bar: &ProgressBar, progress: &Progress) {
    bar.set_position(progress.percent.round() as u64);
    bar.set_message(describe(progress));
}

fn describe(progress: &Progress) -> String {
    match (&progress.chunks, progress.phase) {
        (Some(chunks), Phase::Processing) => {
            let eta = chunks.eta_ms.map(|ms| format!(", eta {:.1}s", ms as f64 / 1000.0)).unwrap_or_default();
            format!(
                "chunk {}/{} on {} workers{}",
                chunks.chunks_processed, chunks.chunks_total, chunks.active_workers, eta
            )
        }
        (_, phase) => phase.to_string(),
    }
}

/// Borderless two-column table, sized to its widest cell.
pub fn metrics_table(name: &str, metrics: &Metrics) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![name.to_string(), String::new()]);
    for (label, value) in metrics.rows() {
        table.add_row(vec![label.to_string(), value]);
    }
    if let Some(column) = table.column_mut(1) {
        column.set_cell_alignment(CellAlignment::Right);
    }
    table
}

pub fn print_table(table: &Table) {
    for line in table.to_string().lines() {
        eprintln!("{}", line.trim_end());
    }
}
