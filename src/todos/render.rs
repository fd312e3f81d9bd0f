use std::sync::{LazyLock, Mutex};
use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tabled::settings::object::Columns;
use tabled::settings::{Style, Width};
use tabled::{Table, Tabled};

use crate::telemetry::{self};
use crate::telemetry::ctx::LogCtx;
use crate::telemetry::ops::fetch::{Fetch, Phase as FetchPhase};
use crate::telemetry::writer;

use super::orchestrator::RunObserver;
use super::types::{FetchResult, RunSummary, Todo};

const TITLE_WIDTH: usize = 48;

const TICK: &str = "⠁⠂⠄⡀⢀⠠⠐⠈ ";

static SPINNER_STYLE: LazyLock<Option<ProgressStyle>> = LazyLock::new(|| {
    ProgressStyle::with_template("{spinner:.blue} {msg} [{elapsed}]")
        .ok()
        .map(|s| s.tick_chars(TICK))
});

#[derive(Tabled, Debug, Clone)]
pub struct TodoRow {
    #[tabled(rename = "Index/ID")]
    pub id: u64,
    #[tabled(rename = "Completion Status")]
    pub status: String,
    #[tabled(rename = "Title")]
    pub title: String,
}

impl From<&Todo> for TodoRow {
    fn from(todo: &Todo) -> Self {
        let status = if todo.completed {
            style("Completed").green().to_string()
        } else {
            style("Not Completed").red().to_string()
        };
        TodoRow { id: todo.id, status, title: todo.title.clone() }
    }
}

pub fn render_table(rows: &[TodoRow]) -> String {
    let mut table = Table::new(rows);
    table.with(Style::modern());
    table.modify(Columns::single(2), Width::wrap(TITLE_WIDTH));
    table.to_string()
}

pub fn header_line(count: usize, retry_budget: u32) -> String {
    format!("Fetching {} TODOs with up to {} retries each...", count, retry_budget)
}

pub fn retry_line(id: u64, attempt: u32) -> String {
    format!("Retrying TODO {} ({})...", id, attempt)
}

pub fn failure_line(id: u64, retry_budget: u32) -> String {
    format!("Failed to fetch TODO {} after {} retries.", id, retry_budget)
}

pub fn summary_lines(summary: &RunSummary) -> Vec<String> {
    let mut lines = vec![
        "Summary".to_string(),
        format!("  attempted:  {}", summary.attempted),
        format!("  succeeded:  {}", summary.succeeded),
        format!("  failed:     {}", summary.failed),
        format!("  completed:  {}", summary.completed),
        format!("  incomplete: {}", summary.incomplete),
        format!("  elapsed:    {:.2}s", summary.elapsed_secs),
    ];
    if !summary.failed_ids.is_empty() {
        let ids: Vec<String> = summary.failed_ids.iter().map(|id| id.to_string()).collect();
        lines.push(format!("  failed ids: {}", ids.join(", ")));
    }
    lines
}

/// Console UI: colored notices, a spinner, and the table re-rendered per success.
pub struct ConsoleRenderer {
    count: usize,
    spinner: ProgressBar,
    rows: Mutex<Vec<TodoRow>>,
    log: LogCtx<Fetch>,
}

impl ConsoleRenderer {
    pub fn new(count: usize) -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Some(s) = SPINNER_STYLE.as_ref() {
            spinner.set_style(s.clone());
        }
        ConsoleRenderer { count, spinner, rows: Mutex::new(Vec::new()), log: telemetry::fetch() }
    }

    /// Append a row and return the whole table as it now stands.
    fn push_row(&self, todo: &Todo) -> String {
        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        rows.push(TodoRow::from(todo));
        render_table(&rows)
    }

    fn print(&self, line: impl AsRef<str>) {
        self.spinner.suspend(|| println!("{}", line.as_ref()));
    }
}

impl RunObserver for ConsoleRenderer {
    fn on_start(&self, count: usize, retry_budget: u32) {
        println!("{}", style(header_line(count, retry_budget)).blue());
        self.spinner.set_message("Fetching TODOs...");
        writer::attach_progress(&self.spinner);
        self.spinner.enable_steady_tick(Duration::from_millis(100));
    }

    fn on_retry(&self, id: u64, attempt: u32) {
        self.print(style(retry_line(id, attempt)).yellow().to_string());
    }

    fn on_permanent_failure(&self, id: u64, retry_budget: u32) {
        self.print(style(failure_line(id, retry_budget)).red().to_string());
    }

    fn on_resolved(&self, result: &FetchResult, summary: &RunSummary) {
        if let Some(todo) = &result.todo {
            let _s = self.log.span(&FetchPhase::Render).entered();
            let table = self.push_row(todo);
            self.log.debug_kv("render", [("id", todo.id.to_string()), ("rows", summary.succeeded.to_string())]);
            self.print(table);
        }
        if summary.is_done(self.count) {
            self.spinner.finish_and_clear();
        }
    }

    fn on_finish(&self, summary: &RunSummary) {
        self.spinner.finish_and_clear();
        writer::detach_progress();
        if summary.failed == 0 {
            println!("{}", style("All TODOs fetched.").green());
        } else {
            println!(
                "{}",
                style(format!("Fetched {} of {} TODOs ({} failed).", summary.succeeded, self.count, summary.failed)).yellow()
            );
        }
        for line in summary_lines(summary) {
            println!("{}", line);
        }
    }
}
