use serde::{Deserialize, Serialize};

/// One remote item. Extra fields in the body (e.g. `userId`) are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    pub id: u64,
    pub title: String,
    pub completed: bool,
}

/// Per-ID retry state; lives for one chain only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchRequest {
    pub id: u64,
    pub retries_remaining: u32,
}

impl FetchRequest {
    pub fn new(id: u64, retry_budget: u32) -> Self {
        Self { id, retries_remaining: retry_budget }
    }
}

/// Terminal outcome of one chain: the item, or `None` after the retry budget ran out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    pub id: u64,
    pub todo: Option<Todo>,
}

impl FetchResult {
    pub fn fetched(id: u64, todo: Todo) -> Self { Self { id, todo: Some(todo) } }
    pub fn failed(id: u64) -> Self { Self { id, todo: None } }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub completed: usize,
    pub incomplete: usize,
    pub failed_ids: Vec<u64>,
    pub elapsed_secs: f64,
}

impl RunSummary {
    /// Fold one terminal outcome into the counters.
    pub fn record(&mut self, result: &FetchResult) {
        self.attempted += 1;
        match &result.todo {
            Some(todo) => {
                self.succeeded += 1;
                if todo.completed { self.completed += 1; } else { self.incomplete += 1; }
            }
            None => {
                self.failed += 1;
                self.failed_ids.push(result.id);
            }
        }
    }

    pub fn is_done(&self, count: usize) -> bool { self.attempted == count }
}

/// JSON result payload for `--json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub summary: RunSummary,
    pub todos: Vec<Todo>,
}
