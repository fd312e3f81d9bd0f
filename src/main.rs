use clap::Parser;
use anyhow::Result;
use dotenvy::dotenv;

mod output;
mod telemetry;
mod todos;

#[derive(Parser)]
#[command(name = "todo-fetch", version, about = "Fetch TODOs from jsonplaceholder")]
struct Cli {
    /// Emit a single JSON envelope to stdout instead of the table; logs go to stderr
    #[arg(long, default_value_t = false)]
    json: bool,

    #[command(flatten)]
    fetch: todos::FetchCmd,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    telemetry::config::set_json_mode(cli.json);

    // initialize logging/tracing (stderr). Respect RUST_LOG and TODOS_LOG_FORMAT
    telemetry::config::init_tracing();

    todos::run(cli.fetch).await
}
