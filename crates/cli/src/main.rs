//! Volley CLI - Command-line interface for the Volley daemon

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::{ColoredString, Colorize};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9527";
const DEFAULT_POLL_MS: u64 = 500;

#[derive(Parser)]
#[command(name = "volley")]
#[command(about = "Run one command across many hosts", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "VOLLEY_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a command for a list of targets
    Run {
        /// Shell command to run on every target
        command: String,

        /// Target ids from the inventory (comma-separated or repeated)
        #[arg(short, long, value_delimiter = ',', required = true)]
        targets: Vec<String>,

        /// Maximum targets in flight at once
        #[arg(short, long)]
        concurrency: Option<u32>,

        /// Per-target timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<i64>,

        /// Operating system hint recorded with the execution
        #[arg(long)]
        os_hint: Option<String>,

        /// Wait for the execution to finish and print its results
        #[arg(short, long)]
        wait: bool,
    },

    /// Show an execution with its per-target results
    Show {
        /// Execution ID
        execution_id: String,

        /// Print captured stdout/stderr for each target
        #[arg(short, long)]
        output: bool,
    },

    /// List recent executions
    List {
        /// Maximum number of executions
        #[arg(short = 'n', long)]
        limit: Option<u32>,
    },

    /// Cancel an execution
    Cancel {
        /// Execution ID
        execution_id: String,
    },

    /// Follow an execution's progress until it finishes
    Watch {
        /// Execution ID
        execution_id: String,

        /// Poll interval in milliseconds
        #[arg(long, default_value_t = DEFAULT_POLL_MS)]
        interval_ms: u64,
    },

    /// Show system status
    Status,
}

#[derive(Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: serde_json::Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: String,
    #[allow(dead_code)]
    id: u64,
    result: Option<serde_json::Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

#[derive(Deserialize, Tabled)]
struct SubmitResult {
    execution_id: String,
    status: String,
    target_count: usize,
}

#[derive(Deserialize)]
struct ExecutionView {
    execution_id: String,
    command: String,
    status: String,
    target_count: usize,
    concurrency_limit: u32,
    timeout_ms: i64,
    error_message: Option<String>,
    created_at: i64,
    completed_at: Option<i64>,
}

impl ExecutionView {
    fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "completed" | "cancelled" | "failed")
    }
}

#[derive(Deserialize)]
struct ResultView {
    position: u32,
    target_id: String,
    host_address: Option<String>,
    status: String,
    exit_code: Option<i32>,
    exit_status_known: bool,
    stdout: String,
    stderr: String,
    output_truncated: bool,
    failure_kind: Option<String>,
    error_message: Option<String>,
}

#[derive(Deserialize)]
struct Progress {
    total: usize,
    pending: usize,
    running: usize,
    success: usize,
    error: usize,
    skipped: usize,
}

#[derive(Deserialize)]
struct ExecutionDetail {
    execution: ExecutionView,
    progress: Progress,
    results: Vec<ResultView>,
}

#[derive(Deserialize)]
struct ExecutionList {
    executions: Vec<ExecutionView>,
}

#[derive(Tabled)]
struct ExecutionRow {
    id: String,
    status: String,
    targets: usize,
    command: String,
    created: String,
}

impl From<&ExecutionView> for ExecutionRow {
    fn from(view: &ExecutionView) -> Self {
        Self {
            id: view.execution_id.clone(),
            status: view.status.clone(),
            targets: view.target_count,
            command: abbreviate(&view.command, 40),
            created: format_millis(view.created_at),
        }
    }
}

#[derive(Tabled)]
struct ResultRow {
    #[tabled(rename = "#")]
    position: u32,
    target: String,
    host: String,
    status: String,
    exit: String,
    failure: String,
}

impl From<&ResultView> for ResultRow {
    fn from(view: &ResultView) -> Self {
        let exit = match (view.exit_code, view.exit_status_known) {
            (Some(code), true) => code.to_string(),
            (Some(_), false) => "unknown".to_string(),
            (None, _) => "-".to_string(),
        };
        let failure = match (&view.failure_kind, &view.error_message) {
            (Some(kind), Some(message)) => format!("{}: {}", kind, abbreviate(message, 50)),
            (Some(kind), None) => kind.clone(),
            _ => String::new(),
        };
        Self {
            position: view.position,
            target: view.target_id.clone(),
            host: view.host_address.clone().unwrap_or_else(|| "-".to_string()),
            status: view.status.clone(),
            exit,
            failure,
        }
    }
}

async fn call_rpc(url: &str, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
    let request = JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        method: method.to_string(),
        params,
        id: 1,
    };

    let client = reqwest::Client::new();
    let response: JsonRpcResponse = client
        .post(url)
        .json(&request)
        .send()
        .await
        .context("Failed to connect to daemon")?
        .json()
        .await
        .context("Failed to parse response")?;

    if let Some(error) = response.error {
        anyhow::bail!("RPC error ({}): {}", error.code, error.message);
    }

    response
        .result
        .ok_or_else(|| anyhow::anyhow!("No result in response"))
}

async fn get_execution(url: &str, execution_id: &str) -> Result<ExecutionDetail> {
    let result = call_rpc(
        url,
        "execution.get.v1",
        json!({ "execution_id": execution_id }),
    )
    .await?;
    Ok(serde_json::from_value(result)?)
}

/// Poll until terminal, printing a progress line whenever the counts move
async fn follow(url: &str, execution_id: &str, interval: Duration) -> Result<ExecutionDetail> {
    let mut last_line = String::new();
    loop {
        let detail = get_execution(url, execution_id).await?;
        let line = progress_line(&detail.progress);
        if line != last_line {
            println!("  {} {}", status_label(&detail.execution.status), line);
            last_line = line;
        }
        if detail.execution.is_terminal() {
            return Ok(detail);
        }
        tokio::time::sleep(interval).await;
    }
}

fn progress_line(progress: &Progress) -> String {
    format!(
        "{}/{} done (success {}, error {}, skipped {}, running {}, pending {})",
        progress.success + progress.error + progress.skipped,
        progress.total,
        progress.success,
        progress.error,
        progress.skipped,
        progress.running,
        progress.pending
    )
}

fn print_detail(detail: &ExecutionDetail, with_output: bool) {
    let execution = &detail.execution;
    println!(
        "{} {}",
        "Execution".cyan().bold(),
        execution.execution_id.bold()
    );
    println!("  {} {}", "Command:".bold(), execution.command);
    println!("  {} {}", "Status:".bold(), status_label(&execution.status));
    println!(
        "  {} {} (concurrency {}, timeout {} ms)",
        "Targets:".bold(),
        execution.target_count,
        execution.concurrency_limit,
        execution.timeout_ms
    );
    println!("  {} {}", "Created:".bold(), format_millis(execution.created_at));
    if let Some(completed_at) = execution.completed_at {
        println!("  {} {}", "Completed:".bold(), format_millis(completed_at));
    }
    if let Some(message) = &execution.error_message {
        println!("  {} {}", "Error:".bold(), message.red());
    }
    println!("  {} {}", "Progress:".bold(), progress_line(&detail.progress));
    println!();

    let rows: Vec<ResultRow> = detail.results.iter().map(ResultRow::from).collect();
    println!("{}", Table::new(rows));

    if with_output {
        for result in &detail.results {
            if result.stdout.is_empty() && result.stderr.is_empty() {
                continue;
            }
            println!();
            println!(
                "{} {}",
                format!("[{}]", result.target_id).cyan().bold(),
                status_label(&result.status)
            );
            if !result.stdout.is_empty() {
                print!("{}", result.stdout);
                if !result.stdout.ends_with('\n') {
                    println!();
                }
            }
            if !result.stderr.is_empty() {
                eprint!("{}", result.stderr.yellow());
                if !result.stderr.ends_with('\n') {
                    eprintln!();
                }
            }
            if result.output_truncated {
                println!("{}", "(output truncated)".dimmed());
            }
        }
    }
}

fn status_label(status: &str) -> ColoredString {
    match status {
        "completed" | "success" => status.green(),
        "failed" | "error" => status.red(),
        "cancelled" | "skipped" => status.yellow(),
        "running" => status.cyan(),
        _ => status.normal(),
    }
}

fn format_millis(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| millis.to_string())
}

fn abbreviate(text: &str, max_chars: usize) -> String {
    let single_line = text.replace('\n', " ");
    if single_line.chars().count() <= max_chars {
        return single_line;
    }
    let kept: String = single_line.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            command,
            targets,
            concurrency,
            timeout_ms,
            os_hint,
            wait,
        } => {
            let mut params = json!({
                "command": command,
                "targets": targets,
            });
            if let Some(limit) = concurrency {
                params["concurrency_limit"] = json!(limit);
            }
            if let Some(timeout_ms) = timeout_ms {
                params["timeout_ms"] = json!(timeout_ms);
            }
            if let Some(os_hint) = os_hint {
                params["os_hint"] = json!(os_hint);
            }

            let result = call_rpc(&cli.rpc_url, "execution.submit.v1", params).await?;
            let submitted: SubmitResult = serde_json::from_value(result)?;

            println!("{}", "✓ Execution submitted".green().bold());
            println!();
            let execution_id = submitted.execution_id.clone();
            println!("{}", Table::new(vec![submitted]));

            if wait {
                println!();
                let detail = follow(
                    &cli.rpc_url,
                    &execution_id,
                    Duration::from_millis(DEFAULT_POLL_MS),
                )
                .await?;
                println!();
                print_detail(&detail, true);
            }
        }

        Commands::Show {
            execution_id,
            output,
        } => {
            let detail = get_execution(&cli.rpc_url, &execution_id).await?;
            print_detail(&detail, output);
        }

        Commands::List { limit } => {
            let params = match limit {
                Some(limit) => json!({ "limit": limit }),
                None => json!({}),
            };
            let result = call_rpc(&cli.rpc_url, "execution.list.v1", params).await?;
            let list: ExecutionList = serde_json::from_value(result)?;

            if list.executions.is_empty() {
                println!("{}", "No executions yet".yellow());
            } else {
                let rows: Vec<ExecutionRow> =
                    list.executions.iter().map(ExecutionRow::from).collect();
                println!("{}", Table::new(rows));
            }
        }

        Commands::Cancel { execution_id } => {
            let params = json!({
                "execution_id": execution_id,
            });

            let result = call_rpc(&cli.rpc_url, "execution.cancel.v1", params).await?;

            if result["cancelled"].as_bool().unwrap_or(false) {
                println!(
                    "{}",
                    format!("✓ Execution {} cancelled", execution_id).green().bold()
                );
            } else {
                let message =
                    format!("Execution {} had no queued targets left to skip", execution_id);
                println!("{}", message.yellow());
            }
        }

        Commands::Watch {
            execution_id,
            interval_ms,
        } => {
            println!(
                "{}",
                format!("Watching execution {}", execution_id).cyan().bold()
            );
            let detail = follow(
                &cli.rpc_url,
                &execution_id,
                Duration::from_millis(interval_ms.max(50)),
            )
            .await?;
            println!();
            print_detail(&detail, false);
        }

        Commands::Status => {
            println!("{}", "System Status".cyan().bold());
            println!();

            match call_rpc(&cli.rpc_url, "admin.stats.v1", json!({})).await {
                Ok(stats) => {
                    println!("  {} {}", "RPC URL:".bold(), cli.rpc_url);
                    println!("  {} {}", "Status:".bold(), "ONLINE".green());
                    println!();
                    println!(
                        "  {} {}",
                        "Active Executions:".bold(),
                        stats["active_executions"]
                    );
                    for (label, section) in [("Executions", "executions"), ("Results", "results")]
                    {
                        if let Some(counts) = stats[section].as_object() {
                            let summary: Vec<String> = counts
                                .iter()
                                .map(|(status, count)| format!("{} {}", status, count))
                                .collect();
                            println!("  {} {}", format!("{}:", label).bold(), summary.join(", "));
                        }
                    }
                    println!();
                    println!("  {} {} seconds", "Uptime:".bold(), stats["uptime_seconds"]);
                }
                Err(e) => {
                    println!("  {} {}", "Status:".bold(), "ERROR".red());
                    println!("  {} {}", "Error:".bold(), e);
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abbreviate_long_command() {
        assert_eq!(abbreviate("uptime", 40), "uptime");
        assert_eq!(abbreviate("echo one\necho two", 40), "echo one echo two");
        assert_eq!(abbreviate("abcdefghij", 8), "abcde...");
    }

    #[test]
    fn test_result_row_exit_column() {
        let view = ResultView {
            position: 0,
            target_id: "web-1".to_string(),
            host_address: None,
            status: "error".to_string(),
            exit_code: Some(0),
            exit_status_known: false,
            stdout: String::new(),
            stderr: String::new(),
            output_truncated: false,
            failure_kind: Some("exit_status_unknown".to_string()),
            error_message: None,
        };
        let row = ResultRow::from(&view);
        assert_eq!(row.exit, "unknown");
        assert_eq!(row.host, "-");
        assert_eq!(row.failure, "exit_status_unknown");
    }

    #[test]
    fn test_format_millis() {
        assert_eq!(format_millis(0), "1970-01-01 00:00:00");
    }
}
