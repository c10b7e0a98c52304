// UI layer: everything the binary shows or asks for. The client itself
// never prints; these helpers wrap it with a spinner, prompts and the
// final JSON dump.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::style::{style, Stylize};
use dialoguer::Password;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;

use crate::api::PandoraClient;

const APIKEY_FILE: &str = ".pandora_apikey";
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Print a response as indented JSON on stdout.
pub fn print_json(value: &Value) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Serializing response")?;
    println!("{}", text);
    Ok(())
}

/// Whether a task status still means "being analysed".
pub fn is_pending(status: &str) -> bool {
    matches!(status, "WAITING" | "RUNNING")
}

/// Poll `task_status` until the task leaves the pending states or
/// `timeout` elapses, and return the last status received.
pub fn wait_for_task(
    client: &PandoraClient,
    task_id: &str,
    seed: Option<&str>,
    timeout: Duration,
) -> Result<Value> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner.set_message(format!("Waiting for task {}...", task_id));

    let start = Instant::now();
    loop {
        let status = client
            .task_status(task_id, seed)
            .with_context(|| format!("Fetching status of task {}", task_id))?;
        let state = status["status"].as_str().unwrap_or_default().to_string();

        if !is_pending(&state) {
            spinner.finish_and_clear();
            eprintln!("Task {}: {}", task_id, colorize_status(&state));
            return Ok(status);
        }
        if start.elapsed() >= timeout {
            spinner.finish_and_clear();
            eprintln!(
                "Task {} still {} after {}s",
                task_id,
                colorize_status(&state),
                timeout.as_secs()
            );
            return Ok(status);
        }
        spinner.set_message(format!("Task {}: {}", task_id, state));
        thread::sleep(POLL_INTERVAL);
    }
}

fn colorize_status(status: &str) -> String {
    match status {
        "CLEAN" => style(status).green().to_string(),
        "WARN" => style(status).yellow().to_string(),
        "ALERT" | "ERROR" => style(status).red().bold().to_string(),
        _ => status.to_string(),
    }
}

/// Ask for the password of `username` without echoing it.
pub fn prompt_password(username: &str) -> Result<String> {
    let password = Password::new()
        .with_prompt(format!("Password for {}", username))
        .interact()?;
    Ok(password)
}

fn apikey_path() -> PathBuf {
    let dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    dir.join(APIKEY_FILE)
}

/// Persist the API key in the user's home directory.
pub fn persist_apikey(apikey: &str) -> Result<()> {
    let path = apikey_path();
    write_secret(&path, apikey)
        .with_context(|| format!("Writing API key to {}", path.display()))?;
    Ok(())
}

/// Write `secret` to `path`, readable by the owner only on unix.
fn write_secret(path: &Path, secret: &str) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
        options.mode(0o600);
        let mut file = options.open(path)?;
        // An existing file keeps its old mode on open.
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        file.write_all(secret.as_bytes())
    }
    #[cfg(not(unix))]
    {
        options.open(path)?.write_all(secret.as_bytes())
    }
}

/// Load the API key saved by a previous run, if any.
pub fn load_apikey() -> Option<String> {
    let data = std::fs::read_to_string(apikey_path()).ok()?;
    let apikey = data.trim();
    (!apikey.is_empty()).then(|| apikey.to_string())
}
