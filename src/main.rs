// Entrypoint for the CLI application.
// - Build a client from the flags, make sure the instance answers, run
//   the one requested action and print its JSON result.
// - Errors are reported with their context chain and exit status 1.

use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;

use pandora::cli::Cli;
use pandora::{logging, ui};
use pandora::{ClientConfig, Credentials, PandoraClient, SeedExpiry, StatsQuery, WorkerQuery};

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let mut config = ClientConfig::new(&cli.url).context("Invalid instance URL")?;
    if let Some(useragent) = &cli.useragent {
        config = config.with_useragent(useragent.as_str());
    }
    if let Some(proxy) = &cli.proxy {
        config = config.with_proxy("all", proxy.as_str());
    }
    let mut client = PandoraClient::with_config(config).context("Failed to build HTTP client")?;

    if !client.is_up() {
        println!("Unable to reach {}. Is the server up?", client.root_url());
        return Ok(ExitCode::FAILURE);
    }

    authenticate(&mut client, cli)?;

    let response = if cli.redis_up {
        client.redis_up()?
    } else if let Some(path) = &cli.file {
        submit(&client, cli, path)?
    } else if let Some(task_id) = &cli.task_id {
        client.task_status(task_id, cli.seed.as_deref())?
    } else if let Some(task_id) = &cli.worker_status {
        let query = WorkerQuery {
            task_id: task_id.clone(),
            seed: cli.seed.clone(),
            all_workers: cli.all_workers,
            worker_name: cli.worker_name.clone(),
            details: cli.details,
        };
        client.worker_status(&query)?
    } else if cli.enabled_workers {
        Value::from(client.get_enabled_workers()?)
    } else if let Some(query) = &cli.search {
        client.search(query, cli.limit_days)?
    } else if let Some(interval) = &cli.stats {
        client.get_stats(&stats_query(interval, cli)?)?
    } else if let Some(interval) = &cli.submit_stats {
        client.get_submit_stats(&stats_query(interval, cli)?)?
    } else {
        println!("{} is up.", client.root_url());
        return Ok(ExitCode::SUCCESS);
    };

    ui::print_json(&response)?;
    Ok(ExitCode::SUCCESS)
}

/// Attach an API key to the session: from --apikey, from --username
/// (password from the environment or a prompt), or from a saved key.
fn authenticate(client: &mut PandoraClient, cli: &Cli) -> Result<()> {
    let credentials = if let Some(apikey) = &cli.apikey {
        Credentials::apikey(apikey.as_str())
    } else if let Some(username) = &cli.username {
        let password = match std::env::var("PANDORA_PASSWORD") {
            Ok(password) if !password.is_empty() => password,
            _ => ui::prompt_password(username)?,
        };
        Credentials::login(username.as_str(), password)
    } else if let Some(apikey) = ui::load_apikey() {
        Credentials::apikey(apikey)
    } else {
        return Ok(());
    };

    client
        .init_apikey(&credentials)
        .context("Authentication failed")?;

    if cli.save_apikey {
        if let Some(apikey) = client.apikey() {
            ui::persist_apikey(apikey)?;
        }
    }
    Ok(())
}

fn submit(client: &PandoraClient, cli: &Cli, path: &Path) -> Result<Value> {
    let mut response = client
        .submit_from_disk(path, SeedExpiry::Seconds(cli.seed_expire), cli.password.as_deref())
        .with_context(|| format!("Submitting {}", path.display()))?;

    // Rejected submissions carry no taskId; there is nothing to wait for.
    if cli.wait {
        if let Some(task_id) = response["taskId"].as_str().map(str::to_owned) {
            let seed = response["seed"].as_str().map(str::to_owned);
            let status = ui::wait_for_task(
                client,
                &task_id,
                seed.as_deref(),
                Duration::from_secs(cli.wait_timeout),
            )?;
            response["status"] = status;
        }
    }
    Ok(response)
}

fn stats_query(interval: &str, cli: &Cli) -> Result<StatsQuery> {
    let mut query = StatsQuery::parse(interval)?;
    query.year = cli.year;
    query.month = cli.month;
    query.week = cli.week;
    query.day = cli.day;
    if let Some(date) = cli.date {
        query = query.date(date);
    }
    Ok(query)
}
