// Command-line surface of the `pandora` binary. Flag names keep the
// underscore spelling users of the Pandora tooling already type.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{ArgGroup, Parser};

use crate::api::DEFAULT_SEARCH_DAYS;
use crate::config::DEFAULT_ROOT_URL;

#[derive(Parser, Debug)]
#[command(name = "pandora")]
#[command(about = "Submit a file to a Pandora instance and query the analysis")]
#[command(version)]
#[command(group(
    ArgGroup::new("action")
        .multiple(false)
        .args([
            "redis_up",
            "file",
            "task_id",
            "worker_status",
            "enabled_workers",
            "search",
            "stats",
            "submit_stats",
        ])
))]
#[command(group(ArgGroup::new("stats_action").args(["stats", "submit_stats"])))]
pub struct Cli {
    /// URL of the instance
    #[arg(long, env = "PANDORA_URL", default_value = DEFAULT_ROOT_URL)]
    pub url: String,

    /// User agent sent with every request
    #[arg(long)]
    pub useragent: Option<String>,

    /// Proxy used for every request
    #[arg(long)]
    pub proxy: Option<String>,

    /// Log requests and retries to stderr
    #[arg(short, long)]
    pub verbose: bool,

    /// API key of the session
    #[arg(long, env = "PANDORA_APIKEY", hide_env_values = true)]
    pub apikey: Option<String>,

    /// Log in as this user; the password is read from PANDORA_PASSWORD
    /// or prompted for
    #[arg(long, conflicts_with = "apikey")]
    pub username: Option<String>,

    /// Keep the API key obtained with --username for later runs
    #[arg(long = "save_apikey", requires = "username")]
    pub save_apikey: bool,

    /// Check if redis is up
    #[arg(long = "redis_up")]
    pub redis_up: bool,

    /// Path to the file to submit
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Seconds the seed of the submission stays valid, 0 for never
    #[arg(long = "seed_expire", default_value_t = 3600)]
    pub seed_expire: u64,

    /// Password protecting the submitted file
    #[arg(long, requires = "file")]
    pub password: Option<String>,

    /// After submitting, poll the task until the analysis is over
    #[arg(long, requires = "file")]
    pub wait: bool,

    /// Seconds --wait polls for before giving up
    #[arg(long = "wait_timeout", default_value_t = 30)]
    pub wait_timeout: u64,

    /// The id of the task you'd like to get the status of
    #[arg(long = "task_id")]
    pub task_id: Option<String>,

    /// The seed of the task you'd like to get the status of
    #[arg(long)]
    pub seed: Option<String>,

    /// Get the worker status of that task
    #[arg(long = "worker_status", value_name = "TASK_ID")]
    pub worker_status: Option<String>,

    /// With --worker_status: every worker, with details
    #[arg(long = "all_workers", requires = "worker_status")]
    pub all_workers: bool,

    /// With --worker_status: only this worker
    #[arg(long = "worker_name", requires = "worker_status")]
    pub worker_name: Option<String>,

    /// With --worker_status: include the worker details
    #[arg(long, requires = "worker_status")]
    pub details: bool,

    /// List the enabled workers
    #[arg(long = "enabled_workers")]
    pub enabled_workers: bool,

    /// [Admin] Search a hash or a file name in the tasks
    #[arg(long, value_name = "QUERY")]
    pub search: Option<String>,

    /// With --search: days of history to search, 0 for the server default
    #[arg(long = "limit_days", default_value_t = DEFAULT_SEARCH_DAYS)]
    pub limit_days: u32,

    /// [Admin] Submission overview for an interval (year, month, week, day)
    #[arg(long, value_name = "INTERVAL")]
    pub stats: Option<String>,

    /// [Admin] Submission count for an interval (year, month, week, day)
    #[arg(long = "submit_stats", value_name = "INTERVAL")]
    pub submit_stats: Option<String>,

    /// Date (YYYY-MM-DD) pinning the stats interval; overrides
    /// --year/--month/--week/--day
    #[arg(long, value_parser = parse_date, requires = "stats_action")]
    pub date: Option<NaiveDate>,

    /// Year of the stats interval
    #[arg(long, requires = "stats_action")]
    pub year: Option<i32>,

    /// Month of the stats interval (month and day intervals)
    #[arg(long, requires = "stats_action")]
    pub month: Option<u32>,

    /// ISO week of the stats interval (week interval)
    #[arg(long, requires = "stats_action")]
    pub week: Option<u32>,

    /// Day of the month of the stats interval (day interval)
    #[arg(long, requires = "stats_action")]
    pub day: Option<u32>,
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("{}: expected YYYY-MM-DD", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_task_lookup() {
        let cli = Cli::try_parse_from(["pandora", "--task_id", "abc", "--seed", "xyz"]).unwrap();
        assert_eq!(cli.task_id.as_deref(), Some("abc"));
        assert_eq!(cli.seed.as_deref(), Some("xyz"));
    }

    #[test]
    fn test_submit_defaults() {
        let cli = Cli::try_parse_from(["pandora", "-f", "sample.bin"]).unwrap();
        assert_eq!(cli.file, Some(PathBuf::from("sample.bin")));
        assert_eq!(cli.seed_expire, 3600);
        assert!(!cli.wait);
    }

    #[test]
    fn test_actions_are_exclusive() {
        let res = Cli::try_parse_from(["pandora", "--redis_up", "-f", "sample.bin"]);
        assert!(res.is_err());
    }

    #[test]
    fn test_worker_flags_need_worker_status() {
        assert!(Cli::try_parse_from(["pandora", "--details"]).is_err());

        let cli = Cli::try_parse_from([
            "pandora",
            "--worker_status",
            "abc",
            "--worker_name",
            "yara",
            "--details",
        ])
        .unwrap();
        assert_eq!(cli.worker_status.as_deref(), Some("abc"));
        assert_eq!(cli.worker_name.as_deref(), Some("yara"));
        assert!(cli.details);
    }

    #[test]
    fn test_stats_components_need_stats_action() {
        for flag in ["--year", "--month", "--week", "--day"] {
            let res = Cli::try_parse_from(["pandora", "--task_id", "abc", flag, "3"]);
            assert!(res.is_err(), "{} accepted without --stats", flag);
        }
        assert!(Cli::try_parse_from(["pandora", "--date", "2024-01-03"]).is_err());

        let cli = Cli::try_parse_from(["pandora", "--submit_stats", "day", "--day", "5", "--month", "6"])
            .unwrap();
        assert_eq!(cli.day, Some(5));
        assert_eq!(cli.month, Some(6));
    }

    #[test]
    fn test_stats_date() {
        let cli = Cli::try_parse_from(["pandora", "--stats", "week", "--date", "2024-01-03"]).unwrap();
        assert_eq!(cli.stats.as_deref(), Some("week"));
        assert_eq!(cli.date, NaiveDate::from_ymd_opt(2024, 1, 3));

        assert!(Cli::try_parse_from(["pandora", "--stats", "day", "--date", "03/01/2024"]).is_err());
    }
}
