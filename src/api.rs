// API client module: a small blocking HTTP client bound to one Pandora
// instance. Every method is a single round trip (plus transport retries)
// and hands back the decoded JSON, so the CLI can print it as-is.

use std::path::Path;
use std::thread;

use reqwest::blocking::{multipart, Client, RequestBuilder, Response};
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::config::ClientConfig;
use crate::error::{PandoraError, Result};
use crate::expiry::SeedExpiry;
use crate::stats::{push_while_present, Interval, StatsQuery};

/// Days of history `search` covers when the caller has no preference.
pub const DEFAULT_SEARCH_DAYS: u32 = 3;

/// Client for one Pandora instance. Holds the HTTP session, the
/// configuration it was built from and, once `init_apikey` succeeded,
/// the API key sent with every request.
#[derive(Clone)]
pub struct PandoraClient {
    client: Client,
    config: ClientConfig,
    apikey: Option<HeaderValue>,
}

/// What `init_apikey` may authenticate with. An explicit API key wins
/// over a username/password pair.
#[derive(Clone, Default)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
    pub apikey: Option<String>,
}

impl Credentials {
    pub fn apikey(apikey: impl Into<String>) -> Self {
        Self {
            apikey: Some(apikey.into()),
            ..Self::default()
        }
    }

    pub fn login(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
            apikey: None,
        }
    }
}

/// Parameters of `worker_status`. All of them are forwarded and the
/// server picks the ones relevant to the view asked for.
#[derive(Debug, Clone, Default)]
pub struct WorkerQuery {
    pub task_id: String,
    pub seed: Option<String>,
    /// Status and details of every worker at once.
    pub all_workers: bool,
    pub worker_name: Option<String>,
    pub details: bool,
}

impl PandoraClient {
    /// Client for the instance at `root_url` with default settings.
    pub fn new(root_url: &str) -> Result<Self> {
        Self::with_config(ClientConfig::new(root_url)?)
    }

    /// Build the HTTP session from `config`. No request is sent.
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        let client = config.build_http()?;
        Ok(PandoraClient {
            client,
            config,
            apikey: None,
        })
    }

    pub fn root_url(&self) -> &Url {
        &self.config.root_url
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Whether an API key is attached to the session.
    pub fn has_apikey(&self) -> bool {
        self.apikey.is_some()
    }

    pub fn apikey(&self) -> Option<&str> {
        self.apikey.as_ref().and_then(|v| v.to_str().ok())
    }

    /// Test if the instance answers. Any failure counts as down.
    pub fn is_up(&self) -> bool {
        let url = self.config.root_url.clone();
        debug!(%url, "HEAD");
        match self.send(|client| client.head(url.clone())) {
            Ok(res) => res.status() == StatusCode::OK,
            Err(e) => {
                debug!(error = %e, "instance unreachable");
                false
            }
        }
    }

    /// Check that the instance's redis backend is up and running.
    pub fn redis_up(&self) -> Result<Value> {
        self.get_json(self.endpoint(["redis_up"])?, &[])
    }

    /// Read `file_on_disk` and submit it under its file name.
    pub fn submit_from_disk(
        &self,
        file_on_disk: impl AsRef<Path>,
        seed_expire: SeedExpiry,
        password: Option<&str>,
    ) -> Result<Value> {
        let path = file_on_disk.as_ref();
        if !path.exists() {
            return Err(PandoraError::FileNotFound(path.to_path_buf()));
        }
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| PandoraError::FileNotFound(path.to_path_buf()))?;
        let content = std::fs::read(path)?;
        self.submit(&content, &filename, seed_expire, password)
    }

    /// Upload a file for analysis.
    ///
    /// With a seed expiry, the response carries a seed that grants access
    /// to the result without authentication. On success the response's
    /// `link` is made absolute; an error payload has no `link` and is
    /// returned untouched for the caller to inspect.
    pub fn submit(
        &self,
        file: &[u8],
        filename: &str,
        seed_expire: SeedExpiry,
        password: Option<&str>,
    ) -> Result<Value> {
        let validity = seed_expire.to_validity()?;
        let url = self.endpoint(["submit"])?;

        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(validity) = validity {
            query.push(("validity", validity.to_string()));
        }
        if let Some(password) = password.filter(|p| !p.is_empty()) {
            query.push(("password", password.to_string()));
        }

        debug!(%url, filename, size = file.len(), "POST");
        let res = self.send(|client| {
            let part = multipart::Part::bytes(file.to_vec()).file_name(filename.to_string());
            let form = multipart::Form::new().part("file", part);
            client.post(url.clone()).query(&query).multipart(form)
        })?;

        let mut body: Value = decode(res)?;
        absolutize_link(&self.config.root_url, &mut body)?;
        Ok(body)
    }

    /// Status of a task. The seed may be omitted on an authenticated
    /// session; otherwise it must still be valid.
    pub fn task_status(&self, task_id: &str, seed: Option<&str>) -> Result<Value> {
        let mut query = vec![("task_id", task_id.to_string())];
        if let Some(seed) = seed {
            query.push(("seed", seed.to_string()));
        }
        self.get_json(self.endpoint(["task_status"])?, &query)
    }

    /// Status of the workers that processed a task.
    pub fn worker_status(&self, worker: &WorkerQuery) -> Result<Value> {
        let mut query = vec![("task_id", worker.task_id.clone())];
        if let Some(seed) = &worker.seed {
            query.push(("seed", seed.clone()));
        }
        query.push(("all_workers", flag(worker.all_workers)));
        if let Some(name) = &worker.worker_name {
            query.push(("worker_name", name.clone()));
        }
        query.push(("details", flag(worker.details)));
        self.get_json(self.endpoint(["worker_status"])?, &query)
    }

    /// Exchange credentials for an API key. Returns the raw response.
    pub fn get_apikey(&self, username: &str, password: &str) -> Result<Value> {
        let query = [
            ("username", username.to_string()),
            ("password", password.to_string()),
        ];
        self.get_json(self.endpoint(["api", "get_token"])?, &query)
    }

    /// Authenticate the session. Every request made after a successful
    /// call carries the key in its `Authorization` header.
    pub fn init_apikey(&mut self, credentials: &Credentials) -> Result<()> {
        let non_empty = |v: &Option<String>| v.clone().filter(|s| !s.is_empty());

        let apikey = match (
            non_empty(&credentials.apikey),
            non_empty(&credentials.username),
            non_empty(&credentials.password),
        ) {
            (Some(apikey), _, _) => apikey,
            (None, Some(username), Some(password)) => {
                let token = self.get_apikey(&username, &password).map_err(|e| match e {
                    PandoraError::Http { status, body } => PandoraError::Auth(format!(
                        "token exchange refused (HTTP {}): {}",
                        status, body
                    )),
                    other => other,
                })?;
                token
                    .get("authkey")
                    .and_then(Value::as_str)
                    .filter(|key| !key.is_empty())
                    .map(str::to_owned)
                    .ok_or_else(|| PandoraError::Auth("unable to initialize API key".into()))?
            }
            _ => return Err(PandoraError::Auth("username and password required".into())),
        };

        let mut header = HeaderValue::from_str(&apikey)
            .map_err(|e| PandoraError::InvalidHeader(e.to_string()))?;
        header.set_sensitive(true);
        self.apikey = Some(header);
        Ok(())
    }

    /// [Admin only] Overview of what was submitted on the platform.
    pub fn get_stats(&self, stats: &StatsQuery) -> Result<Value> {
        let mut segments = vec!["api".to_string(), "stats".to_string()];
        segments.extend(stats.segments());
        self.get_json(self.endpoint(segments)?, &[])
    }

    /// [Admin only] Number of submissions over an interval.
    pub fn get_submit_stats(&self, stats: &StatsQuery) -> Result<Value> {
        let mut segments = vec!["api".to_string(), "stats".to_string(), "submit".to_string()];
        segments.extend(stats.segments());
        self.get_json(self.endpoint(segments)?, &[])
    }

    /// [Admin only] Search a hash or a file name among the tasks of the
    /// last `limit_days` days. `0` lets the server pick the window.
    ///
    /// URL path handling folds `.` and `..` segments, so those (and the
    /// empty query) are refused instead of silently searching for
    /// something else.
    pub fn search(&self, query: &str, limit_days: u32) -> Result<Value> {
        if !is_single_segment(query) {
            return Err(PandoraError::InvalidQuery(query.to_string()));
        }
        let mut segments = vec!["api".to_string(), "search".to_string(), query.to_string()];
        if limit_days > 0 {
            segments.push(limit_days.to_string());
        }
        self.get_json(self.endpoint(segments)?, &[])
    }

    /// [Admin only] Worker stats for a day, today by default.
    pub fn workers_stats_day(
        &self,
        year: Option<i32>,
        month: Option<u32>,
        day: Option<u32>,
    ) -> Result<Value> {
        self.workers_stats(
            Interval::Day,
            [
                day.map(|d| d.to_string()),
                month.map(|m| m.to_string()),
                year.map(|y| y.to_string()),
            ],
        )
    }

    /// [Admin only] Worker stats for a week, this week by default.
    pub fn workers_stats_week(&self, year: Option<i32>, week: Option<u32>) -> Result<Value> {
        self.workers_stats(
            Interval::Week,
            [week.map(|w| w.to_string()), year.map(|y| y.to_string())],
        )
    }

    /// [Admin only] Worker stats for a month, this month by default.
    pub fn workers_stats_month(&self, year: Option<i32>, month: Option<u32>) -> Result<Value> {
        self.workers_stats(
            Interval::Month,
            [month.map(|m| m.to_string()), year.map(|y| y.to_string())],
        )
    }

    /// [Admin only] Worker stats for a year, this year by default.
    pub fn workers_stats_year(&self, year: Option<i32>) -> Result<Value> {
        self.workers_stats(Interval::Year, [year.map(|y| y.to_string())])
    }

    /// Names of the workers enabled on the instance.
    pub fn get_enabled_workers(&self) -> Result<Vec<String>> {
        self.get_json(self.endpoint(["api", "enabled_workers"])?, &[])
    }

    fn workers_stats<I>(&self, interval: Interval, components: I) -> Result<Value>
    where
        I: IntoIterator<Item = Option<String>>,
    {
        let mut segments = vec![
            "api".to_string(),
            "workers_stats".to_string(),
            interval.to_string(),
        ];
        push_while_present(&mut segments, components);
        self.get_json(self.endpoint(segments)?, &[])
    }

    /// Resolve path segments against the root URL. Each segment is
    /// percent-encoded on its own.
    fn endpoint<I>(&self, segments: I) -> Result<Url>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut url = self.config.root_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| PandoraError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment.as_ref());
            }
        }
        Ok(url)
    }

    fn get_json<T: DeserializeOwned>(&self, url: Url, query: &[(&str, String)]) -> Result<T> {
        debug!(%url, "GET");
        let res = self.send(|client| client.get(url.clone()).query(query))?;
        decode(res)
    }

    /// Send the request built by `build`, retrying on transport failures
    /// and on the statuses of the retry policy. `build` runs once per
    /// attempt.
    fn send(&self, build: impl Fn(&Client) -> RequestBuilder) -> Result<Response> {
        let policy = &self.config.retries;
        let mut retry = 0u32;

        loop {
            let mut req = build(&self.client);
            if let Some(apikey) = &self.apikey {
                req = req.header(AUTHORIZATION, apikey.clone());
            }

            match req.send() {
                Ok(res) => {
                    let status = res.status().as_u16();
                    if !policy.is_retryable(status) {
                        return Ok(res);
                    }
                    if retry >= policy.total {
                        return Err(PandoraError::RetriesExhausted {
                            attempts: retry + 1,
                            status,
                        });
                    }
                    retry += 1;
                    warn!(status, retry, total = policy.total, "server error, retrying");
                }
                Err(e) if (e.is_connect() || e.is_timeout()) && retry < policy.total => {
                    retry += 1;
                    warn!(error = %e, retry, total = policy.total, "request failed, retrying");
                }
                Err(e) => return Err(e.into()),
            }

            thread::sleep(policy.backoff(retry));
        }
    }
}

fn is_single_segment(segment: &str) -> bool {
    !matches!(segment, "" | "." | "..")
}

fn flag(set: bool) -> String {
    let value = if set { "1" } else { "0" };
    value.to_string()
}

fn decode<T: DeserializeOwned>(res: Response) -> Result<T> {
    let status = res.status();
    let body = res.text()?;
    if !status.is_success() {
        let body = serde_json::from_str(&body).unwrap_or(Value::String(body));
        return Err(PandoraError::Http {
            status: status.as_u16(),
            body,
        });
    }
    Ok(serde_json::from_str(&body)?)
}

/// Rewrite a relative `link` in a submission response into an absolute
/// URL under `root`. Bodies without a `link` are error payloads and are
/// left alone.
pub(crate) fn absolutize_link(root: &Url, body: &mut Value) -> Result<()> {
    if let Some(link) = body.get_mut("link") {
        if let Some(path) = link.as_str() {
            let absolute = root.join(path)?;
            *link = Value::String(absolute.into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn root() -> Url {
        Url::parse("https://pandora.example/").unwrap()
    }

    #[test]
    fn test_relative_link_made_absolute() {
        let mut body = json!({"success": true, "link": "/task/123"});
        absolutize_link(&root(), &mut body).unwrap();
        assert_eq!(body["link"], "https://pandora.example/task/123");
        assert_eq!(body["success"], true);
    }

    #[test]
    fn test_error_payload_untouched() {
        let mut body = json!({"success": false, "error": "file too big"});
        let before = body.clone();
        absolutize_link(&root(), &mut body).unwrap();
        assert_eq!(body, before);
    }

    #[test]
    fn test_absolute_link_kept() {
        let mut body = json!({"link": "https://other.example/task/1"});
        absolutize_link(&root(), &mut body).unwrap();
        assert_eq!(body["link"], "https://other.example/task/1");
    }

    #[test]
    fn test_endpoint_under_path_prefix() {
        let client = PandoraClient::new("https://example.org/pandora").unwrap();
        let url = client.endpoint(["api", "stats", "day"]).unwrap();
        assert_eq!(url.as_str(), "https://example.org/pandora/api/stats/day");
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let client = PandoraClient::new("example.org").unwrap();
        let url = client.endpoint(["api", "search", "evil/file name.exe"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://example.org/api/search/evil%2Ffile%20name.exe"
        );

        let url = client.endpoint(["api", "search", "%2E%2E"]).unwrap();
        assert_eq!(url.as_str(), "http://example.org/api/search/%252E%252E");
    }

    #[test]
    fn test_dot_queries_are_not_single_segments() {
        for query in ["", ".", ".."] {
            assert!(!is_single_segment(query), "{:?}", query);
        }
        for query in ["deadbeef", "...", "a.exe", "../etc", "%2E%2E"] {
            assert!(is_single_segment(query), "{:?}", query);
        }
    }

    #[test]
    fn test_search_rejects_dot_query_before_io() {
        let client = PandoraClient::new("127.0.0.1:1").unwrap();
        let err = client.search("..", DEFAULT_SEARCH_DAYS).unwrap_err();
        assert!(matches!(err, PandoraError::InvalidQuery(ref q) if q == ".."));
        assert!(matches!(
            client.search("", 0).unwrap_err(),
            PandoraError::InvalidQuery(_)
        ));
    }

    #[test]
    fn test_init_apikey_without_credentials() {
        let mut client = PandoraClient::new("example.org").unwrap();
        let err = client.init_apikey(&Credentials::default()).unwrap_err();
        assert!(matches!(err, PandoraError::Auth(_)));
        assert!(!client.has_apikey());

        let only_user = Credentials {
            username: Some("admin".into()),
            ..Credentials::default()
        };
        assert!(matches!(
            client.init_apikey(&only_user).unwrap_err(),
            PandoraError::Auth(_)
        ));
    }

    #[test]
    fn test_init_apikey_explicit_key() {
        let mut client = PandoraClient::new("example.org").unwrap();
        client.init_apikey(&Credentials::apikey("s3cr3t")).unwrap();
        assert!(client.has_apikey());
        assert_eq!(client.apikey(), Some("s3cr3t"));
    }

    #[test]
    fn test_init_apikey_rejects_unprintable_key() {
        let mut client = PandoraClient::new("example.org").unwrap();
        let err = client.init_apikey(&Credentials::apikey("bad\nkey")).unwrap_err();
        assert!(matches!(err, PandoraError::InvalidHeader(_)));
    }
}
