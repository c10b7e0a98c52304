// Library root
// -----------
// Client for the Pandora file-analysis service. The binary (`main.rs`)
// is a thin layer over these modules.
//
// Module responsibilities:
// - `api`: `PandoraClient`, one method per endpoint, transport retries.
// - `config`: base URL normalization, user agent, proxies, retry policy.
// - `expiry`: lifetime of the seed requested with a submission.
// - `stats`: statistics intervals and the paths they map to.
// - `error`: the error every operation returns.
// - `cli`, `ui`, `logging`: argument parsing, terminal output and
//   tracing setup used by the binary.
pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod expiry;
pub mod logging;
pub mod stats;
pub mod ui;

pub use api::{Credentials, PandoraClient, WorkerQuery, DEFAULT_SEARCH_DAYS};
pub use config::{ClientConfig, RetryPolicy, DEFAULT_ROOT_URL};
pub use error::{PandoraError, Result};
pub use expiry::SeedExpiry;
pub use stats::{Interval, StatsQuery};
