use anyhow::{Context, Result, bail};
use clap::Parser;
use paced::backoff::BackoffConfig;
use paced::client::{AsyncClient, RateLimitedClient};
use paced::config::{AsyncClientConfig, ClientConfig};
use paced::http::{CallResult, RequestOptions};
use paced::limiter::RateLimiter;
use paced::transport::SharedSession;
use reqwest::Method;
use std::sync::Arc;
use std::time::Duration;

/// paced - rate limited HTTP client
///
/// Sends one request, pacing requests per host with a token bucket and
/// retrying when the server answers 429 Too Many Requests.
///
/// Examples:
///   paced get https://api.example.com/items --json
///   paced --retries 5 --backoff exponential post https://api.example.com/items \
///     --json-body '{"name":"x"}'
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    settings: Settings,
}

/// Client settings shared by every subcommand.
#[derive(clap::Args, Debug)]
struct Settings {
    /// Retries allowed after a 429 response
    #[arg(long, env = "PACED_RETRIES", default_value_t = 3, global = true)]
    retries: u32,

    /// Requests per second per host (0 disables limiting)
    #[arg(long, env = "PACED_RATE", default_value_t = 10.0, global = true)]
    rate: f64,

    /// Token bucket capacity (defaults to the rate)
    #[arg(long, env = "PACED_BURST", global = true)]
    burst: Option<f64>,

    /// Backoff strategy: fixed or exponential
    #[arg(long, env = "PACED_BACKOFF", default_value = "fixed", global = true)]
    backoff: String,

    /// Base backoff delay in seconds
    #[arg(
        long = "base-delay",
        env = "PACED_BASE_DELAY",
        value_name = "SECS",
        default_value_t = 10.0,
        global = true
    )]
    base_delay: f64,

    /// Randomize backoff delays
    #[arg(long, env = "PACED_JITTER", global = true)]
    jitter: bool,

    /// Ignore Retry-After headers on 429 responses
    #[arg(long = "ignore-retry-after", global = true)]
    ignore_retry_after: bool,

    /// Print the last 429 response instead of failing when retries run out
    #[arg(long = "no-raise-on-429", global = true)]
    no_raise_on_429: bool,

    /// Per-attempt timeout in seconds
    #[arg(
        long,
        env = "PACED_TIMEOUT",
        value_name = "SECS",
        default_value_t = 10.0,
        global = true
    )]
    timeout: f64,

    /// Use the async client
    #[arg(long, global = true)]
    cooperative: bool,

    /// More logging (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Send a GET request
    Get(RequestArgs),

    /// Send a POST request
    Post(RequestArgs),

    /// Send a PUT request
    Put(RequestArgs),

    /// Send a DELETE request
    Delete(RequestArgs),
}

#[derive(clap::Args, Debug)]
struct RequestArgs {
    /// Target URL
    url: String,

    /// Query parameter, repeatable
    #[arg(long = "query", short = 'q', value_name = "KEY=VALUE")]
    query: Vec<String>,

    /// Request header, repeatable
    #[arg(long = "header", short = 'H', value_name = "NAME: VALUE")]
    headers: Vec<String>,

    /// Raw request body
    #[arg(long, conflicts_with = "json_body")]
    data: Option<String>,

    /// JSON request body
    #[arg(long = "json-body", value_name = "JSON")]
    json_body: Option<String>,

    /// Decode the response as JSON
    #[arg(long)]
    json: bool,
}

impl Commands {
    fn split(self) -> (Method, RequestArgs) {
        match self {
            Commands::Get(args) => (Method::GET, args),
            Commands::Post(args) => (Method::POST, args),
            Commands::Put(args) => (Method::PUT, args),
            Commands::Delete(args) => (Method::DELETE, args),
        }
    }
}

fn parse_query(pair: &str) -> Result<(String, String)> {
    match pair.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => bail!("Invalid query parameter {:?}, expected KEY=VALUE", pair),
    }
}

fn parse_header(header: &str) -> Result<(String, String)> {
    match header.split_once(':') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => bail!("Invalid header {:?}, expected 'NAME: VALUE'", header),
    }
}

fn build_options(args: &RequestArgs) -> Result<RequestOptions> {
    let mut options = RequestOptions::new();
    for pair in &args.query {
        let (key, value) = parse_query(pair)?;
        options = options.query(key, value);
    }
    for header in &args.headers {
        let (name, value) = parse_header(header)?;
        options = options.try_header(&name, &value)?;
    }
    if let Some(data) = &args.data {
        options = options.body(data.clone());
    }
    if let Some(body) = &args.json_body {
        let value = serde_json::from_str(body).context("Invalid --json-body")?;
        options = options.json_body(value);
    }
    if args.json {
        options = options.json();
    }
    Ok(options)
}

fn secs(value: f64, flag: &str) -> Result<Duration> {
    Duration::try_from_secs_f64(value).with_context(|| format!("Invalid {}: {}", flag, value))
}

fn backoff_config(settings: &Settings) -> Result<BackoffConfig> {
    Ok(BackoffConfig {
        strategy: settings.backoff.as_str().into(),
        base_delay: secs(settings.base_delay, "--base-delay")?,
        jitter: settings.jitter,
        respect_retry_after: !settings.ignore_retry_after,
    })
}

fn client_config(settings: &Settings) -> Result<ClientConfig> {
    Ok(ClientConfig {
        max_retries: settings.retries,
        requests_per_second: settings.rate,
        max_burst: settings.burst,
        timeout: Some(secs(settings.timeout, "--timeout")?),
        backoff: backoff_config(settings)?,
        raise_on_429: !settings.no_raise_on_429,
    })
}

fn async_client_config(settings: &Settings) -> Result<AsyncClientConfig> {
    Ok(AsyncClientConfig {
        timeout: Some(secs(settings.timeout, "--timeout")?),
        max_retries: settings.retries,
        backoff: backoff_config(settings)?,
        raise_on_non_2xx: true,
        ..AsyncClientConfig::default()
    })
}

fn run_blocking(
    settings: &Settings,
    method: Method,
    url: &str,
    options: RequestOptions,
) -> Result<CallResult> {
    let session = Arc::new(SharedSession::reqwest());
    let client = RateLimitedClient::new(client_config(settings)?, session);
    Ok(client.request(method, url, options)?)
}

fn run_cooperative(
    settings: &Settings,
    method: Method,
    url: String,
    options: RequestOptions,
) -> Result<CallResult> {
    let config = async_client_config(settings)?;
    let limiter = Arc::new(RateLimiter::new(settings.rate, settings.burst));
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let result = runtime.block_on(async move {
        let client = AsyncClient::new(config).with_limiter(limiter);
        client
            .scoped(|c| Box::pin(async move { c.request(method, &url, options).await }))
            .await
    })?;
    Ok(result)
}

fn main() -> Result<()> {
    let Cli { command, settings } = Cli::parse();
    let default_filter = match settings.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let (method, args) = command.split();
    let options = build_options(&args)?;

    let (status, payload) = if settings.cooperative {
        run_cooperative(&settings, method, args.url, options)?
    } else {
        run_blocking(&settings, method, &args.url, options)?
    };

    println!("{}", status);
    println!("{}", payload);
    Ok(())
}
