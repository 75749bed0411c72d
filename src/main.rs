use std::{process::ExitCode, sync::Arc};

use clap::{Parser, Subcommand};
use log::{error, warn};
use serde_json::{json, Value as JsonValue};
use validator::Validate;

use riveredge_client::{
    coalesce::{CoalescingRegistry, HttpLookupSource},
    config::Config,
    core::{ClientResult, ErrorContext},
    internal_error,
    logging::Logger,
    metrics,
    request::HttpMethod,
    resilience::{with_retry, RetryPolicy},
    scheduler::TokioScheduler,
    ApiClient,
};

#[derive(Parser, Debug)]
#[command(name = "riveredge-client", version, about = "RiverEdge API client")]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, env = "RIVEREDGE_CONFIG")]
    config: Option<String>,

    /// Overrides `client.base_url`
    #[arg(long, env = "RIVEREDGE_BASE_URL")]
    base_url: Option<String>,

    /// Print the Prometheus exposition after the command
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Dispatch one call through the full pipeline
    Request {
        method: HttpMethod,
        path: String,
        /// Query entry, repeatable
        #[arg(short, long = "query", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        query: Vec<(String, String)>,
        /// JSON body
        #[arg(short, long)]
        data: Option<String>,
        /// Retry transient failures with the configured back-off
        #[arg(long)]
        retry: bool,
    },
    /// Log in and persist the session
    Login {
        #[arg(short, long)]
        username: String,
        #[arg(short, long, env = "RIVEREDGE_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        tenant_domain: Option<String>,
    },
    /// Clear the persisted session
    Logout,
    /// Resolve quantities and BOM flags for a batch of keys
    Lookup {
        #[arg(required = true)]
        keys: Vec<String>,
    },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("invalid KEY=VALUE: no `=` found in `{s}`"))
}

fn load_config(cli: &Cli) -> ClientResult<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from_yaml(path)?,
        None => Config::default(),
    };
    if let Some(base_url) = &cli.base_url {
        config.client.base_url = base_url.clone();
        config.validate()?;
    }
    Ok(config)
}

fn print_json(value: &JsonValue) -> ClientResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(cli: Cli, config: Config) -> ClientResult<()> {
    let client = Arc::new(ApiClient::builder(config.clone()).build()?);

    match cli.command {
        Command::Request {
            method,
            path,
            query,
            data,
            retry,
        } => {
            let mut descriptor = client.describe(method, path);
            for (name, value) in query {
                descriptor = descriptor.query(name, value);
            }
            if let Some(data) = data {
                descriptor = descriptor.json(serde_json::from_str(&data)?);
            }

            let value = if retry {
                let policy = RetryPolicy::from(&config.retry)
                    .on_retry(|attempt, e| warn!("Retry {attempt} after: {e}"));
                let client = client.as_ref();
                let descriptor = &descriptor;
                with_retry(move || client.send(descriptor), &policy, &TokioScheduler).await?
            } else {
                client.send(&descriptor).await?
            };
            print_json(&value)?;
        }
        Command::Login {
            username,
            password,
            tenant_domain,
        } => {
            client
                .login(&username, &password, tenant_domain.as_deref())
                .await?;
            let tenant = client.session().tenant_id().unwrap_or_else(|| "-".to_string());
            println!("Logged in as {username} (tenant {tenant})");
        }
        Command::Logout => {
            if client.logout() {
                println!("Logged out");
            } else {
                println!("No active session");
            }
        }
        Command::Lookup { keys } => {
            let source = Arc::new(HttpLookupSource::new(client.clone(), config.lookups.clone()));
            let registry: CoalescingRegistry<String> = CoalescingRegistry::from_config(
                source,
                Arc::new(TokioScheduler),
                &config.coalescing,
            );
            let mut updates = registry.subscribe();
            registry.register_keys(keys.iter().cloned());

            tokio::time::timeout(
                config.client.timeout + config.coalescing.window,
                updates.changed(),
            )
            .await
            .map_err(|_| internal_error!("timed out waiting for lookups"))?
            .with_context("lookup registry closed")?;

            let rows: Vec<JsonValue> = keys
                .iter()
                .map(|key| {
                    json!({
                        "key": key,
                        "quantity": registry.quantity(key).ready(),
                        "configured": registry.configured(key).ready(),
                    })
                })
                .collect();
            print_json(&JsonValue::Array(rows))?;
        }
    }

    if cli.metrics {
        print!("{}", metrics::render()?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let logger = Logger::new(config.log.clone());
    if let Err(e) = logger.init_env_logger() {
        eprintln!("{e}");
    }
    let _writer = logger.spawn_writer();

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
