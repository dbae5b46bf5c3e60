//! fetchcache - read and write a JSON API through the request cache
//!
//! Each subcommand builds one `ApiClient`, runs against it and prints the
//! results as JSON along with the cache statistics.

use std::error::Error;
use std::process;
use std::time::Duration;

use clap::Parser;
use serde_json::Value;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use fetchcache::cli::{parse_body, Cli, Command, Settings};
use fetchcache::{ApiClient, CredentialStore, MutationOptions, Query};

/// Installs a compact stderr logger; `RUST_LOG` overrides `level`
fn init_logging(level: LevelFilter) -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .compact()
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| format!("failed to install tracing subscriber: {}", err).into())
}

/// The stored credential unless a token was given on the command line
fn credentials(token: Option<String>) -> CredentialStore {
    match token {
        Some(token) => CredentialStore::fixed(Some(token)),
        None => CredentialStore::new().unwrap_or_else(|| CredentialStore::fixed(None)),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_stats(client: &ApiClient) -> Result<(), Box<dyn Error>> {
    eprintln!("cache: {}", serde_json::to_string(&client.cache_stats())?);
    eprintln!("requests: {}", serde_json::to_string(&client.request_stats())?);
    Ok(())
}

async fn run(cli: Cli, settings: Settings) -> Result<(), Box<dyn Error>> {
    match &cli.command {
        Command::Login { token } => {
            let store = CredentialStore::new().ok_or("no config directory available")?;
            store.set_token(token)?;
            eprintln!("Token stored");
            return Ok(());
        }
        Command::Logout => {
            let store = CredentialStore::new().ok_or("no config directory available")?;
            store.clear_token()?;
            eprintln!("Token removed");
            return Ok(());
        }
        _ => {}
    }

    let client = ApiClient::new(settings.client, credentials(cli.token))?;

    match cli.command {
        Command::Get { endpoint, repeat } => {
            let query: Query<Value> = client.query(&endpoint, settings.query);
            let value = query.activate().await?;
            for _ in 1..repeat {
                query.activate().await?;
            }
            print_json(&value)?;
        }
        Command::Batch { endpoints } => {
            let batch = client.batch_with(settings.query);
            let outcome = batch.batch_fetch(endpoints.as_slice()).await;
            for item in &outcome.results {
                println!("{}: {}", item.endpoint, item.data);
            }
            for error in &outcome.errors {
                eprintln!("error: {}", error);
            }
        }
        Command::Post {
            endpoint,
            body,
            invalidate,
        } => {
            let payload = parse_body(&body)?;
            let options = invalidate
                .into_iter()
                .fold(MutationOptions::<Value, Value>::new(), |options, key| {
                    options.invalidate(key)
                });
            let mutation = client.mutation::<Value, Value>(&endpoint, options);
            let response = mutation.mutate(payload).await?;
            print_json(&response)?;
        }
        Command::Watch {
            endpoint,
            interval_secs,
            ticks,
        } => {
            let query: Query<Value> = client.query(&endpoint, settings.query);
            if let Err(err) = query.activate().await {
                eprintln!("error: {}", err);
            }
            for _ in 0..ticks {
                tokio::time::sleep(Duration::from_secs(interval_secs)).await;
                let state = query.state();
                match (&state.data, &state.error) {
                    (_, Some(error)) => eprintln!("error: {}", error),
                    (Some(data), None) => println!("{}", data),
                    (None, None) => eprintln!("no data yet"),
                }
            }
            query.deactivate();
        }
        Command::Login { .. } | Command::Logout => {}
    }

    print_stats(&client)?;
    client.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let settings = match Settings::from_cli(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    init_logging(settings.log_level)?;

    if let Err(e) = run(cli, settings).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
    Ok(())
}
