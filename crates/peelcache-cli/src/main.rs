//! peelcache - drive the Peel offline cache worker from the command line.
//!
//! Installs the configured cache generation from the live origin into an
//! on-disk store, then answers requests through the worker exactly as a
//! controlled page would see them.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::{Method, Url};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use peelcache_core::{
    CacheStorage, DemoData, DiskCacheStorage, FetchOutcome, Fetcher, HttpFetcher,
    OfflineCacheWorker, Registration, Request, RequestMode, Response, UpdateOutcome, WorkerConfig,
};

const USAGE: &str = "\
Usage: peelcache <command>

Commands:
  install                                   Precache the app shell and activate it
  fetch <path|url> [--navigate] [--method M] Request a resource through the worker
  stores                                    List cache stores and their entries
  payload                                   Print the synthetic demo payload
  init-config                               Write the default config file

Environment:
  PEELCACHE_SCOPE, PEELCACHE_CACHE_NAME, PEELCACHE_CACHE_DIR, RUST_LOG";

/// Initialize the tracing subscriber for logging
fn init_tracing() -> WorkerGuard {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let (writer, guard) = tracing_appender::non_blocking(io::stderr());

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer))
        .with(filter)
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };

    let config = WorkerConfig::load().context("Failed to load config")?;

    match command.as_str() {
        "install" => install(config).await,
        "fetch" => fetch(config, &args[1..]).await,
        "stores" => list_stores(&config).await,
        "payload" => print_payload(),
        "init-config" => {
            config.save()?;
            eprintln!("Wrote default config");
            Ok(())
        }
        "-h" | "--help" | "help" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}\n\n{}", other, USAGE);
            std::process::exit(2);
        }
    }
}

fn open_storage(config: &WorkerConfig) -> Result<Arc<DiskCacheStorage>> {
    let dir = config.cache_dir()?;
    let storage = DiskCacheStorage::new(dir.clone())
        .with_context(|| format!("Failed to open cache directory: {}", dir.display()))?;
    Ok(Arc::new(storage))
}

fn build_worker(
    config: &WorkerConfig,
    storage: Arc<DiskCacheStorage>,
) -> Result<(Arc<OfflineCacheWorker>, Arc<HttpFetcher>)> {
    let network = Arc::new(HttpFetcher::from_config(config)?);
    let worker = OfflineCacheWorker::new(config.clone(), storage, network.clone())?;
    Ok((Arc::new(worker), network))
}

async fn install(config: WorkerConfig) -> Result<()> {
    let storage = open_storage(&config)?;
    let (worker, _) = build_worker(&config, storage)?;

    info!(version = %config.cache_name, scope = %config.scope, "Installing");
    let mut registration = Registration::new();
    match registration.update(worker).await? {
        UpdateOutcome::Activated(outcome) => {
            println!("Activated {}", config.cache_name);
            for name in outcome.deleted {
                println!("  deleted {}", name);
            }
            for name in outcome.failed {
                println!("  could not delete {}", name);
            }
        }
        UpdateOutcome::Waiting => println!("Installed {} (waiting)", config.cache_name),
    }
    Ok(())
}

struct FetchArgs {
    target: String,
    navigate: bool,
    method: Method,
}

fn parse_fetch_args(args: &[String]) -> Result<FetchArgs> {
    let mut target = None;
    let mut navigate = false;
    let mut method = Method::GET;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--navigate" => navigate = true,
            "--method" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--method needs a value"))?;
                method = Method::from_bytes(value.to_ascii_uppercase().as_bytes())
                    .with_context(|| format!("Invalid method: {}", value))?;
            }
            _ if target.is_none() => target = Some(arg.clone()),
            _ => anyhow::bail!("Unexpected argument: {}", arg),
        }
    }

    Ok(FetchArgs {
        target: target.ok_or_else(|| anyhow::anyhow!("fetch needs a path or URL"))?,
        navigate,
        method,
    })
}

async fn fetch(config: WorkerConfig, args: &[String]) -> Result<()> {
    let args = parse_fetch_args(args)?;
    let url = if args.target.starts_with("http://") || args.target.starts_with("https://") {
        Url::parse(&args.target).with_context(|| format!("Invalid URL: {}", args.target))?
    } else {
        config.resolve(args.target.trim_start_matches('/'))?
    };

    let mut request = Request::new(args.method, url);
    if args.navigate {
        request = request.with_mode(RequestMode::Navigate);
    }

    let storage = open_storage(&config)?;
    let installed = storage.has(&config.cache_name).await?;
    let (worker, network) = build_worker(&config, storage)?;

    let outcome = if installed {
        worker.handle_fetch(&request).await
    } else {
        warn!(version = %config.cache_name, "Cache generation not installed, run `peelcache install`");
        FetchOutcome::Passthrough
    };

    let response = complete(outcome, network.as_ref(), &request).await;

    // Flush write-behind before reporting, even when the request failed
    for e in worker.settle().await {
        eprintln!("Cache write failed: {}", e);
    }

    print_response(&response?)
}

/// Turn a worker outcome into the response the page would see.
async fn complete(
    outcome: FetchOutcome,
    network: &dyn Fetcher,
    request: &Request,
) -> Result<Response> {
    match outcome {
        FetchOutcome::Respond(response) => Ok(response),
        FetchOutcome::Passthrough => Ok(network.fetch(request).await?),
        FetchOutcome::NetworkError(e) => {
            Err(anyhow::Error::new(e).context(format!("Network error for {}", request.url)))
        }
    }
}

fn print_response(response: &Response) -> Result<()> {
    eprintln!(
        "{} {} ({:?}{})",
        response.status,
        response.url,
        response.response_type,
        if response.redirected { ", redirected" } else { "" }
    );
    for (name, value) in &response.headers {
        eprintln!("{}: {}", name, value);
    }
    let mut stdout = io::stdout().lock();
    stdout.write_all(&response.body)?;
    stdout.flush()?;
    Ok(())
}

async fn list_stores(config: &WorkerConfig) -> Result<()> {
    let storage = open_storage(config)?;
    let names = storage.keys().await?;
    if names.is_empty() {
        println!("No cache stores in {}", storage.root().display());
        return Ok(());
    }
    for name in names {
        let marker = if name == config.cache_name { " (current)" } else { "" };
        println!("{}{}", name, marker);
        for (key, age) in storage.entry_ages(&name)? {
            println!("  {:<60} {}", key, age);
        }
    }
    Ok(())
}

fn print_payload() -> Result<()> {
    let json = serde_json::to_string_pretty(DemoData::get())?;
    println!("{}", json);
    Ok(())
}
