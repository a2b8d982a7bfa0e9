mod cli;
mod logging;

use crate::cli::{Cli, Command, FetchArgs};
use clap::Parser;
use futures::StreamExt;
use geocrawl_cache::{Database, Repository};
use geocrawl_config::Config;
use geocrawl_engine::analyze::HttpAnalyzer;
use geocrawl_engine::{Context, Settings, catalog, worker};
use geocrawl_storage::{AdapterPool, Remote};
use http::Method;
use miette::{IntoDiagnostic, miette};
use serde::Serialize;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

/// Library errors carry their whole chain in `Debug`.
fn report(err: impl Debug) -> miette::Report {
    miette!("{err:?}")
}

fn print_json(value: &impl Serialize) -> miette::Result<()> {
    println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
    Ok(())
}

async fn context(config: &Config) -> miette::Result<Context> {
    if let Some(dir) = config.database.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir).await.into_diagnostic()?;
    }
    let db = Database::connect(&config.database).await.map_err(report)?;
    let settings = Settings::from_config(config).map_err(report)?;
    let ctx = Context::new(Repository::from(&db), AdapterPool::new(config.adapter_options()), settings);
    Ok(match &config.analysis.analyzer_url {
        Some(url) => {
            let analyzer = HttpAnalyzer::new(url, config.analysis_timeout()).map_err(report)?;
            tracing::debug!(endpoint = %analyzer.endpoint(), "Using remote metadata analyzer");
            ctx.with_analyzer(Arc::new(analyzer))
        },
        None => ctx,
    })
}

async fn run_worker(ctx: &Context) -> miette::Result<()> {
    if ctx.analyzer.is_none() {
        miette::bail!("analysis.analyzer_url must be configured to run the worker");
    }
    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted; stopping after the current scan");
            signal.cancel();
        }
    });
    worker::run(ctx, shutdown).await;
    Ok(())
}

async fn fetch(ctx: &Context, args: FetchArgs) -> miette::Result<()> {
    let path = match args.path.starts_with('/') {
        true => args.path,
        false => format!("/{}", args.path),
    };
    let method = if args.head { Method::HEAD } else { Method::GET };
    let download = geocrawl_engine::download(ctx, args.id, &path, &method, args.range.as_deref())
        .await
        .map_err(report)?;
    eprintln!("{}", download.status);
    for (name, value) in &download.headers {
        eprintln!("{name}: {}", value.to_str().unwrap_or("<binary>"));
    }
    let Some(mut body) = download.body else {
        return Ok(());
    };
    let mut out: Box<dyn AsyncWrite + Unpin> = match &args.output {
        Some(file) => Box::new(tokio::fs::File::create(file).await.into_diagnostic()?),
        None => Box::new(tokio::io::stdout()),
    };
    while let Some(chunk) = body.next().await {
        out.write_all(&chunk.into_diagnostic()?).await.into_diagnostic()?;
    }
    out.flush().await.into_diagnostic()
}

async fn run(ctx: &Context, command: Command) -> miette::Result<()> {
    match command {
        Command::Worker => run_worker(ctx).await,
        Command::Add { url } => {
            let remote = Remote::from_url(&url).map_err(report)?;
            let created = catalog::create_storage(ctx, &remote).await.map_err(report)?;
            if !created.is_new() {
                tracing::warn!("Storage is already registered; no scan queued");
            }
            print_json(&created.into_inner())
        },
        Command::Check { url } => {
            let remote = Remote::from_url(&url).map_err(report)?;
            catalog::check_connectivity(ctx, &remote).await.map_err(report)?;
            println!("{remote} is reachable");
            Ok(())
        },
        Command::List => print_json(&catalog::list_storages(ctx).await.map_err(report)?),
        Command::Status { id } => print_json(&catalog::get_storage(ctx, id).await.map_err(report)?),
        Command::Rescan { id } => print_json(&catalog::rescan(ctx, id).await.map_err(report)?),
        Command::Items { id } => print_json(&catalog::data_items(ctx, id).await.map_err(report)?),
        Command::Fetch(args) => fetch(ctx, args).await,
        Command::Remove { id } => catalog::remove_storage(ctx, id).await.map_err(report),
    }
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).map_err(report)?;
    logging::init(&config.log.filter, cli.verbose)?;
    let ctx = context(&config).await?;
    let outcome = run(&ctx, cli.command).await;
    ctx.adapters.disconnect_all().await;
    outcome
}
