use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use tokio::io::AsyncReadExt;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use email_ensemble::config::{EnsembleConfig, load_provider_file};
use email_ensemble::ensemble::{
    AnalysisRequest, Dispatcher, Ensemble, IncomingEmail, probe_and_record, request_from_rfc822,
};
use email_ensemble::llm::ProviderFamily;
use email_ensemble::store::{LibSqlBackend, ProviderStore};

const USAGE: &str = "\
Usage: email-ensemble <command>

Commands:
  analyze [FILE]   Analyze an email (RFC 822 or JSON; stdin when FILE is omitted)
  probe <ID>       Test a stored provider and record its status
  providers        List stored providers with their stats
  import <FILE>    Add providers from a JSON array file
  catalog          List supported provider families and models

Environment:
  EMAIL_ENSEMBLE_DB_PATH, EMAIL_ENSEMBLE_TIMEOUT_SECS,
  EMAIL_ENSEMBLE_LOG_DIR, EMAIL_ENSEMBLE_FALLBACK_RATE, RUST_LOG";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = EnsembleConfig::from_env().context("Invalid configuration")?;
    let _log_guard = init_tracing(config.log_dir.as_deref());

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("help");

    match command {
        "analyze" => analyze(&config, args.get(1).map(PathBuf::from)).await,
        "probe" => {
            let id = parse_id(args.get(1))?;
            probe(&config, id).await
        }
        "providers" => list_providers(&config).await,
        "import" => {
            let Some(path) = args.get(1) else {
                bail!("import needs a provider file\n\n{USAGE}");
            };
            import(&config, Path::new(path)).await
        }
        "catalog" => {
            print_catalog();
            Ok(())
        }
        "help" | "-h" | "--help" => {
            println!("{USAGE}");
            Ok(())
        }
        other => bail!("Unknown command: {other}\n\n{USAGE}"),
    }
}

/// stderr logging, plus a daily rolling file when `log_dir` is set.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "email-ensemble.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(file_layer)
        .init();
    guard
}

fn parse_id(arg: Option<&String>) -> anyhow::Result<i64> {
    let raw = arg.context("missing provider id")?;
    raw.parse()
        .with_context(|| format!("provider id must be an integer, got {raw:?}"))
}

async fn open_store(config: &EnsembleConfig) -> anyhow::Result<Arc<LibSqlBackend>> {
    let backend = LibSqlBackend::new_local(&config.db_path)
        .await
        .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?;
    Ok(Arc::new(backend))
}

fn dispatcher(config: &EnsembleConfig) -> Dispatcher {
    Dispatcher::new(config.timeout, config.cost_table())
}

async fn read_request(path: Option<PathBuf>) -> anyhow::Result<AnalysisRequest> {
    let raw = match &path {
        Some(path) => tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = Vec::new();
            tokio::io::stdin()
                .read_to_end(&mut buf)
                .await
                .context("Failed to read stdin")?;
            buf
        }
    };

    let looks_like_json = raw
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'{');
    if looks_like_json {
        let email: IncomingEmail =
            serde_json::from_slice(&raw).context("Invalid email JSON")?;
        Ok(email.into_request())
    } else {
        Ok(request_from_rfc822(&raw)?)
    }
}

async fn analyze(config: &EnsembleConfig, path: Option<PathBuf>) -> anyhow::Result<()> {
    let request = read_request(path).await?;
    let store = open_store(config).await?;
    let ensemble = Ensemble::from_store(dispatcher(config), store).await?;

    let consensus = ensemble.analyze(&request).await?;
    println!("{}", serde_json::to_string_pretty(&consensus)?);
    Ok(())
}

async fn probe(config: &EnsembleConfig, id: i64) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    let report = probe_and_record(&dispatcher(config), store.as_ref(), id).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.success {
        bail!("Provider {id} failed its probe");
    }
    Ok(())
}

async fn list_providers(config: &EnsembleConfig) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    let providers = store.list_providers().await?;
    if providers.is_empty() {
        println!("No providers stored. Add some with `email-ensemble import <FILE>`.");
        return Ok(());
    }

    println!(
        "{:>4}  {:<28} {:>6} {:<8} {:>5} {:>5} {:>5} {:>9} {:>12}",
        "ID", "PROVIDER", "WEIGHT", "STATUS", "REQ", "OK", "FAIL", "AVG MS", "COST"
    );
    for p in providers {
        let status = if p.config.enabled {
            p.status.as_str()
        } else {
            "disabled"
        };
        println!(
            "{:>4}  {:<28} {:>6.2} {:<8} {:>5} {:>5} {:>5} {:>9.1} {:>12}",
            p.config.id,
            p.config.label(),
            p.config.priority_weight,
            status,
            p.stats.requests,
            p.stats.successes,
            p.stats.failures,
            p.stats.average_latency_ms,
            p.stats.total_cost,
        );
        if let Some(error) = p.last_error {
            println!("      last error: {error}");
        }
    }
    Ok(())
}

async fn import(config: &EnsembleConfig, path: &Path) -> anyhow::Result<()> {
    let providers = load_provider_file(path)
        .with_context(|| format!("Failed to load providers from {}", path.display()))?;
    let store = open_store(config).await?;
    for provider in &providers {
        let id = store.insert_provider(provider).await?;
        println!("Added {} as provider {id}", provider.label());
    }
    Ok(())
}

fn print_catalog() {
    for family in ProviderFamily::ALL {
        println!("{} ({})", family.display_name(), family.as_str());
        println!("  endpoint: {}", family.default_endpoint());
        for model in family.known_models() {
            println!("  - {model}");
        }
    }
}
