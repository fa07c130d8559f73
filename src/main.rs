use rollup_counters::config::{ServiceConfig, StoreBackend};
use rollup_counters::counting::{CommandReply, CounterCommand, CounterCommandExecutor, CounterRegistry};
use rollup_counters::observability::init_logging;
use rollup_counters::store::{CounterStore, InMemoryCounterStore, SimulatedCounterStore};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;

fn config_path() -> Result<Option<PathBuf>, String> {
    let mut args = std::env::args().skip(1);
    match (args.next().as_deref(), args.next()) {
        (None, _) => Ok(None),
        (Some("--config" | "-c"), Some(path)) => Ok(Some(PathBuf::from(path))),
        (Some(other), _) => Err(format!("usage: rollup-counters [--config <path>] (got '{}')", other)),
    }
}

fn build_store(config: &ServiceConfig) -> Arc<dyn CounterStore> {
    match config.store.backend {
        StoreBackend::Memory => Arc::new(InMemoryCounterStore::new()),
        StoreBackend::Simulated => Arc::new(SimulatedCounterStore::new(
            InMemoryCounterStore::new(),
            config.store.simulation.clone(),
        )),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match config_path()? {
        Some(path) => ServiceConfig::load(&path)?,
        None => {
            let mut config = ServiceConfig::default();
            config.apply_env_overrides()?;
            config.validate()?;
            config
        }
    };

    init_logging(&config.logging)?;
    info!(backend = ?config.store.backend, "rollup-counters starting");

    let registry = CounterRegistry::new(
        build_store(&config),
        config.policy,
        config.granularities.clone(),
    );
    let mut executor = CounterCommandExecutor::new(registry);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        let args: Vec<&str> = line.split_whitespace().collect();
        if args.is_empty() {
            continue;
        }
        if args[0].eq_ignore_ascii_case("QUIT") {
            break;
        }

        let reply = match CounterCommand::parse(&args) {
            Ok(cmd) => executor.execute(cmd).await,
            Err(e) => CommandReply::Error(e),
        };
        stdout.write_all(reply.render().as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    info!("rollup-counters stopped");
    Ok(())
}
