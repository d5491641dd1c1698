use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use relay_core::app::WorkerBuilder;
use relay_core::config::RelayConfig;
use relay_core::domain::{NewJob, OwnerId, TerminalState};
use relay_core::impls::{DeliveryPlan, InMemoryStore, SimulatedSender, TracingObserver};

#[derive(Parser, Debug)]
#[command(name = "relay")]
#[command(version)]
#[command(about = "Claim SMS jobs from a shared pool, send them and settle confirmations")]
struct Args {
    /// Owner id the run claims for
    #[arg(long, env = "RELAY_OWNER")]
    owner: String,

    /// TOML config file (defaults are used when omitted)
    #[arg(long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Override claim_batch_size
    #[arg(long)]
    batch_size: Option<usize>,

    /// Override send_interval_ms
    #[arg(long)]
    send_interval_ms: Option<u64>,

    /// Number of demo jobs to seed into the in-memory pool
    #[arg(long, default_value = "3")]
    seed: usize,

    /// Fail every n-th delivery (0 = deliver all)
    #[arg(long, default_value = "0")]
    fail_every: usize,

    /// Fail every delivery
    #[arg(long, conflicts_with = "fail_every")]
    fail_all: bool,

    /// Delay before a simulated delivery confirmation arrives
    #[arg(long, default_value = "200")]
    confirm_after_ms: u64,

    /// Documents per store transaction (forces split claims when small)
    #[arg(long)]
    tx_limit: Option<usize>,

    /// Only show the next job in the pool, do not run
    #[arg(long)]
    peek: bool,
}

impl Args {
    fn relay_config(&self) -> anyhow::Result<RelayConfig> {
        let mut config = match &self.config {
            Some(path) => RelayConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => RelayConfig::default(),
        };
        if let Some(batch_size) = self.batch_size {
            config.claim_batch_size = batch_size;
        }
        if let Some(interval) = self.send_interval_ms {
            config.send_interval_ms = interval;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay_core=info,relay_cli=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = args.relay_config()?;
    let owner = OwnerId::new(args.owner.clone());

    let store = match args.tx_limit {
        Some(limit) => InMemoryStore::new().with_transaction_doc_limit(limit),
        None => InMemoryStore::new(),
    };
    let store = Arc::new(store);
    store
        .seed((0..args.seed).map(|i| {
            NewJob::new(
                format!("+9190000{i:05}"),
                format!("Relay demo message {}", i + 1),
            )
        }))
        .await
        .context("seeding demo jobs")?;

    let plan = match (args.fail_all, args.fail_every) {
        (true, _) => DeliveryPlan::FailAll,
        (false, 0) => DeliveryPlan::DeliverAll,
        (false, n) => DeliveryPlan::FailEvery(n),
    };
    let confirm_after = Duration::from_millis(args.confirm_after_ms);
    let (confirm_tx, confirm_rx) = mpsc::channel(64);
    let sender = Arc::new(
        SimulatedSender::new(confirm_tx)
            .with_plan(plan)
            .with_confirm_after(confirm_after),
    );

    let worker = WorkerBuilder::new()
        .in_memory(Arc::clone(&store))
        .sender(sender)
        .config(config)
        .build()?;

    if args.peek {
        match worker.peek_next().await? {
            Some(job) => println!("{}", serde_json::to_string_pretty(&job)?),
            None => println!("pool is empty"),
        }
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    let listener = worker.listen_confirmations(confirm_rx, shutdown.clone());
    let handle = worker.start(owner.clone()).await?;
    let observer = handle.observe(Arc::new(TracingObserver));
    let canceller = {
        let worker = worker.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("ctrl-c received, cancelling run");
                worker.cancel().await;
            }
        })
    };

    let terminal = handle.wait().await;
    canceller.abort();
    let _ = observer.await;

    // 最後の送信分の確認を待つ
    tokio::time::sleep(confirm_after + Duration::from_millis(800)).await;
    shutdown.cancel();
    let _ = listener.await;

    let balance = worker.balance(&owner).await?;
    let report = serde_json::json!({
        "owner": owner,
        "terminal": terminal,
        "balance": balance.to_string(),
        "balance_paise": balance.as_paise(),
        "outcomes": worker.outcomes(&owner).await?,
        "stuck": worker.claimed(&owner).await?,
        "pool_remaining": store.pool_len().await,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    if let TerminalState::Failed { reason } = terminal {
        anyhow::bail!("run failed: {reason}");
    }
    Ok(())
}
