use clap::{Args, Parser, Subcommand};
use feeledger::application::orchestrator::PaymentOrchestrator;
use feeledger::config::FeeLedgerConfig;
use feeledger::domain::fee_schedule::{Program, Semester};
use feeledger::domain::money::Amount;
use feeledger::domain::payment::{Caller, OrderId, PaymentId, SettleResult, StudentId, TenantId};
use feeledger::domain::ports::{OrderBookBox, PaymentLedgerBox};
use feeledger::infrastructure::in_memory::{InMemoryLedger, InMemoryOrderBook};
use feeledger::interfaces::csv::report_writer::ReportWriter;
use miette::{IntoDiagnostic, Result, miette};
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

const NOTIFICATION_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// YAML configuration file. `FEELEDGER_*` environment variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct CallerArgs {
    #[arg(long)]
    student: String,
    #[arg(long)]
    tenant: String,
    /// Receives the payment confirmation.
    #[arg(long)]
    email: Option<String>,
}

impl CallerArgs {
    fn caller(self) -> Result<Caller> {
        let mut caller = Caller::new(
            StudentId::new(self.student).into_diagnostic()?,
            TenantId::new(self.tenant).into_diagnostic()?,
        );
        if let Some(email) = self.email {
            caller = caller.with_email(email);
        }
        Ok(caller)
    }
}

#[derive(Subcommand)]
enum Command {
    /// Print a programme's fee table as CSV
    Fees {
        #[arg(long)]
        program: Program,
        #[arg(long)]
        tenant: Option<String>,
    },
    /// Open a gateway order for one semester
    Initiate {
        #[command(flatten)]
        caller: CallerArgs,
        #[arg(long)]
        program: Program,
        #[arg(long)]
        semester: Semester,
    },
    /// Settle a gateway callback
    Settle {
        #[command(flatten)]
        caller: CallerArgs,
        #[arg(long)]
        semester: Semester,
        #[arg(long)]
        amount: Amount,
        #[arg(long)]
        order_id: String,
        #[arg(long)]
        payment_id: String,
        #[arg(long)]
        signature: String,
    },
    /// Print a student's payments as CSV, newest first
    History {
        #[command(flatten)]
        caller: CallerArgs,
    },
    /// Find a payment by gateway order id
    Lookup {
        #[arg(long)]
        order_id: String,
    },
    /// Sign a callback the way the gateway does
    Sign {
        #[arg(long)]
        order_id: String,
        #[arg(long)]
        payment_id: String,
    },
}

fn init_tracing() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn in_memory_stores() -> (PaymentLedgerBox, OrderBookBox) {
    (
        Box::new(InMemoryLedger::new()),
        Box::new(InMemoryOrderBook::new()),
    )
}

#[cfg(feature = "storage-rocksdb")]
fn persistent_stores(db_path: PathBuf) -> Result<(PaymentLedgerBox, OrderBookBox)> {
    use feeledger::infrastructure::rocksdb::RocksDBStore;

    let store = RocksDBStore::open(db_path).into_diagnostic()?;
    Ok((Box::new(store.clone()), Box::new(store)))
}

#[cfg(not(feature = "storage-rocksdb"))]
fn persistent_stores(_db_path: PathBuf) -> Result<(PaymentLedgerBox, OrderBookBox)> {
    tracing::warn!(
        "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to in-memory storage."
    );
    Ok(in_memory_stores())
}

fn orchestrator(
    config: &FeeLedgerConfig,
    db_path: Option<PathBuf>,
) -> Result<PaymentOrchestrator> {
    let (ledger, orders) = match db_path {
        Some(db_path) => persistent_stores(db_path)?,
        None => in_memory_stores(),
    };
    config.orchestrator(ledger, orders).into_diagnostic()
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = FeeLedgerConfig::load(cli.config.as_deref()).into_diagnostic()?;

    match cli.command {
        Command::Fees { program, tenant } => {
            let schedules = config.fee_schedules().into_diagnostic()?;
            let schedule = match tenant {
                Some(tenant) => schedules.for_tenant(&TenantId::new(tenant).into_diagnostic()?),
                None => schedules.default_schedule(),
            };
            let rows = schedule.table(program).into_diagnostic()?;
            let stdout = io::stdout();
            let mut writer = ReportWriter::new(stdout.lock());
            writer
                .write_fee_table(program, schedule.currency(), &rows)
                .into_diagnostic()?;
        }
        Command::Sign {
            order_id,
            payment_id,
        } => {
            let verifier = config.verifier().into_diagnostic()?;
            let signature = verifier.sign(
                &OrderId::new(order_id).into_diagnostic()?,
                &PaymentId::new(payment_id).into_diagnostic()?,
            );
            println!("{}", signature);
        }
        Command::Initiate {
            caller,
            program,
            semester,
        } => {
            let orchestrator = orchestrator(&config, cli.db_path)?;
            let order = orchestrator
                .initiate(&caller.caller()?, program, semester)
                .await
                .into_diagnostic()?;
            print_json(&order)?;
        }
        Command::Settle {
            caller,
            semester,
            amount,
            order_id,
            payment_id,
            signature,
        } => {
            let orchestrator = orchestrator(&config, cli.db_path)?;
            let result = orchestrator
                .settle(
                    &caller.caller()?,
                    semester,
                    amount,
                    &order_id,
                    &payment_id,
                    &signature,
                )
                .await
                .into_diagnostic()?;
            let outcome = match &result {
                SettleResult::Success(_) => "success",
                SettleResult::Duplicate(_) => "duplicate",
                SettleResult::Rejected { .. } => "rejected",
            };
            print_json(&serde_json::json!({
                "outcome": outcome,
                "message": result.confirmation(),
                "payment": result.record(),
            }))?;
            orchestrator
                .flush_notifications(NOTIFICATION_FLUSH_TIMEOUT)
                .await;
        }
        Command::History { caller } => {
            let orchestrator = orchestrator(&config, cli.db_path)?;
            let records = orchestrator
                .history(&caller.caller()?)
                .await
                .into_diagnostic()?;
            let stdout = io::stdout();
            let mut writer = ReportWriter::new(stdout.lock());
            writer.write_payments(&records).into_diagnostic()?;
        }
        Command::Lookup { order_id } => {
            let orchestrator = orchestrator(&config, cli.db_path)?;
            let order_id = OrderId::new(order_id).into_diagnostic()?;
            match orchestrator.lookup(&order_id).await.into_diagnostic()? {
                Some(record) => print_json(&record)?,
                None => return Err(miette!("No payment recorded for order {}", order_id)),
            }
        }
    }

    Ok(())
}
