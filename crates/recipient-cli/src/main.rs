use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use recipient_adapters::{FileExporter, InMemoryDataService, DEMO_RECIPIENT_ID};
use recipient_core::{
    AnticipationConfig, BankAccountSave, DashboardConfig, DataService, DateRange, ExportFormat,
    FilterChange, RecipientDashboard, RecipientDirectory, SortDirection, SortOrder,
    TransferConfig,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ExportKind {
    Csv,
    Xlsx,
}

impl From<ExportKind> for ExportFormat {
    fn from(kind: ExportKind) -> Self {
        match kind {
            ExportKind::Csv => ExportFormat::Csv,
            ExportKind::Xlsx => ExportFormat::Xlsx,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "recipientctl", version, about = "Recipient dashboard driver")]
struct Cli {
    /// JSON dashboard configuration; defaults apply to missing keys.
    #[arg(long, env = "RECIPIENT_CONFIG")]
    config: Option<PathBuf>,
    /// JSON fixture for the in-memory data service. Uses the demo fixture when absent.
    #[arg(long, env = "RECIPIENT_FIXTURE")]
    fixture: Option<PathBuf>,
    /// Recipient shown on the detail screen.
    #[arg(long, default_value = DEMO_RECIPIENT_ID)]
    recipient: String,
    /// Location query the screen is mounted with, e.g. `count=15&offset=2`.
    #[arg(long, default_value = "")]
    location: String,
    /// Reference date (YYYY-MM-DD) for default date windows. Defaults to today (UTC).
    #[arg(long)]
    today: Option<NaiveDate>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load the recipient view.
    Load,
    /// Load, then move to another page.
    Page { page: u32 },
    /// Load, then change the page size.
    PageSize { size: u32 },
    /// Load, then change the date range.
    Dates { start: NaiveDate, end: NaiveDate },
    /// Load, then change the ordering.
    Order {
        field: String,
        #[arg(long, default_value_t = false)]
        ascending: bool,
    },
    /// Search recipients by id, bank account id, name or external id.
    Search { term: String },
    /// Export the balance statement for the current date range.
    Export {
        #[arg(long, value_enum, default_value_t = ExportKind::Csv)]
        format: ExportKind,
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Cancel a pending anticipation request.
    Cancel { id: String },
    /// Save anticipation settings from a JSON document.
    SaveAnticipation { data: String },
    /// Save transfer settings from a JSON document.
    SaveTransfer { data: String },
    /// Link an existing bank account (`{"id": ...}`) or create and link a new one.
    SaveBankAccount { data: String },
}

fn load_service(cli: &Cli, today: NaiveDate) -> anyhow::Result<Arc<InMemoryDataService>> {
    let service = match &cli.fixture {
        Some(path) => InMemoryDataService::load(path)
            .with_context(|| format!("loading fixture {}", path.display()))?,
        None => InMemoryDataService::demo(today),
    };
    Ok(Arc::new(service))
}

fn print(value: serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

async fn run_dashboard(
    cli: &Cli,
    config: DashboardConfig,
    service: Arc<dyn DataService>,
    today: NaiveDate,
) -> anyhow::Result<()> {
    let out = match &cli.command {
        Command::Export { out, .. } => out.clone(),
        _ => PathBuf::from("."),
    };
    let mut dashboard = RecipientDashboard::new(
        service,
        Arc::new(FileExporter::new(out)),
        cli.recipient.clone(),
        config,
        today,
        &cli.location,
    );
    dashboard.mount().await?;

    let change = match &cli.command {
        Command::Page { page } => Some(FilterChange::Page(*page)),
        Command::PageSize { size } => Some(FilterChange::PageSize(*size)),
        Command::Dates { start, end } => {
            Some(FilterChange::DateRange(DateRange::new(*start, *end)))
        }
        Command::Order { field, ascending } => Some(FilterChange::Order(SortOrder {
            field: field.clone(),
            direction: if *ascending {
                SortDirection::Ascending
            } else {
                SortDirection::Descending
            },
        })),
        _ => None,
    };
    if let Some(change) = change {
        let scope = dashboard.apply_filter(change).await?;
        info!(scope = ?scope, location = %dashboard.location(), "filter applied");
    }

    match &cli.command {
        Command::Export { format, .. } => {
            let artifact = dashboard.export((*format).into(), today).await?;
            return print(json!({
                "file_name": artifact.file_name,
                "content_type": artifact.content_type,
                "bytes": artifact.bytes.len(),
            }));
        }
        Command::Cancel { id } => {
            dashboard.request_cancel(id.clone())?;
            dashboard.confirm_cancel().await?;
        }
        Command::SaveAnticipation { data } => {
            let data: AnticipationConfig =
                serde_json::from_str(data).context("parsing anticipation settings")?;
            dashboard.save_anticipation_config(data).await?;
        }
        Command::SaveTransfer { data } => {
            let data: TransferConfig =
                serde_json::from_str(data).context("parsing transfer settings")?;
            dashboard.save_transfer_config(data).await?;
        }
        Command::SaveBankAccount { data } => {
            let data: BankAccountSave =
                serde_json::from_str(data).context("parsing bank account")?;
            dashboard.save_bank_account(data).await?;
        }
        _ => {}
    }

    print(json!({
        "location": dashboard.location(),
        "pagination": dashboard.pagination(),
        "configuration_saved": dashboard.configuration_saved(),
        "view": dashboard.view(),
    }))
}

async fn run_search(
    term: &str,
    location: &str,
    config: &DashboardConfig,
    service: Arc<dyn DataService>,
    today: NaiveDate,
) -> anyhow::Result<()> {
    let mut directory = RecipientDirectory::new(service, config, today, location);
    directory.mount().await?;
    directory
        .apply(FilterChange::Confirm {
            search: term.to_string(),
            filters: BTreeMap::new(),
            date_range: None,
        })
        .await?;

    print(json!({
        "location": directory.location(),
        "pagination": directory.pagination(),
        "rows": directory.rows(),
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| {
            "recipientctl=info,recipient_core=info,recipient_adapters=info,info".to_string()
        }))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => DashboardConfig::load(path)?,
        None => DashboardConfig::default(),
    };
    let today = cli.today.unwrap_or_else(|| Utc::now().date_naive());
    let service = load_service(&cli, today)?;
    info!(recipient = %cli.recipient, today = %today, "recipientctl starting");

    match &cli.command {
        Command::Search { term } => {
            run_search(term, &cli.location, &config, service, today).await
        }
        _ => run_dashboard(&cli, config, service, today).await,
    }
}
