use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use netaudit_core::config::{Config, Mode as CoreMode};
use netaudit_core::csv_out::write_csv;
use netaudit_core::cve_index::CveIndex;
use netaudit_core::driver::{run_scan, ScanEvent};
use netaudit_core::host::HostResult;
use netaudit_core::oui::OuiTable;
use netaudit_core::ports::load_ports;
use netaudit_core::target::parse_targets;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(
    name = "netaudit",
    version,
    about = "Authorized defensive network audit scanner"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Scan(ScanArgs),
}

#[derive(Copy, Clone, ValueEnum)]
enum ModeArg {
    Auto,
    Leve,
    Completo,
}

impl From<ModeArg> for CoreMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Auto => CoreMode::Auto,
            ModeArg::Leve => CoreMode::Leve,
            ModeArg::Completo => CoreMode::Completo,
        }
    }
}

#[derive(Args, Clone)]
struct ScanArgs {
    /// Single IP, CIDR block, or start-end IPv4 range.
    target: String,
    #[arg(long)]
    ports: Option<String>,
    #[arg(long)]
    ports_file: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = ModeArg::Auto)]
    mode: ModeArg,
    #[arg(long)]
    csv: Option<PathBuf>,
    #[arg(long)]
    json: bool,
    #[arg(long, default_value = "manuf")]
    oui_file: PathBuf,
    #[arg(long)]
    force_rebuild_cve: bool,
    #[arg(long)]
    no_progress: bool,
    #[arg(long)]
    i_own_or_am_authorized: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Scan(args) => run_scan_command(args).await,
    }
}

async fn run_scan_command(args: ScanArgs) -> Result<()> {
    if !args.i_own_or_am_authorized {
        eprintln!(
            "Refusing to scan. You must explicitly confirm authorization with --i-own-or-am-authorized"
        );
        std::process::exit(2);
    }

    let targets = parse_targets(&args.target).context("unable to parse target")?;
    let ports = load_ports(args.ports.as_deref(), args.ports_file.as_deref())
        .context("unable to load port list")?;
    let config = Config::build(args.mode.into());

    let cve_index = if config.skip_cve {
        Arc::new(CveIndex::default())
    } else {
        let index = CveIndex::build_or_load(
            &config.nvd_dir,
            config.nvd_index_max_years,
            Some(&config.cpe_part_allowed),
            args.force_rebuild_cve,
        )
        .context("unable to build or load the CVE index")?;
        Arc::new(index)
    };

    let oui = match OuiTable::load(&args.oui_file) {
        Ok(table) => Arc::new(table),
        Err(e) => {
            log::warn!("OUI table unavailable ({e}); vendor lookups will report N/D");
            Arc::new(OuiTable::default())
        }
    };

    let interactive = std::io::stdout().is_terminal() && !args.no_progress && !args.json;
    let (events_tx, progress_task) = if args.json {
        (None, None)
    } else {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = if interactive {
            tokio::spawn(run_progress_bar(rx, targets.len()))
        } else {
            tokio::spawn(run_plain_progress(rx))
        };
        (Some(tx), Some(task))
    };

    let results = run_scan(targets, ports, &config, cve_index, oui, events_tx).await;

    if let Some(task) = progress_task {
        let _ = task.await;
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print_table(&results);
    }

    if let Some(path) = args.csv {
        write_csv(&results, &path)
            .with_context(|| format!("failed to write CSV to {}", path.display()))?;
        println!("CSV written to {}", path.display());
    }

    Ok(())
}

async fn run_plain_progress(mut rx: mpsc::UnboundedReceiver<ScanEvent>) {
    while let Some(event) = rx.recv().await {
        println!(
            "[{}/{}] {}",
            event.stats.total_scanned, event.stats.total_targets, event.message
        );
    }
}

async fn run_progress_bar(mut rx: mpsc::UnboundedReceiver<ScanEvent>, total: usize) {
    let bar = ProgressBar::new(total as u64);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    while let Some(event) = rx.recv().await {
        bar.set_position(event.stats.total_scanned as u64);
        bar.set_message(event.message);
    }
    bar.finish_and_clear();
}

fn print_table(results: &[HostResult]) {
    println!(
        "{:<16} {:<9} {:<20} {:<18} {:<14} {:<7} {:<5}",
        "IP", "Status", "Hostname", "MAC", "SO", "Portas", "Vulns"
    );
    println!("{}", "-".repeat(100));
    for r in results {
        let hostname = r.hostname.clone().unwrap_or_else(|| "N/D".to_string());
        let mac = r.mac.clone().unwrap_or_else(|| "N/D".to_string());
        let os = r
            .os_family
            .map(|f| f.to_string())
            .unwrap_or_else(|| "N/D".to_string());
        println!(
            "{:<16} {:<9} {:<20} {:<18} {:<14} {:<7} {:<5}",
            r.ip,
            r.status.to_string(),
            hostname,
            mac,
            os,
            r.open_ports.len(),
            r.vulns.len()
        );
    }
    let total_vulns: usize = results.iter().map(|r| r.vulns.len()).sum();
    println!("Hosts: {}  Vulnerabilities matched: {}", results.len(), total_vulns);
}
