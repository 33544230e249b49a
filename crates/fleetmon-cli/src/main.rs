#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};
use fleetmon_convert::{
    convert_tenant, rule_filter_js, rule_reference_data, translate_tenant, ConvertLog,
    ConvertOptions,
};
use fleetmon_model::{Rule, TenantId};
use fleetmon_store::{DocumentStoreBackend, LocalFsBackend, LocalFsSink};
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode as ProcessExitCode;

#[derive(Clone, Copy)]
enum ExitCode {
    Success = 0,
    Configuration = 3,
    Internal = 4,
}

impl ExitCode {
    /// Multi-tenant runs report the most severe failure seen.
    const fn worse(self, other: Self) -> Self {
        if (other as u8) > (self as u8) {
            other
        } else {
            self
        }
    }
}

#[derive(Parser)]
#[command(name = "fleetmon")]
#[command(about = "Fleetmon operations CLI")]
struct Cli {
    #[arg(long, global = true, default_value_t = false)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build and publish reference data for one tenant, or all tenants.
    Convert {
        #[arg(long)]
        store_root: PathBuf,
        #[arg(long)]
        refdata_root: PathBuf,
        #[arg(long)]
        tenant: Option<String>,
    },
    /// Translate a tenant's documents without publishing anything.
    Validate {
        #[arg(long)]
        store_root: PathBuf,
        #[arg(long)]
        tenant: String,
    },
    /// Print the JavaScript filter generated for a rule document.
    FilterPreview {
        /// Path to a rule JSON document.
        #[arg(long)]
        rule: PathBuf,
    },
}

fn main() -> ProcessExitCode {
    match run() {
        Ok(code) => ProcessExitCode::from(code as u8),
        Err(err) => {
            eprintln!("{err}");
            ProcessExitCode::from(ExitCode::Internal as u8)
        }
    }
}

fn run() -> Result<ExitCode, String> {
    let cli = Cli::parse();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("runtime init failed: {e}"))?;

    match cli.command {
        Commands::Convert {
            store_root,
            refdata_root,
            tenant,
        } => runtime.block_on(run_convert(store_root, refdata_root, tenant, cli.json)),
        Commands::Validate { store_root, tenant } => {
            runtime.block_on(run_validate(store_root, &tenant, cli.json))
        }
        Commands::FilterPreview { rule } => preview_filter(&rule, cli.json),
    }
}

fn parse_tenant(raw: &str) -> Result<TenantId, String> {
    TenantId::parse(raw).map_err(|e| format!("invalid tenant: {}", e.0))
}

async fn run_convert(
    store_root: PathBuf,
    refdata_root: PathBuf,
    tenant: Option<String>,
    machine_json: bool,
) -> Result<ExitCode, String> {
    let store = LocalFsBackend::new(store_root);
    let sink = LocalFsSink::new(refdata_root);
    let tenants = match tenant {
        Some(raw) => vec![parse_tenant(&raw)?],
        None => store
            .list_tenants()
            .await
            .map_err(|e| format!("tenant discovery failed: {e}"))?,
    };
    if tenants.is_empty() {
        return Err("no tenants found under the store root".to_string());
    }

    let mut worst = ExitCode::Success;
    for tenant in tenants {
        match convert_tenant(&store, &sink, &ConvertOptions::new(tenant.clone())).await {
            Ok(result) => {
                if machine_json {
                    println!(
                        "{}",
                        serde_json::to_string(&result.manifest).map_err(|e| e.to_string())?
                    );
                } else {
                    println!(
                        "{}: {} rules, {} mapping rows, {} skipped groups",
                        tenant.as_str(),
                        result.manifest.rule_count,
                        result.manifest.mapping_row_count,
                        result.manifest.skipped_groups.len()
                    );
                }
            }
            Err(err) => {
                eprintln!("{}: {err}", tenant.as_str());
                worst = worst.worse(if err.is_configuration() {
                    ExitCode::Configuration
                } else {
                    ExitCode::Internal
                });
            }
        }
    }
    Ok(worst)
}

async fn run_validate(
    store_root: PathBuf,
    tenant: &str,
    machine_json: bool,
) -> Result<ExitCode, String> {
    let store = LocalFsBackend::new(store_root);
    let tenant = parse_tenant(tenant)?;
    let mut log = ConvertLog::default();
    match translate_tenant(&store, &tenant, &mut log).await {
        Ok(translated) => {
            let summary = json!({
                "tenant": tenant.as_str(),
                "rules": translated.rules.len(),
                "mapping_rows": translated.rows.len(),
                "skipped_groups": translated.skipped_groups,
            });
            if machine_json {
                println!(
                    "{}",
                    serde_json::to_string(&summary).map_err(|e| e.to_string())?
                );
            } else {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&summary).map_err(|e| e.to_string())?
                );
            }
            Ok(ExitCode::Success)
        }
        Err(err) => {
            eprintln!("{err}");
            Ok(if err.is_configuration() {
                ExitCode::Configuration
            } else {
                ExitCode::Internal
            })
        }
    }
}


fn preview_filter(path: &PathBuf, machine_json: bool) -> Result<ExitCode, String> {
    let raw = fs::read(path).map_err(|e| format!("read {} failed: {e}", path.display()))?;
    let rule: Rule =
        serde_json::from_slice(&raw).map_err(|e| format!("invalid rule document: {e}"))?;
    match rule_filter_js(&rule).and_then(|filter| {
        let record = rule_reference_data(&rule)?;
        Ok((filter, record))
    }) {
        Ok((filter, record)) => {
            if machine_json {
                println!(
                    "{}",
                    serde_json::to_string(&record).map_err(|e| e.to_string())?
                );
            } else {
                println!("{filter}");
            }
            Ok(ExitCode::Success)
        }
        Err(err) => {
            eprintln!("{err}");
            Ok(if err.is_configuration() {
                ExitCode::Configuration
            } else {
                ExitCode::Internal
            })
        }
    }
}
