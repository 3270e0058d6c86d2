use clap::Parser;
use redash_refresh::adapters::http::redact;
use redash_refresh::core::engine::{plan, CycleStatus, RunReport};
use redash_refresh::domain::model::QuerySpec;
use redash_refresh::domain::ports::ConfigProvider;
use redash_refresh::utils::error::{ErrorSeverity, RefreshError};
use redash_refresh::utils::{logger, validation::Validate};
use redash_refresh::{CliArgs, LocalStorage, RedashClient, RefreshConfig, RefreshEngine};
use tokio_util::sync::CancellationToken;

const EXIT_PARTIAL_FAILURE: i32 = 2;
const EXIT_ABORTED: i32 = 3;
const EXIT_CANCELLED: i32 = 130;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    // 初始化日誌
    logger::init_cli_logger(args.verbose, args.log_format);

    tracing::info!("🚀 Starting redash-refresh");
    tracing::info!("📁 Loading configuration from: {}", args.config);

    let config = match RefreshConfig::from_file(&args.config) {
        Ok(config) => config.with_api_key(args.api_key.clone()),
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", args.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML (or legacy JSON)");
            std::process::exit(1);
        }
    };

    // 驗證配置
    if let Err(e) = config.validate() {
        fail(&e);
    }

    tracing::info!("✅ Configuration loaded and validated successfully");

    let queries: Vec<QuerySpec> = config
        .query_specs()?
        .into_iter()
        .filter(|q| args.selects(&q.query_id))
        .collect();

    if queries.is_empty() {
        tracing::warn!("⚠️ No queries selected; check --only / --skip and `enabled` flags");
        return Ok(());
    }

    display_config_summary(&config, &queries, &args);

    let client = RedashClient::from_config(&config)?;

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - No requests will be sent");
        perform_dry_run(&client, &config, &queries)?;
        return Ok(());
    }

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("🛑 Interrupt received, cancelling in-flight refreshes");
                cancel.cancel();
            }
        }
    });

    let storage = LocalStorage::new(config.export_path());
    let engine = RefreshEngine::new(client, storage, config.engine_options())
        .with_cancellation(cancel)
        .with_monitoring(args.monitor);

    let report = match engine.run(&queries).await {
        Ok(report) => report,
        Err(e) => fail(&e),
    };

    if let Some(path) = &args.summary_file {
        let summary = serde_json::to_string_pretty(&report.summary())?;
        std::fs::write(path, summary)?;
        tracing::info!("📝 Run summary written to: {}", path);
    }

    display_run_results(&report);

    let exit_code = if report.cancelled {
        EXIT_CANCELLED
    } else if report.aborted {
        EXIT_ABORTED
    } else if report.failed() > 0 {
        EXIT_PARTIAL_FAILURE
    } else {
        0
    };

    if exit_code > 0 {
        std::process::exit(exit_code);
    }

    Ok(())
}

fn fail(e: &RefreshError) -> ! {
    tracing::error!(
        "❌ {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());

    let exit_code = match e.severity() {
        ErrorSeverity::Low => EXIT_CANCELLED,
        ErrorSeverity::Medium | ErrorSeverity::High => EXIT_ABORTED,
        ErrorSeverity::Critical => 1,
    };
    std::process::exit(exit_code);
}

fn display_config_summary(config: &RefreshConfig, queries: &[QuerySpec], args: &CliArgs) {
    let policy = config.poll_policy();

    println!("📋 Configuration Summary:");
    println!("  Redash: {}", config.base_url());
    println!("  Export path: {}", config.export_path());
    println!("  Queries: {}", queries.len());
    println!(
        "  Polling: every {:?}, up to {} checks{}",
        policy.interval,
        policy.max_attempts,
        policy
            .deadline
            .map(|d| format!(" or {:?}", d))
            .unwrap_or_default()
    );
    println!("  Concurrent jobs: {}", config.concurrent_jobs());
    println!("  On cycle failure: {:?}", config.error_policy());

    if args.dry_run {
        println!("  🔍 DRY RUN MODE ENABLED");
    }

    println!();
}

fn perform_dry_run(
    client: &RedashClient,
    config: &RefreshConfig,
    queries: &[QuerySpec],
) -> anyhow::Result<()> {
    let planned = plan(queries)?;
    let export_root = std::path::Path::new(config.export_path());

    println!("🔍 Dry Run Analysis: {} refresh cycles", planned.len());
    println!();

    for (i, cycle) in planned.iter().enumerate() {
        println!("  {}. Query {} [{}]", i + 1, cycle.query_id, cycle.parameters);
        println!(
            "     POST {}",
            redact(&client.refresh_url(&cycle.query_id, &cycle.parameters))
        );
        println!(
            "     -> {}",
            export_root.join(cycle.target.relative_path()).display()
        );
    }

    println!();
    println!("✅ Dry run complete. Run without --dry-run to refresh and export.");

    Ok(())
}

fn display_run_results(report: &RunReport) {
    println!();
    println!("📊 Run {} results:", report.run_id);

    for outcome in &report.outcomes {
        match &outcome.status {
            CycleStatus::Exported { path, .. } => println!(
                "  ✅ {} [{}] -> {}",
                outcome.query_id,
                outcome.parameters,
                path.display()
            ),
            CycleStatus::Failed(e) => println!("  ❌ {} [{}]: {}", outcome.query_id, outcome.parameters, e),
        }
    }

    println!();
    println!(
        "✅ {} exported, ❌ {} failed in {}s",
        report.succeeded(),
        report.failed(),
        (report.finished_at - report.started_at).num_seconds()
    );

    if report.aborted {
        println!("🛑 Run aborted after the first failure (on_cycle_failure = \"abort\")");
    }
    if report.cancelled {
        println!("⚠️ Run cancelled; remaining cycles were not started");
    }
}
