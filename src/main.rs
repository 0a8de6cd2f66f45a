use std::process::ExitCode;

use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use healthcheck::config::{app_config::filter_targets, load_config, setup_resolver};
use healthcheck::{CheckResult, History, RunRecord, Runner, save_csv};

const MAX_URL_WIDTH: usize = 60;

fn to_fixed_width(input: &str, width: usize) -> String {
    use unicode_truncate::UnicodeTruncateStr;

    let (truncated, _) = input.unicode_truncate(width);
    format!("{:<width$}", truncated, width = width)
}

fn print_result(result: &CheckResult, url_width: usize) {
    let url = to_fixed_width(&result.url, url_width);
    let status = result
        .status_code
        .map(|code| code.to_string())
        .unwrap_or_else(|| "---".to_string());

    if result.success {
        println!(
            "✅ {url} Status: {status}, Response: {:.2}ms, Latency: {:.2}ms",
            result.response_time_ms(),
            result.latency_ms()
        );
    } else {
        println!(
            "❌ {url} Status: {status}, Error: {} ({}), Attempts: {}",
            result.error.map_or("unknown", |kind| kind.as_str()),
            result.error_message.as_deref().unwrap_or_default(),
            result.attempts
        );
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let targets = filter_targets(&config.targets);
    if targets.is_empty() {
        log::warn!("No http(s) targets configured, nothing to check");
        return ExitCode::SUCCESS;
    }

    let resolver = match setup_resolver(&config.dns_hosts) {
        Ok(resolver) => resolver,
        Err(e) => {
            log::error!("Failed to set up DNS resolver: {e}");
            return ExitCode::FAILURE;
        }
    };

    let url_width = targets
        .iter()
        .map(|t| t.chars().count())
        .max()
        .unwrap_or(0)
        .min(MAX_URL_WIDTH);

    let runner = Runner::from_config(&config.run, resolver);
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("Interrupted, cancelling outstanding requests");
                cancel.cancel();
            }
        }
    });

    let batch = match runner.run_batch(targets, &config.run, cancel) {
        Ok(batch) => batch,
        Err(e) => {
            log::error!("Failed to start checks: {e}");
            return ExitCode::FAILURE;
        }
    };

    let (mut results_stream, progress, handle) = batch.split();
    let total = handle.total();

    let progress_logger = tokio::spawn(async move {
        let mut progress = progress;
        while let Some(done) = progress.next().await {
            log::debug!("Progress: {done}/{total}");
        }
    });

    let mut results = Vec::with_capacity(total);
    while let Some(result) = results_stream.next().await {
        print_result(&result, url_width);
        results.push(result);
    }

    let statistics = handle.finish(&results).await;
    let _ = progress_logger.await;

    println!();
    println!("{statistics}");

    let all_ok = statistics.failure_count == 0;
    if let Some(path) = &config.history.csv {
        match save_csv(&results, path) {
            Ok(()) => log::info!("Exported results to {}", path.display()),
            Err(e) => log::error!("Failed to export results: {e}"),
        }
    }

    let history = History::from_config(&config.history);
    match history.save(&RunRecord::new(results, statistics)) {
        Ok(path) => log::info!("Saved results to {}", path.display()),
        Err(e) => log::error!("Failed to save results: {e}"),
    }

    if all_ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
