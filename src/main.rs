use std::{process::ExitCode, sync::Arc};

use args::AppArgs;
use log::{debug, error, info, warn};

use crate::{
    context::Outcome,
    engines::{load_paths, saver, write_report, DnsCache, HttpConnector, Scanner, SystemLookup},
    error::ScanError,
};

mod args;
mod context;
mod engines;
mod error;
mod logger;

#[tokio::main]
async fn main() -> ExitCode {
    let mut app_args = AppArgs::default();
    app_args.parse_cli_arguments();

    if let Err(e) = logger::init(app_args.verbose, app_args.log_file.as_deref()) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }
    debug!("app_args: {:?}", app_args);

    match run(app_args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(app_args: AppArgs) -> Result<(), ScanError> {
    // 配置和字典都在发起任何网络请求之前检查
    let config = Arc::new(app_args.scanner_config()?);
    let paths = load_paths(&app_args.paths_file).await?;

    let lookup = SystemLookup::new(&app_args.nameserver_list)
        .map_err(|e| ScanError::Config(format!("failed to build DNS resolver: {}", e)))?;
    let connector = HttpConnector::new(DnsCache::new(Arc::new(lookup)))?;
    let scanner = Scanner::new(config.clone(), Arc::new(connector));

    // Ctrl-C 触发全局取消
    let cancel = scanner.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling in-flight requests.");
            cancel.cancel();
        }
    });

    // 结果通道
    let (result_tx, result_rx) = async_channel::bounded::<Outcome>(config.concurrent);
    let saver = tokio::spawn(saver(result_rx));

    info!(
        "scanning {} paths on {} with {} workers",
        paths.len(),
        config.base_url,
        config.concurrent
    );
    let summary = scanner.run(paths, result_tx).await?;
    let outcomes = saver
        .await
        .map_err(|e| ScanError::Worker(e.to_string()))?;

    debug!("run summary: {:?}, {} results collected", summary, outcomes.len());
    write_report(&outcomes, app_args.output_format, &app_args.output_file).await
}
