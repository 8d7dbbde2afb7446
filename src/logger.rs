use std::path::Path;

use log::LevelFilter;
use log4rs::{
    append::{console::ConsoleAppender, file::FileAppender},
    config::{Appender, Config, Logger, Root},
    encode::pattern::PatternEncoder,
};

use crate::error::ScanError;

const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} {h({l:<5})} {m}{n}";

// 第三方库的日志只保留 warn 以上
const QUIET_TARGETS: [&str; 4] = ["trust_dns_proto", "trust_dns_resolver", "hyper", "reqwest"];

/// 初始化日志，控制台必开，文件可选
pub fn init(verbose: bool, log_file: Option<&Path>) -> Result<(), ScanError> {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build();
    let mut builder = Config::builder().appender(Appender::builder().build("stdout", Box::new(stdout)));
    for target in QUIET_TARGETS {
        builder = builder.logger(Logger::builder().build(target, LevelFilter::Warn));
    }
    let mut root = Root::builder().appender("stdout");

    if let Some(path) = log_file {
        let file = FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(PATTERN)))
            .build(path)
            .map_err(|e| ScanError::Logger(e.to_string()))?;
        builder = builder.appender(Appender::builder().build("file", Box::new(file)));
        root = root.appender("file");
    }

    let config = builder
        .build(root.build(level))
        .map_err(|e| ScanError::Logger(e.to_string()))?;
    log4rs::init_config(config).map_err(|e| ScanError::Logger(e.to_string()))?;
    Ok(())
}
