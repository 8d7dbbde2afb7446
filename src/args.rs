use std::{ffi::OsString, path::PathBuf, time::Duration};

use clap::{command, value_parser, Arg, ArgAction, ArgMatches, Command};

use crate::{
    context::{OutputFormat, ScannerConfig, DEFAULT_USER_AGENTS, MAX_CONCURRENT},
    error::ScanError,
};

#[derive(Debug, Default)]
pub struct AppArgs {
    // 待扫描的 base url
    pub url: String,

    // path 字典文件
    pub paths_file: PathBuf,

    // worker 数量
    pub concurrent: usize,

    // 单次请求超时
    pub timeout: Duration,

    // 初始退避时间
    pub adaptive_delay: Duration,

    pub output_format: OutputFormat,

    pub output_file: PathBuf,

    // ns 服务器列表，为空时使用系统配置
    pub nameserver_list: Vec<String>,

    // 是否输出 404
    pub report_not_found: bool,

    pub verbose: bool,

    pub log_file: Option<PathBuf>,
}

impl AppArgs {
    fn build_command(&self) -> Command {
        command!()
            .arg_required_else_help(true)
            .arg(
                Arg::new("url")
                    .short('u')
                    .long("url")
                    .env("PROBE_URL")
                    .required(true)
                    .help("Base URL to scan"),
            )
            .arg(
                Arg::new("paths")
                    .short('p')
                    .long("paths")
                    .env("PROBE_PATHS")
                    .required(true)
                    .value_parser(value_parser!(PathBuf))
                    .help("File containing paths to scan, one per line"),
            )
            .arg(
                Arg::new("concurrent")
                    .short('c')
                    .long("concurrent")
                    .default_value("10")
                    .value_parser(parse_concurrency)
                    .help("Number of concurrent workers, at most 1024"),
            )
            .arg(
                Arg::new("timeout")
                    .short('t')
                    .long("timeout")
                    .default_value("10s")
                    .value_parser(parse_duration)
                    .help("Timeout of a single HTTP request, e.g. 500ms, 10s"),
            )
            .arg(
                Arg::new("adaptive-delay")
                    .short('d')
                    .long("adaptive-delay")
                    .default_value("100ms")
                    .value_parser(parse_duration)
                    .help("Initial backoff delay, doubled after every failed attempt"),
            )
            .arg(
                Arg::new("output-format")
                    .short('o')
                    .long("output-format")
                    .default_value("text")
                    .value_parser(OutputFormat::NAMES)
                    .help("Output format"),
            )
            .arg(
                Arg::new("output-file")
                    .short('f')
                    .long("output-file")
                    .required(true)
                    .value_parser(value_parser!(PathBuf))
                    .help("File to save the results to"),
            )
            .arg(
                Arg::new("nameserver")
                    .short('n')
                    .long("nameserver")
                    .help("Nameserver IPs separated by commas, system resolver by default"),
            )
            .arg(
                Arg::new("report-not-found")
                    .long("report-not-found")
                    .action(ArgAction::SetTrue)
                    .help("Report 404 responses instead of dropping them"),
            )
            .arg(
                Arg::new("verbose")
                    .short('v')
                    .long("verbose")
                    .action(ArgAction::SetTrue)
                    .help("Enable debug logging"),
            )
            .arg(
                Arg::new("log-file")
                    .long("log-file")
                    .value_parser(value_parser!(PathBuf))
                    .help("Also write logs to this file"),
            )
    }

    pub fn parse_cli_arguments(&mut self) -> &mut AppArgs {
        if let Err(e) = self.try_parse_from(std::env::args_os()) {
            e.exit();
        }
        self
    }

    pub fn try_parse_from<I, T>(&mut self, itr: I) -> Result<&mut AppArgs, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let mut cmd = self.build_command();
        let matches = cmd.try_get_matches_from_mut(itr)?;
        if let Err(e) = self.fill_from(&matches) {
            return Err(cmd.error(clap::error::ErrorKind::ValueValidation, e));
        }
        Ok(self)
    }

    fn fill_from(&mut self, matches: &ArgMatches) -> Result<(), String> {
        // 取 url
        self.url = matches
            .get_one::<String>("url")
            .map(|it| it.trim().to_owned())
            .unwrap_or_default();
        if self.url.is_empty() {
            return Err("url must not be empty".into());
        }

        self.paths_file = matches
            .get_one::<PathBuf>("paths")
            .cloned()
            .ok_or("paths is required")?;
        self.output_file = matches
            .get_one::<PathBuf>("output-file")
            .cloned()
            .ok_or("output file is required")?;

        self.concurrent = matches.get_one::<usize>("concurrent").copied().unwrap_or(10);
        self.timeout = matches
            .get_one::<Duration>("timeout")
            .copied()
            .unwrap_or(Duration::from_secs(10));
        self.adaptive_delay = matches
            .get_one::<Duration>("adaptive-delay")
            .copied()
            .unwrap_or(Duration::from_millis(100));

        self.output_format = matches
            .get_one::<String>("output-format")
            .and_then(|it| OutputFormat::from_name(it))
            .unwrap_or_default();

        // 取 nameserver
        self.nameserver_list = matches
            .get_one::<String>("nameserver")
            .map_or(vec![], |it| it.split(',').collect::<Vec<&str>>())
            .iter()
            .map(|&it| it.trim().to_owned())
            .filter(|it| !it.is_empty())
            .collect::<Vec<String>>();

        self.report_not_found = matches.get_flag("report-not-found");
        self.verbose = matches.get_flag("verbose");
        self.log_file = matches.get_one::<PathBuf>("log-file").cloned();
        Ok(())
    }

    pub fn scanner_config(&self) -> Result<ScannerConfig, ScanError> {
        let config = ScannerConfig {
            base_url: self.url.clone(),
            concurrent: self.concurrent,
            timeout: self.timeout,
            adaptive_delay: self.adaptive_delay,
            user_agents: DEFAULT_USER_AGENTS.iter().map(|&it| it.to_owned()).collect(),
            report_not_found: self.report_not_found,
        };
        config.validate()?;
        Ok(config)
    }
}

fn parse_concurrency(raw: &str) -> Result<usize, String> {
    let n = raw
        .trim()
        .parse::<usize>()
        .map_err(|_| format!("invalid number: {}", raw))?;
    if n == 0 || n > MAX_CONCURRENT {
        return Err(format!("must be between 1 and {}", MAX_CONCURRENT));
    }
    Ok(n)
}

/// 解析 `100ms`、`10s`、`2m`、`1h` 形式的时长，纯数字按秒处理
fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    // scale 单位为纳秒
    let (number, scale) = if let Some(n) = raw.strip_suffix("ms") {
        (n, 1e6)
    } else if let Some(n) = raw.strip_suffix('s') {
        (n, 1e9)
    } else if let Some(n) = raw.strip_suffix('m') {
        (n, 60e9)
    } else if let Some(n) = raw.strip_suffix('h') {
        (n, 3600e9)
    } else {
        (raw, 1e9)
    };

    let value = number
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("invalid duration: {}", raw))?;
    if !value.is_finite() || value < 0.0 {
        return Err(format!("invalid duration: {}", raw));
    }
    Ok(Duration::from_nanos((value * scale).round() as u64))
}
