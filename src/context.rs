use std::{fmt, time::Duration};

use reqwest::Url;
use serde::Serialize;

use crate::error::ScanError;

/// worker 数量上限
pub const MAX_CONCURRENT: usize = 1024;

pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/58.0.3029.110 Safari/537.3",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.0.3 Safari/605.1.15",
    "Mozilla/5.0 (iPad; CPU OS 13_2_3 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/13.0.3 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 13_2_3 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/13.0.3 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (Linux; Android 10; SM-G975F) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/77.0.3865.92 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 10; SM-A505FN) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/77.0.3865.92 Mobile Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/77.0.3865.90 Safari/537.36",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:68.0) Gecko/20100101 Firefox/68.0",
    "Mozilla/5.0 (Windows NT 6.1; WOW64; rv:54.0) Gecko/20100101 Firefox/54.0",
    "Mozilla/5.0 (Windows NT 10.0; WOW64; Trident/7.0; rv:11.0) like Gecko",
    "Mozilla/5.0 (compatible; MSIE 10.0; Windows NT 6.2)",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:78.0) Gecko/20100101 Firefox/78.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_14_6) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/78.0.3904.97 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/88.0.4324.150 Safari/537.36 Edge/88.0.705.50",
    "Mozilla/5.0 (Linux; Android 9; SM-G960F Build/PPR1.180610.011) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/70.0.3538.110 Mobile Safari/537.36",
    "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)",
    "Mozilla/5.0 (compatible; Bingbot/2.0; +http://www.bing.com/bingbot.htm)",
    "Mozilla/5.0 (compatible; Yahoo! Slurp; http://help.yahoo.com/help/us/ysearch/slurp)",
    "Mozilla/5.0 (compatible; Baiduspider/2.0; +http://www.baidu.com/search/spider.html)",
];

/// 报告的输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Xml,
}

impl OutputFormat {
    pub const NAMES: [&'static str; 3] = ["text", "json", "xml"];

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "text" => Some(OutputFormat::Text),
            "json" => Some(OutputFormat::Json),
            "xml" => Some(OutputFormat::Xml),
            _ => None,
        }
    }
}

/// 扫描运行参数，运行开始后只读
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub base_url: String,
    pub concurrent: usize,
    // 单次请求的超时
    pub timeout: Duration,
    // 初始退避时间，每个任务复制一份自己的 RetryState
    pub adaptive_delay: Duration,
    pub user_agents: Vec<String>,
    // 是否把 404 也作为结果输出，默认丢弃
    pub report_not_found: bool,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            concurrent: 10,
            timeout: Duration::from_secs(10),
            adaptive_delay: Duration::from_millis(100),
            user_agents: DEFAULT_USER_AGENTS.iter().map(|&it| it.to_owned()).collect(),
            report_not_found: false,
        }
    }
}

impl ScannerConfig {
    pub fn validate(&self) -> Result<(), ScanError> {
        if self.base_url.trim().is_empty() {
            return Err(ScanError::Config("base url is required".into()));
        }
        let url = Url::parse(&self.base_url)
            .map_err(|e| ScanError::Config(format!("invalid base url {}: {}", self.base_url, e)))?;
        if url.host_str().is_none() {
            return Err(ScanError::Config(format!(
                "base url {} has no host",
                self.base_url
            )));
        }
        if self.concurrent == 0 {
            return Err(ScanError::Config("concurrent must be positive".into()));
        }
        if self.concurrent > MAX_CONCURRENT {
            return Err(ScanError::Config(format!(
                "concurrent must not exceed {}",
                MAX_CONCURRENT
            )));
        }
        if self.user_agents.is_empty() {
            return Err(ScanError::Config("user agent pool is empty".into()));
        }
        Ok(())
    }

    /// 把 base url 和 path 拼成完整的目标地址
    pub fn target_url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }
}

/// HTTP 状态码的分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Found,
    RateLimited,
    NotFound,
    ServerError,
    Other,
}

impl From<u16> for StatusClass {
    fn from(code: u16) -> Self {
        match code {
            200 => StatusClass::Found,
            429 => StatusClass::RateLimited,
            404 => StatusClass::NotFound,
            500.. => StatusClass::ServerError,
            _ => StatusClass::Other,
        }
    }
}

/// 一个 path 的最终结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Found,
    RateLimited,
    NotFound,
    Other,
    Error,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Classification::Found => "Found",
            Classification::RateLimited => "Rate limited",
            Classification::NotFound => "Not found",
            Classification::Other => "Other",
            Classification::Error => "Error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub url: String,
    pub status_code: Option<u16>,
    #[serde(rename = "status")]
    pub classification: Classification,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Outcome {
    pub fn with_status(url: String, code: u16, classification: Classification) -> Self {
        Self {
            url,
            status_code: Some(code),
            classification,
            error_message: None,
        }
    }

    pub fn error(url: String, code: Option<u16>, message: String) -> Self {
        Self {
            url,
            status_code: code,
            classification: Classification::Error,
            error_message: Some(message),
        }
    }
}

/// 一次扫描的汇总
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub count: usize,
    pub emitted: usize,
    pub suppressed: usize,
    // 结果通道提前关闭，没能送出的结果
    pub dropped: usize,
    // 被取消的任务，包括还没出队的
    pub cancelled: usize,
    pub elapsed: Duration,
}
