use std::{sync::Arc, time::Duration};

use log::debug;
use rand::seq::SliceRandom;
use tokio_util::sync::CancellationToken;

use crate::{
    context::{Classification, Outcome, ScannerConfig, StatusClass},
    engines::connector::Fetch,
};

/// 单个 path 最多尝试的次数
pub const MAX_ATTEMPTS: u32 = 3;

/// 每个任务独有的重试状态，从配置的初始延迟复制而来
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    attempt: u32,
    delay: Duration,
}

impl RetryState {
    pub fn new(initial_delay: Duration) -> Self {
        Self {
            attempt: 0,
            delay: initial_delay,
        }
    }

    pub fn next_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    pub fn exhausted(&self) -> bool {
        self.attempt >= MAX_ATTEMPTS
    }

    /// 返回这次要等待的时间，下一次翻倍
    pub fn backoff(&mut self) -> Duration {
        let delay = self.delay;
        self.delay = self.delay.saturating_mul(2);
        delay
    }
}

/// 一个任务的最终状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Emit(Outcome),
    // 404 默认不输出
    Suppressed,
    Cancelled,
}

pub struct Prober {
    config: Arc<ScannerConfig>,
    connector: Arc<dyn Fetch>,
}

impl Prober {
    pub fn new(config: Arc<ScannerConfig>, connector: Arc<dyn Fetch>) -> Self {
        Self { config, connector }
    }

    /// 探测一个 path，直到得到最终结果
    ///
    /// 网络错误和 5xx 会退避重试，最多 [`MAX_ATTEMPTS`] 次；每次失败后都会等待
    /// 当前的延迟再翻倍，包括最后一次。429 直接结束，不再重试。
    pub async fn probe(&self, path: &str, cancel: &CancellationToken) -> Verdict {
        let url = self.config.target_url(path);
        let mut retry = RetryState::new(self.config.adaptive_delay);
        let mut last_code: Option<u16> = None;
        let mut last_error = String::new();

        while !retry.exhausted() {
            let attempt = retry.next_attempt();
            let user_agent = self.pick_user_agent();

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Verdict::Cancelled,
                result = self.connector.fetch(&url, user_agent, self.config.timeout) => result,
            };

            match result {
                Ok(code) => match StatusClass::from(code) {
                    StatusClass::Found => {
                        return Verdict::Emit(Outcome::with_status(url, code, Classification::Found))
                    }
                    StatusClass::RateLimited => {
                        return Verdict::Emit(Outcome::with_status(
                            url,
                            code,
                            Classification::RateLimited,
                        ))
                    }
                    StatusClass::NotFound => {
                        return if self.config.report_not_found {
                            Verdict::Emit(Outcome::with_status(url, code, Classification::NotFound))
                        } else {
                            Verdict::Suppressed
                        };
                    }
                    StatusClass::Other => {
                        return Verdict::Emit(Outcome::with_status(url, code, Classification::Other))
                    }
                    StatusClass::ServerError => {
                        last_code = Some(code);
                        last_error = format!("server error, HTTP status code {}", code);
                    }
                },
                Err(e) => {
                    last_code = None;
                    last_error = e.to_string();
                }
            }

            let delay = retry.backoff();
            debug!(
                "attempt {}/{} for {} failed: {}, backoff {:?}",
                attempt, MAX_ATTEMPTS, url, last_error, delay
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Verdict::Cancelled,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let message = format!("Error scanning {}: {}", path, last_error);
        Verdict::Emit(Outcome::error(url, last_code, message))
    }

    fn pick_user_agent(&self) -> &str {
        self.config
            .user_agents
            .choose(&mut rand::thread_rng())
            .map_or("", |it| it.as_str())
    }
}
