use std::sync::Arc;

use async_channel::Sender;
use log::{info, warn};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    context::{Outcome, RunSummary, ScannerConfig},
    engines::{
        connector::Fetch,
        prober::Prober,
        worker::{worker, WorkerStats},
    },
    error::ScanError,
};

/// 负责启动 worker、投递任务、等待结束
pub struct Scanner {
    config: Arc<ScannerConfig>,
    prober: Arc<Prober>,
    cancel: CancellationToken,
}

impl Scanner {
    pub fn new(config: Arc<ScannerConfig>, connector: Arc<dyn Fetch>) -> Self {
        let prober = Arc::new(Prober::new(config.clone(), connector));
        Self {
            config,
            prober,
            cancel: CancellationToken::new(),
        }
    }

    /// 触发后所有 worker 在下一个挂起点放弃当前任务并退出
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 按顺序投递所有 path，等所有任务结束后才关闭结果通道。
    ///
    /// 任务队列容量等于 worker 数量，worker 全忙时投递会阻塞，不会丢任务。
    pub async fn run(
        &self,
        paths: Vec<String>,
        result_channel: Sender<Outcome>,
    ) -> Result<RunSummary, ScanError> {
        let count = paths.len();
        let concurrent = self.config.concurrent.max(1);
        let (task_tx, task_rx) = async_channel::bounded::<String>(concurrent);

        // 启动 worker
        let mut workers = Vec::with_capacity(concurrent);
        for idx in 0..concurrent {
            workers.push(tokio::spawn(worker(
                task_rx.clone(),
                result_channel.clone(),
                idx,
                self.prober.clone(),
                self.cancel.clone(),
            )));
        }
        drop(task_rx);

        let start = Instant::now();
        for path in paths {
            let sent = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => false,
                sent = task_tx.send(path) => sent.is_ok(),
            };
            if !sent {
                warn!("submission stopped, remaining paths are skipped");
                break;
            }
        }
        // 关闭任务队列，worker 取完剩余任务后退出
        drop(task_tx);

        let mut stats = WorkerStats::default();
        let mut failure = None;
        for h in workers {
            match h.await {
                Ok(s) => stats += s,
                Err(e) => failure = Some(ScanError::Worker(e.to_string())),
            }
        }
        let elapsed = start.elapsed();

        // 所有 worker 都结束了，结果通道在这里关闭
        drop(result_channel);

        if let Some(e) = failure {
            return Err(e);
        }

        // 没出队的任务也算取消
        let unstarted = count - stats.emitted - stats.suppressed - stats.dropped - stats.cancelled;
        let summary = RunSummary {
            count,
            emitted: stats.emitted,
            suppressed: stats.suppressed,
            dropped: stats.dropped,
            cancelled: stats.cancelled + unstarted,
            elapsed,
        };
        if summary.dropped > 0 {
            warn!("{} outcomes were dropped, result channel closed early", summary.dropped);
        }
        info!(
            "Checked {} URLs in {:?} using {} workers ({} reported, {} suppressed, {} cancelled, {} interrupted)",
            summary.count,
            summary.elapsed,
            concurrent,
            summary.emitted,
            summary.suppressed,
            summary.cancelled,
            stats.cancelled
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        net::{IpAddr, Ipv4Addr},
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    use async_trait::async_trait;
    use tokio::time::Instant;
    use wiremock::{matchers::path, Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::{
        context::Classification,
        engines::{
            connector::{tests::ScriptedConnector, HttpConnector},
            dns_cache::{tests::StaticLookup, DnsCache},
        },
    };

    /// 每次请求固定耗时，并记录同时在途的最大请求数
    struct GaugedConnector {
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        total: AtomicUsize,
    }

    impl GaugedConnector {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                total: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Fetch for GaugedConnector {
        async fn fetch(&self, _url: &str, _ua: &str, _timeout: Duration) -> Result<u16, ScanError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.total.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(200)
        }
    }

    fn config(base: &str, concurrent: usize) -> Arc<ScannerConfig> {
        Arc::new(ScannerConfig {
            base_url: base.into(),
            concurrent,
            timeout: Duration::from_secs(5),
            adaptive_delay: Duration::from_millis(10),
            ..Default::default()
        })
    }

    fn paths(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("/p{}", i)).collect()
    }

    async fn run_and_collect(scanner: &Scanner, paths: Vec<String>) -> (RunSummary, Vec<Outcome>) {
        let (tx, rx) = async_channel::unbounded();
        let summary = scanner.run(paths, tx).await.unwrap();
        let mut outcomes = vec![];
        while let Ok(outcome) = rx.recv().await {
            outcomes.push(outcome);
        }
        (summary, outcomes)
    }

    #[tokio::test(start_paused = true)]
    async fn every_path_yields_exactly_one_terminal_state() {
        let mut connector = ScriptedConnector::new(Some(200));
        for i in 0..30 {
            let url = format!("http://test.local/p{}", i);
            connector = match i % 3 {
                0 => connector.script(&url, vec![Ok(404)]),
                1 => connector.script(&url, vec![Err(ScanError::Request("reset".into())), Ok(200)]),
                _ => connector,
            };
        }
        let scanner = Scanner::new(config("http://test.local", 4), Arc::new(connector));

        let (summary, outcomes) = run_and_collect(&scanner, paths(30)).await;
        assert_eq!(summary.count, 30);
        assert_eq!(summary.suppressed, 10);
        assert_eq!(summary.emitted, 20);
        assert_eq!(summary.cancelled, 0);
        assert_eq!(outcomes.len(), summary.emitted);

        let mut urls = outcomes.iter().map(|o| o.url.clone()).collect::<Vec<_>>();
        urls.sort();
        urls.dedup();
        assert_eq!(urls.len(), 20);
        assert!(outcomes.iter().all(|o| o.classification == Classification::Found));
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_requests_never_exceed_concurrency() {
        let connector = Arc::new(GaugedConnector::new(Duration::from_millis(20)));
        let scanner = Scanner::new(config("http://test.local", 3), connector.clone());

        let (summary, outcomes) = run_and_collect(&scanner, paths(25)).await;
        assert_eq!(outcomes.len(), 25);
        assert_eq!(summary.emitted, 25);
        assert_eq!(connector.total.load(Ordering::SeqCst), 25);
        let peak = connector.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak in flight {}", peak);
        assert!(peak >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn single_worker_serializes_execution() {
        let connector = Arc::new(GaugedConnector::new(Duration::from_millis(50)));
        let scanner = Scanner::new(config("http://test.local", 1), connector.clone());

        let start = Instant::now();
        let (summary, _) = run_and_collect(&scanner, paths(5)).await;
        assert!(start.elapsed() >= Duration::from_millis(250));
        assert!(summary.elapsed >= Duration::from_millis(250));
        assert_eq!(connector.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_the_run() {
        let connector = Arc::new(GaugedConnector::new(Duration::from_secs(3600)));
        let scanner = Scanner::new(config("http://test.local", 2), connector.clone());

        let cancel = scanner.cancel_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        });

        let (summary, outcomes) = run_and_collect(&scanner, paths(10)).await;
        assert!(outcomes.is_empty());
        assert_eq!(summary.count, 10);
        assert_eq!(summary.cancelled, 10);
        assert!(summary.elapsed < Duration::from_secs(3600));
        assert_eq!(connector.total.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancelled_before_run_does_nothing() {
        let connector = Arc::new(ScriptedConnector::new(Some(200)));
        let scanner = Scanner::new(config("http://test.local", 4), connector.clone());
        scanner.cancel_token().cancel();

        let (summary, outcomes) = run_and_collect(&scanner, paths(20)).await;
        assert!(outcomes.is_empty());
        assert!(connector.calls.lock().unwrap().is_empty());
        assert_eq!(summary.count, 20);
        assert_eq!(summary.emitted, 0);
        assert_eq!(summary.cancelled, 20);
    }

    #[tokio::test]
    async fn closed_result_channel_counts_dropped() {
        let scanner = Scanner::new(
            config("http://test.local", 2),
            Arc::new(ScriptedConnector::new(Some(200))),
        );
        let (tx, rx) = async_channel::unbounded();
        drop(rx);

        let summary = scanner.run(paths(6), tx).await.unwrap();
        assert_eq!(summary.emitted, 0);
        assert_eq!(summary.dropped, 6);
        assert_eq!(summary.cancelled, 0);
    }

    #[tokio::test]
    async fn empty_path_list_completes() {
        let scanner = Scanner::new(
            config("http://test.local", 4),
            Arc::new(ScriptedConnector::new(Some(200))),
        );
        let (summary, outcomes) = run_and_collect(&scanner, vec![]).await;
        assert_eq!(summary.count, 0);
        assert!(outcomes.is_empty());
    }

    async fn mock_target() -> (MockServer, Arc<ScannerConfig>, Arc<HttpConnector>) {
        let server = MockServer::start().await;
        Mock::given(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(path("/login"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;
        Mock::given(path("/broken"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(path("/admin"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(path("/secret"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let lookup = Arc::new(StaticLookup::new(&[(
            "test.local",
            IpAddr::V4(Ipv4Addr::LOCALHOST),
        )]));
        let connector = Arc::new(HttpConnector::new(DnsCache::new(lookup)).unwrap());
        let base = format!("http://test.local:{}", server.address().port());
        (server, config(&base, 2), connector)
    }

    fn classify(outcomes: &[Outcome]) -> HashMap<String, (Option<u16>, Classification)> {
        outcomes
            .iter()
            .map(|o| (o.url.clone(), (o.status_code, o.classification)))
            .collect()
    }

    #[tokio::test]
    async fn robots_found_and_not_found_suppressed() {
        let (server, config, connector) = mock_target().await;
        let base = config.base_url.clone();
        let scanner = Scanner::new(config, connector);

        let input = vec!["/admin".into(), "/robots.txt".into(), "/secret".into()];
        let (summary, outcomes) = run_and_collect(&scanner, input).await;

        assert_eq!(summary.count, 3);
        assert_eq!(summary.suppressed, 2);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].url, format!("{}/robots.txt", base));
        assert_eq!(outcomes[0].classification, Classification::Found);
        drop(server);
    }

    #[tokio::test]
    async fn rate_limited_login_is_requested_once() {
        let server = MockServer::start().await;
        Mock::given(path("/login"))
            .respond_with(ResponseTemplate::new(429))
            .expect(1)
            .mount(&server)
            .await;
        let connector = Arc::new(HttpConnector::new(DnsCache::new(Arc::new(StaticLookup::new(&[])))).unwrap());
        let scanner = Scanner::new(config(&server.uri(), 2), connector);

        let (_, outcomes) = run_and_collect(&scanner, vec!["/login".into()]).await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].classification, Classification::RateLimited);
        assert_eq!(outcomes[0].status_code, Some(429));
    }

    #[tokio::test]
    async fn repeated_runs_classify_identically() {
        let (_server, config, connector) = mock_target().await;
        let input: Vec<String> = ["/admin", "/robots.txt", "/secret", "/login", "/broken"]
            .iter()
            .map(|&it| it.to_owned())
            .collect();

        let first = run_and_collect(&Scanner::new(config.clone(), connector.clone()), input.clone()).await;
        let second = run_and_collect(&Scanner::new(config, connector), input).await;

        assert_eq!(first.0.emitted, 3);
        assert_eq!(classify(&first.1), classify(&second.1));
        let broken = classify(&first.1)
            .into_iter()
            .find(|(url, _)| url.ends_with("/broken"))
            .map(|(_, v)| v);
        assert_eq!(broken, Some((Some(500), Classification::Error)));
    }
}
