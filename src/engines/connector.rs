use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use log::debug;
use reqwest::{header::USER_AGENT, Client, ClientBuilder, Url};
use tokio::time::{timeout_at, Instant};

use crate::{
    engines::dns_cache::DnsCache,
    error::{ResolutionError, ScanError},
};

/// 发起一次 GET 探测，返回状态码
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str, user_agent: &str, timeout: Duration) -> Result<u16, ScanError>;
}

/// 整个扫描过程共用一个 client，连接池和 DNS 缓存都挂在上面
pub struct HttpConnector {
    client: Client,
    dns: DnsCache,
}

impl HttpConnector {
    pub fn new(dns: DnsCache) -> Result<Self, ScanError> {
        let client = ClientBuilder::new()
            .no_proxy()
            .pool_max_idle_per_host(100)
            .pool_idle_timeout(Duration::from_secs(90))
            .dns_resolver(Arc::new(dns.clone()))
            .build()
            .map_err(|e| ScanError::Config(format!("failed to build http client: {}", e)))?;
        Ok(Self { client, dns })
    }
}

#[async_trait]
impl Fetch for HttpConnector {
    async fn fetch(&self, url: &str, user_agent: &str, timeout: Duration) -> Result<u16, ScanError> {
        let parsed = Url::parse(url).map_err(|e| ScanError::Request(format!("bad url {}: {}", url, e)))?;
        // 解析、请求、读 body 共用一个截止时间
        let deadline = Instant::now() + timeout;

        // 先走缓存解析，这样解析失败和请求失败能区分开
        // IP 形式的 host 不需要解析
        if let Some(host) = parsed.domain() {
            timeout_at(deadline, self.dns.resolve(host))
                .await
                .map_err(|_| ResolutionError::new(host, format!("timed out after {:?}", timeout)))??;
        }

        let resp = timeout_at(
            deadline,
            self.client.get(parsed).header(USER_AGENT, user_agent).send(),
        )
        .await
        .map_err(|_| ScanError::Request(format!("timed out after {:?}", timeout)))??;
        let code = resp.status().as_u16();

        // 读完 body，连接才能回到连接池
        match timeout_at(deadline, resp.bytes()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => debug!("drain body of {} failed: {:?}", url, e),
            Err(_) => debug!("drain body of {} timed out", url),
        }
        Ok(code)
    }
}
