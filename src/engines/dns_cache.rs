use std::{
    collections::HashMap,
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use hyper::client::connect::dns::Name;
use log::{debug, warn};
use reqwest::dns::{Addrs, Resolve, Resolving};
use tokio::{sync::RwLock, time::Instant};
use trust_dns_resolver::{
    config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts},
    error::ResolveError,
    TokioAsyncResolver,
};

use crate::error::ResolutionError;

pub const DEFAULT_FRESHNESS: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_CAPACITY: usize = 1024;

/// 真正执行域名解析的后端
#[async_trait]
pub trait Lookup: Send + Sync {
    async fn lookup(&self, host: &str) -> Result<IpAddr, ResolutionError>;
}

/// 基于 trust-dns 的解析器
pub struct SystemLookup {
    resolver: TokioAsyncResolver,
}

impl SystemLookup {
    /// nameserver 为空时使用系统配置
    pub fn new(nameservers: &[String]) -> Result<Self, ResolveError> {
        let resolver = if nameservers.is_empty() {
            TokioAsyncResolver::tokio_from_system_conf()?
        } else {
            TokioAsyncResolver::tokio(build_resolver_config(nameservers), ResolverOpts::default())?
        };
        Ok(Self { resolver })
    }
}

/// 使用用户提供的 NS IP 构建配置
fn build_resolver_config(nameservers: &[String]) -> ResolverConfig {
    let mut resolve_config = ResolverConfig::new();
    for ns_ip in nameservers {
        match format!("{}:53", ns_ip).parse::<SocketAddr>() {
            Ok(ip) => resolve_config.add_name_server(NameServerConfig::new(ip, Protocol::Udp)),
            Err(e) => {
                warn!("Invalid nameserver IP {}, error: {:?}, skip.", ns_ip, e);
                continue;
            }
        };
    }
    if resolve_config.name_servers().is_empty() {
        warn!("No valid nameserver given, fall back to Google nameserver.");
        return ResolverConfig::google();
    }
    resolve_config
}

#[async_trait]
impl Lookup for SystemLookup {
    async fn lookup(&self, host: &str) -> Result<IpAddr, ResolutionError> {
        let resp = self
            .resolver
            .lookup_ip(host)
            .await
            .map_err(|e| ResolutionError::new(host, e))?;
        resp.iter()
            .next()
            .ok_or_else(|| ResolutionError::new(host, "no address returned"))
    }
}

#[derive(Debug, Clone, Copy)]
struct DnsCacheEntry {
    ip: IpAddr,
    resolved_at: Instant,
}

/// 所有 worker 共享的 DNS 缓存
///
/// 读走共享锁，写走独占锁。同一个 host 的并发 miss 可能各自解析一次，
/// 最后写入的结果生效。解析失败不会写入缓存。
#[derive(Clone)]
pub struct DnsCache {
    entries: Arc<RwLock<HashMap<String, DnsCacheEntry>>>,
    backend: Arc<dyn Lookup>,
    freshness: Duration,
    capacity: usize,
}

impl DnsCache {
    pub fn new(backend: Arc<dyn Lookup>) -> Self {
        Self::with_policy(backend, DEFAULT_FRESHNESS, DEFAULT_CAPACITY)
    }

    pub fn with_policy(backend: Arc<dyn Lookup>, freshness: Duration, capacity: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            backend,
            freshness,
            capacity: capacity.max(1),
        }
    }

    pub async fn resolve(&self, host: &str) -> Result<IpAddr, ResolutionError> {
        if let Some(entry) = self.entries.read().await.get(host) {
            if entry.resolved_at.elapsed() < self.freshness {
                return Ok(entry.ip);
            }
        }

        // 解析过程中不持有锁
        let ip = self.backend.lookup(host).await?;
        debug!("resolved {} -> {}", host, ip);

        let mut guard = self.entries.write().await;
        if !guard.contains_key(host) && guard.len() >= self.capacity {
            self.evict(&mut guard);
        }
        guard.insert(
            host.to_owned(),
            DnsCacheEntry {
                ip,
                resolved_at: Instant::now(),
            },
        );
        Ok(ip)
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// 先清理过期项，仍然满了就淘汰最早解析的一项
    fn evict(&self, entries: &mut HashMap<String, DnsCacheEntry>) {
        let freshness = self.freshness;
        entries.retain(|_, entry| entry.resolved_at.elapsed() < freshness);
        if entries.len() < self.capacity {
            return;
        }
        let oldest = entries
            .iter()
            .min_by_key(|(_, entry)| entry.resolved_at)
            .map(|(host, _)| host.clone());
        if let Some(host) = oldest {
            entries.remove(&host);
        }
    }
}

/// HTTP 连接池通过这里解析域名
impl Resolve for DnsCache {
    fn resolve(&self, name: Name) -> Resolving {
        let cache = self.clone();
        Box::pin(async move {
            let ip = cache
                .resolve(name.as_str())
                .await
                .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)?;
            // 端口由连接器根据 URL 重新设置
            let addrs: Addrs = Box::new(std::iter::once(SocketAddr::new(ip, 0)));
            Ok::<_, Box<dyn std::error::Error + Send + Sync>>(addrs)
        })
    }
}
