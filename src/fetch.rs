use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{StatusCode, Url};
use tokio::sync::{Mutex, OnceCell, Semaphore};
use tracing::{debug, info, warn};

use crate::parser::PageSource;
use crate::robots::RobotsPolicy;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; contact_scraper/0.1)";
const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 2000;

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub user_agent: String,
    /// Minimum spacing between two requests to the same host.
    pub delay: Duration,
    pub respect_robots: bool,
    pub concurrency: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        FetchOptions {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            delay: Duration::from_millis(500),
            respect_robots: true,
            concurrency: 4,
        }
    }
}

/// Per-origin robots.txt policies. Concurrent lookups for one origin share a
/// single load.
#[derive(Default)]
struct RobotsCache {
    cells: Mutex<HashMap<String, Arc<OnceCell<Arc<RobotsPolicy>>>>>,
}

impl RobotsCache {
    async fn get_or_load<F, Fut>(&self, origin: &str, load: F) -> Arc<RobotsPolicy>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RobotsPolicy>,
    {
        let cell = {
            let mut cells = self.cells.lock().await;
            Arc::clone(cells.entry(origin.to_string()).or_default())
        };
        let policy = cell.get_or_init(|| async move { Arc::new(load().await) }).await;
        Arc::clone(policy)
    }
}

/// Loads page sources from disk or over HTTP(S).
pub struct Fetcher {
    client: reqwest::Client,
    opts: FetchOptions,
    robots: RobotsCache,
    next_slot: Mutex<HashMap<String, Instant>>,
}

pub struct FetchResult {
    pub source: String,
    pub outcome: Result<PageSource>,
}

impl Fetcher {
    pub fn new(opts: FetchOptions) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));

        let client = reqwest::Client::builder()
            .user_agent(opts.user_agent.clone())
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Fetcher {
            client,
            opts,
            robots: RobotsCache::default(),
            next_slot: Mutex::new(HashMap::new()),
        })
    }

    /// Fetch one source: a local path, a `file://` URL or an http(s) URL.
    pub async fn get(&self, source: &str) -> Result<PageSource> {
        if let Some(path) = local_path(source) {
            return read_local(path).await;
        }

        let url = Url::parse(source).with_context(|| format!("Invalid URL `{}`", source))?;
        match url.scheme() {
            "http" | "https" => self.fetch_http(url).await,
            other => bail!("Unsupported URL scheme `{}`", other),
        }
    }

    async fn fetch_http(&self, url: Url) -> Result<PageSource> {
        if self.opts.respect_robots {
            let policy = self.robots_for(&url).await;
            let mut path = url.path().to_string();
            if let Some(query) = url.query() {
                path.push('?');
                path.push_str(query);
            }
            if !policy.is_allowed(&self.opts.user_agent, &path) {
                bail!("Blocked by robots.txt: {}", url);
            }
        }

        let mut attempt = 0;
        loop {
            self.wait_turn(&url).await;
            let response = self
                .client
                .get(url.clone())
                .send()
                .await
                .with_context(|| format!("GET {} failed", url))?;

            let status = response.status();
            if status.is_success() {
                let final_url = response.url().to_string();
                let html = response
                    .text()
                    .await
                    .with_context(|| format!("Failed to read body of {}", final_url))?;
                return Ok(PageSource { id: final_url, html });
            }

            if !is_retryable(status) || attempt == MAX_RETRIES {
                bail!("HTTP {} for {}", status, url);
            }

            let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
            warn!(
                "HTTP {} on {} (attempt {}/{}), backing off {:.1}s",
                status.as_u16(),
                url,
                attempt + 1,
                MAX_RETRIES,
                backoff.as_secs_f64()
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }

    /// robots.txt for the URL's origin, fetched once and cached.
    async fn robots_for(&self, url: &Url) -> Arc<RobotsPolicy> {
        let origin = url.origin().ascii_serialization();
        self.robots
            .get_or_load(&origin, || self.load_robots(url, &origin))
            .await
    }

    async fn load_robots(&self, url: &Url, origin: &str) -> RobotsPolicy {
        let robots_url = format!("{}/robots.txt", origin);
        self.wait_turn(url).await;
        match self.client.get(&robots_url).send().await {
            Ok(resp) if resp.status().is_success() => match resp.text().await {
                Ok(body) => RobotsPolicy::parse(&body),
                Err(e) => {
                    debug!("Failed to read {}: {}", robots_url, e);
                    RobotsPolicy::allow_all()
                }
            },
            Ok(resp) if matches!(resp.status(), StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
                RobotsPolicy::disallow_all()
            }
            Ok(_) => RobotsPolicy::allow_all(),
            Err(e) => {
                debug!("Failed to fetch {}: {}", robots_url, e);
                RobotsPolicy::allow_all()
            }
        }
    }

    /// Reserve the next request slot for the URL's host and sleep until it opens.
    async fn wait_turn(&self, url: &Url) {
        let host = url.host_str().unwrap_or_default().to_string();
        let wait = {
            let mut slots = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = slots.get(&host).map_or(now, |&t| t.max(now));
            slots.insert(host, slot + self.opts.delay);
            slot.saturating_duration_since(now)
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }
}

fn is_retryable(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503)
}

/// Local filesystem path for plain paths and `file://` URLs.
pub fn local_path(source: &str) -> Option<PathBuf> {
    if let Some(rest) = source.strip_prefix("file://") {
        Some(PathBuf::from(rest))
    } else if source.contains("://") {
        None
    } else {
        Some(PathBuf::from(source))
    }
}

async fn read_local(path: PathBuf) -> Result<PageSource> {
    let html = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let absolute = tokio::fs::canonicalize(&path)
        .await
        .with_context(|| format!("Failed to resolve {}", path.display()))?;
    Ok(PageSource {
        id: format!("file://{}", absolute.display()),
        html,
    })
}

/// Fetch all sources with bounded concurrency. Results come back in input order.
pub async fn fetch_all(fetcher: Arc<Fetcher>, sources: Vec<String>) -> Result<Vec<FetchResult>> {
    let semaphore = Arc::new(Semaphore::new(fetcher.opts.concurrency.max(1)));
    let total = sources.len();

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} fetched ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let mut handles = Vec::with_capacity(total);
    for source in sources {
        let fetcher = Arc::clone(&fetcher);
        let sem = Arc::clone(&semaphore);
        let pb = pb.clone();
        let task_source = source.clone();

        let handle = tokio::spawn(async move {
            let outcome = match sem.acquire().await {
                Ok(_permit) => fetcher.get(&task_source).await,
                Err(e) => Err(e.into()),
            };
            pb.inc(1);
            FetchResult {
                source: task_source,
                outcome,
            }
        });
        handles.push((source, handle));
    }

    let mut results = Vec::with_capacity(total);
    for (source, handle) in handles {
        let result = handle.await.unwrap_or_else(|e| FetchResult {
            source,
            outcome: Err(anyhow!("Fetch task failed: {}", e)),
        });
        results.push(result);
    }

    pb.finish_and_clear();
    let ok = results.iter().filter(|r| r.outcome.is_ok()).count();
    info!("Fetched {} sources ({} ok, {} failed)", total, ok, total - ok);

    Ok(results)
}

// ── Tests ──
