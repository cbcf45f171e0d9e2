// src/observer/http.rs
//! Browserless content session: fetches the page over HTTP and diffs text blocks
//! between refreshes to synthesize insertion events.

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use regex::Regex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::session::{ContentSession, SessionError};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct HttpSessionConfig {
    pub base_url: String,
    pub user_agent: String,
    pub request_timeout: Duration,
    pub refresh_interval: Duration,
    /// Consecutive failed fetches before the session reports itself disconnected.
    pub max_failures: u32,
}

impl Default for HttpSessionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://bandit.camp".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout: Duration::from_secs(30),
            refresh_interval: Duration::from_secs(5),
            max_failures: 10,
        }
    }
}

/// Text view of one fetched page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageSnapshot {
    pub blocks: Vec<String>,
    pub elements: Vec<String>,
}

impl PageSnapshot {
    pub fn body_text(&self) -> String {
        self.blocks.join("\n")
    }

    /// Blocks of `self` absent from `prev`, joined as one inserted fragment.
    pub fn inserted_since(&self, prev: &PageSnapshot) -> Option<String> {
        let before: HashSet<&str> = prev.blocks.iter().map(String::as_str).collect();
        let added: Vec<&str> = self
            .blocks
            .iter()
            .map(String::as_str)
            .filter(|b| !before.contains(b))
            .collect();
        (!added.is_empty()).then(|| added.join("\n"))
    }
}

fn re(cell: &'static OnceCell<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static html regex compiles"))
}

fn strip_tags_to_lines(html: &str) -> String {
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    re(&RE_TAGS, r"(?s)<[^>]+>").replace_all(html, "\n").into_owned()
}

fn clean_text(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse raw HTML into visible text blocks and interactive element texts.
pub fn parse_page(html: &str) -> PageSnapshot {
    static RE_HIDDEN: OnceCell<Regex> = OnceCell::new();
    static RE_BUTTON: OnceCell<Regex> = OnceCell::new();
    static RE_LINK: OnceCell<Regex> = OnceCell::new();
    static RE_ROLE: OnceCell<Regex> = OnceCell::new();

    let visible = re(
        &RE_HIDDEN,
        r"(?is)<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>|<noscript\b[^>]*>.*?</noscript\s*>|<!--.*?-->",
    )
    .replace_all(html, "\n");

    let blocks = strip_tags_to_lines(&visible)
        .lines()
        .map(clean_text)
        .filter(|b| !b.is_empty())
        .collect();

    let mut elements = Vec::new();
    for cell_re in [
        re(&RE_BUTTON, r"(?is)<button\b[^>]*>(.*?)</button\s*>"),
        re(&RE_LINK, r"(?is)<a\b[^>]*>(.*?)</a\s*>"),
        re(
            &RE_ROLE,
            r#"(?is)<(?:div|span|li)\b[^>]*\brole\s*=\s*["']button["'][^>]*>(.*?)</(?:div|span|li)\s*>"#,
        ),
    ] {
        for caps in cell_re.captures_iter(&visible) {
            if let Some(inner) = caps.get(1) {
                let text = clean_text(&strip_tags_to_lines(inner.as_str()));
                if !text.is_empty() {
                    elements.push(text);
                }
            }
        }
    }

    PageSnapshot { blocks, elements }
}

struct Shared {
    cfg: HttpSessionConfig,
    client: reqwest::Client,
    snapshot: Mutex<PageSnapshot>,
    inserts: Mutex<Option<mpsc::Sender<String>>>,
    connected: watch::Sender<bool>,
    failures: AtomicU32,
}

impl Shared {
    async fn fetch(&self) -> Result<PageSnapshot> {
        let rsp = self
            .client
            .get(&self.cfg.base_url)
            .send()
            .await
            .context("page fetch")?
            .error_for_status()
            .context("page non-2xx")?;
        let html = rsp.text().await.context("page body")?;
        Ok(parse_page(&html))
    }

    /// Fetch, record the outcome for liveness, and swap in the new snapshot.
    async fn refresh(&self) -> Result<PageSnapshot, SessionError> {
        if !*self.connected.borrow() {
            return Err(SessionError::Disconnected);
        }
        match self.fetch().await {
            Ok(next) => {
                self.failures.store(0, Ordering::SeqCst);
                *self.snapshot.lock() = next.clone();
                Ok(next)
            }
            Err(e) => {
                let failures = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
                if failures >= self.cfg.max_failures {
                    error!(
                        target: "observer",
                        failures,
                        url = %self.cfg.base_url,
                        "page unreachable; marking session disconnected"
                    );
                    self.connected.send_replace(false);
                }
                Err(SessionError::Query(format!("{e:#}")))
            }
        }
    }
}

pub struct HttpPageSession {
    shared: Arc<Shared>,
    refresher: Mutex<Option<JoinHandle<()>>>,
}

impl HttpPageSession {
    /// Build the client, load the page once and start the refresh task.
    /// A failed first load is only a warning; the refresh task keeps trying.
    pub async fn connect(cfg: HttpSessionConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .timeout(cfg.request_timeout)
            .build()
            .context("building http client")?;

        let (connected, _) = watch::channel(true);
        let shared = Arc::new(Shared {
            cfg,
            client,
            snapshot: Mutex::new(PageSnapshot::default()),
            inserts: Mutex::new(None),
            connected,
            failures: AtomicU32::new(0),
        });

        match shared.refresh().await {
            Ok(page) => info!(
                target: "observer",
                url = %shared.cfg.base_url,
                blocks = page.blocks.len(),
                "page loaded"
            ),
            Err(e) => warn!(
                target: "observer",
                url = %shared.cfg.base_url,
                error = %e,
                "initial page load failed; continuing"
            ),
        }

        let refresher = tokio::spawn(refresh_loop(shared.clone()));
        Ok(Self {
            shared,
            refresher: Mutex::new(Some(refresher)),
        })
    }
}

async fn refresh_loop(shared: Arc<Shared>) {
    let every = shared.cfg.refresh_interval;
    let mut ticker = interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut connected = shared.connected.subscribe();
    // The diff baseline is private to this loop so poll-path fetches cannot swallow insertions.
    let mut baseline: Option<PageSnapshot> = {
        let first = shared.snapshot.lock().clone();
        (!first.blocks.is_empty()).then_some(first)
    };

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = connected.changed() => {}
        }
        if !*connected.borrow_and_update() {
            debug!(target: "observer", "refresh loop stopping: disconnected");
            break;
        }

        let next = match shared.refresh().await {
            Ok(page) => page,
            Err(e) => {
                debug!(target: "observer", error = %e, "refresh failed");
                continue;
            }
        };
        // The first successful load is the baseline, not an insertion.
        let Some(prev) = baseline.replace(next.clone()) else {
            continue;
        };
        let Some(fragment) = next.inserted_since(&prev) else {
            continue;
        };
        let tx = shared.inserts.lock().clone();
        if let Some(tx) = tx {
            if tx.send(fragment).await.is_err() {
                shared.inserts.lock().take();
            }
        }
    }
}

#[async_trait::async_trait]
impl ContentSession for HttpPageSession {
    async fn subscribe_insertions(&self) -> Result<mpsc::Receiver<String>, SessionError> {
        if !*self.shared.connected.borrow() {
            return Err(SessionError::Disconnected);
        }
        let (tx, rx) = mpsc::channel(32);
        *self.shared.inserts.lock() = Some(tx);
        Ok(rx)
    }

    /// Fresh fetch of the page; also refreshes what `interactive_texts` returns.
    async fn body_text(&self) -> Result<String, SessionError> {
        let page = self.shared.refresh().await?;
        Ok(page.body_text())
    }

    /// Elements from the most recent fetch.
    async fn interactive_texts(&self) -> Result<Vec<String>, SessionError> {
        Ok(self.shared.snapshot.lock().elements.clone())
    }

    fn current_url(&self) -> String {
        self.shared.cfg.base_url.clone()
    }

    fn connection(&self) -> watch::Receiver<bool> {
        self.shared.connected.subscribe()
    }

    async fn close(&self) -> Result<(), SessionError> {
        if let Some(task) = self.refresher.lock().take() {
            task.abort();
        }
        self.shared.inserts.lock().take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Local one-page server. The served HTML can be swapped between requests.
    async fn serve(page: Arc<Mutex<String>>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                let page = page.clone();
                tokio::spawn(async move {
                    let mut req = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !req.windows(4).any(|w| w == b"\r\n\r\n") {
                        match sock.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => req.extend_from_slice(&buf[..n]),
                        }
                    }
                    let body = page.lock().clone();
                    let rsp = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: text/html; charset=utf-8\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = sock.write_all(rsp.as_bytes()).await;
                    let _ = sock.shutdown().await;
                });
            }
        });
        format!("http://{addr}/")
    }

    fn session_cfg(base_url: impl Into<String>) -> HttpSessionConfig {
        HttpSessionConfig {
            base_url: base_url.into(),
            request_timeout: Duration::from_secs(2),
            refresh_interval: Duration::from_millis(50),
            max_failures: 3,
            ..HttpSessionConfig::default()
        }
    }

    #[tokio::test]
    async fn refresh_publishes_new_blocks_as_one_fragment() {
        let page = Arc::new(Mutex::new("<p>Welcome</p><p>Jackpot</p>".to_string()));
        let url = serve(page.clone()).await;
        let session = HttpPageSession::connect(session_cfg(url)).await.unwrap();
        let mut inserts = session.subscribe_insertions().await.unwrap();

        *page.lock() = "<p>Welcome</p><div>Join now</div><p>Share 3</p><p>Jackpot</p>".to_string();
        let fragment = tokio::time::timeout(Duration::from_secs(5), inserts.recv())
            .await
            .expect("refresh tick within 5s")
            .expect("insertion channel open");
        assert_eq!(fragment, "Join now\nShare 3");

        // poll-path fetch sees the same page
        assert!(session.body_text().await.unwrap().contains("Join now"));
        assert!(*session.connection().borrow());
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn consecutive_fetch_failures_mark_session_disconnected() {
        let session = HttpPageSession::connect(session_cfg("http://127.0.0.1:1/"))
            .await
            .unwrap();
        let mut conn = session.connection();
        tokio::time::timeout(Duration::from_secs(5), conn.wait_for(|up| !*up))
            .await
            .expect("disconnect within 5s")
            .unwrap();
        assert!(matches!(
            session.body_text().await,
            Err(SessionError::Disconnected)
        ));
        session.close().await.unwrap();
    }

    const PAGE: &str = r#"
        <html><head><style>.x { color: red }</style><script>var rain = "join now";</script></head>
        <body>
          <div class="banner">Join now to get free scrap<br>based on your play amount</div>
          <p>Share&nbsp;25,00 scrap</p>
          <button class="btn"><span>Join</span> rain</button>
          <a href="/rain">Rain &amp; more</a>
          <div role="button">Claim</div>
          <!-- <p>hidden</p> -->
        </body></html>"#;

    #[test]
    fn parse_strips_scripts_styles_and_comments() {
        let page = parse_page(PAGE);
        let body = page.body_text();
        assert!(!body.contains("color: red"));
        assert!(!body.contains("var rain"));
        assert!(!body.contains("hidden"));
        assert!(body.contains("Share 25,00 scrap"));
        assert!(body.contains("Join now to get free scrap\nbased on your play amount"));
    }

    #[test]
    fn parse_collects_interactive_elements() {
        let page = parse_page(PAGE);
        assert_eq!(
            page.elements,
            vec![
                "Join rain".to_string(),
                "Rain & more".to_string(),
                "Claim".to_string()
            ]
        );
    }

    #[test]
    fn inserted_since_reports_only_new_blocks() {
        let before = parse_page("<p>Welcome</p><p>Jackpot</p>");
        let after = parse_page("<p>Welcome</p><div>Join now</div><p>Share 3</p><p>Jackpot</p>");
        assert_eq!(
            after.inserted_since(&before).as_deref(),
            Some("Join now\nShare 3")
        );
        assert!(before.inserted_since(&before).is_none());
    }
}
