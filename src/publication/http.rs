//! HTTP/1.1 read surface
//!
//! Every `GET <name>` answers with the latest payload published under that
//! name. A few address-keyed endpoints read the claim/win history:
//!
//! - `/player-wins?address=`
//! - `/player-claims?address=`
//! - `/poolerVaults?address=`
//! - `/v5pooler?address=&claims=true` (or `wins=true`)
//!
//! The address is validated before any lookup. Lookup failures are logged and
//! answered with a generic 500; aggregation errors never reach this layer.
//!
//! Routing is a pure function of the request target (`ArtifactRouter::route`);
//! the listener only parses the request line and writes the response.

use super::{PublicationRegistry, JSON_CONTENT_TYPE};
use crate::aggregation::amounts::Amount;
use crate::aggregation::types::normalize_address;
use crate::history_store::{HistoryStoreError, PlayerLookup};
use reqwest::Url;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

pub const INVALID_ADDRESS: &str = "ERROR - Invalid or missing address";
const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";
const MAX_HEADER_LINES: usize = 100;
const READ_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl HttpResponse {
    fn json(body: String) -> Self {
        Self {
            status: 200,
            content_type: JSON_CONTENT_TYPE,
            body,
        }
    }

    fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: TEXT_CONTENT_TYPE,
            body: body.to_string(),
        }
    }

    fn reason(&self) -> &'static str {
        match self.status {
            200 => "OK",
            400 => "Bad Request",
            404 => "Not Found",
            405 => "Method Not Allowed",
            _ => "Internal Server Error",
        }
    }

    /// Full response bytes, connection closed after
    pub fn to_bytes(&self) -> Vec<u8> {
        let head = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nAccess-Control-Allow-Origin: *\r\nConnection: close\r\n\r\n",
            self.status,
            self.reason(),
            self.content_type,
            self.body.len()
        );
        let mut bytes = head.into_bytes();
        bytes.extend_from_slice(self.body.as_bytes());
        bytes
    }
}

/// `/v5pooler` row
#[derive(Debug, Clone, Serialize)]
pub struct PoolerPrize {
    pub network: u64,
    pub draw: u64,
    pub vault: String,
    pub tier: u8,
    pub index: u32,
    pub payout: Amount,
}

/// Percent-decoded query parameters; the first occurrence of a key wins
fn parse_query(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    if let Ok(url) = Url::parse(&format!("http://localhost/?{}", query)) {
        for (key, value) in url.query_pairs().into_owned() {
            params.entry(key).or_insert(value);
        }
    }
    params
}

pub struct ArtifactRouter {
    registry: Arc<PublicationRegistry>,
    players: Arc<dyn PlayerLookup>,
}

impl ArtifactRouter {
    pub fn new(registry: Arc<PublicationRegistry>, players: Arc<dyn PlayerLookup>) -> Self {
        Self { registry, players }
    }

    /// Answer a GET for `target` (path plus optional query)
    pub fn route(&self, target: &str) -> HttpResponse {
        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        let query = parse_query(query);

        match path {
            "/player-wins" | "/player-claims" | "/poolerVaults" | "/v5pooler" => {
                let Some(address) = query.get("address").and_then(|a| normalize_address(a)) else {
                    return HttpResponse::text(400, INVALID_ADDRESS);
                };
                self.lookup(path, &address, &query)
            }
            _ => match self.registry.serve(path) {
                Some(artifact) => HttpResponse {
                    status: 200,
                    content_type: artifact.content_type,
                    body: artifact.payload.clone(),
                },
                None => HttpResponse::text(404, "Not Found"),
            },
        }
    }

    fn lookup(&self, path: &str, address: &str, query: &HashMap<String, String>) -> HttpResponse {
        let result: Result<String, HistoryStoreError> = match path {
            "/player-wins" => self
                .players
                .player_wins(address)
                .and_then(|rows| Ok(serde_json::to_string(&rows)?)),
            "/player-claims" => self
                .players
                .player_claims(address)
                .and_then(|rows| Ok(serde_json::to_string(&rows)?)),
            "/poolerVaults" => self
                .players
                .pooler_vaults(address)
                .and_then(|rows| Ok(serde_json::to_string(&rows)?)),
            _ => {
                let wants = |flag: &str| query.get(flag).map(String::as_str) == Some("true");
                if !wants("claims") && !wants("wins") {
                    return HttpResponse::text(400, "ERROR - Specify claims=true or wins=true");
                }
                // Both views read claims: a claimed prize is the realized win
                self.players.player_claims(address).and_then(|rows| {
                    let prizes: Vec<PoolerPrize> = rows
                        .into_iter()
                        .map(|c| PoolerPrize {
                            network: c.network,
                            draw: c.draw,
                            vault: c.vault,
                            tier: c.tier,
                            index: c.index,
                            payout: c.payout,
                        })
                        .collect();
                    Ok(serde_json::to_string(&prizes)?)
                })
            }
        };

        match result {
            Ok(body) => HttpResponse::json(body),
            Err(e) => {
                log::error!("❌ Lookup {} for {} failed: {}", path, address, e);
                HttpResponse::text(500, "ERROR - Unable to fetch data")
            }
        }
    }
}

/// Bind the listener; failure here is fatal at startup
pub async fn bind_listener(addr: &str) -> std::io::Result<TcpListener> {
    let listener = TcpListener::bind(addr).await?;
    log::info!("🌐 HTTP listening on {}", listener.local_addr()?);
    Ok(listener)
}

/// Accept loop; one task per connection
pub async fn serve(listener: TcpListener, router: Arc<ArtifactRouter>) {
    loop {
        match listener.accept().await {
            Ok((stream, _peer)) => {
                let router = Arc::clone(&router);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, router).await {
                        log::debug!("HTTP connection error: {}", e);
                    }
                });
            }
            Err(e) => log::error!("❌ Failed to accept connection: {}", e),
        }
    }
}

async fn handle_connection(stream: TcpStream, router: Arc<ArtifactRouter>) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let mut request_line = String::new();
    match tokio::time::timeout(READ_TIMEOUT, reader.read_line(&mut request_line)).await {
        Ok(Ok(0)) | Err(_) => return Ok(()),
        Ok(result) => {
            result?;
        }
    }

    // Drain headers; the body of a GET is ignored
    for _ in 0..MAX_HEADER_LINES {
        let mut line = String::new();
        match tokio::time::timeout(READ_TIMEOUT, reader.read_line(&mut line)).await {
            Ok(Ok(0)) | Err(_) => break,
            Ok(Ok(_)) if line.trim().is_empty() => break,
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(e),
        }
    }

    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("");
    let target = parts.next().unwrap_or("/").to_string();

    let response = if method == "GET" {
        let router = Arc::clone(&router);
        // History lookups hit SQLite synchronously
        tokio::task::spawn_blocking(move || router.route(&target))
            .await
            .unwrap_or_else(|_| HttpResponse::text(500, "ERROR - Unable to fetch data"))
    } else {
        HttpResponse::text(405, "Method Not Allowed")
    };

    log::debug!("{} -> {}", request_line.trim(), response.status);
    writer.write_all(&response.to_bytes()).await?;
    writer.shutdown().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history_store::{PlayerClaim, PlayerWin, PoolerVault};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::AsyncReadExt;

    const ADDRESS: &str = "0x00000000000000000000000000000000000000aa";

    #[derive(Default)]
    struct CountingLookup {
        calls: AtomicUsize,
    }

    impl PlayerLookup for CountingLookup {
        fn player_wins(&self, _address: &str) -> Result<Vec<PlayerWin>, HistoryStoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        fn player_claims(&self, address: &str) -> Result<Vec<PlayerClaim>, HistoryStoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![PlayerClaim {
                network: 10,
                hash: "0xh".to_string(),
                draw: 7,
                vault: "0xv".to_string(),
                tier: 1,
                index: 3,
                payout: Amount::from(500),
                prize_pool: address.to_string(),
            }])
        }

        fn pooler_vaults(&self, _address: &str) -> Result<Vec<PoolerVault>, HistoryStoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(HistoryStoreError::Poisoned)
        }
    }

    fn router() -> (ArtifactRouter, Arc<CountingLookup>, Arc<PublicationRegistry>) {
        let registry = Arc::new(PublicationRegistry::new());
        let lookup = Arc::new(CountingLookup::default());
        let router = ArtifactRouter::new(Arc::clone(&registry), lookup.clone());
        (router, lookup, registry)
    }

    #[test]
    fn test_invalid_address_rejected_before_lookup() {
        let (router, lookup, _) = router();

        for target in [
            "/player-wins?address=not-an-address",
            "/player-claims",
            "/poolerVaults?address=",
            "/v5pooler?address=0x1234&claims=true",
        ] {
            let response = router.route(target);
            assert_eq!(response.status, 400, "{}", target);
            assert_eq!(response.body, INVALID_ADDRESS);
        }
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_valid_address_returns_list() {
        let (router, lookup, _) = router();

        let wins = router.route(&format!("/player-wins?address={}", ADDRESS));
        assert_eq!(wins.status, 200);
        assert_eq!(wins.body, "[]");

        let prizes = router.route(&format!("/v5pooler?address={}&wins=true", ADDRESS.to_uppercase().replace("0X", "0x")));
        assert_eq!(prizes.status, 200);
        let rows: serde_json::Value = serde_json::from_str(&prizes.body).unwrap();
        assert_eq!(rows[0]["payout"], "500");
        assert!(rows[0].get("hash").is_none());
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_percent_encoded_query_decoded() {
        let (router, lookup, _) = router();

        let encoded = format!("0x{}aa", "%30".repeat(38));
        let wins = router.route(&format!("/player-wins?address={}", encoded));
        assert_eq!(wins.status, 200);

        let prizes = router.route(&format!("/v5pooler?address={}&claims=%74rue", ADDRESS));
        assert_eq!(prizes.status, 200);
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_v5pooler_requires_a_view_flag() {
        let (router, lookup, _) = router();
        let response = router.route(&format!("/v5pooler?address={}", ADDRESS));
        assert_eq!(response.status, 400);
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_lookup_failure_is_generic_500() {
        let (router, _, _) = router();
        let response = router.route(&format!("/poolerVaults?address={}", ADDRESS));
        assert_eq!(response.status, 500);
        assert!(!response.body.contains("poisoned"));
    }

    #[test]
    fn test_artifacts_served_verbatim() {
        let (router, _, registry) = router();
        registry.publish("/10-0xabc-history", "[{\"drawId\":1}]".to_string());

        let response = router.route("/10-0xabc-history?cachebust=1");
        assert_eq!(response.status, 200);
        assert_eq!(response.content_type, JSON_CONTENT_TYPE);
        assert_eq!(response.body, "[{\"drawId\":1}]");
        assert_eq!(router.route("/nope").status, 404);
    }

    #[test]
    fn test_response_headers() {
        let bytes = HttpResponse::json("[]".to_string()).to_bytes();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Length: 2\r\n"));
        assert!(text.contains("Access-Control-Allow-Origin: *\r\n"));
        assert!(text.ends_with("\r\n\r\n[]"));
    }

    #[tokio::test]
    async fn test_listener_round_trip() {
        let (router, _, registry) = router();
        registry.publish("/prices", "{\"pooltogether\":0.5}".to_string());

        let listener = bind_listener("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, Arc::new(router)));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /prices HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();

        assert!(raw.starts_with("HTTP/1.1 200 OK"));
        assert!(raw.ends_with("{\"pooltogether\":0.5}"));
    }
}
