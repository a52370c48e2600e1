//! Test network faucet client
//!
//! POSTs `{address, amount?}` to a faucet endpoint. Faucets differ in what
//! they send back, so the response is parsed leniently.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::common::SyncError;

#[derive(Debug, Serialize)]
struct FaucetRequest<'a> {
    address: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    amount: Option<u64>,
}

/// What the faucet told us
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FaucetReceipt {
    #[serde(default, alias = "tx_id", alias = "txId")]
    pub txid: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FaucetClient {
    client: reqwest::Client,
    url: String,
}

impl FaucetClient {
    pub fn new(url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
        }
    }

    /// Ask the faucet to send funds to `address`
    pub async fn request_funds(
        &self,
        address: &str,
        amount: Option<u64>,
    ) -> Result<FaucetReceipt, SyncError> {
        let response = self
            .client
            .post(&self.url)
            .json(&FaucetRequest { address, amount })
            .send()
            .await
            .map_err(|e| SyncError::faucet(format!("request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SyncError::faucet(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(SyncError::faucet(format!("{}: {}", status, body.trim())));
        }

        let receipt = parse_receipt(&body);
        info!(address, txid = ?receipt.txid, "faucet request accepted");
        Ok(receipt)
    }
}

fn parse_receipt(body: &str) -> FaucetReceipt {
    if let Ok(receipt) = serde_json::from_str::<FaucetReceipt>(body) {
        return receipt;
    }

    let text = body.trim();
    if text.len() == 64 && text.bytes().all(|b| b.is_ascii_hexdigit()) {
        FaucetReceipt {
            txid: Some(text.to_string()),
            message: None,
        }
    } else {
        FaucetReceipt {
            txid: None,
            message: (!text.is_empty()).then(|| text.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const TXID: &str = "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b";

    #[test]
    fn test_parse_receipt_variants() {
        let json = parse_receipt(&format!(r#"{{"txid":"{}"}}"#, TXID));
        assert_eq!(json.txid.as_deref(), Some(TXID));

        let camel = parse_receipt(&format!(r#"{{"txId":"{}","message":"sent"}}"#, TXID));
        assert_eq!(camel.txid.as_deref(), Some(TXID));
        assert_eq!(camel.message.as_deref(), Some("sent"));

        let bare = parse_receipt(&format!("{}\n", TXID));
        assert_eq!(bare.txid.as_deref(), Some(TXID));

        let text = parse_receipt("Payment queued");
        assert_eq!(text.txid, None);
        assert_eq!(text.message.as_deref(), Some("Payment queued"));

        assert_eq!(parse_receipt(""), FaucetReceipt::default());
    }

    /// Serve one HTTP response and hand back the raw request
    async fn serve_once(status_line: &'static str, body: String) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/api/faucet", listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                if n == 0 || request_complete(&request) {
                    break;
                }
            }

            let response = format!(
                "{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&request).to_string()
        });

        (url, server)
    }

    fn request_complete(request: &[u8]) -> bool {
        let text = String::from_utf8_lossy(request);
        let Some((head, body)) = text.split_once("\r\n\r\n") else {
            return false;
        };
        let length = head
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())?
            })
            .unwrap_or(0);
        body.len() >= length
    }

    #[tokio::test]
    async fn test_request_funds() {
        let (url, server) = serve_once("HTTP/1.1 200 OK", format!(r#"{{"txid":"{}"}}"#, TXID)).await;

        let receipt = FaucetClient::new(&url)
            .request_funds("tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx", Some(50_000))
            .await
            .unwrap();
        assert_eq!(receipt.txid.as_deref(), Some(TXID));

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/faucet"));
        assert!(request.contains(r#""address":"tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx""#));
        assert!(request.contains(r#""amount":50000"#));
    }

    #[tokio::test]
    async fn test_rejected_request() {
        let (url, server) =
            serve_once("HTTP/1.1 429 Too Many Requests", r#"{"error":"slow down"}"#.to_string()).await;

        let err = FaucetClient::new(&url)
            .request_funds("tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx", None)
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Faucet(_)));
        assert!(err.to_string().contains("429"));
        assert!(!server.await.unwrap().contains("amount"));
    }
}
