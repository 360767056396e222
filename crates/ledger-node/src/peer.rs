use ledger_core::consensus::{ChainResponse, PeerClient};
use ledger_core::PeerError;
use reqwest::Client;

/// Fetches `GET http://{peer}/chain` over HTTP.
#[derive(Clone, Debug, Default)]
pub struct HttpPeerClient {
    http: Client,
}

impl HttpPeerClient {
    pub fn new(http: Client) -> Self {
        Self { http }
    }
}

impl PeerClient for HttpPeerClient {
    async fn fetch_chain(&self, peer: &str) -> Result<ChainResponse, PeerError> {
        let response = self
            .http
            .get(format!("http://{peer}/chain"))
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    PeerError::Timeout { peer: peer.into() }
                } else {
                    PeerError::Unreachable {
                        peer: peer.into(),
                        reason: err.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PeerError::Status {
                peer: peer.into(),
                status: status.as_u16(),
            });
        }

        response
            .json::<ChainResponse>()
            .await
            .map_err(|err| PeerError::Malformed {
                peer: peer.into(),
                reason: err.to_string(),
            })
    }
}
