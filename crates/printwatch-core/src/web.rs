use std::time::Duration;

use tracing::debug;

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Checks whether the printer serves a management UI over HTTP or HTTPS.
#[derive(Debug, Clone)]
pub struct WebInterfaceProbe {
    client: reqwest::Client,
}

impl WebInterfaceProbe {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self { client })
    }

    /// Any response below 500 counts as "available". Never fails.
    pub async fn available(&self, host: &str) -> bool {
        for scheme in ["http", "https"] {
            let url = format!("{scheme}://{host}");
            match self.client.get(&url).send().await {
                Ok(response) if response.status().as_u16() < 500 => return true,
                Ok(response) => {
                    debug!(%url, status = response.status().as_u16(), "web interface returned server error");
                }
                Err(err) => {
                    debug!(%url, error = %err, "web interface probe failed");
                }
            }
        }
        false
    }
}
