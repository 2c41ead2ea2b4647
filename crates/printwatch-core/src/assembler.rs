use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};

use crate::client::{ClientError, PrinterClient, Query};
use crate::error::CollectionError;
use crate::snapshot::{CoverStatus, PrinterData, Supply, Tray};
use crate::web::WebInterfaceProbe;

/// Runs every query of one refresh cycle concurrently and merges the replies.
/// Any failed query fails the whole cycle; there are no partial captures.
pub struct Assembler<C: PrinterClient> {
    client: C,
    host: String,
    query_timeout: Duration,
    web_probe: Option<WebInterfaceProbe>,
}

impl<C: PrinterClient> Assembler<C> {
    pub fn new(client: C, host: impl Into<String>, query_timeout: Duration) -> Self {
        Self {
            client,
            host: host.into(),
            query_timeout,
            web_probe: None,
        }
    }

    pub fn with_web_probe(mut self, probe: WebInterfaceProbe) -> Self {
        self.web_probe = Some(probe);
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub async fn assemble(&self) -> Result<PrinterData, CollectionError> {
        let queries = async {
            tokio::try_join!(
                self.query(Query::SystemInfo, self.client.system_info()),
                self.query(Query::DeviceInfo, self.client.device_info()),
                self.query(Query::CoverStatus, self.client.cover_status()),
                self.query(Query::Supplies, self.client.supplies()),
                self.query(Query::InputTrays, self.client.input_trays()),
                self.query(Query::DisplayText, self.client.display_text()),
                self.query(Query::PrinterErrors, self.client.printer_errors()),
            )
        };
        let probe = async { Ok::<_, CollectionError>(self.probe_web_interface().await) };

        let ((info, device_info, cover, supplies, trays, display_text, errors), web_interface_available) =
            tokio::try_join!(queries, probe)?;

        let (status, page_count) = device_info.into_parts();
        let supplies = unique_by_index(supplies, |s: &Supply| s.index, "supply");
        let input_trays = unique_by_index(
            trays.into_iter().map(Tray::from).collect(),
            |t: &Tray| t.index,
            "tray",
        );

        Ok(PrinterData {
            info,
            status,
            cover_status: CoverStatus { state: cover },
            page_count,
            supplies,
            input_trays,
            display_text,
            errors: errors.filter(|e| !e.trim().is_empty()),
            web_interface_available,
        })
    }

    async fn query<T>(
        &self,
        query: Query,
        call: impl Future<Output = Result<T, ClientError>>,
    ) -> Result<T, CollectionError> {
        match timeout(self.query_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(CollectionError { query, source }),
            Err(_) => {
                debug!(host = %self.host, %query, "query exceeded timeout");
                Err(CollectionError {
                    query,
                    source: ClientError::Timeout,
                })
            }
        }
    }

    async fn probe_web_interface(&self) -> bool {
        let Some(probe) = &self.web_probe else {
            return false;
        };
        match timeout(self.query_timeout, probe.available(&self.host)).await {
            Ok(available) => available,
            Err(_) => {
                debug!(host = %self.host, "web interface probe exceeded query timeout");
                false
            }
        }
    }
}

fn unique_by_index<T>(items: Vec<T>, index: impl Fn(&T) -> u32, what: &str) -> Vec<T> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| {
            let idx = index(item);
            let first = seen.insert(idx);
            if !first {
                warn!(index = idx, kind = what, "dropping duplicate index reported by device");
            }
            first
        })
        .collect()
}
