//! The single-shot currency service probe.
//!
//! Each iteration opens a fresh plaintext connection, asks the currency
//! service for its supported currencies, logs the answer and pauses for one
//! time unit. Nothing is retried.

use std::time::Duration;

use async_trait::async_trait;
use http::Uri;
use metrics::counter;
use tracing::{debug, info};

use crate::{
    clock::Clock,
    runner::Driver,
    target::currency::{self, CurrencyClient},
};

/// Errors produced by [`CurrencyProbe`].
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Connecting to or calling the currency service failed.
    #[error(transparent)]
    Currency(#[from] currency::Error),
    /// The response could not be rendered for the log.
    #[error("Could not render response: {0}")]
    Render(#[from] serde_json::Error),
}

/// The currency service probe.
#[derive(Debug)]
pub struct CurrencyProbe<C> {
    addr: Uri,
    connect_timeout: Duration,
    clock: C,
    time_unit: Duration,
    labels: Vec<(String, String)>,
}

impl<C> CurrencyProbe<C>
where
    C: Clock,
{
    /// Create a new [`CurrencyProbe`] against `addr`.
    pub fn new(addr: Uri, connect_timeout: Duration, clock: C, time_unit: Duration) -> Self {
        let labels = vec![
            ("component".to_string(), "target".to_string()),
            ("component_name".to_string(), "currency".to_string()),
        ];
        Self {
            addr,
            connect_timeout,
            clock,
            time_unit,
            labels,
        }
    }

    async fn call(&self) -> Result<Vec<String>, Error> {
        let mut client = CurrencyClient::connect(self.addr.clone(), self.connect_timeout).await?;
        let response = client.get_supported_currencies().await?;
        Ok(response.currency_codes)
    }
}

#[async_trait]
impl<C> Driver for CurrencyProbe<C>
where
    C: Clock,
{
    type Error = Error;

    async fn start(&mut self) -> Result<(), Error> {
        debug!(addr = %self.addr, "currency probe starting");
        Ok(())
    }

    async fn run_iteration(&mut self) -> Result<(), Error> {
        counter!("requests_sent", &self.labels).increment(1);
        let currency_codes = match self.call().await {
            Ok(codes) => codes,
            Err(err) => {
                counter!("request_failure", &self.labels).increment(1);
                return Err(err);
            }
        };
        counter!("request_ok", &self.labels).increment(1);

        let rendered = serde_json::to_string(&currency_codes)?;
        info!("response: {rendered}");

        self.clock.sleep(self.time_unit).await;
        Ok(())
    }

    async fn stop(&mut self) {
        debug!("currency probe stopped");
    }
}
