use hookrelay_common::{
    Delivery, DeliveryResult, RelayError, Result, constants::GATEWAY_TIMEOUT_STATUS,
    flatten_headers, format_duration, map_to_headers,
};
use reqwest::{
    Client, Method, Url,
    header::{CONNECTION, CONTENT_LENGTH, HOST, HeaderName, TRANSFER_ENCODING},
};
use std::time::Duration;
use tracing::{debug, warn};

use crate::console::{Console, ForwardSummary};

/// Describe the relay's connection, not the delivery; the client sets its own
static CONNECTION_HEADERS: [HeaderName; 4] = [CONTENT_LENGTH, TRANSFER_ENCODING, HOST, CONNECTION];

/// Forwards deliveries to the local service
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: Client,
    timeout: Duration,
    console: Console,
}

impl Forwarder {
    pub fn new(timeout: Duration, console: Console) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::LocalService(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            timeout,
            console,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Call the local service for one delivery and translate the outcome
    ///
    /// A local timeout is a valid outcome and yields a 504 result. Any other
    /// transport failure is returned as an error.
    pub async fn forward(
        &self,
        delivery: &Delivery,
        local_address: &str,
    ) -> Result<DeliveryResult> {
        let method = Method::from_bytes(delivery.method().as_bytes()).map_err(|e| {
            RelayError::LocalService(format!("Invalid HTTP method {}: {}", delivery.method(), e))
        })?;

        let url = Url::parse(&format!("{}{}", local_address, delivery.path)).map_err(|e| {
            RelayError::LocalService(format!(
                "Invalid URL {}{}: {}",
                local_address, delivery.path, e
            ))
        })?;

        let mut headers = map_to_headers(&delivery.headers);
        if headers.len() != delivery.headers.len() {
            warn!(
                "Dropped {} invalid header(s) from delivery {}",
                delivery.headers.len() - headers.len(),
                delivery.id
            );
        }
        for name in &CONNECTION_HEADERS {
            if headers.remove(name).is_some() {
                debug!("Not forwarding {} header of delivery {}", name, delivery.id);
            }
        }

        debug!("Forwarding {}: {} {}", delivery.id, method, url);

        let mut request = self
            .client
            .request(method.clone(), url.clone())
            .headers(headers);
        if delivery.has_body() {
            request = request.body(delivery.body.clone());
        }

        let sent = request.send().await;

        let response = match sent {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return Ok(self.timed_out(delivery, &method, &url)),
            Err(e) => return Err(local_error(&method, &url, e)),
        };

        let status = response.status().as_u16();
        let headers = flatten_headers(response.headers());
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) if e.is_timeout() => return Ok(self.timed_out(delivery, &method, &url)),
            Err(e) => return Err(local_error(&method, &url, e)),
        };

        self.console.report_forward(&ForwardSummary {
            method: method.as_str(),
            url: url.as_str(),
            request_bytes: delivery.body.len(),
            status,
            response_bytes: body.len(),
            timeout: None,
        });

        Ok(DeliveryResult {
            id: delivery.id.clone(),
            status,
            headers,
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }

    fn timed_out(&self, delivery: &Delivery, method: &Method, url: &Url) -> DeliveryResult {
        warn!("{} {} timed out after {:?}", method, url, self.timeout);

        self.console.report_forward(&ForwardSummary {
            method: method.as_str(),
            url: url.as_str(),
            request_bytes: delivery.body.len(),
            status: GATEWAY_TIMEOUT_STATUS,
            response_bytes: 0,
            timeout: Some(self.timeout),
        });

        DeliveryResult::timed_out(
            &delivery.id,
            format!(
                "{} {} timed out ({})",
                method,
                url,
                format_duration(self.timeout)
            ),
        )
    }
}

fn local_error(method: &Method, url: &Url, e: reqwest::Error) -> RelayError {
    // reqwest hides the root cause (e.g. "Connection refused") in the source chain
    RelayError::LocalService(format!(
        "{} {} failed: {:#}",
        method,
        url,
        anyhow::Error::new(e)
    ))
}
