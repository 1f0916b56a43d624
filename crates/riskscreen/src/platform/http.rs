use std::time::Duration;

use serde_json::Value;

use super::{MutateSpec, MutationResponse, PlatformTransport, QuerySpec, TransportError, WriteOperation};

/// Thin wrapper around a blocking HTTP client so the synchronization flows
/// stay sequential without exposing async details to the engine.
pub struct HttpPlatformClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl HttpPlatformClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| TransportError::Network(err.to_string()))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str, id: Option<&str>) -> String {
        match id {
            Some(id) => format!("{}/api/{}/{}", self.base_url, path, id),
            None => format!("{}/api/{}", self.base_url, path),
        }
    }

    fn map_error(err: reqwest::Error) -> TransportError {
        TransportError::Network(err.to_string())
    }

    fn check_status(response: reqwest::blocking::Response) -> Result<Value, TransportError> {
        let status = response.status();
        if status.as_u16() == 409 {
            return Err(TransportError::Conflict);
        }

        let body: Value = response
            .json()
            .map_err(|err| TransportError::Decode(err.to_string()))?;

        if !status.is_success() {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("request failed")
                .to_string();
            return Err(TransportError::Http {
                status: status.as_u16(),
                message,
            });
        }

        Ok(body)
    }
}

impl std::fmt::Debug for HttpPlatformClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPlatformClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl PlatformTransport for HttpPlatformClient {
    fn query(&self, spec: &QuerySpec) -> Result<Value, TransportError> {
        let url = self.url(spec.resource.path(), spec.id.as_deref());
        let response = self
            .client
            .get(url)
            .query(&spec.params)
            .send()
            .map_err(Self::map_error)?;

        Self::check_status(response)
    }

    fn mutate(&self, spec: &MutateSpec) -> Result<MutationResponse, TransportError> {
        let url = self.url(spec.resource.path(), spec.id.as_deref());
        let request = match spec.operation {
            WriteOperation::Create => self.client.post(url),
            WriteOperation::Update => self.client.put(url),
        };

        let response = request.json(&spec.body).send().map_err(Self::map_error)?;
        let body = Self::check_status(response)?;
        Ok(MutationResponse::from_envelope(&body))
    }
}
