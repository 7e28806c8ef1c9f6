//! FHIR RESTful interactions over a [`Transport`]

use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::transport::{HttpRequest, HttpResponse, Transport};
use crate::error::SondeError;
use crate::fhir::{self, CapabilityStatement};
use crate::result::Result;
use crate::search::SearchParams;

const FHIR_JSON: &str = "application/fhir+json";

/// Credentials attached to requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Auth {
    None,
    Bearer(String),
}

/// A normalized server response
#[derive(Debug, Clone, PartialEq)]
pub struct FhirResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// Parsed body, when it was JSON
    pub body: Option<Value>,
    pub raw: String,
}

impl FhirResponse {
    fn from_http(response: HttpResponse) -> Self {
        let body = if response.body.trim().is_empty() {
            None
        } else {
            serde_json::from_str(&response.body).ok()
        };

        Self {
            status: response.status,
            headers: response.headers,
            body,
            raw: response.body,
        }
    }

    /// 2xx or 3xx
    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status)
    }

    /// `resourceType` of the body, if any
    pub fn resource_type(&self) -> Option<&str> {
        self.body.as_ref().and_then(fhir::resource_type)
    }
}

/// Issues search/read/vread/history interactions against one server
#[derive(Clone)]
pub struct InteractionClient {
    base_url: String,
    transport: Arc<dyn Transport>,
    auth: Auth,
}

impl InteractionClient {
    pub fn new(base_url: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            transport,
            auth: Auth::None,
        }
    }

    /// Attach a bearer token, or clear credentials with `None`
    pub fn with_bearer_token(mut self, token: Option<String>) -> Self {
        self.auth = match token {
            Some(token) if !token.is_empty() => Auth::Bearer(token),
            _ => Auth::None,
        };
        self
    }

    /// Same server and transport, no credentials
    pub fn without_auth(&self) -> Self {
        Self {
            auth: Auth::None,
            ..self.clone()
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn auth(&self) -> &Auth {
        &self.auth
    }

    /// `GET [base]/[type]?params`
    pub async fn search(&self, resource_type: &str, params: &SearchParams) -> Result<FhirResponse> {
        let query = params.iter().map(|(k, v)| (k.clone(), v.clone()));
        self.get(resource_type, query).await
    }

    /// `GET [base]/[type]/[id]`
    pub async fn read(&self, resource_type: &str, id: &str) -> Result<FhirResponse> {
        self.get(&format!("{resource_type}/{id}"), []).await
    }

    /// `GET [base]/[type]/[id]/_history/[vid]`
    pub async fn vread(&self, resource_type: &str, id: &str, version_id: &str) -> Result<FhirResponse> {
        self.get(&format!("{resource_type}/{id}/_history/{version_id}"), [])
            .await
    }

    /// `GET [base]/[type]/[id]/_history`
    pub async fn history(&self, resource_type: &str, id: &str) -> Result<FhirResponse> {
        self.get(&format!("{resource_type}/{id}/_history"), []).await
    }

    /// `GET [base]/metadata`, parsed
    pub async fn capability_statement(&self) -> Result<CapabilityStatement> {
        let response = self.get("metadata", []).await?;
        if !response.is_success() {
            return Err(SondeError::invalid_response(format!(
                "Capability statement request returned status {}",
                response.status
            )));
        }

        let body = response.body.ok_or_else(|| {
            SondeError::invalid_response("Capability statement response is not JSON")
        })?;
        CapabilityStatement::from_json(&body)
    }

    async fn get<I>(&self, path: &str, query: I) -> Result<FhirResponse>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut request = HttpRequest::get(format!("{}/{}", self.base_url, path))
            .header("Accept", FHIR_JSON)
            .query(query);

        if let Auth::Bearer(token) = &self.auth {
            request = request.header("Authorization", format!("Bearer {token}"));
        }

        let response = self.transport.send(request).await?;
        debug!(path, status = response.status, "Interaction completed");
        Ok(FhirResponse::from_http(response))
    }
}

impl std::fmt::Debug for InteractionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteractionClient")
            .field("base_url", &self.base_url)
            .field("authenticated", &matches!(self.auth, Auth::Bearer(_)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records requests and answers with a canned response
    struct Recorder {
        requests: Mutex<Vec<HttpRequest>>,
        response: HttpResponse,
    }

    #[async_trait]
    impl Transport for Recorder {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
            self.requests.lock().unwrap().push(request);
            Ok(self.response.clone())
        }
    }

    fn recorder(status: u16, body: &str) -> Arc<Recorder> {
        Arc::new(Recorder {
            requests: Mutex::new(Vec::new()),
            response: HttpResponse {
                status,
                headers: vec![("Content-Type".into(), FHIR_JSON.into())],
                body: body.to_string(),
            },
        })
    }

    #[tokio::test]
    async fn test_search_sends_query_and_bearer_token() {
        let transport = recorder(200, r#"{"resourceType":"Bundle"}"#);
        let client = InteractionClient::new("http://example.org/fhir/", transport.clone())
            .with_bearer_token(Some("ABC".into()));

        let mut params = SearchParams::new();
        params.insert("patient".into(), "123".into());
        let response = client.search("Condition", &params).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.resource_type(), Some("Bundle"));

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests[0].url, "http://example.org/fhir/Condition");
        assert_eq!(requests[0].query, vec![("patient".into(), "123".into())]);
        assert!(
            requests[0]
                .headers
                .contains(&("Authorization".into(), "Bearer ABC".into()))
        );
    }

    #[tokio::test]
    async fn test_without_auth_drops_token() {
        let transport = recorder(401, "");
        let client = InteractionClient::new("http://example.org/fhir", transport.clone())
            .with_bearer_token(Some("ABC".into()));

        let response = client.without_auth().read("Goal", "g1").await.unwrap();
        assert_eq!(response.status, 401);
        assert!(response.body.is_none());

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests[0].url, "http://example.org/fhir/Goal/g1");
        assert!(requests[0].headers.iter().all(|(k, _)| k != "Authorization"));
    }

    #[tokio::test]
    async fn test_unparseable_capability_statement() {
        let transport = recorder(200, "<html/>");
        let client = InteractionClient::new("http://example.org/fhir", transport);
        assert!(client.capability_statement().await.is_err());
    }
}
