use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use infinity_model::PolicyDocument;
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::{error::ApiError, handler::ApiHandler};

/// The only body type accepted and produced for policies.
pub const YAML_CONTENT_TYPE: &str = "application/x-yaml";

/// Caller recorded in logs for stops requested over HTTP.
const HTTP_CALLER: &str = "http-api";

/// HTTP API service builder.
pub struct HttpApi<H> {
    handler: Arc<H>,
}

impl<H> HttpApi<H>
where
    H: ApiHandler,
{
    pub fn new(handler: Arc<H>) -> Self {
        Self { handler }
    }

    /// Build axum router with mounted endpoints.
    ///
    /// Routes:
    /// - GET /api/v1/status - Supervisor status
    /// - GET /api/v1/capabilities - Worker self-description
    /// - GET /api/v1/policies - Registered policy names
    /// - POST /api/v1/policies - Create a policy (YAML body)
    /// - GET /api/v1/policies/{name} - Policy with its runner state (YAML)
    /// - DELETE /api/v1/policies/{name} - Stop and remove a policy
    pub fn router(self) -> Router {
        Router::new()
            .route("/api/v1/status", get(status::<H>))
            .route("/api/v1/capabilities", get(capabilities::<H>))
            .route(
                "/api/v1/policies",
                get(list_policies::<H>).post(create_policy::<H>),
            )
            .route(
                "/api/v1/policies/{name}",
                get(get_policy::<H>).delete(delete_policy::<H>),
            )
            .layer(TraceLayer::new_for_http())
            .with_state(self.handler)
    }
}

/// A body rendered as YAML.
struct Yaml<T>(T);

impl<T: Serialize> IntoResponse for Yaml<T> {
    fn into_response(self) -> Response {
        match serde_yaml::to_string(&self.0) {
            Ok(body) => (
                [(header::CONTENT_TYPE, HeaderValue::from_static(YAML_CONTENT_TYPE))],
                body,
            )
                .into_response(),
            Err(e) => ApiError::Internal(format!("encode response: {e}")).into_response(),
        }
    }
}

fn is_yaml(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(YAML_CONTENT_TYPE))
}

/// GET /api/v1/status
async fn status<H>(State(handler): State<Arc<H>>) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    Ok(Json(handler.status().await?))
}

/// GET /api/v1/capabilities
async fn capabilities<H>(State(handler): State<Arc<H>>) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    Ok(Json(handler.capabilities().await?))
}

/// GET /api/v1/policies
async fn list_policies<H>(State(handler): State<Arc<H>>) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    Ok(Json(handler.list_policies().await?))
}

/// POST /api/v1/policies
///
/// Body: one YAML document with exactly one top-level key, the policy name.
async fn create_policy<H>(
    State(handler): State<Arc<H>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    if !is_yaml(&headers) {
        return Err(ApiError::InvalidRequest(format!(
            "invalid Content-Type. Only '{YAML_CONTENT_TYPE}' is supported"
        )));
    }

    let doc: PolicyDocument = serde_yaml::from_slice(&body)
        .map_err(|e| ApiError::InvalidRequest(format!("invalid policy document: {e}")))?;

    let mut entries = doc.into_iter();
    let (name, policy) = match (entries.next(), entries.next()) {
        (Some(entry), None) => entry,
        _ => {
            return Err(ApiError::InvalidRequest(
                "exactly one policy per request is supported".into(),
            ));
        }
    };

    debug!(policy = %name, "creating policy");
    let view = handler.create_policy(name.clone(), policy).await?;

    Ok((StatusCode::CREATED, Yaml(view.into_document(name))))
}

/// GET /api/v1/policies/{name}
async fn get_policy<H>(
    State(handler): State<Arc<H>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    match handler.get_policy(&name).await? {
        Some(view) => Ok(Yaml(view.into_document(name))),
        None => Err(ApiError::NotFound(format!("policy {name} not found"))),
    }
}

/// DELETE /api/v1/policies/{name}
async fn delete_policy<H>(
    State(handler): State<Arc<H>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    handler.delete_policy(&name, HTTP_CALLER).await?;
    debug!(policy = %name, "policy deleted");

    Ok(Json(serde_json::json!({ "message": format!("{name} was deleted") })))
}

#[cfg(test)]
mod tests {
    use std::{
        collections::BTreeMap,
        sync::Mutex,
        time::{Duration, SystemTime},
    };

    use async_trait::async_trait;
    use axum::{body::Body, http::Request};
    use infinity_model::{Policy, PolicyView, PolicyViewDocument, RunnerState, RunnerStatus, SupervisorStatus};
    use tower::ServiceExt;

    use super::*;

    #[derive(Default)]
    struct MockHandler {
        policies: Mutex<BTreeMap<String, PolicyView>>,
    }

    #[async_trait]
    impl ApiHandler for MockHandler {
        async fn status(&self) -> Result<SupervisorStatus, ApiError> {
            Ok(SupervisorStatus {
                start_time: SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000),
                up_time: Duration::from_secs(42),
                version: "0.1.0".into(),
                worker_version: Some("0.88.0".into()),
                hostname: "node-1".into(),
                policies: self.policies.lock().unwrap().len(),
            })
        }

        async fn capabilities(&self) -> Result<serde_json::Value, ApiError> {
            Ok(serde_json::json!({ "buildinfo": { "version": "0.88.0" } }))
        }

        async fn list_policies(&self) -> Result<Vec<String>, ApiError> {
            Ok(self.policies.lock().unwrap().keys().cloned().collect())
        }

        async fn create_policy(&self, name: String, policy: Policy) -> Result<PolicyView, ApiError> {
            if name == "broken" {
                return Err(ApiError::InvalidRequest(
                    "otelcol-contrib - Error: invalid configuration".into(),
                ));
            }
            let mut policies = self.policies.lock().unwrap();
            if policies.contains_key(&name) {
                return Err(ApiError::Conflict(format!("policy {name} already exists")));
            }
            if !policy.has_config() {
                return Err(ApiError::Forbidden(format!("invalid policy {name}")));
            }
            let state = RunnerState {
                status: RunnerStatus::Running,
                start_time: Some(SystemTime::now()),
                ..Default::default()
            };
            let view = PolicyView::new(policy, state);
            policies.insert(name, view.clone());
            Ok(view)
        }

        async fn get_policy(&self, name: &str) -> Result<Option<PolicyView>, ApiError> {
            Ok(self.policies.lock().unwrap().get(name).cloned())
        }

        async fn delete_policy(&self, name: &str, _caller: &str) -> Result<(), ApiError> {
            self.policies
                .lock()
                .unwrap()
                .remove(name)
                .map(|_| ())
                .ok_or_else(|| ApiError::NotFound(format!("policy {name} not found")))
        }
    }

    const P1: &str = r#"
p1:
  feature_gates: [connector.spanmetrics]
  set:
    processors.batch.timeout: 5s
  config:
    receivers:
      otlp:
        protocols:
          grpc: {}
    exporters:
      debug: {}
    service:
      pipelines:
        traces:
          receivers: [otlp]
          exporters: [debug]
"#;

    fn app() -> Router {
        HttpApi::new(Arc::new(MockHandler::default())).router()
    }

    fn post(body: &str, content_type: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/v1/policies")
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_string(res: Response) -> String {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn message(res: Response) -> String {
        let value: serde_json::Value = serde_json::from_str(&body_string(res).await).unwrap();
        value["message"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn create_conflict_delete_lifecycle() {
        let app = app();

        let res = app.clone().oneshot(post(P1, YAML_CONTENT_TYPE)).await.unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        assert_eq!(res.headers()[header::CONTENT_TYPE], YAML_CONTENT_TYPE);
        let created: PolicyViewDocument = serde_yaml::from_str(&body_string(res).await).unwrap();
        assert_eq!(created["p1"].state.status, RunnerStatus::Running);
        assert_eq!(created["p1"].policy.set["processors.batch.timeout"], "5s");

        let res = app.clone().oneshot(request("GET", "/api/v1/policies")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let names: Vec<String> = serde_json::from_str(&body_string(res).await).unwrap();
        assert_eq!(names, vec!["p1"]);

        let res = app.clone().oneshot(post(P1, YAML_CONTENT_TYPE)).await.unwrap();
        assert_eq!(res.status(), StatusCode::CONFLICT);

        let res = app.clone().oneshot(request("DELETE", "/api/v1/policies/p1")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(message(res).await, "p1 was deleted");

        let res = app.clone().oneshot(request("GET", "/api/v1/policies/p1")).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let res = app.oneshot(request("DELETE", "/api/v1/policies/p1")).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn get_returns_policy_with_state_as_yaml() {
        let app = app();
        app.clone().oneshot(post(P1, YAML_CONTENT_TYPE)).await.unwrap();

        let res = app.oneshot(request("GET", "/api/v1/policies/p1")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_string(res).await;
        assert!(body.starts_with("p1:"), "{body}");
        assert!(body.contains("status: running"), "{body}");

        let doc: PolicyViewDocument = serde_yaml::from_str(&body).unwrap();
        let submitted: PolicyDocument = serde_yaml::from_str(P1).unwrap();
        assert_eq!(doc["p1"].policy, submitted["p1"]);
    }

    #[tokio::test]
    async fn content_type_must_be_yaml() {
        let res = app().oneshot(post(P1, "application/json")).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(message(res).await.contains("application/x-yaml"));

        let res = app()
            .oneshot(post(P1, "application/x-yaml; charset=utf-8"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn body_must_hold_exactly_one_policy() {
        let two = format!("{P1}\np2:\n  config:\n    a: b\n");
        let res = app().oneshot(post(&two, YAML_CONTENT_TYPE)).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = app().oneshot(post("{}", YAML_CONTENT_TYPE)).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = app().oneshot(post("p1: [1, 2", YAML_CONTENT_TYPE)).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn empty_config_is_forbidden() {
        let res = app()
            .oneshot(post("p1:\n  feature_gates: [a]\n", YAML_CONTENT_TYPE))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn startup_failure_is_returned_inline() {
        let res = app()
            .oneshot(post("broken:\n  config:\n    a: b\n", YAML_CONTENT_TYPE))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(message(res).await, "otelcol-contrib - Error: invalid configuration");
    }

    #[tokio::test]
    async fn status_and_capabilities_are_json() {
        let res = app().oneshot(request("GET", "/api/v1/status")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let status: serde_json::Value = serde_json::from_str(&body_string(res).await).unwrap();
        assert_eq!(status["up_time"], 42_000_000_000u64);
        assert_eq!(status["hostname"], "node-1");
        assert_eq!(status["otlpinf_version"], "0.1.0");
        assert_eq!(status["otel_contrib_version"], "0.88.0");
        assert!(status["start_time"].as_str().unwrap().starts_with("2023-11-14T"));

        let res = app().oneshot(request("GET", "/api/v1/capabilities")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let caps: serde_json::Value = serde_json::from_str(&body_string(res).await).unwrap();
        assert_eq!(caps["buildinfo"]["version"], "0.88.0");
    }
}
