//! Pipeline behaviour tests
//!
//! Every test drives an `axum::Router` wrapped by the pipeline layer with
//! `oneshot`, against in-memory fakes for every port.

#[cfg(test)]
mod support {
    use std::collections::HashMap;
    use std::io;
    use std::net::{IpAddr, SocketAddr};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use axum::body::{Body, to_bytes};
    use axum::extract::{ConnectInfo, Extension, Request};
    use axum::http::{HeaderValue, Method, StatusCode, header};
    use axum::response::Response;
    use axum::routing::{get, post};
    use axum::Router;
    use chrono::{DateTime, Utc};
    use kernel::id::{AdminId, UserId};
    use platform::crypto::to_base64;
    use platform::password::ClearTextPassword;
    use platform::rate_limit::{RateLimitConfig, RateLimitResult, RateLimitStore};
    use tower::ServiceExt;

    use crate::application::config::{AppEnvironment, PipelineConfig};
    use crate::domain::entity::access_log::{AccessLogEntry, AccessLogKind};
    use crate::domain::entity::admin_account::AdminAccount;
    use crate::domain::entity::external_log::{AccessRecord, Anomaly};
    use crate::domain::entity::principal::Principal;
    use crate::domain::repository::{
        AccessLogRepository, AdminAccountRepository, ExternalLogSink, PenaltyRepository,
        PrincipalRepository, SessionStore,
    };
    use crate::domain::value_object::csp::CspNonce;
    use crate::domain::value_object::route::{PathPrefix, RouteTable};
    use crate::error::{SinkError, StorageError, StorageResult};
    use crate::presentation::chain::Pipeline;
    use crate::presentation::context::CurrentPrincipal;
    use crate::presentation::default_pipeline;

    pub const SESSION_ID: &str = "sess-1";
    pub const CLIENT_IP: &str = "203.0.113.7";
    pub const PROXY_IP: &str = "10.0.0.1";

    type SessionRecord = (Option<UserId>, serde_json::Map<String, serde_json::Value>);

    #[derive(Default)]
    pub struct MemoryStore {
        pub access_logs: Mutex<Vec<AccessLogEntry>>,
        pub admins: Mutex<Vec<AdminAccount>>,
        pub principals: Mutex<HashMap<UserId, Principal>>,
        pub sessions: Mutex<HashMap<String, SessionRecord>>,
        pub cleared_freezes: Mutex<Vec<UserId>>,
        pub penalty_resets: AtomicUsize,
        pub rate_counts: Mutex<HashMap<String, u32>>,
        pub fail_access_log: AtomicBool,
        pub fail_clear_freeze: AtomicBool,
        pub fail_rate_limit: AtomicBool,
        pub fail_admin_lookup: AtomicBool,
    }

    impl MemoryStore {
        pub fn logged_kinds(&self) -> Vec<AccessLogKind> {
            self.access_logs
                .lock()
                .unwrap()
                .iter()
                .map(|entry| entry.kind)
                .collect()
        }

        pub fn session_value(&self, key: &str) -> Option<serde_json::Value> {
            self.sessions
                .lock()
                .unwrap()
                .get(SESSION_ID)
                .and_then(|(_, payload)| payload.get(key).cloned())
        }

        pub fn principal(&self, id: UserId) -> Option<Principal> {
            self.principals.lock().unwrap().get(&id).cloned()
        }

        /// Put `principal` behind [`SESSION_ID`].
        pub fn sign_in(&self, principal: Principal) {
            self.sessions
                .lock()
                .unwrap()
                .insert(SESSION_ID.to_string(), (Some(principal.id), Default::default()));
            self.principals.lock().unwrap().insert(principal.id, principal);
        }

        pub fn anonymous_session(&self) {
            self.sessions
                .lock()
                .unwrap()
                .insert(SESSION_ID.to_string(), (None, Default::default()));
        }

        pub fn add_admin(&self, username: &str, email: &str, password: &str) {
            self.add_peppered_admin(username, email, password, None);
        }

        pub fn add_peppered_admin(
            &self,
            username: &str,
            email: &str,
            password: &str,
            pepper: Option<&[u8]>,
        ) {
            let password_hash = ClearTextPassword::new(password).hash(pepper).unwrap();
            self.admins.lock().unwrap().push(AdminAccount {
                id: AdminId::new(),
                username: username.to_string(),
                email: email.to_string(),
                password_hash,
            });
        }
    }

    fn unavailable() -> StorageError {
        StorageError::Unavailable("connection refused".to_string())
    }

    impl AccessLogRepository for MemoryStore {
        async fn record(&self, entry: &AccessLogEntry) -> StorageResult<()> {
            if self.fail_access_log.load(Ordering::SeqCst) {
                return Err(unavailable());
            }
            self.access_logs.lock().unwrap().push(entry.clone());
            Ok(())
        }
    }

    impl AdminAccountRepository for MemoryStore {
        async fn find_by_login(&self, login: &str) -> StorageResult<Option<AdminAccount>> {
            if self.fail_admin_lookup.load(Ordering::SeqCst) {
                return Err(unavailable());
            }
            Ok(self
                .admins
                .lock()
                .unwrap()
                .iter()
                .find(|admin| admin.matches_login(login))
                .cloned())
        }
    }

    impl PrincipalRepository for MemoryStore {
        async fn find_by_id(&self, user_id: UserId) -> StorageResult<Option<Principal>> {
            Ok(self.principal(user_id))
        }

        async fn clear_frozen_until(&self, user_id: UserId) -> StorageResult<()> {
            if self.fail_clear_freeze.load(Ordering::SeqCst) {
                return Err(unavailable());
            }
            if let Some(principal) = self.principals.lock().unwrap().get_mut(&user_id) {
                principal.frozen_until = None;
            }
            self.cleared_freezes.lock().unwrap().push(user_id);
            Ok(())
        }
    }

    impl PenaltyRepository for MemoryStore {
        async fn reset_expired_out_counts(&self, _before: DateTime<Utc>) -> StorageResult<u64> {
            self.penalty_resets.fetch_add(1, Ordering::SeqCst);
            Ok(0)
        }
    }

    impl SessionStore for MemoryStore {
        async fn user_id(&self, session_id: &str) -> StorageResult<Option<UserId>> {
            Ok(self
                .sessions
                .lock()
                .unwrap()
                .get(session_id)
                .and_then(|(user_id, _)| *user_id))
        }

        async fn put(
            &self,
            session_id: &str,
            key: &str,
            value: serde_json::Value,
        ) -> StorageResult<()> {
            if let Some((_, payload)) = self.sessions.lock().unwrap().get_mut(session_id) {
                payload.insert(key.to_string(), value);
            }
            Ok(())
        }
    }

    impl RateLimitStore for MemoryStore {
        async fn check_and_increment(
            &self,
            key: &str,
            config: &RateLimitConfig,
        ) -> Result<RateLimitResult, Box<dyn std::error::Error + Send + Sync>> {
            if self.fail_rate_limit.load(Ordering::SeqCst) {
                return Err("limiter backend down".into());
            }
            let mut counts = self.rate_counts.lock().unwrap();
            let count = counts.entry(key.to_string()).or_insert(0);
            *count += 1;
            Ok(RateLimitResult {
                allowed: *count <= config.max_requests,
                remaining: config.max_requests.saturating_sub(*count),
                reset_at_ms: Utc::now().timestamp_millis() + config.window_ms(),
            })
        }
    }

    #[derive(Default)]
    pub struct RecordingSink {
        pub access: Mutex<Vec<AccessRecord>>,
        pub anomalies: Mutex<Vec<Anomaly>>,
        pub fail: AtomicBool,
    }

    impl ExternalLogSink for RecordingSink {
        async fn send_access(&self, record: &AccessRecord) -> Result<(), SinkError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(SinkError::Rejected(502));
            }
            self.access.lock().unwrap().push(record.clone());
            Ok(())
        }

        async fn raise_anomaly(&self, anomaly: &Anomaly) -> Result<(), SinkError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(SinkError::Rejected(502));
            }
            self.anomalies.lock().unwrap().push(anomaly.clone());
            Ok(())
        }
    }

    /// Buffer a JSON `tracing` subscriber writes into.
    #[derive(Clone, Default)]
    pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        pub fn install(&self) -> tracing::subscriber::DefaultGuard {
            let writer = self.clone();
            let subscriber = tracing_subscriber::fmt()
                .json()
                .with_max_level(tracing::Level::DEBUG)
                .with_writer(move || writer.clone())
                .finish();
            tracing::subscriber::set_default(subscriber)
        }

        /// Events whose message is exactly `message`
        pub fn events(&self, message: &str) -> Vec<serde_json::Value> {
            let buffer = self.0.lock().unwrap();
            String::from_utf8_lossy(&buffer)
                .lines()
                .filter_map(|line| serde_json::from_str::<serde_json::Value>(line).ok())
                .filter(|event| event["fields"]["message"] == message)
                .collect()
        }
    }

    pub fn test_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.environment = AppEnvironment::Testing;
        config.admin.path_prefix = PathPrefix::new("secret-admin");
        config.external_log.enabled = true;
        config.external_log.detached = false;
        config.trusted_proxies = vec![PROXY_IP.parse().unwrap()];
        config
    }

    pub fn route_table() -> RouteTable {
        RouteTable::new()
            .route(Method::GET, "/threads", "threads.index")
            .route(Method::POST, "/threads", "threads.store")
            .route(Method::GET, "/threads/{id}", "threads.show")
            .route(Method::POST, "/threads/{id}/responses", "responses.store")
            .route(Method::GET, "/logout", "logout")
            .route(Method::POST, "/logout", "logout")
            .route(Method::POST, "/verification", "verification.send")
    }

    async fn show_nonce(nonce: Option<Extension<CspNonce>>) -> String {
        nonce
            .map(|Extension(nonce)| nonce.as_str().to_string())
            .unwrap_or_else(|| "none".to_string())
    }

    async fn show_freeze(principal: Option<Extension<CurrentPrincipal>>) -> String {
        match principal {
            Some(Extension(CurrentPrincipal(principal))) => format!("{:?}", principal.frozen_until),
            None => "anonymous".to_string(),
        }
    }

    async fn explode(calls: Arc<AtomicUsize>) -> StatusCode {
        calls.fetch_add(1, Ordering::SeqCst);
        panic!("handler exploded")
    }

    pub struct Harness {
        pub store: Arc<MemoryStore>,
        pub sink: Arc<RecordingSink>,
        pub pipeline: Pipeline,
        pub handler_calls: Arc<AtomicUsize>,
        app: Router,
    }

    impl Harness {
        pub fn new() -> Self {
            Self::with_config(test_config())
        }

        pub fn with_config(config: PipelineConfig) -> Self {
            Self::with_store(config, Arc::new(MemoryStore::default()))
        }

        pub fn with_store(config: PipelineConfig, store: Arc<MemoryStore>) -> Self {
            let sink = Arc::new(RecordingSink::default());
            let pipeline = default_pipeline(
                &config,
                store.clone(),
                sink.clone(),
                Arc::new(route_table()),
            );
            let handler_calls = Arc::new(AtomicUsize::new(0));

            let counted = {
                let calls = handler_calls.clone();
                move || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        "ok"
                    }
                }
            };
            let exploding = {
                let calls = handler_calls.clone();
                move || explode(calls.clone())
            };

            let app = Router::new()
                .route("/threads", get(show_nonce).post(counted.clone()))
                .route("/threads/{id}", get(counted.clone()))
                .route("/threads/{id}/responses", post(counted.clone()))
                .route("/me", get(show_freeze).post(show_freeze))
                .route("/logout", get(counted.clone()).post(counted.clone()))
                .route("/verification", post(counted.clone()))
                .route("/telescope/requests", get(show_nonce))
                .route("/secret-admin/dashboard", get(|| async { "admin" }))
                .route(
                    "/slow",
                    get(|| async {
                        tokio::time::sleep(Duration::from_millis(600)).await;
                        "slow"
                    }),
                )
                .route(
                    "/fast",
                    get(|| async {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        "fast"
                    }),
                )
                .route("/unavailable", get(|| async { StatusCode::SERVICE_UNAVAILABLE }))
                .route("/panic", post(exploding))
                .layer(pipeline.layer());

            Self {
                store,
                sink,
                pipeline,
                handler_calls,
                app,
            }
        }

        pub async fn send(&self, request: Request) -> Response {
            self.app.clone().oneshot(request).await.unwrap()
        }

        pub fn calls(&self) -> usize {
            self.handler_calls.load(Ordering::SeqCst)
        }
    }

    /// A request as forwarded by the trusted reverse proxy for [`CLIENT_IP`].
    pub fn request(method: Method, path: &str) -> axum::http::request::Builder {
        from_peer(PROXY_IP, method, path).header("x-forwarded-for", CLIENT_IP)
    }

    /// A request whose TCP peer is `peer`.
    pub fn from_peer(peer: &str, method: Method, path: &str) -> axum::http::request::Builder {
        let peer: IpAddr = peer.parse().unwrap();
        Request::builder()
            .method(method)
            .uri(path)
            .header(header::HOST, "bbs.test")
            .extension(ConnectInfo(SocketAddr::new(peer, 40000)))
    }

    pub fn anonymous(method: Method, path: &str) -> Request {
        request(method, path).body(Body::empty()).unwrap()
    }

    pub fn with_session(method: Method, path: &str) -> Request {
        request(method, path)
            .header(header::COOKIE, format!("bbs_session={}", SESSION_ID))
            .header(header::REFERER, "/threads/7")
            .body(Body::empty())
            .unwrap()
    }

    pub fn with_basic(path: &str, username: &str, password: &str) -> Request {
        let encoded = to_base64(format!("{}:{}", username, password).as_bytes());
        request(Method::GET, path)
            .header(header::AUTHORIZATION, format!("Basic {}", encoded))
            .body(Body::empty())
            .unwrap()
    }

    pub async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    pub fn header<'a>(response: &'a Response, name: &str) -> Option<&'a str> {
        response.headers().get(name).and_then(|v: &HeaderValue| v.to_str().ok())
    }
}

#[cfg(test)]
mod chain_tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::extract::Request;
    use axum::http::{HeaderValue, StatusCode};
    use axum::response::{IntoResponse, Response};

    use super::support::*;
    use crate::presentation::chain::{Endpoint, Next, Pipeline, Policy};

    /// Appends its name to the `x-trace` response header.
    struct Tracer(&'static str);

    #[async_trait]
    impl Policy for Tracer {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn handle(&self, request: Request, next: Next<'_>) -> Response {
            let mut response = next.run(request).await;
            let trace = response
                .headers()
                .get("x-trace")
                .and_then(|v| v.to_str().ok())
                .map(|v| format!("{},{}", self.0, v))
                .unwrap_or_else(|| self.0.to_string());
            response
                .headers_mut()
                .insert("x-trace", HeaderValue::from_str(&trace).unwrap());
            response
        }
    }

    struct ShortCircuit;

    #[async_trait]
    impl Policy for ShortCircuit {
        fn name(&self) -> &'static str {
            "short_circuit"
        }

        async fn handle(&self, _request: Request, _next: Next<'_>) -> Response {
            StatusCode::IM_A_TEAPOT.into_response()
        }
    }

    struct Terminal;

    #[async_trait]
    impl Endpoint for Terminal {
        async fn call(&self, _request: Request) -> Response {
            "terminal".into_response()
        }
    }

    fn empty_request() -> Request {
        Request::builder().uri("/").body(Body::empty()).unwrap()
    }

    #[test]
    fn test_default_order() {
        let harness = Harness::new();
        assert_eq!(
            harness.pipeline.policy_names(),
            vec![
                "request_context",
                "security_headers",
                "external_log",
                "timing",
                "guest_visit_log",
                "admin_gate",
                "admin_visit_log",
                "rate_limit",
                "account_state",
            ]
        );
    }

    #[test]
    fn test_external_log_omitted_when_disabled() {
        let mut config = test_config();
        config.external_log.enabled = false;
        let harness = Harness::with_config(config);
        assert!(!harness.pipeline.policy_names().contains(&"external_log"));
        assert_eq!(harness.pipeline.len(), 8);
    }

    #[test]
    fn test_builder_insert_before() {
        let pipeline = Pipeline::builder()
            .then(Tracer("a"))
            .then(Tracer("c"))
            .insert_before("c", Tracer("b"))
            .insert_before("missing", Tracer("d"))
            .then_if(false, Tracer("never"))
            .build();
        assert_eq!(pipeline.policy_names(), vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn test_policies_wrap_in_order() {
        let pipeline = Pipeline::builder()
            .then(Tracer("outer"))
            .then(Tracer("inner"))
            .build();

        let response = pipeline.handle(empty_request(), &Terminal).await;
        assert_eq!(header(&response, "x-trace"), Some("outer,inner"));
        assert_eq!(body_text(response).await, "terminal");
    }

    #[tokio::test]
    async fn test_short_circuit_skips_rest() {
        let pipeline = Pipeline::builder()
            .then(Tracer("outer"))
            .then(ShortCircuit)
            .then(Tracer("unreached"))
            .build();

        let response = pipeline.handle(empty_request(), &Terminal).await;
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(header(&response, "x-trace"), Some("outer"));
    }

    #[tokio::test]
    async fn test_empty_pipeline_calls_endpoint() {
        let pipeline = Pipeline::builder().build();
        assert!(pipeline.is_empty());
        let response = pipeline.handle(empty_request(), &Terminal).await;
        assert_eq!(body_text(response).await, "terminal");
    }

    #[test]
    fn test_then_arc_shares_policy() {
        let shared: Arc<dyn Policy> = Arc::new(Tracer("shared"));
        let pipeline = Pipeline::builder()
            .then_arc(shared.clone())
            .then_arc(shared)
            .build();
        assert_eq!(pipeline.policy_names(), vec!["shared", "shared"]);
    }
}

#[cfg(test)]
mod security_header_tests {
    use axum::http::{Method, StatusCode};

    use super::support::*;
    use crate::domain::value_object::csp::CspPolicy;

    #[tokio::test]
    async fn test_diagnostics_path_is_untouched() {
        let harness = Harness::new();
        harness.store.anonymous_session();

        let response = harness
            .send(with_session(Method::GET, "/telescope/requests"))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("content-security-policy").is_none());
        assert!(response.headers().get("x-frame-options").is_none());
        assert_eq!(body_text(response).await, "none");
        assert!(harness.store.session_value("csp_nonce").is_none());
    }

    #[tokio::test]
    async fn test_nonce_shared_by_script_and_style() {
        let harness = Harness::new();

        let response = harness.send(anonymous(Method::GET, "/threads")).await;
        assert_eq!(header(&response, "x-frame-options"), Some("DENY"));
        let csp = header(&response, "content-security-policy")
            .unwrap()
            .to_string();
        let nonce = body_text(response).await;

        assert!(csp.contains(&format!("script-src 'self' 'nonce-{}'", nonce)));
        assert!(csp.contains(&format!("style-src 'self' 'nonce-{}'", nonce)));
        assert_eq!(csp.matches("'nonce-").count(), 2);
        assert!(csp.starts_with("default-src 'self'; script-src"));
    }

    #[tokio::test]
    async fn test_nonce_changes_per_request() {
        let harness = Harness::new();

        let first = body_text(harness.send(anonymous(Method::GET, "/threads")).await).await;
        let second = body_text(harness.send(anonymous(Method::GET, "/threads")).await).await;

        assert_ne!(first, "none");
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_nonce_stored_in_session() {
        let harness = Harness::new();
        harness.store.anonymous_session();

        let response = harness.send(with_session(Method::GET, "/threads")).await;
        let nonce = body_text(response).await;

        assert_eq!(
            harness.store.session_value("csp_nonce"),
            Some(serde_json::Value::String(nonce))
        );
    }

    #[tokio::test]
    async fn test_report_only_with_report_uri() {
        let mut config = test_config();
        config.csp.report_only = true;
        config.csp.policy = CspPolicy::default().with_report_uri("/csp-report");
        let harness = Harness::with_config(config);

        let response = harness.send(anonymous(Method::GET, "/threads")).await;
        assert!(response.headers().get("content-security-policy").is_none());
        let csp = header(&response, "content-security-policy-report-only").unwrap();
        assert!(csp.ends_with("; form-action 'self'; report-uri /csp-report"));
    }

    #[tokio::test]
    async fn test_panic_response_keeps_security_headers() {
        let harness = Harness::new();

        let response = harness.send(anonymous(Method::POST, "/panic")).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(header(&response, "x-frame-options"), Some("DENY"));
        let csp = header(&response, "content-security-policy").unwrap();
        assert!(csp.contains("script-src 'self' 'nonce-"));
    }

    #[tokio::test]
    async fn test_csp_disabled_keeps_frame_options() {
        let mut config = test_config();
        config.csp.enabled = false;
        let harness = Harness::with_config(config);

        let response = harness.send(anonymous(Method::GET, "/threads")).await;
        assert!(response.headers().get("content-security-policy").is_none());
        assert_eq!(header(&response, "x-frame-options"), Some("DENY"));
    }
}

#[cfg(test)]
mod access_log_tests {
    use std::sync::atomic::Ordering;

    use axum::http::{Method, StatusCode};
    use kernel::id::UserId;

    use super::support::*;
    use crate::domain::entity::access_log::AccessLogKind;
    use crate::domain::entity::principal::Principal;

    #[tokio::test]
    async fn test_anonymous_get_logs_one_guest_visit() {
        let harness = Harness::new();

        let response = harness.send(anonymous(Method::GET, "/threads")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let logs = harness.store.access_logs.lock().unwrap().clone();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].kind, AccessLogKind::GuestVisit);
        assert_eq!(logs[0].path, "/threads");
        assert_eq!(logs[0].ip, CLIENT_IP);
        assert_eq!(logs[0].user_id, None);
    }

    #[tokio::test]
    async fn test_admin_prefix_is_not_a_guest_visit() {
        let harness = Harness::new();

        let response = harness
            .send(anonymous(Method::GET, "/secret-admin/dashboard"))
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(harness.store.logged_kinds().is_empty());
    }

    #[tokio::test]
    async fn test_signed_in_and_non_get_are_not_logged() {
        let harness = Harness::new();
        harness
            .store
            .sign_in(Principal::new(UserId::new(), "bob"));

        harness.send(with_session(Method::GET, "/threads")).await;
        harness.send(anonymous(Method::POST, "/threads")).await;

        assert!(harness.store.logged_kinds().is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure_is_swallowed() {
        let harness = Harness::new();
        harness.store.fail_access_log.store(true, Ordering::SeqCst);
        let logs = CapturedLogs::default();
        let _guard = logs.install();

        let response = harness.send(anonymous(Method::GET, "/threads")).await;

        assert_eq!(response.status(), StatusCode::OK);
        let failures = logs.events("Best-effort storage operation failed");
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0]["fields"]["operation"], "record guest visit");
    }
}

#[cfg(test)]
mod admin_gate_tests {
    use std::sync::atomic::Ordering;

    use axum::http::{Method, StatusCode};

    use super::support::*;
    use crate::domain::entity::access_log::AccessLogKind;

    const DASHBOARD: &str = "/secret-admin/dashboard";

    fn harness_with_alice() -> Harness {
        let harness = Harness::new();
        harness.store.add_admin("alice", "alice@x.com", "secret");
        harness
    }

    async fn assert_challenge(response: axum::response::Response) {
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            header(&response, "www-authenticate"),
            Some("Basic realm=\"Admin Area\"")
        );
        assert_eq!(body_text(response).await, "Unauthorized");
    }

    #[tokio::test]
    async fn test_login_by_email_passes() {
        let harness = harness_with_alice();

        let response = harness
            .send(with_basic(DASHBOARD, "alice@x.com", "secret"))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "admin");
        assert_eq!(
            harness.store.logged_kinds(),
            vec![AccessLogKind::AdminLogin, AccessLogKind::AdminVisit]
        );
    }

    #[tokio::test]
    async fn test_every_request_logs_login_and_visit() {
        let harness = harness_with_alice();

        harness.send(with_basic(DASHBOARD, "alice", "secret")).await;
        harness.send(with_basic(DASHBOARD, "alice", "secret")).await;

        assert_eq!(
            harness.store.logged_kinds(),
            vec![
                AccessLogKind::AdminLogin,
                AccessLogKind::AdminVisit,
                AccessLogKind::AdminLogin,
                AccessLogKind::AdminVisit,
            ]
        );
    }

    #[tokio::test]
    async fn test_configured_pepper_is_applied() {
        let mut config = test_config();
        config.admin.password_pepper = Some(b"pepper".to_vec());
        let harness = Harness::with_config(config);
        harness
            .store
            .add_peppered_admin("alice", "alice@x.com", "secret", Some(b"pepper"));
        harness.store.add_admin("bob", "bob@x.com", "secret");

        let alice = harness.send(with_basic(DASHBOARD, "alice", "secret")).await;
        assert_eq!(alice.status(), StatusCode::OK);

        let bob = harness.send(with_basic(DASHBOARD, "bob", "secret")).await;
        assert_challenge(bob).await;
    }

    #[tokio::test]
    async fn test_wrong_password_is_challenged() {
        let harness = harness_with_alice();

        let response = harness.send(with_basic(DASHBOARD, "alice", "wrong")).await;

        assert_challenge(response).await;
        assert!(harness.store.logged_kinds().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_account_is_challenged() {
        let harness = harness_with_alice();

        let response = harness.send(with_basic(DASHBOARD, "mallory", "secret")).await;

        assert_challenge(response).await;
    }

    #[tokio::test]
    async fn test_missing_credentials_are_challenged() {
        let harness = harness_with_alice();

        let response = harness.send(anonymous(Method::GET, DASHBOARD)).await;

        assert_challenge(response).await;
    }

    #[tokio::test]
    async fn test_lookup_failure_denies() {
        let harness = harness_with_alice();
        harness.store.fail_admin_lookup.store(true, Ordering::SeqCst);

        let response = harness
            .send(with_basic(DASHBOARD, "alice", "secret"))
            .await;

        assert_challenge(response).await;
    }

    #[tokio::test]
    async fn test_login_log_failure_does_not_deny() {
        let harness = harness_with_alice();
        harness.store.fail_access_log.store(true, Ordering::SeqCst);

        let response = harness
            .send(with_basic(DASHBOARD, "alice", "secret"))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_similar_prefix_is_not_gated() {
        let harness = harness_with_alice();

        let response = harness
            .send(anonymous(Method::GET, "/secret-administrator"))
            .await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

#[cfg(test)]
mod account_state_tests {
    use std::sync::atomic::Ordering;

    use axum::body::Body;
    use axum::http::{Method, StatusCode, header};
    use chrono::{Duration, Utc};
    use kernel::error::app_error::FieldErrors;
    use kernel::id::UserId;

    use super::support::*;
    use crate::application::config::FREEZE_EXPIRY_FORMAT;
    use crate::domain::entity::principal::Principal;

    fn banned() -> Principal {
        let mut principal = Principal::new(UserId::new(), "banned");
        principal.is_permanently_banned = true;
        principal
    }

    fn frozen_for(offset: Duration) -> Principal {
        let mut principal = Principal::new(UserId::new(), "frozen");
        principal.frozen_until = Some(Utc::now() + offset);
        principal
    }

    fn frozen_error(response: &axum::response::Response) -> Option<String> {
        response
            .extensions()
            .get::<FieldErrors>()
            .and_then(|errors| errors.get("frozen"))
            .and_then(|messages| messages.first().cloned())
    }

    #[tokio::test]
    async fn test_banned_get_redirects_to_logout() {
        let harness = Harness::new();
        harness.store.sign_in(banned());

        let response = harness.send(with_session(Method::GET, "/threads")).await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(header(&response, "location"), Some("/logout"));
        let message = frozen_error(&response).unwrap();
        assert_eq!(
            harness.store.session_value("errors"),
            Some(serde_json::json!({ "frozen": [message] }))
        );
    }

    #[tokio::test]
    async fn test_banned_post_goes_back() {
        let harness = Harness::new();
        harness.store.sign_in(banned());

        let response = harness
            .send(with_session(Method::POST, "/threads/7/responses"))
            .await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(header(&response, "location"), Some("/threads/7"));
        assert!(frozen_error(&response).is_some());
        assert_eq!(harness.calls(), 0);
    }

    #[tokio::test]
    async fn test_cross_site_referer_goes_home() {
        let harness = Harness::new();
        harness.store.sign_in(banned());

        let request = request(Method::POST, "/threads/7/responses")
            .header(header::COOKIE, format!("bbs_session={}", SESSION_ID))
            .header(header::REFERER, "https://evil.example/form")
            .body(Body::empty())
            .unwrap();
        let response = harness.send(request).await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(header(&response, "location"), Some("/"));
        assert_eq!(harness.calls(), 0);
    }

    #[tokio::test]
    async fn test_banned_may_log_out() {
        let harness = Harness::new();
        harness.store.sign_in(banned());

        let post = harness.send(with_session(Method::POST, "/logout")).await;
        let get = harness.send(with_session(Method::GET, "/logout")).await;

        assert_eq!(post.status(), StatusCode::OK);
        assert_eq!(get.status(), StatusCode::OK);
        assert_eq!(harness.calls(), 2);
    }

    #[tokio::test]
    async fn test_frozen_may_read() {
        let harness = Harness::new();
        harness.store.sign_in(frozen_for(Duration::hours(1)));

        let response = harness.send(with_session(Method::GET, "/threads/7")).await;

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_frozen_cannot_respond() {
        let harness = Harness::new();
        let principal = frozen_for(Duration::hours(1));
        let until = principal.frozen_until.unwrap();
        harness.store.sign_in(principal);

        let response = harness
            .send(with_session(Method::POST, "/threads/7/responses"))
            .await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(header(&response, "location"), Some("/threads/7"));
        let message = frozen_error(&response).unwrap();
        assert!(message.contains(&until.format(FREEZE_EXPIRY_FORMAT).to_string()));
        assert_eq!(harness.calls(), 0);
    }

    #[tokio::test]
    async fn test_frozen_may_log_out() {
        let harness = Harness::new();
        harness.store.sign_in(frozen_for(Duration::hours(1)));

        let response = harness.send(with_session(Method::POST, "/logout")).await;

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_expired_freeze_is_cleared_first() {
        let harness = Harness::new();
        let principal = frozen_for(-Duration::minutes(1));
        let id = principal.id;
        harness.store.sign_in(principal);

        let response = harness
            .send(with_session(Method::POST, "/threads/7/responses"))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(*harness.store.cleared_freezes.lock().unwrap(), vec![id]);
        assert_eq!(harness.store.principal(id).unwrap().frozen_until, None);
    }

    #[tokio::test]
    async fn test_downstream_sees_cleared_freeze() {
        let harness = Harness::new();
        harness.store.sign_in(frozen_for(-Duration::minutes(1)));
        harness.store.fail_clear_freeze.store(true, Ordering::SeqCst);

        let response = harness.send(with_session(Method::POST, "/me")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "None");
    }

    #[tokio::test]
    async fn test_penalty_reset_runs_for_guests() {
        let harness = Harness::new();

        harness.send(anonymous(Method::GET, "/threads")).await;
        harness.send(anonymous(Method::POST, "/threads")).await;

        assert_eq!(harness.store.penalty_resets.load(Ordering::SeqCst), 2);
    }
}

#[cfg(test)]
mod rate_limit_tests {
    use std::sync::atomic::Ordering;

    use axum::body::Body;
    use axum::http::{Method, StatusCode};

    use super::support::*;

    #[tokio::test]
    async fn test_verification_limited_to_one_per_minute() {
        let harness = Harness::new();

        let first = harness.send(anonymous(Method::POST, "/verification")).await;
        let second = harness.send(anonymous(Method::POST, "/verification")).await;

        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry_after: u64 = header(&second, "retry-after").unwrap().parse().unwrap();
        assert!((1..=60).contains(&retry_after));
        assert_eq!(harness.calls(), 1);
        assert!(
            harness
                .store
                .rate_counts
                .lock()
                .unwrap()
                .contains_key(&format!("verification:{}", CLIENT_IP))
        );
    }

    #[tokio::test]
    async fn test_spoofed_forwarded_for_shares_peer_bucket() {
        let harness = Harness::new();

        let mut statuses = Vec::new();
        for hop in 0..5 {
            let request = from_peer("192.0.2.44", Method::POST, "/verification")
                .header("x-forwarded-for", format!("198.51.100.{}", hop))
                .body(Body::empty())
                .unwrap();
            statuses.push(harness.send(request).await.status());
        }

        assert_eq!(statuses[0], StatusCode::OK);
        assert!(statuses[1..].iter().all(|status| *status == StatusCode::TOO_MANY_REQUESTS));
        assert_eq!(harness.calls(), 1);
        let counts = harness.store.rate_counts.lock().unwrap();
        assert_eq!(counts.len(), 1);
        assert!(counts.contains_key("verification:192.0.2.44"));
    }

    #[tokio::test]
    async fn test_unbound_route_is_not_limited() {
        let harness = Harness::new();

        for _ in 0..3 {
            let response = harness.send(anonymous(Method::GET, "/threads")).await;
            assert_eq!(response.status(), StatusCode::OK);
        }
        assert!(harness.store.rate_counts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_allows() {
        let harness = Harness::new();
        harness.store.fail_rate_limit.store(true, Ordering::SeqCst);

        let first = harness.send(anonymous(Method::POST, "/verification")).await;
        let second = harness.send(anonymous(Method::POST, "/verification")).await;

        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(second.status(), StatusCode::OK);
    }
}

#[cfg(test)]
mod timing_tests {
    use axum::http::{Method, StatusCode};

    use super::support::*;
    use crate::application::config::AppEnvironment;

    #[tokio::test(start_paused = true)]
    async fn test_slow_request_warns_once() {
        let harness = Harness::new();
        let logs = CapturedLogs::default();
        let _guard = logs.install();

        let response = harness.send(anonymous(Method::GET, "/slow")).await;

        assert_eq!(response.status(), StatusCode::OK);
        let warnings = logs.events("Slow request detected");
        assert_eq!(warnings.len(), 1);
        let fields = &warnings[0]["fields"];
        let elapsed = fields["execution_time_ms"].as_u64().unwrap();
        assert!((600..700).contains(&elapsed));
        assert_eq!(fields["method"], "GET");
        assert_eq!(fields["ip"], CLIENT_IP);
        assert!(fields["url"].as_str().unwrap().ends_with("/slow"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_request_is_quiet() {
        let harness = Harness::new();
        let logs = CapturedLogs::default();
        let _guard = logs.install();

        harness.send(anonymous(Method::GET, "/fast")).await;

        assert!(logs.events("Slow request detected").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_debug_headers_outside_production() {
        let harness = Harness::new();

        let response = harness.send(anonymous(Method::GET, "/fast")).await;

        assert!(header(&response, "x-execution-time").unwrap().ends_with("ms"));
        assert!(header(&response, "x-memory-usage").unwrap().ends_with("MB"));
    }

    #[tokio::test]
    async fn test_no_debug_headers_in_production() {
        let mut config = test_config();
        config.environment = AppEnvironment::Production;
        let harness = Harness::with_config(config);

        let response = harness.send(anonymous(Method::GET, "/threads")).await;

        assert!(response.headers().get("x-execution-time").is_none());
        assert!(response.headers().get("x-memory-usage").is_none());
    }

    #[tokio::test]
    async fn test_panic_becomes_500_without_retry() {
        let harness = Harness::new();
        let logs = CapturedLogs::default();
        let _guard = logs.install();

        let response = harness.send(anonymous(Method::POST, "/panic")).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(harness.calls(), 1);
        let errors = logs.events("Request handler panicked");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["fields"]["error_message"], "handler exploded");
        assert_eq!(errors[0]["fields"]["method"], "POST");
    }
}

#[cfg(test)]
mod external_log_tests {
    use std::sync::atomic::Ordering;

    use axum::http::{Method, StatusCode};

    use super::support::*;

    #[tokio::test]
    async fn test_access_record_mirrored() {
        let harness = Harness::new();

        harness.send(anonymous(Method::GET, "/threads?page=2")).await;

        let access = harness.sink.access.lock().unwrap().clone();
        assert_eq!(access.len(), 1);
        assert_eq!(access[0].method, "GET");
        assert_eq!(access[0].url, "http://bbs.test/threads?page=2");
        assert_eq!(access[0].ip, CLIENT_IP);
        assert_eq!(access[0].status, 200);
        assert!(harness.sink.anomalies.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_server_error_raises_one_anomaly() {
        let harness = Harness::new();

        let response = harness.send(anonymous(Method::GET, "/unavailable")).await;

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let anomalies = harness.sink.anomalies.lock().unwrap().clone();
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].status, 503);
        assert_eq!(anomalies[0].url, "http://bbs.test/unavailable");
    }

    #[tokio::test]
    async fn test_disabled_raises_nothing() {
        let mut config = test_config();
        config.external_log.enabled = false;
        let harness = Harness::with_config(config);

        harness.send(anonymous(Method::GET, "/unavailable")).await;

        assert!(harness.sink.access.lock().unwrap().is_empty());
        assert!(harness.sink.anomalies.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sink_failure_keeps_response() {
        let harness = Harness::new();
        harness.sink.fail.store(true, Ordering::SeqCst);
        let logs = CapturedLogs::default();
        let _guard = logs.install();

        let response = harness.send(anonymous(Method::GET, "/unavailable")).await;

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(logs.events("Failed to mirror access log").len(), 1);
        assert_eq!(logs.events("Failed to raise anomaly").len(), 1);
    }

    #[tokio::test]
    async fn test_panic_is_mirrored_as_500() {
        let harness = Harness::new();

        harness.send(anonymous(Method::POST, "/panic")).await;

        let anomalies = harness.sink.anomalies.lock().unwrap().clone();
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].status, 500);
    }
}
