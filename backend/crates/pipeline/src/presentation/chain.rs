//! Policy Chain
//!
//! The pipeline is an explicit ordered list of [`Policy`] objects folded
//! around a terminal [`Endpoint`] (the route table). Each policy receives
//! the request and a [`Next`] cursor over the rest of the chain; it may
//! answer itself, change the request or response, or delegate.
//!
//! The list is built once at startup and shared by every request, so
//! ordering and insertion are plain data and can be asserted in tests.

use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use axum::extract::Request;
use axum::response::Response;
use futures_util::future::BoxFuture;
use tower::{Layer, Service, ServiceExt};

/// One cross-cutting concern of the request pipeline.
#[async_trait]
pub trait Policy: Send + Sync {
    /// Stable name, used in logs and for ordering
    fn name(&self) -> &'static str;

    async fn handle(&self, request: Request, next: Next<'_>) -> Response;
}

/// Terminal handler of the chain.
#[async_trait]
pub trait Endpoint: Send + Sync {
    async fn call(&self, request: Request) -> Response;
}

/// Any infallible tower service (an `axum::Router`, a `Route`) as an
/// [`Endpoint`].
pub struct ServiceEndpoint<S> {
    inner: S,
}

impl<S> ServiceEndpoint<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S> Endpoint for ServiceEndpoint<S>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
{
    async fn call(&self, request: Request) -> Response {
        match self.inner.clone().oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        }
    }
}

/// Cursor over the policies that have not run yet.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    policies: &'a [Arc<dyn Policy>],
    endpoint: &'a dyn Endpoint,
}

impl<'a> Next<'a> {
    pub fn new(policies: &'a [Arc<dyn Policy>], endpoint: &'a dyn Endpoint) -> Self {
        Self { policies, endpoint }
    }

    /// Run the head policy with a cursor over the tail, or the endpoint
    /// once every policy has run.
    pub async fn run(self, request: Request) -> Response {
        match self.policies.split_first() {
            Some((head, tail)) => {
                head.handle(request, Next::new(tail, self.endpoint)).await
            }
            None => self.endpoint.call(request).await,
        }
    }
}

/// Ordered, immutable policy list.
#[derive(Clone)]
pub struct Pipeline {
    policies: Arc<[Arc<dyn Policy>]>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Outermost first
    pub fn policy_names(&self) -> Vec<&'static str> {
        self.policies.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub async fn handle(&self, request: Request, endpoint: &dyn Endpoint) -> Response {
        Next::new(&self.policies, endpoint).run(request).await
    }

    /// Tower layer that runs this pipeline in front of the wrapped service.
    pub fn layer(&self) -> PipelineLayer {
        PipelineLayer {
            policies: self.policies.clone(),
        }
    }
}

#[derive(Default)]
pub struct PipelineBuilder {
    policies: Vec<Arc<dyn Policy>>,
}

impl PipelineBuilder {
    /// Append a policy (runs after every policy added so far).
    pub fn then<P: Policy + 'static>(self, policy: P) -> Self {
        self.then_arc(Arc::new(policy))
    }

    pub fn then_arc(mut self, policy: Arc<dyn Policy>) -> Self {
        self.policies.push(policy);
        self
    }

    /// Append only when `enabled`.
    pub fn then_if<P: Policy + 'static>(self, enabled: bool, policy: P) -> Self {
        if enabled { self.then(policy) } else { self }
    }

    /// Insert right before the first policy named `anchor`, or at the end
    /// when no such policy exists.
    pub fn insert_before<P: Policy + 'static>(mut self, anchor: &str, policy: P) -> Self {
        let index = self
            .policies
            .iter()
            .position(|p| p.name() == anchor)
            .unwrap_or(self.policies.len());
        self.policies.insert(index, Arc::new(policy));
        self
    }

    pub fn build(self) -> Pipeline {
        let pipeline = Pipeline {
            policies: self.policies.into(),
        };
        tracing::debug!(policies = ?pipeline.policy_names(), "Request pipeline built");
        pipeline
    }
}

#[derive(Clone)]
pub struct PipelineLayer {
    policies: Arc<[Arc<dyn Policy>]>,
}

impl<S> Layer<S> for PipelineLayer {
    type Service = PipelineService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PipelineService {
            policies: self.policies.clone(),
            endpoint: Arc::new(ServiceEndpoint::new(inner)),
        }
    }
}

pub struct PipelineService<S> {
    policies: Arc<[Arc<dyn Policy>]>,
    endpoint: Arc<ServiceEndpoint<S>>,
}

impl<S> Clone for PipelineService<S> {
    fn clone(&self) -> Self {
        Self {
            policies: self.policies.clone(),
            endpoint: self.endpoint.clone(),
        }
    }
}

impl<S> Service<Request> for PipelineService<S>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // The inner service is cloned and driven with `oneshot` per request.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let policies = self.policies.clone();
        let endpoint = self.endpoint.clone();

        Box::pin(async move {
            let response = Next::new(&policies, endpoint.as_ref()).run(request).await;
            Ok(response)
        })
    }
}
