//! Tower layers binding request handles and registry cleanup to HTTP requests.
//!
//! Stack them with [`RequestHandleLayer`] outermost:
//!
//! ```text
//! ServiceBuilder::new()
//!     .layer(RequestHandleLayer)
//!     .layer(ClearLayer::new(registry))
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::http::Request;
use ctxmap::{ContextRegistry, RequestHandle, clear_after};
use tower::{Layer, Service};
use tracing::warn;

/// Mints a [`RequestHandle`] into the request extensions, unless one is
/// already there.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestHandleLayer;

impl<S> Layer<S> for RequestHandleLayer {
    type Service = RequestHandleService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestHandleService { inner }
    }
}

#[derive(Debug, Clone)]
pub struct RequestHandleService<S> {
    inner: S,
}

impl<S, B> Service<Request<B>> for RequestHandleService<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        if req.extensions().get::<RequestHandle>().is_none() {
            req.extensions_mut().insert(RequestHandle::new());
        }
        self.inner.call(req)
    }
}

/// Removes the request's registry entry once the inner service's response
/// future finishes, fails, panics, or is dropped.
pub struct ClearLayer<V> {
    registry: Arc<ContextRegistry<RequestHandle, V>>,
}

impl<V> ClearLayer<V> {
    pub fn new(registry: Arc<ContextRegistry<RequestHandle, V>>) -> Self {
        Self { registry }
    }
}

impl<V> Clone for ClearLayer<V> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<S, V> Layer<S> for ClearLayer<V> {
    type Service = ClearService<S, V>;

    fn layer(&self, inner: S) -> Self::Service {
        ClearService {
            inner,
            registry: Arc::clone(&self.registry),
        }
    }
}

pub struct ClearService<S, V> {
    inner: S,
    registry: Arc<ContextRegistry<RequestHandle, V>>,
}

impl<S: Clone, V> Clone for ClearService<S, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<S, V, B> Service<Request<B>> for ClearService<S, V>
where
    S: Service<Request<B>>,
    S::Future: Send + 'static,
    V: Send + Sync + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<S::Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let handle = req.extensions().get::<RequestHandle>().copied();
        let fut = self.inner.call(req);

        match handle {
            Some(handle) => Box::pin(clear_after(Arc::clone(&self.registry), handle, fut)),
            None => {
                warn!("Request reached ClearLayer without a handle; nothing to clear");
                Box::pin(fut)
            }
        }
    }
}
