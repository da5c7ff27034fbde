//! The request handler abstraction that route tables are built from.
//!
//! Every compiled route is a stack of `Handler`s: decorating layers (such as
//! admission control) wrap the innermost proxy handler. Handlers return
//! `'static` futures so a request never borrows the table it was resolved
//! from; the table snapshot is kept alive by the `Arc` the dispatcher holds.

use std::future::Future;
use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

/// Future returned by [`Handler::handle`].
pub type HandlerFuture = BoxFuture<'static, Response>;

/// A shared, type-erased handler.
pub type BoxHandler = Arc<dyn Handler>;

/// Something that turns a request into a response.
pub trait Handler: Send + Sync {
    fn handle(&self, request: Request<Body>) -> HandlerFuture;
}

impl<H: Handler + ?Sized> Handler for Arc<H> {
    fn handle(&self, request: Request<Body>) -> HandlerFuture {
        (**self).handle(request)
    }
}

/// Adapts an async function into a [`Handler`].
pub struct HandlerFn<F>(F);

/// Build a [`Handler`] from a closure returning a future.
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    HandlerFn(f)
}

impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    fn handle(&self, request: Request<Body>) -> HandlerFuture {
        (self.0)(request).boxed()
    }
}
