//! Live route table holder.
//!
//! The active [`RouteTable`] sits behind an `ArcSwap`: dispatch loads the
//! pointer without locking, and a reload publishes a fully built table with a
//! single atomic store. A request keeps the table it loaded until it finishes;
//! the previous table is freed when its last request completes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::body::Body;
use axum::http::Request;
use axum::response::Response;

use crate::observability::metrics;
use crate::routing::table::RouteTable;

pub struct RouterManager {
    current: ArcSwap<RouteTable>,
    generation: AtomicU64,
}

impl RouterManager {
    pub fn new(initial: RouteTable) -> Self {
        metrics::record_route_table(0, initial.len());
        Self {
            current: ArcSwap::from_pointee(initial),
            generation: AtomicU64::new(0),
        }
    }

    /// Serve a request with whichever table is current right now.
    pub async fn dispatch(&self, request: Request<Body>) -> Response {
        let table = self.current.load_full();
        table.dispatch(request).await
    }

    /// Publish a new table. Returns its generation number.
    pub fn swap(&self, table: RouteTable) -> u64 {
        let routes = table.len();
        let previous = self.current.swap(Arc::new(table));
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;

        metrics::record_route_table(generation, routes);
        tracing::info!(
            generation,
            routes,
            previous_routes = previous.len(),
            "Route table swapped"
        );
        generation
    }

    /// Snapshot of the current table.
    pub fn current(&self) -> Arc<RouteTable> {
        self.current.load_full()
    }

    /// Number of swaps since startup.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::Route;
    use crate::http::forward::{Forward, ForwardError};
    use crate::routing::table::RouteCompiler;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use futures_util::future::BoxFuture;
    use futures_util::FutureExt;
    use std::time::Duration;
    use tokio::sync::Semaphore;

    /// Answers with the upstream origin, optionally after waiting for a permit.
    struct GatedForwarder {
        gate: Option<Arc<Semaphore>>,
    }

    impl Forward for GatedForwarder {
        fn forward(&self, request: Request<Body>) -> BoxFuture<'static, Result<Response, ForwardError>> {
            let host = request.uri().host().unwrap_or_default().to_string();
            let gate = self.gate.clone();
            async move {
                if let Some(gate) = gate {
                    let _permit = gate.acquire().await.unwrap();
                }
                Ok(host.into_response())
            }
            .boxed()
        }
    }

    fn table(upstream: &str, gate: Option<Arc<Semaphore>>) -> RouteTable {
        RouteCompiler::new(None, Arc::new(GatedForwarder { gate }))
            .compile(&[Route::new("/svc/", upstream)])
    }

    async fn body(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn request() -> Request<Body> {
        Request::builder().uri("/svc/x").body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn swap_replaces_table_and_bumps_generation() {
        let manager = RouterManager::new(table("http://old", None));
        assert_eq!(manager.generation(), 0);
        assert_eq!(body(manager.dispatch(request()).await).await, "old");

        assert_eq!(manager.swap(table("http://new", None)), 1);
        assert_eq!(manager.generation(), 1);
        assert_eq!(body(manager.dispatch(request()).await).await, "new");

        manager.swap(RouteTable::empty());
        assert!(manager.current().is_empty());
        assert_eq!(
            manager.dispatch(request()).await.status(),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn in_flight_request_finishes_on_its_snapshot() {
        let gate = Arc::new(Semaphore::new(0));
        let manager = Arc::new(RouterManager::new(table("http://old", Some(gate.clone()))));

        // Start a request on the old table and park it inside the forwarder.
        let in_flight = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { body(manager.dispatch(request()).await).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        manager.swap(table("http://new", None));
        assert_eq!(body(manager.dispatch(request()).await).await, "new");

        gate.add_permits(1);
        assert_eq!(in_flight.await.unwrap(), "old");
    }

    #[tokio::test]
    async fn concurrent_swaps_never_mix_tables() {
        let manager = Arc::new(RouterManager::new(table("http://gen0", None)));

        let swapper = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                for i in 1..=50 {
                    manager.swap(table(&format!("http://gen{i}"), None));
                    tokio::task::yield_now().await;
                }
            })
        };

        let mut readers = Vec::new();
        for _ in 0..8 {
            let manager = Arc::clone(&manager);
            readers.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                for _ in 0..50 {
                    let served = body(manager.dispatch(request()).await).await;
                    let generation: u64 = served.trim_start_matches("gen").parse().unwrap();
                    seen.push(generation);
                    tokio::task::yield_now().await;
                }
                seen
            }));
        }

        swapper.await.unwrap();
        for reader in readers {
            let seen = reader.await.unwrap();
            // Each reader observes a total order of snapshots.
            assert!(seen.windows(2).all(|w| w[0] <= w[1]), "went backwards: {seen:?}");
        }
    }
}
