use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use assay_queue::QueueEngine;
use tokio::net::{TcpListener, ToSocketAddrs};
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{routes, AssayState};

/// Default cap on request bodies; event logs are uploaded whole.
pub const DEFAULT_BODY_LIMIT: usize = 512 * 1024 * 1024;

/// HTTP options that are not part of the queue itself.
#[derive(Debug, Clone)]
pub struct HttpOptions {
    /// Served under `/assets`; reports live below it.
    pub assets_dir: PathBuf,
    pub body_limit: usize,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            assets_dir: PathBuf::from("assets"),
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}

#[derive(Clone)]
pub struct AssayApp {
    pub engine: Arc<QueueEngine>,
    pub router: Router<()>,
}

impl AssayApp {
    pub fn new(engine: Arc<QueueEngine>, options: HttpOptions) -> Self {
        let state = AssayState::new(Arc::clone(&engine));

        let router = Router::new()
            .route("/", get(routes::hello))
            .route("/health", get(routes::health))
            .route("/swagger.json", get(routes::api_doc::swagger_json))
            .route("/callback", post(routes::callback::receive_callback))
            .nest("/jobs", routes::jobs::router())
            .nest_service("/assets", ServeDir::new(&options.assets_dir))
            .layer(DefaultBodyLimit::max(options.body_limit))
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .with_state(state);

        Self { engine, router }
    }

    pub async fn listen<A>(self, addr: A) -> anyhow::Result<()>
    where
        A: ToSocketAddrs,
    {
        self.listen_with_shutdown(addr, std::future::pending()).await
    }

    /// Serve until `signal` resolves, then let in-flight requests finish.
    pub async fn listen_with_shutdown<A, F>(self, addr: A, signal: F) -> anyhow::Result<()>
    where
        A: ToSocketAddrs,
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(addr).await?;
        info!("listening on http://{}", listener.local_addr()?);
        axum::serve(listener, self.router)
            .with_graceful_shutdown(signal)
            .await?;
        Ok(())
    }
}
