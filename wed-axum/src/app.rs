use axum::body::Body;
use axum::handler::Handler;
use axum::http::Request;
use axum::routing::get;
use axum::Router;
use tokio::net::{TcpListener, ToSocketAddrs};
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use wed_core::{WedConfig, WedConfigSnapshot};

#[derive(Clone)]
pub struct AxumApp {
    pub config: WedConfigSnapshot,
    pub router: Router<()>,
}

impl AxumApp {
    pub fn new(config: &WedConfig) -> Self {
        Self {
            config: config.snapshot(),
            router: Router::new(),
        }
    }

    /// Configuration value captured when the app was built.
    pub fn get(&self, key: &str) -> Option<String> {
        self.config.get_string(key)
    }

    pub fn use_router(mut self, path: &str, router: Router<()>) -> Self {
        self.router = if path.is_empty() || path == "/" {
            self.router.merge(router)
        } else {
            self.router.nest(path, router)
        };
        self
    }

    pub fn r#use(self, path: &str, router: Router<()>) -> Self {
        self.use_router(path, router)
    }

    pub fn use_get<H, T>(mut self, path: &str, handler: H) -> Self
    where
        H: Handler<T, ()> + Clone + Send + Sync + 'static,
        T: 'static,
    {
        self.router = self.router.route(path, get(handler));
        self
    }

    pub fn service<H, T>(self, path: &str, handler: H) -> Self
    where
        H: Handler<T, ()> + Clone + Send + Sync + 'static,
        T: 'static,
    {
        self.use_get(path, handler)
    }

    /// Request ids and HTTP tracing around every route registered so far.
    /// Call it last.
    pub fn traced(mut self) -> Self {
        let trace = TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
            let request_id = req
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-");
            tracing::info_span!(
                "http",
                method = %req.method(),
                uri = %req.uri(),
                request_id = %request_id,
            )
        });

        self.router = self.router.layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(trace)
                .layer(PropagateRequestIdLayer::x_request_id()),
        );
        self
    }

    pub async fn listen<A>(self, addr: A) -> anyhow::Result<()>
    where
        A: ToSocketAddrs,
    {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(addr = ?listener.local_addr().ok(), "listening");
        axum::serve(listener, self.router).await?;
        Ok(())
    }
}

pub fn axum(config: &WedConfig) -> AxumApp {
    AxumApp::new(config)
}
