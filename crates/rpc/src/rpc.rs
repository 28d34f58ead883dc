use hyper::{http::HeaderValue, Method};
use jsonrpsee::{
    server::{ServerBuilder, ServerHandle},
    Methods,
};
use std::net::{IpAddr, SocketAddr};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

/// A thin wrapper around the `jsonrpsee` HTTP server: collects the namespace
/// method bundles and starts them on one listener
pub struct JsonRpcServer {
    /// HTTP address to listen on
    http_addr: IpAddr,
    /// HTTP port to listen on
    http_port: u16,
    /// The RPC methods to be exposed
    http_methods: Methods,
    /// The [cors layer](CorsLayer) filtering the requests
    http_cors_layer: Option<CorsLayer>,
}

impl JsonRpcServer {
    pub fn new(http_addr: IpAddr, http_port: u16) -> Self {
        Self { http_addr, http_port, http_methods: Methods::new(), http_cors_layer: None }
    }

    /// Adds a CORS layer for the given domains (`*` allows any origin)
    pub fn with_cors(mut self, cors_domain: &[String]) -> Self {
        let cors_layer = if cors_domain.iter().any(|d| d == "*") {
            CorsLayer::new().allow_headers(Any).allow_methods([Method::POST]).allow_origin(Any)
        } else {
            let mut origins: Vec<HeaderValue> = vec![];

            for domain in cors_domain.iter() {
                if let Ok(origin) = domain.parse::<HeaderValue>() {
                    origins.push(origin);
                }
            }

            CorsLayer::new()
                .allow_headers(Any)
                .allow_methods([Method::POST])
                .allow_origin(AllowOrigin::list(origins))
        };

        self.http_cors_layer = Some(cors_layer);
        self
    }

    /// Merges the methods of one namespace into the server
    pub fn add_methods(&mut self, methods: impl Into<Methods>) -> eyre::Result<()> {
        self.http_methods.merge(methods.into()).map_err(|err| err.into())
    }

    /// Starts the JSON-RPC server
    pub async fn start(&self) -> eyre::Result<ServerHandle> {
        let service = ServiceBuilder::new().option_layer(self.http_cors_layer.clone());

        let server = ServerBuilder::new()
            .http_only()
            .set_http_middleware(service)
            .build(SocketAddr::new(self.http_addr, self.http_port))
            .await?;

        Ok(server.start(self.http_methods.clone()))
    }
}
