//! Gateway HTTP server.

use crate::dispatch::{Dispatcher, DispatcherConfig, InMemoryMetrics};
use crate::http::{GatewayRequest, GatewayResponse, Method, StatusCode};
use crate::routing::clean_path;
use crate::runner::ExecutionBackend;
use crate::runtime::GatewayConfig;
use crate::store::Datastore;
use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Body;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use percent_encoding::percent_decode_str;
use std::convert::Infallible;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Prefix for requests that name their app in the path: `/r/{app}/{route}`.
const APP_PREFIX: &str = "/r/";
/// Reserved for the management API.
const API_PREFIX: &str = "/v1";

/// Gateway server.
///
/// Accepts HTTP/1 connections and hands every function request to a
/// [`Dispatcher`].
pub struct GatewayServer {
    state: Arc<ServerState>,
}

struct ServerState {
    config: GatewayConfig,
    datastore: Arc<dyn Datastore>,
    dispatcher: Dispatcher,
    metrics: Arc<InMemoryMetrics>,
}

impl GatewayServer {
    /// Create a new server. Timeouts and output limits come from `config`.
    pub fn new(
        config: GatewayConfig,
        datastore: Arc<dyn Datastore>,
        backend: Arc<dyn ExecutionBackend>,
    ) -> Self {
        let metrics = Arc::new(InMemoryMetrics::new());
        let dispatcher = Dispatcher::new(
            DispatcherConfig::new(datastore.clone(), backend)
                .metrics(metrics.clone())
                .timeout(config.timeout())
                .max_output_size(config.max_output_size),
        );
        Self {
            state: Arc::new(ServerState {
                config,
                datastore,
                dispatcher,
                metrics,
            }),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.state.config
    }

    /// Metrics recorded by the dispatcher, as served on `/_metrics`.
    pub fn metrics(&self) -> Arc<InMemoryMetrics> {
        self.state.metrics.clone()
    }

    /// Handle one HTTP request.
    pub async fn handle<B>(&self, req: Request<B>, remote_addr: SocketAddr) -> Response<Full<Bytes>>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn Error + Send + Sync>>,
    {
        self.state.handle(req, remote_addr).await
    }

    /// Start the HTTP server.
    pub async fn run(self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let addr: SocketAddr = self.state.config.bind_addr().parse()?;
        let listener = TcpListener::bind(addr).await?;

        info!("Gateway listening on {}", addr);

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let state = self.state.clone();

            tokio::task::spawn(async move {
                let service = service_fn(move |req| {
                    let state = state.clone();
                    async move { Ok::<_, Infallible>(state.handle(req, remote_addr).await) }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Error serving connection: {:?}", err);
                }
            });
        }
    }
}

impl ServerState {
    async fn handle<B>(&self, req: Request<B>, remote_addr: SocketAddr) -> Response<Full<Bytes>>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn Error + Send + Sync>>,
    {
        // Routing works on the decoded path; REQUEST_URL keeps the raw one.
        let path = percent_decode_str(req.uri().path())
            .decode_utf8_lossy()
            .into_owned();
        debug!(method = %req.method(), path = %path, remote = %remote_addr, "Handling request");

        if self.config.enable_health && path == "/_health" {
            return build_response(GatewayResponse::text("OK"));
        }
        if self.config.enable_metrics && path == "/_metrics" {
            return build_response(GatewayResponse::json(
                StatusCode::OK,
                &self.metrics.snapshot(),
            ));
        }
        if path == API_PREFIX || path.starts_with("/v1/") {
            let response = if req.method() == hyper::Method::GET {
                self.route_info(&path).await
            } else {
                not_found()
            };
            return build_response(response);
        }

        let (app, route_path) = match path.strip_prefix(APP_PREFIX) {
            Some(rest) => {
                let (app, route) = rest.split_once('/').unwrap_or((rest, ""));
                (Some(app.to_string()), format!("/{}", route))
            }
            None => (self.host_app(&req), path.clone()),
        };

        let request = match convert_request(req, remote_addr, self.config.max_body_size).await {
            Ok(request) => request.path(route_path),
            Err(message) => {
                warn!(path = %path, remote = %remote_addr, "{}", message);
                return build_response(GatewayResponse::error(StatusCode::BAD_REQUEST, message));
            }
        };
        let request = match app {
            Some(app) => request.app(app),
            None => request,
        };

        build_response(self.dispatcher.dispatch(request).await)
    }

    /// App mapped to the request's Host header, with or without its port.
    fn host_app<B>(&self, req: &Request<B>) -> Option<String> {
        let host = req.headers().get(hyper::header::HOST)?.to_str().ok()?;
        let hosts = &self.config.app_hosts;
        hosts
            .get(host)
            .or_else(|| host.rsplit_once(':').and_then(|(name, _)| hosts.get(name)))
            .cloned()
    }

    /// `GET /v1/apps/{app}/routes/{route...}`
    async fn route_info(&self, path: &str) -> GatewayResponse {
        let Some((app, route)) = path
            .strip_prefix("/v1/apps/")
            .and_then(|rest| rest.split_once("/routes/"))
        else {
            return not_found();
        };
        if app.is_empty() || app.contains('/') {
            return not_found();
        }
        let route_path = clean_path(route);

        match self.datastore.get_app(app).await {
            Ok(Some(_)) => {}
            Ok(None) => return GatewayResponse::error(StatusCode::NOT_FOUND, "App not found"),
            Err(err) => {
                error!(app = %app, error = %err, "Could not read app from datastore");
                return GatewayResponse::error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Could not read from datastore",
                );
            }
        }

        match self.datastore.get_route_by_pattern(app, &route_path).await {
            Ok(Some(route)) => GatewayResponse::json(
                StatusCode::OK,
                &serde_json::json!({
                    "message": "Successfully loaded route",
                    "route": route,
                }),
            ),
            Ok(None) => GatewayResponse::error(StatusCode::NOT_FOUND, "Route not found"),
            Err(err) => {
                error!(app = %app, route = %route_path, error = %err, "Could not read route from datastore");
                GatewayResponse::error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Could not read from datastore",
                )
            }
        }
    }
}

fn not_found() -> GatewayResponse {
    GatewayResponse::error(StatusCode::NOT_FOUND, "Not found")
}

/// Convert a hyper Request to a GatewayRequest, reading at most
/// `max_body_size` bytes of body.
async fn convert_request<B>(
    req: Request<B>,
    remote_addr: SocketAddr,
    max_body_size: usize,
) -> Result<GatewayRequest, String>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn Error + Send + Sync>>,
{
    let method = Method::from(req.method());
    let url = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let mut request = GatewayRequest::new(method, url).remote_addr(remote_addr);
    for (name, value) in req.headers() {
        let value = String::from_utf8_lossy(value.as_bytes());
        request = request.header(name.as_str(), value);
    }

    let body = Limited::new(req.into_body(), max_body_size)
        .collect()
        .await
        .map_err(|err| {
            if err.is::<http_body_util::LengthLimitError>() {
                "Request body too large".to_string()
            } else {
                format!("Could not read request body: {}", err)
            }
        })?
        .to_bytes();

    Ok(if body.is_empty() {
        request
    } else {
        request.body(body)
    })
}

/// Build a hyper Response from GatewayResponse.
fn build_response(response: GatewayResponse) -> Response<Full<Bytes>> {
    let status = hyper::StatusCode::from_u16(response.status.0).unwrap_or_else(|_| {
        warn!(
            "Invalid status code {}, falling back to 500 Internal Server Error",
            response.status.0
        );
        hyper::StatusCode::INTERNAL_SERVER_ERROR
    });

    let mut builder = Response::builder().status(status);
    for (name, value) in response.headers {
        builder = builder.header(name, value);
    }

    builder.body(Full::new(response.body)).unwrap_or_else(|err| {
        error!("Could not build response: {}", err);
        let mut fallback = Response::new(Full::new(Bytes::new()));
        *fallback.status_mut() = hyper::StatusCode::INTERNAL_SERVER_ERROR;
        fallback
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_response_copies_headers() {
        let response = build_response(
            GatewayResponse::new(StatusCode::OK)
                .header("X-A", "1")
                .header("X-A", "2"),
        );
        assert_eq!(response.status(), hyper::StatusCode::OK);
        assert_eq!(response.headers().get_all("x-a").iter().count(), 2);
    }

    #[test]
    fn test_build_response_rejects_bad_header() {
        let response =
            build_response(GatewayResponse::new(StatusCode::OK).header("bad header", "x"));
        assert_eq!(response.status(), hyper::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_convert_request_limits_body() {
        let req = Request::post("/r/demo/hello")
            .body(Full::new(Bytes::from_static(b"0123456789")))
            .unwrap();
        let addr = "127.0.0.1:1234".parse().unwrap();

        let err = convert_request(req, addr, 4).await.unwrap_err();
        assert_eq!(err, "Request body too large");
    }

    #[tokio::test]
    async fn test_convert_request_keeps_query_and_headers() {
        let req = Request::get("/r/demo/hello?payload=%7B%7D")
            .header("X-Trace", "abc")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let addr = "127.0.0.1:1234".parse().unwrap();

        let request = convert_request(req, addr, 1024).await.unwrap();
        assert_eq!(request.url, "/r/demo/hello?payload=%7B%7D");
        assert_eq!(request.headers, vec![("x-trace".to_string(), "abc".to_string())]);
        assert!(request.body.is_none());
        assert_eq!(request.remote_addr, Some(addr));
    }

    #[tokio::test]
    async fn test_convert_request_keeps_non_utf8_headers() {
        let req = Request::get("/r/demo/hello")
            .header("X-Name", hyper::header::HeaderValue::from_bytes(b"caf\xe9").unwrap())
            .body(Full::new(Bytes::new()))
            .unwrap();
        let addr = "127.0.0.1:1234".parse().unwrap();

        let request = convert_request(req, addr, 1024).await.unwrap();
        assert_eq!(
            request.headers,
            vec![("x-name".to_string(), "caf\u{FFFD}".to_string())]
        );
    }
}
