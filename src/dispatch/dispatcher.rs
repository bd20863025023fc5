//! Turns one request into one function invocation and one response.

use crate::dispatch::error::DispatchError;
use crate::dispatch::metrics::{ExecutionTimer, InMemoryMetrics, MetricNames, MetricsSink};
use crate::http::{GatewayRequest, GatewayResponse, StatusCode};
use crate::routing::{bind_params, Params};
use crate::runner::{
    build_environment, EnvInput, Environment, ExecutionBackend, ExecutionRequest, LoggerFactory,
    OutputBuffer, TracingLoggerFactory,
};
use crate::store::{App, Datastore, Route};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Default time a function may run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default cap on captured standard output.
pub const DEFAULT_MAX_OUTPUT_SIZE: usize = 1024 * 1024;

/// Collaborators and limits for a [`Dispatcher`].
#[derive(Clone)]
pub struct DispatcherConfig {
    pub datastore: Arc<dyn Datastore>,
    pub backend: Arc<dyn ExecutionBackend>,
    pub metrics: Arc<dyn MetricsSink>,
    pub loggers: Arc<dyn LoggerFactory>,
    pub timeout: Duration,
    pub max_output_size: usize,
}

impl DispatcherConfig {
    /// Create a config with in-memory metrics, `tracing` function logs and
    /// default limits.
    pub fn new(datastore: Arc<dyn Datastore>, backend: Arc<dyn ExecutionBackend>) -> Self {
        Self {
            datastore,
            backend,
            metrics: Arc::new(InMemoryMetrics::new()),
            loggers: Arc::new(TracingLoggerFactory),
            timeout: DEFAULT_TIMEOUT,
            max_output_size: DEFAULT_MAX_OUTPUT_SIZE,
        }
    }

    /// Set the metrics sink.
    pub fn metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Set the log sink factory.
    pub fn loggers(mut self, loggers: Arc<dyn LoggerFactory>) -> Self {
        self.loggers = loggers;
        self
    }

    /// Set the execution timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the standard output limit in bytes.
    pub fn max_output_size(mut self, max_output_size: usize) -> Self {
        self.max_output_size = max_output_size;
        self
    }
}

/// Stage of a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    ResolvingApp,
    ResolvingRoute,
    BuildingEnv,
    Executing,
    Completed,
}

/// Per-request state threaded through the pipeline.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub app: Option<String>,
    pub route: Option<String>,
    pub phase: Phase,
}

impl RequestContext {
    fn new(request_id: String) -> Self {
        Self {
            request_id,
            app: None,
            route: None,
            phase: Phase::ResolvingApp,
        }
    }
}

/// Dispatches requests to functions.
///
/// Stateless apart from its collaborators, so one instance serves all
/// requests concurrently.
pub struct Dispatcher {
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Run the whole pipeline for `request`. Always produces exactly one
    /// response; failures are logged and mapped to their status code.
    pub async fn dispatch(&self, request: GatewayRequest) -> GatewayResponse {
        let mut ctx = RequestContext::new(request_id(&request));

        match self.run(&mut ctx, &request).await {
            Ok(response) => {
                ctx.phase = Phase::Completed;
                info!(
                    request_id = %ctx.request_id,
                    app = ctx.app.as_deref().unwrap_or_default(),
                    route = ctx.route.as_deref().unwrap_or_default(),
                    bytes = response.body.len(),
                    "Function succeeded"
                );
                response
            }
            Err(err) => {
                let app = ctx.app.as_deref().unwrap_or_default();
                let route = ctx.route.as_deref().unwrap_or_default();
                if err.status() == StatusCode::INTERNAL_SERVER_ERROR {
                    error!(request_id = %ctx.request_id, app, route, phase = ?ctx.phase, error = %err, "Dispatch failed");
                } else {
                    warn!(request_id = %ctx.request_id, app, route, phase = ?ctx.phase, error = %err, "Dispatch rejected");
                }
                err.into()
            }
        }
    }

    async fn run(
        &self,
        ctx: &mut RequestContext,
        request: &GatewayRequest,
    ) -> Result<GatewayResponse, DispatchError> {
        let app = self.resolve_app(ctx, request).await?;
        let (route, params) = self.resolve_route(ctx, &app, request).await?;

        ctx.phase = Phase::BuildingEnv;
        let payload = request.payload();
        let env = build_environment(&EnvInput {
            method: request.method.as_str(),
            route: &route.path,
            payload: &payload,
            request_url: &request.url,
            app_config: &app.config,
            route_config: &route.config,
            params: &params,
            headers: &request.headers,
        })?;

        self.execute(ctx, &app, &route, env).await
    }

    async fn resolve_app(
        &self,
        ctx: &mut RequestContext,
        request: &GatewayRequest,
    ) -> Result<App, DispatchError> {
        ctx.phase = Phase::ResolvingApp;
        let name = request
            .app
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or(DispatchError::MissingApp)?;
        ctx.app = Some(name.to_string());

        self.config
            .datastore
            .get_app(name)
            .await?
            .ok_or_else(|| DispatchError::AppNotFound(name.to_string()))
    }

    async fn resolve_route(
        &self,
        ctx: &mut RequestContext,
        app: &App,
        request: &GatewayRequest,
    ) -> Result<(Route, Params), DispatchError> {
        ctx.phase = Phase::ResolvingRoute;
        let base = base_path(&request.path);
        debug!(
            request_id = %ctx.request_id,
            app = %app.name,
            path = %request.path,
            base_path = %base,
            "Finding route on datastore"
        );

        let datastore = &self.config.datastore;
        let mut route = datastore.get_route(&app.name, base).await?;
        // Parametric routes only match the full path.
        if route.is_none() && base != request.path {
            route = datastore.get_route(&app.name, &request.path).await?;
        }
        let route = route.ok_or_else(|| DispatchError::RouteNotFound {
            app: app.name.clone(),
            path: base.to_string(),
        })?;
        ctx.route = Some(route.path.clone());

        let params = match bind_params(&route.path, &request.path) {
            Some(params) => params,
            None => {
                // A base-path route shadows longer patterns under the same segment.
                warn!(
                    request_id = %ctx.request_id,
                    app = %app.name,
                    route = %route.path,
                    path = %request.path,
                    "Route does not match the full path, running it without params"
                );
                Params::default()
            }
        };
        Ok((route, params))
    }

    async fn execute(
        &self,
        ctx: &mut RequestContext,
        app: &App,
        route: &Route,
        env: Environment,
    ) -> Result<GatewayResponse, DispatchError> {
        ctx.phase = Phase::Executing;
        let names = MetricNames::for_app(&app.name);
        let metrics = self.config.metrics.as_ref();
        metrics.increment_count(&names.requests, 1);

        let stdout = OutputBuffer::new(self.config.max_output_size);
        let stderr = self.config.loggers.new_function_logger(
            &app.name,
            &route.path,
            &route.image,
            &ctx.request_id,
        );
        let request = ExecutionRequest {
            image: route.image.clone(),
            timeout: self.config.timeout,
            id: ctx.request_id.clone(),
            app_name: app.name.clone(),
            memory: route.memory,
            env,
            stdout: stdout.clone(),
            stderr,
        };

        info!(request_id = %ctx.request_id, app = %app.name, route = %route.path, image = %route.image, "Running function");
        let timer = ExecutionTimer::start(metrics, &names);
        let outcome = tokio::time::timeout(self.config.timeout, self.config.backend.run(request)).await;

        let result = match outcome {
            Err(_) => {
                timer.finish(false);
                return Err(DispatchError::Timeout(self.config.timeout));
            }
            Ok(Err(err)) => {
                timer.finish(false);
                return Err(DispatchError::Execution(err));
            }
            Ok(Ok(result)) => result,
        };

        if stdout.overflowed() {
            timer.finish(false);
            return Err(DispatchError::OutputLimitExceeded(stdout.limit()));
        }
        if !result.is_success() {
            timer.finish(false);
            return Err(DispatchError::FunctionFailed(result));
        }
        let elapsed = timer.finish(true);
        debug!(request_id = %ctx.request_id, elapsed = ?elapsed, "Function finished");

        let mut response = GatewayResponse::new(StatusCode::OK);
        for (name, values) in &route.headers {
            for value in values {
                response = response.header(name.as_str(), value.as_str());
            }
        }
        Ok(response.body(stdout.take()))
    }
}

/// First segment of `path` as a rooted path: `/hello/world` → `/hello`.
pub fn base_path(path: &str) -> &str {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    match trimmed.find('/') {
        Some(end) if path.starts_with('/') => &path[..end + 1],
        Some(_) => "/",
        None if path.starts_with('/') => path,
        None => "/",
    }
}

/// Request ID derived from the client address, path and current second.
///
/// Two requests from the same client to the same path within one second
/// share an ID; it is only used to correlate log lines.
fn request_id(request: &GatewayRequest) -> String {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let remote = request
        .remote_addr
        .map(|addr| addr.to_string())
        .unwrap_or_default();
    let name = format!("{}{}{}", remote, request.url_path(), seconds);
    Uuid::new_v5(&Uuid::nil(), name.as_bytes()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;

    #[test]
    fn test_base_path() {
        assert_eq!(base_path("/hello"), "/hello");
        assert_eq!(base_path("/hello/world/x"), "/hello");
        assert_eq!(base_path("/"), "/");
        assert_eq!(base_path(""), "/");
        assert_eq!(base_path("hello/world"), "/");
    }

    #[test]
    fn test_request_id_is_name_based_uuid() {
        let addr = "10.0.0.1:5000".parse().unwrap();
        let request = GatewayRequest::new(Method::Get, "/hello?x=1").remote_addr(addr);

        let id = Uuid::parse_str(&request_id(&request)).unwrap();
        assert_eq!(id.get_version_num(), 5);
    }
}
