// Proxy module - Pingora ProxyHttp implementation
// Every request is answered in request_filter; nothing is proxied upstream.

use async_trait::async_trait;
use pingora_core::upstreams::peer::HttpPeer;
use pingora_core::Result;
use pingora_http::ResponseHeader;
use pingora_proxy::{ProxyHttp, Session};
use std::time::Instant;

use crate::engine::Engine;

pub mod helpers;
pub mod responses;

use helpers::Route;
use responses::{handle_health, EndpointResponse};

/// Per-request state for the logging hook
pub struct RequestContext {
    request_id: String,
    started: Instant,
    path: String,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            started: Instant::now(),
            path: String::new(),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// GatewayProxy implements the Pingora ProxyHttp trait on top of [`Engine`]
pub struct GatewayProxy {
    engine: Engine,
    path_prefix: String,
    unsafe_allowed: bool,
    start_time: Instant,
}

impl GatewayProxy {
    pub fn new(engine: Engine, path_prefix: impl Into<String>, unsafe_allowed: bool) -> Self {
        Self {
            engine,
            path_prefix: path_prefix.into(),
            unsafe_allowed,
            start_time: Instant::now(),
        }
    }

    /// Build the response for a GET/HEAD request path
    pub async fn respond(&self, raw_path: &str) -> EndpointResponse {
        match helpers::route(raw_path, &self.path_prefix) {
            Route::Healthcheck => handle_health(self.start_time, self.engine.in_flight_count()),
            Route::NotFound => EndpointResponse::failure(404, "no such route"),
            Route::Process(path) => match self.engine.process(&path, self.unsafe_allowed).await {
                Ok(blob) => EndpointResponse::image(blob),
                Err(e) => EndpointResponse::error(&e),
            },
        }
    }
}

async fn write_response(
    session: &mut Session,
    response: EndpointResponse,
    with_body: bool,
) -> Result<()> {
    let mut header = ResponseHeader::build(response.status, None)?;
    header.insert_header("Content-Type", response.content_type.as_str())?;
    header.insert_header("Content-Length", response.body.len().to_string())?;

    session
        .write_response_header(Box::new(header), !with_body)
        .await?;
    if with_body {
        session
            .write_response_body(Some(response.body), true)
            .await?;
    }
    Ok(())
}

#[async_trait]
impl ProxyHttp for GatewayProxy {
    type CTX = RequestContext;

    fn new_ctx(&self) -> Self::CTX {
        RequestContext::new()
    }

    /// Never reached: request_filter answers every request
    async fn upstream_peer(
        &self,
        _session: &mut Session,
        _ctx: &mut Self::CTX,
    ) -> Result<Box<HttpPeer>> {
        Err(pingora_core::Error::explain(
            pingora_core::ErrorType::InternalError,
            "gateway has no upstream peer",
        ))
    }

    async fn request_filter(&self, session: &mut Session, ctx: &mut Self::CTX) -> Result<bool> {
        let method = session.req_header().method.as_str().to_string();
        ctx.path = session.req_header().uri.path().to_string();

        let is_head = method == "HEAD";
        if method != "GET" && !is_head {
            tracing::debug!(
                request_id = %ctx.request_id(),
                method = %method,
                "Rejecting non-GET request"
            );
            write_response(session, EndpointResponse::failure(405, "only GET is supported"), true)
                .await?;
            return Ok(true);
        }

        let response = self.respond(&ctx.path).await;
        write_response(session, response, !is_head).await?;
        Ok(true)
    }

    async fn logging(
        &self,
        session: &mut Session,
        _e: Option<&pingora_core::Error>,
        ctx: &mut Self::CTX,
    ) {
        let status_code = session
            .response_written()
            .map_or(500, |resp| resp.status.as_u16());

        tracing::info!(
            request_id = %ctx.request_id(),
            client_ip = %helpers::get_client_ip(session),
            path = %ctx.path,
            status = status_code,
            duration_ms = ctx.started.elapsed().as_millis() as u64,
            "Request completed"
        );
    }
}
