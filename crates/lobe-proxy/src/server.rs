//! Actix Web HTTP server.
//!
//! Exposes OpenAI-compatible endpoints:
//! - `POST /v1/chat/completions`
//! - `GET /health`
//! - `GET /`

use actix_cors::Cors;
use actix_web::{
    http::header::{self, ContentType},
    web, App, HttpRequest, HttpResponse, HttpServer,
};
use anyhow::{Context, Result};
use tracing::{error, info};

use crate::{
    auth,
    config::ProxyConfig,
    error::{ProxyError, ProxyResult},
    synth::{self, CompletionContext},
    transcode::{content_deltas, TranscodeOptions},
    types::ChatCompletionRequest,
    upstream::UpstreamClient,
};

const BANNER: &str = "<pre>Powered by lobe-proxy</pre>";

pub struct AppState {
    pub config: ProxyConfig,
    pub upstream: UpstreamClient,
    pub options: TranscodeOptions,
}

impl AppState {
    pub fn new(config: ProxyConfig) -> ProxyResult<Self> {
        let upstream = UpstreamClient::new(&config)?;
        let options = TranscodeOptions::from_config(&config);
        Ok(Self {
            config,
            upstream,
            options,
        })
    }
}

pub async fn serve(config: ProxyConfig) -> Result<()> {
    let addr = format!("0.0.0.0:{}", config.port);
    info!(
        addr = %addr,
        upstream = %config.upstream_url(),
        decode_mode = %config.decode_mode,
        auth = config.requires_auth(),
        "lobe-proxy listening"
    );

    let state =
        web::Data::new(AppState::new(config).context("failed to build upstream client")?);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Cors::permissive())
            .configure(routes)
    })
    .bind(&addr)
    .with_context(|| format!("failed to bind {}", addr))?
    .run()
    .await
    .context("server error")?;

    Ok(())
}

/// Register routes, the JSON body error handler, and the 404 fallback.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        ProxyError::InvalidRequest(format!("Invalid request body: {err}")).into()
    }))
    .route("/", web::get().to(index))
    .route("/health", web::get().to(health_check))
    .route("/v1/chat/completions", web::post().to(handle_chat_completions))
    .default_service(web::to(not_found));
}

async fn index() -> HttpResponse {
    HttpResponse::Ok().content_type(ContentType::html()).body(BANNER)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn not_found(req: HttpRequest) -> Result<HttpResponse, ProxyError> {
    info!(method = %req.method(), path = %req.path(), "no route");
    Err(ProxyError::NotFound)
}

async fn handle_chat_completions(
    state: web::Data<AppState>,
    req_http: HttpRequest,
    body: web::Json<ChatCompletionRequest>,
) -> Result<HttpResponse, ProxyError> {
    let auth_header = req_http
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if !auth::is_authorized(state.config.auth_token.as_deref(), auth_header) {
        return Err(ProxyError::Unauthorized);
    }

    let req = body.into_inner();
    info!(
        method = %req_http.method(),
        path = %req_http.path(),
        messages = req.message_count(),
        stream = req.stream,
        "chat completion request"
    );

    if req.messages.is_none() {
        return Err(ProxyError::InvalidRequest(
            "`messages` is required".to_string(),
        ));
    }

    complete(&state, req).await.inspect_err(|e| {
        error!(error = %e, "chat completion failed");
    })
}

async fn complete(state: &AppState, req: ChatCompletionRequest) -> ProxyResult<HttpResponse> {
    let ctx = CompletionContext::new(req.model_or(state.upstream.default_model()));
    let chunks = state.upstream.open(&req).await?;
    let deltas = content_deltas(chunks, state.options.clone());

    if req.stream {
        let body = synth::start_event_stream(synth::event_stream(deltas, ctx)).await?;
        return Ok(HttpResponse::Ok()
            .content_type("text/event-stream")
            .insert_header((header::CACHE_CONTROL, "no-cache"))
            .streaming(body));
    }

    let completion = synth::aggregate(deltas, &ctx).await?;
    Ok(HttpResponse::Ok().json(completion))
}
