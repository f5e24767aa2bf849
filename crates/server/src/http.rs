//! HTTP Endpoints
//!
//! Twilio webhook routes. Every route answers with a voice document and
//! HTTP 200, including failures, because the provider has no other way to
//! tell the caller something went wrong.

use std::any::Any;
use std::sync::Arc;

use axum::{
    async_trait,
    body::Body,
    extract::{Form, FromRequest, Query, Request, State},
    http::{header, Method, Response, StatusCode},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tower_http::catch_panic::{CatchPanicLayer, ResponseForPanic};
use tower_http::trace::TraceLayer;

use voice_caller_core::{
    SpeechStep, Transition, TurnInput, VoiceResponse, OUTBOUND_PATH, PROCESS_FOLLOWUP_PATH,
    PROCESS_SPEECH_PATH, TWIML_CONTENT_TYPE,
};

use crate::metrics::{
    metrics_handler, record_error, record_health, record_request, record_transition,
};
use crate::response::Twiml;
use crate::state::AppState;
use crate::{ServerError, WebhookError};

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let flow = state.flow.clone();
    let script = flow.script();

    let greeting_apology = PanicApology::new("outbound", flow.apology(&script.greeting_failure));
    let speech_apology =
        PanicApology::new("process_speech", flow.apology(&script.technical_difficulties));
    let followup_apology =
        PanicApology::new("process_followup", flow.apology(&script.followup_failure));
    let generic_apology = PanicApology::new("router", flow.apology(&script.technical_difficulties));

    Router::new()
        .route(
            OUTBOUND_PATH,
            get(outbound)
                .post(outbound)
                .layer(CatchPanicLayer::custom(greeting_apology)),
        )
        .route(
            PROCESS_SPEECH_PATH,
            get(process_speech)
                .post(process_speech)
                .layer(CatchPanicLayer::custom(speech_apology)),
        )
        .route(
            PROCESS_FOLLOWUP_PATH,
            get(process_followup)
                .post(process_followup)
                .layer(CatchPanicLayer::custom(followup_apology)),
        )
        .route("/health", get(health_check).post(health_check))
        .route("/metrics", get(metrics_handler))
        .fallback(not_found)
        .layer(CatchPanicLayer::custom(generic_apology))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Fields Twilio posts with a gather result. Unknown fields are ignored.
#[derive(Debug, Default, Deserialize)]
pub struct GatherForm {
    #[serde(rename = "SpeechResult")]
    pub speech_result: Option<String>,
    #[serde(rename = "Confidence")]
    pub confidence: Option<String>,
    #[serde(rename = "CallSid")]
    pub call_sid: Option<String>,
}

impl GatherForm {
    /// Fill fields missing here from `other`
    fn or(self, other: GatherForm) -> Self {
        Self {
            speech_result: self.speech_result.or(other.speech_result),
            confidence: self.confidence.or(other.confidence),
            call_sid: self.call_sid.or(other.call_sid),
        }
    }
}

/// Gather fields from the query string merged with a form-encoded body.
///
/// Query values win over body values. A request without a form content type
/// contributes no body fields, so a bare POST reads as an empty transcript.
/// Only a query or form body that fails to deserialize is rejected.
#[derive(Debug, Default)]
pub struct GatherFields(pub GatherForm);

#[async_trait]
impl<S> FromRequest<S> for GatherFields
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Query(query) = Query::<GatherForm>::try_from_uri(req.uri())?;

        let is_form_body = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"));
        if !is_form_body || req.method() == Method::GET || req.method() == Method::HEAD {
            return Ok(Self(query));
        }

        let Form(body) = Form::<GatherForm>::from_request(req, state).await?;
        Ok(Self(query.or(body)))
    }
}

fn log_transition(route: &'static str, transition: &Transition) {
    tracing::debug!(
        route,
        from = %transition.from,
        next = %transition.next,
        "Call stage transition"
    );
    record_transition(transition.next);
}

/// Opening question
async fn outbound(State(state): State<AppState>) -> Twiml {
    record_request("outbound");
    tracing::info!("Outbound call connected");

    let transition = state.flow.greet();
    log_transition("outbound", &transition);
    Twiml(transition.document)
}

/// Caller's question: validate, ask the completion API, speak the answer
async fn process_speech(
    State(state): State<AppState>,
    fields: Result<GatherFields, ServerError>,
) -> Result<Twiml, WebhookError> {
    const ROUTE: &str = "process_speech";
    record_request(ROUTE);

    let GatherFields(form) = fields.map_err(|rejection| {
        let apology = state.flow.apology(&state.flow.script().technical_difficulties);
        WebhookError::new(ROUTE, rejection, apology)
    })?;

    let turn = TurnInput::from_raw(form.speech_result.as_deref(), form.confidence.as_deref());
    tracing::info!(
        call_sid = form.call_sid.as_deref().unwrap_or("unknown"),
        transcript = %turn.transcript,
        confidence = ?turn.confidence,
        "Speech received"
    );

    let transition = match state.flow.on_speech(&turn) {
        SpeechStep::Reprompt(transition) => transition,
        SpeechStep::Answer(question) => {
            let answer = state.answers.get_answer(&question).await;
            if answer.is_none() {
                record_error("completion");
            }
            state.flow.on_answer(answer.as_deref())
        },
    };

    log_transition(ROUTE, &transition);
    Ok(Twiml(transition.document))
}

/// "Anything else?" reply: restart on yes, otherwise say goodbye
async fn process_followup(
    State(state): State<AppState>,
    fields: Result<GatherFields, ServerError>,
) -> Result<Twiml, WebhookError> {
    const ROUTE: &str = "process_followup";
    record_request(ROUTE);

    let GatherFields(form) = fields.map_err(|rejection| {
        let apology = state.flow.apology(&state.flow.script().followup_failure);
        WebhookError::new(ROUTE, rejection, apology)
    })?;

    let reply = form.speech_result.unwrap_or_default();
    tracing::info!(
        call_sid = form.call_sid.as_deref().unwrap_or("unknown"),
        reply = %reply,
        "Follow-up received"
    );

    let transition = state.flow.on_followup(&reply);
    log_transition(ROUTE, &transition);
    Ok(Twiml(transition.document))
}

/// Health check endpoint
///
/// Runs one small completion per call, so pollers spend API quota.
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    record_request("health");

    let healthy = state.answers.probe().await;
    record_health(healthy);

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "running",
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "completion_api": if healthy { "healthy" } else { "unhealthy" },
        })),
    )
}

/// Unknown route: routing apology instead of a 404
async fn not_found(State(state): State<AppState>, uri: axum::http::Uri) -> Twiml {
    record_request("not_found");
    tracing::warn!(%uri, "No route matched");
    Twiml(state.flow.apology(&state.flow.script().routing_error))
}

/// Panic handler that speaks a fixed apology
#[derive(Clone)]
struct PanicApology {
    route: &'static str,
    body: Arc<str>,
}

impl PanicApology {
    fn new(route: &'static str, document: VoiceResponse) -> Self {
        Self {
            route,
            body: document.to_xml().into(),
        }
    }
}

impl ResponseForPanic for PanicApology {
    type ResponseBody = Body;

    fn response_for_panic(&mut self, err: Box<dyn Any + Send + 'static>) -> Response<Body> {
        let detail = if let Some(s) = err.downcast_ref::<String>() {
            s.as_str()
        } else if let Some(s) = err.downcast_ref::<&str>() {
            s
        } else {
            "unknown panic"
        };
        tracing::error!(route = self.route, panic = detail, "Handler panicked");
        record_error("panic");

        let mut response = Response::new(Body::from(self.body.to_string()));
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static(TWIML_CONTENT_TYPE),
        );
        response
    }
}
