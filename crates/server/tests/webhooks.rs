//! Webhook routes driven through the router with a scripted answer provider

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use voice_caller_config::Settings;
use voice_caller_llm::{
    AdapterConfig, AnswerProvider, CompletionAdapter, OpenAIBackend, OpenAIConfig,
};
use voice_caller_server::{create_router, AppState};

#[derive(Default)]
struct ScriptedAnswers {
    answers: Mutex<VecDeque<Option<String>>>,
    questions: Mutex<Vec<String>>,
    calls: AtomicUsize,
    healthy: bool,
    panic_on_answer: bool,
}

impl ScriptedAnswers {
    fn answering(answers: &[Option<&str>]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().map(|a| a.map(str::to_string)).collect()),
            healthy: true,
            ..Default::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnswerProvider for ScriptedAnswers {
    async fn get_answer(&self, user_text: &str) -> Option<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_answer {
            panic!("answer provider exploded");
        }
        self.questions.lock().unwrap().push(user_text.to_string());
        self.answers.lock().unwrap().pop_front().flatten()
    }

    async fn probe(&self) -> bool {
        self.healthy
    }
}

fn router(answers: Arc<ScriptedAnswers>) -> Router {
    create_router(AppState::with_answer_provider(Settings::default(), answers))
}

fn post(path: &str, form: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.to_string()))
        .unwrap()
}

fn get(path: &str) -> Request<Body> {
    Request::builder().uri(path).body(Body::empty()).unwrap()
}

struct Reply {
    status: StatusCode,
    content_type: String,
    body: String,
}

async fn send(app: &Router, request: Request<Body>) -> Reply {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_string())
        .unwrap_or_default();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    Reply {
        status,
        content_type,
        body: String::from_utf8(bytes.to_vec()).unwrap(),
    }
}

#[tokio::test]
async fn test_outbound_greets_and_gathers_speech() {
    let app = router(Arc::new(ScriptedAnswers::answering(&[])));
    let reply = send(&app, post("/outbound", "CallSid=CA1")).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.content_type, "text/xml");
    assert!(reply.body.starts_with("<?xml"));
    assert!(reply
        .body
        .contains("<Gather action=\"/process_speech\" input=\"speech\""));
    assert!(reply.body.contains("timeout=\"10\""));
    assert!(reply.body.contains("virtual assistant from Buildn 123"));
    assert!(reply.body.ends_with("<Redirect>/outbound</Redirect></Response>"));
}

#[tokio::test]
async fn test_outbound_accepts_get() {
    let app = router(Arc::new(ScriptedAnswers::answering(&[])));
    let reply = send(&app, get("/outbound")).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body.contains("<Gather"));
}

#[tokio::test]
async fn test_empty_speech_reprompts_without_completion() {
    let answers = Arc::new(ScriptedAnswers::answering(&[Some("unused")]));
    let app = router(answers.clone());

    for form in ["", "SpeechResult=", "SpeechResult=+++&Confidence=0.9"] {
        let reply = send(&app, post("/process_speech", form)).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert!(reply.body.contains("catch that"), "form {form:?}");
        assert!(reply.body.contains("<Redirect>/outbound</Redirect>"));
    }
    assert_eq!(answers.calls(), 0);
}

#[tokio::test]
async fn test_low_confidence_reprompts_without_completion() {
    let answers = Arc::new(ScriptedAnswers::answering(&[Some("unused")]));
    let app = router(answers.clone());

    let reply = send(
        &app,
        post("/process_speech", "SpeechResult=price&Confidence=0.3"),
    )
    .await;

    assert!(reply.body.contains("understood that correctly"));
    assert!(reply.body.contains("<Redirect>/outbound</Redirect>"));
    assert_eq!(answers.calls(), 0);
}

#[tokio::test]
async fn test_confidence_just_below_threshold_reprompts() {
    let answers = Arc::new(ScriptedAnswers::answering(&[Some("unused")]));
    let app = router(answers.clone());

    for confidence in ["0.49999999", "-inf"] {
        let reply = send(
            &app,
            post(
                "/process_speech",
                &format!("SpeechResult=test&Confidence={confidence}"),
            ),
        )
        .await;
        assert!(
            reply.body.contains("understood that correctly"),
            "confidence {confidence:?}"
        );
    }
    assert_eq!(answers.calls(), 0);
}

#[tokio::test]
async fn test_unparseable_confidence_is_ignored() {
    let answers = Arc::new(ScriptedAnswers::answering(&[Some("Two bedrooms.")]));
    let app = router(answers.clone());

    let reply = send(
        &app,
        post("/process_speech", "SpeechResult=How+big&Confidence=high"),
    )
    .await;

    assert!(reply.body.contains("Two bedrooms."));
    assert_eq!(answers.calls(), 1);
}

#[tokio::test]
async fn test_answer_is_spoken_with_followup_gather() {
    let answers = Arc::new(ScriptedAnswers::answering(&[Some(
        "Units start at $180,000 & up.",
    )]));
    let app = router(answers.clone());

    let reply = send(
        &app,
        post(
            "/process_speech",
            "SpeechResult=What+is+the+price%3F&Confidence=0.92&CallSid=CA1&AccountSid=AC1",
        ),
    )
    .await;

    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body.contains("Units start at $180,000 &amp; up."));
    assert!(reply
        .body
        .contains("<Gather action=\"/process_followup\" input=\"speech\""));
    assert!(reply.body.contains("timeout=\"5\""));
    assert!(reply.body.contains("anything else I can help you with?"));
    assert!(reply.body.ends_with("<Hangup/></Response>"));
    assert_eq!(
        answers.questions.lock().unwrap().as_slice(),
        ["What is the price?"]
    );
}

#[tokio::test]
async fn test_missing_answer_apologizes_and_hangs_up() {
    let answers = Arc::new(ScriptedAnswers::answering(&[None]));
    let app = router(answers.clone());

    let reply = send(
        &app,
        post("/process_speech", "SpeechResult=Hello&Confidence=0.8"),
    )
    .await;

    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body.contains("trouble processing your request"));
    assert!(reply.body.contains("<Hangup/>"));
    assert!(!reply.body.contains("<Gather"));
    assert_eq!(answers.calls(), 1);
}

#[tokio::test]
async fn test_speech_via_query_string() {
    let answers = Arc::new(ScriptedAnswers::answering(&[Some("Yes, in Dallas.")]));
    let app = router(answers.clone());

    let reply = send(
        &app,
        get("/process_speech?SpeechResult=Where+is+it&Confidence=0.75"),
    )
    .await;

    assert!(reply.body.contains("Yes, in Dallas."));
    assert_eq!(answers.calls(), 1);
}

#[tokio::test]
async fn test_followup_affirmative_restarts() {
    let app = router(Arc::new(ScriptedAnswers::answering(&[])));

    for reply_text in ["Yes", "yeah+sure", "Okay+one+more", "Sure"] {
        let reply = send(
            &app,
            post("/process_followup", &format!("SpeechResult={reply_text}")),
        )
        .await;
        assert_eq!(reply.status, StatusCode::OK);
        assert!(
            reply.body.contains("<Redirect>/outbound</Redirect>"),
            "reply {reply_text:?}"
        );
        assert!(!reply.body.contains("<Hangup/>"));
    }
}

#[tokio::test]
async fn test_followup_otherwise_says_goodbye() {
    let app = router(Arc::new(ScriptedAnswers::answering(&[])));

    for form in ["SpeechResult=No+thanks", "SpeechResult=", ""] {
        let reply = send(&app, post("/process_followup", form)).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert!(reply.body.contains("Have a great day!"), "form {form:?}");
        assert!(reply.body.ends_with("<Hangup/></Response>"));
        assert!(!reply.body.contains("<Redirect>"));
    }
}

#[tokio::test]
async fn test_unknown_route_speaks_routing_apology() {
    let app = router(Arc::new(ScriptedAnswers::answering(&[])));
    let reply = send(&app, post("/does-not-exist", "")).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.content_type, "text/xml");
    assert!(reply.body.contains("routing error"));
    assert!(reply.body.contains("<Hangup/>"));
}

#[tokio::test]
async fn test_panic_in_handler_speaks_apology() {
    let answers = Arc::new(ScriptedAnswers {
        panic_on_answer: true,
        ..Default::default()
    });
    let app = router(answers);

    let reply = send(
        &app,
        post("/process_speech", "SpeechResult=Hello&Confidence=0.9"),
    )
    .await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.content_type, "text/xml");
    assert!(reply.body.contains("technical difficulties"));
    assert!(reply.body.contains("<Hangup/>"));
}

#[tokio::test]
async fn test_malformed_form_speaks_apology() {
    let app = router(Arc::new(ScriptedAnswers::answering(&[])));

    let reply = send(
        &app,
        post("/process_followup", "SpeechResult=yes&SpeechResult=no"),
    )
    .await;

    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body.contains("Goodbye!"));
    assert!(reply.body.contains("<Hangup/>"));
}

#[tokio::test]
async fn test_bare_post_reprompts_without_completion() {
    let answers = Arc::new(ScriptedAnswers::answering(&[Some("unused")]));
    let app = router(answers.clone());

    let bare = Request::builder()
        .method("POST")
        .uri("/process_speech")
        .body(Body::empty())
        .unwrap();
    let json = Request::builder()
        .method("POST")
        .uri("/process_speech")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();

    for request in [bare, json] {
        let reply = send(&app, request).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert!(reply.body.contains("catch that"));
        assert!(reply.body.contains("<Redirect>/outbound</Redirect>"));
        assert!(!reply.body.contains("<Hangup/>"));
    }
    assert_eq!(answers.calls(), 0);
}

#[tokio::test]
async fn test_bare_post_followup_says_goodbye() {
    let app = router(Arc::new(ScriptedAnswers::answering(&[])));
    let request = Request::builder()
        .method("POST")
        .uri("/process_followup")
        .body(Body::empty())
        .unwrap();

    let reply = send(&app, request).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body.contains("Have a great day!"));
    assert!(reply.body.ends_with("<Hangup/></Response>"));
}

#[tokio::test]
async fn test_rate_limited_completion_speaks_high_demand() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
            "error": { "message": "Rate limit reached for gpt-4", "type": "requests" }
        })))
        .expect(1)
        .mount(&upstream)
        .await;

    let settings = Settings::default();
    let backend = OpenAIBackend::new(OpenAIConfig {
        endpoint: upstream.uri(),
        api_key: "sk-test".to_string(),
        ..Default::default()
    })
    .unwrap();
    let adapter =
        CompletionAdapter::new(Arc::new(backend), AdapterConfig::from_settings(&settings));
    let app = create_router(AppState::with_answer_provider(settings, Arc::new(adapter)));

    let reply = send(
        &app,
        post("/process_speech", "SpeechResult=What+is+the+price&Confidence=0.9"),
    )
    .await;

    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body.contains("experiencing high demand"));
    assert!(reply
        .body
        .contains("<Gather action=\"/process_followup\" input=\"speech\""));
    assert!(reply.body.ends_with("<Hangup/></Response>"));
    assert_eq!(upstream.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_health_reports_probe_result() {
    for (healthy, expected) in [(true, "healthy"), (false, "unhealthy")] {
        let answers = Arc::new(ScriptedAnswers {
            healthy,
            ..Default::default()
        });
        let app = router(answers);

        for request in [get("/health"), post("/health", "")] {
            let reply = send(&app, request).await;
            assert_eq!(reply.status, StatusCode::OK);
            assert!(reply.content_type.starts_with("application/json"));

            let json: serde_json::Value = serde_json::from_str(&reply.body).unwrap();
            assert_eq!(json["status"], "running");
            assert_eq!(json["completion_api"], expected);
            assert!(json["timestamp"].as_str().is_some());
        }
    }
}

#[tokio::test]
async fn test_metrics_route_always_answers() {
    let app = router(Arc::new(ScriptedAnswers::answering(&[])));
    let reply = send(&app, get("/metrics")).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn test_scenario_question_then_goodbye() {
    let answers = Arc::new(ScriptedAnswers::answering(&[Some(
        "Two and three bedroom apartments.",
    )]));
    let app = router(answers.clone());

    let greeting = send(&app, post("/outbound", "")).await;
    assert!(greeting.body.contains("/process_speech"));

    let answer = send(
        &app,
        post(
            "/process_speech",
            "SpeechResult=What+units+do+you+have&Confidence=0.9",
        ),
    )
    .await;
    assert!(answer.body.contains("Two and three bedroom apartments."));
    assert!(answer.body.contains("/process_followup"));

    let goodbye = send(&app, post("/process_followup", "SpeechResult=no")).await;
    assert!(goodbye.body.contains("Thank you for your interest in Buildn 123"));
    assert!(goodbye.body.contains("<Hangup/>"));
    assert_eq!(answers.calls(), 1);
}

#[tokio::test]
async fn test_scenario_two_questions() {
    let answers = Arc::new(ScriptedAnswers::answering(&[
        Some("Prices start at $180,000."),
        Some("It is in Dallas."),
    ]));
    let app = router(answers.clone());

    send(&app, post("/outbound", "")).await;
    let first = send(
        &app,
        post("/process_speech", "SpeechResult=Price&Confidence=0.9"),
    )
    .await;
    assert!(first.body.contains("Prices start at $180,000."));

    let restart = send(&app, post("/process_followup", "SpeechResult=yes+please")).await;
    assert!(restart.body.contains("<Redirect>/outbound</Redirect>"));

    send(&app, post("/outbound", "")).await;
    let second = send(
        &app,
        post("/process_speech", "SpeechResult=Location&Confidence=0.9"),
    )
    .await;
    assert!(second.body.contains("It is in Dallas."));
    assert_eq!(answers.calls(), 2);
}

#[tokio::test]
async fn test_scenario_silence_then_question() {
    let answers = Arc::new(ScriptedAnswers::answering(&[Some("Yes, there is parking.")]));
    let app = router(answers.clone());

    let silent = send(&app, post("/process_speech", "SpeechResult=")).await;
    assert!(silent.body.contains("<Redirect>/outbound</Redirect>"));
    assert_eq!(answers.calls(), 0);

    let answer = send(
        &app,
        post("/process_speech", "SpeechResult=Is+there+parking&Confidence=0.88"),
    )
    .await;
    assert!(answer.body.contains("Yes, there is parking."));
    assert_eq!(answers.calls(), 1);
}

#[tokio::test]
async fn test_scenario_completion_unavailable() {
    let answers = Arc::new(ScriptedAnswers::answering(&[None]));
    let app = router(answers.clone());

    send(&app, post("/outbound", "")).await;
    let apology = send(
        &app,
        post("/process_speech", "SpeechResult=Price&Confidence=0.9"),
    )
    .await;

    assert!(apology.body.contains("call back in a few minutes"));
    assert!(apology.body.ends_with("<Hangup/></Response>"));
}
