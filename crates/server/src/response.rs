//! Voice document responses

use axum::http::header;
use axum::response::{IntoResponse, Response};

use voice_caller_core::{VoiceResponse, TWIML_CONTENT_TYPE};

/// Voice document served as `text/xml`
#[derive(Debug, Clone)]
pub struct Twiml(pub VoiceResponse);

impl IntoResponse for Twiml {
    fn into_response(self) -> Response {
        ([(header::CONTENT_TYPE, TWIML_CONTENT_TYPE)], self.0.to_xml()).into_response()
    }
}

impl From<VoiceResponse> for Twiml {
    fn from(document: VoiceResponse) -> Self {
        Self(document)
    }
}
