//! Spoken lines and voice settings for a call
//!
//! Every line the caller can hear lives here so a deployment can re-brand the
//! agent from config alone. Defaults match the Buildn 123 deployment.

use serde::{Deserialize, Serialize};

/// Scripted lines and the completion system prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallScript {
    /// Business the agent speaks for
    pub business_name: String,
    /// System prompt sent with every completion
    pub system_prompt: String,
    /// Spoken inside the opening gather
    pub welcome: String,
    /// Spoken when the opening gather times out with no speech
    pub no_input: String,
    /// Empty transcript re-prompt
    pub didnt_catch: String,
    /// Low recognition confidence re-prompt
    pub low_confidence: String,
    /// Follow-up question after an answer
    pub anything_else: String,
    /// Last line before hanging up
    pub closing: String,
    /// Completion retries exhausted or refused
    pub processing_failure: String,
    /// Spoken as the answer when the completion API is rate limited
    pub high_demand: String,
    /// Unhandled handler failure
    pub technical_difficulties: String,
    /// Unknown route
    pub routing_error: String,
    /// Failure while building the greeting
    pub greeting_failure: String,
    /// Failure while handling the follow-up answer
    pub followup_failure: String,
}

impl Default for CallScript {
    fn default() -> Self {
        Self {
            business_name: "Buildn 123".to_string(),
            system_prompt: "You are a helpful AI assistant for Buildn 123, a residential real \
                estate project in Dallas, offering modern 2- and 3-bedroom apartments starting at \
                $180,000. Key details: Located in Dallas, modern amenities, competitive pricing, \
                quality construction. Answer user questions clearly, briefly (under 100 words), \
                and professionally. If asked about specific details you don't know, suggest they \
                contact our sales team. Always maintain a friendly, helpful tone."
                .to_string(),
            welcome: "Hi, I am the virtual assistant from Buildn 123. How can I help you with \
                our real estate project today?"
                .to_string(),
            no_input: "I didn't hear anything. Let me ask again.".to_string(),
            didnt_catch: "I didn't catch that. Could you please repeat your question more clearly?"
                .to_string(),
            low_confidence: "I'm not sure I understood that correctly. Could you please repeat \
                your question?"
                .to_string(),
            anything_else: "Is there anything else I can help you with?".to_string(),
            closing: "Thank you for your interest in Buildn 123. Have a great day!".to_string(),
            processing_failure: "I'm having trouble processing your request right now. Please \
                call back in a few minutes or visit our website for immediate assistance."
                .to_string(),
            high_demand: "I'm currently experiencing high demand. Please try again in a moment."
                .to_string(),
            technical_difficulties: "I'm sorry, I'm experiencing technical difficulties. Please \
                try again later."
                .to_string(),
            routing_error: "I'm sorry, there was a routing error. Please try again.".to_string(),
            greeting_failure: "I'm sorry, there was an issue starting our conversation."
                .to_string(),
            followup_failure: "Thank you for calling Buildn 123. Goodbye!".to_string(),
        }
    }
}

impl CallScript {
    /// Names of lines that are blank after trimming
    pub fn blank_lines(&self) -> Vec<&'static str> {
        let lines = [
            ("system_prompt", &self.system_prompt),
            ("welcome", &self.welcome),
            ("no_input", &self.no_input),
            ("didnt_catch", &self.didnt_catch),
            ("low_confidence", &self.low_confidence),
            ("anything_else", &self.anything_else),
            ("closing", &self.closing),
            ("processing_failure", &self.processing_failure),
            ("high_demand", &self.high_demand),
            ("technical_difficulties", &self.technical_difficulties),
            ("routing_error", &self.routing_error),
            ("greeting_failure", &self.greeting_failure),
            ("followup_failure", &self.followup_failure),
        ];
        lines
            .into_iter()
            .filter(|(_, text)| text.trim().is_empty())
            .map(|(name, _)| name)
            .collect()
    }
}

/// How the provider speaks and listens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceSettings {
    /// Locale for synthesis and recognition
    pub language: String,
    /// Provider voice name
    pub voice: String,
    /// Listening window for the opening question
    pub speech_timeout_secs: u32,
    /// Listening window for the follow-up question
    pub followup_timeout_secs: u32,
    /// Transcripts below this confidence are re-prompted
    pub min_confidence: f64,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            language: "en-US".to_string(),
            voice: "Polly.Joanna".to_string(),
            speech_timeout_secs: 10,
            followup_timeout_secs: 5,
            min_confidence: 0.5,
        }
    }
}
