//! Call stages and the per-stage transitions
//!
//! A call moves through a fixed set of stages, each entered by a provider
//! webhook. The provider holds no state for us; the stage is implied by which
//! route it calls next, and every transition returns the voice document that
//! steers it there.

use serde::{Deserialize, Serialize};

use crate::script::{CallScript, VoiceSettings};
use crate::twiml::{Gather, Say, VoiceResponse};

/// Route that starts (or restarts) the conversation
pub const OUTBOUND_PATH: &str = "/outbound";
/// Route receiving the caller's question
pub const PROCESS_SPEECH_PATH: &str = "/process_speech";
/// Route receiving the answer to "anything else?"
pub const PROCESS_FOLLOWUP_PATH: &str = "/process_followup";

/// Follow-up words that keep the call going
pub const AFFIRMATIVE_TOKENS: [&str; 6] = ["yes", "yeah", "yep", "sure", "okay", "ok"];

/// Where a call currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CallStage {
    /// Welcome spoken, waiting for the first question
    #[default]
    Greeting,
    /// Transcript received, being validated
    AwaitingSpeech,
    /// Completion in flight
    Answering,
    /// Answer spoken, waiting for yes/no
    AwaitingFollowup,
    /// Call hung up
    Ended,
}

impl CallStage {
    /// Stages reachable from this one
    pub fn allowed_transitions(&self) -> &'static [CallStage] {
        use CallStage::*;
        match self {
            Greeting => &[AwaitingSpeech, Greeting],
            AwaitingSpeech => &[Answering, Greeting],
            Answering => &[AwaitingFollowup, Ended],
            AwaitingFollowup => &[Greeting, Ended],
            Ended => &[],
        }
    }

    pub fn can_transition_to(&self, target: CallStage) -> bool {
        self.allowed_transitions().contains(&target)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CallStage::Ended)
    }

    /// Stable snake_case name, used as a metrics label
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStage::Greeting => "greeting",
            CallStage::AwaitingSpeech => "awaiting_speech",
            CallStage::Answering => "answering",
            CallStage::AwaitingFollowup => "awaiting_followup",
            CallStage::Ended => "ended",
        }
    }

    /// Webhook route the provider calls to enter this stage
    pub fn webhook_path(&self) -> Option<&'static str> {
        match self {
            CallStage::Greeting => Some(OUTBOUND_PATH),
            CallStage::AwaitingSpeech => Some(PROCESS_SPEECH_PATH),
            CallStage::AwaitingFollowup => Some(PROCESS_FOLLOWUP_PATH),
            CallStage::Answering | CallStage::Ended => None,
        }
    }
}

impl std::fmt::Display for CallStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallStage::Greeting => write!(f, "Greeting"),
            CallStage::AwaitingSpeech => write!(f, "Awaiting Speech"),
            CallStage::Answering => write!(f, "Answering"),
            CallStage::AwaitingFollowup => write!(f, "Awaiting Follow-up"),
            CallStage::Ended => write!(f, "Ended"),
        }
    }
}

/// One caller utterance as reported by the provider
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TurnInput {
    /// Whitespace-trimmed transcript
    pub transcript: String,
    /// Recognition confidence, when reported and parseable
    pub confidence: Option<f64>,
}

impl TurnInput {
    pub fn new(transcript: impl AsRef<str>, confidence: Option<f64>) -> Self {
        Self {
            transcript: transcript.as_ref().trim().to_string(),
            confidence,
        }
    }

    /// Build from raw webhook fields.
    ///
    /// An unparseable confidence or NaN is dropped. Infinities are kept, so
    /// `-inf` still counts as below any threshold.
    pub fn from_raw(speech: Option<&str>, confidence: Option<&str>) -> Self {
        let confidence = confidence
            .map(str::trim)
            .and_then(|raw| raw.parse::<f64>().ok())
            .filter(|value| !value.is_nan());
        Self::new(speech.unwrap_or_default(), confidence)
    }

    pub fn is_empty(&self) -> bool {
        self.transcript.is_empty()
    }
}

/// Result of a stage transition
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: CallStage,
    pub next: CallStage,
    pub document: VoiceResponse,
}

/// Outcome of validating a transcript
#[derive(Debug, Clone, PartialEq)]
pub enum SpeechStep {
    /// Input rejected, ask again
    Reprompt(Transition),
    /// Input accepted, ask the completion API
    Answer(String),
}

/// Whether a follow-up reply means "keep going"
///
/// Matches on substrings, so "okay then" and "yes please" count.
pub fn is_affirmative(transcript: &str) -> bool {
    let lowered = transcript.to_lowercase();
    AFFIRMATIVE_TOKENS
        .iter()
        .any(|token| lowered.contains(token))
}

/// Builds the voice document for each stage from the configured script
#[derive(Debug, Clone, Default)]
pub struct CallFlow {
    script: CallScript,
    voice: VoiceSettings,
}

impl CallFlow {
    pub fn new(script: CallScript, voice: VoiceSettings) -> Self {
        Self { script, voice }
    }

    pub fn script(&self) -> &CallScript {
        &self.script
    }

    pub fn voice(&self) -> &VoiceSettings {
        &self.voice
    }

    fn say(&self, text: &str) -> Say {
        Say::new(text, &self.voice.language, &self.voice.voice)
    }

    /// Opening question.
    ///
    /// If the gather times out without speech the provider falls through to
    /// the no-input line and the redirect back here.
    pub fn greet(&self) -> Transition {
        let gather = Gather::speech(
            PROCESS_SPEECH_PATH,
            self.voice.speech_timeout_secs,
            &self.voice.language,
        )
        .with_prompt(self.say(&self.script.welcome));

        Transition {
            from: CallStage::Greeting,
            next: CallStage::AwaitingSpeech,
            document: VoiceResponse::new()
                .gather(gather)
                .say(self.say(&self.script.no_input))
                .redirect(OUTBOUND_PATH),
        }
    }

    /// Validate a transcript before it reaches the completion API
    pub fn on_speech(&self, turn: &TurnInput) -> SpeechStep {
        if turn.is_empty() {
            return SpeechStep::Reprompt(self.reprompt(&self.script.didnt_catch));
        }

        if let Some(confidence) = turn.confidence {
            if confidence < self.voice.min_confidence {
                return SpeechStep::Reprompt(self.reprompt(&self.script.low_confidence));
            }
        }

        SpeechStep::Answer(turn.transcript.clone())
    }

    fn reprompt(&self, line: &str) -> Transition {
        Transition {
            from: CallStage::AwaitingSpeech,
            next: CallStage::Greeting,
            document: VoiceResponse::new()
                .say(self.say(line))
                .redirect(OUTBOUND_PATH),
        }
    }

    /// Speak the answer and ask for a follow-up, or apologize when there is none
    pub fn on_answer(&self, answer: Option<&str>) -> Transition {
        let answer = answer.map(str::trim).filter(|text| !text.is_empty());

        match answer {
            Some(text) => {
                let gather = Gather::speech(
                    PROCESS_FOLLOWUP_PATH,
                    self.voice.followup_timeout_secs,
                    &self.voice.language,
                )
                .with_prompt(self.say(&self.script.anything_else));

                Transition {
                    from: CallStage::Answering,
                    next: CallStage::AwaitingFollowup,
                    document: VoiceResponse::new()
                        .say(self.say(text))
                        .gather(gather)
                        .say(self.say(&self.script.closing))
                        .hangup(),
                }
            },
            None => Transition {
                from: CallStage::Answering,
                next: CallStage::Ended,
                document: self.apology(&self.script.processing_failure),
            },
        }
    }

    /// Restart on an affirmative reply, otherwise say goodbye
    pub fn on_followup(&self, transcript: &str) -> Transition {
        if is_affirmative(transcript) {
            Transition {
                from: CallStage::AwaitingFollowup,
                next: CallStage::Greeting,
                document: VoiceResponse::new().redirect(OUTBOUND_PATH),
            }
        } else {
            Transition {
                from: CallStage::AwaitingFollowup,
                next: CallStage::Ended,
                document: VoiceResponse::new()
                    .say(self.say(&self.script.closing))
                    .hangup(),
            }
        }
    }

    /// Say `line` and hang up
    pub fn apology(&self, line: &str) -> VoiceResponse {
        VoiceResponse::new().say(self.say(line)).hangup()
    }
}
