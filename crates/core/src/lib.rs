//! Core types for the voice caller
//!
//! This crate has no I/O. It provides:
//! - Voice documents and their TwiML serialization
//! - Call stages and the transition for each stage
//! - The scripted lines and voice settings a call is spoken with

pub mod conversation;
pub mod script;
pub mod twiml;

pub use conversation::{
    is_affirmative, CallFlow, CallStage, SpeechStep, Transition, TurnInput, AFFIRMATIVE_TOKENS,
    OUTBOUND_PATH, PROCESS_FOLLOWUP_PATH, PROCESS_SPEECH_PATH,
};
pub use script::{CallScript, VoiceSettings};
pub use twiml::{Gather, GatherInput, Say, Verb, VoiceResponse, TWIML_CONTENT_TYPE};
