//! TwiML voice documents
//!
//! A [`VoiceResponse`] is the ordered list of verbs that tells the telephony
//! provider what to do next on a live call. Each verb maps to exactly one
//! markup element inside a single `<Response>` root:
//!
//! | Verb       | Element       |
//! |------------|---------------|
//! | `Say`      | `<Say>`       |
//! | `Gather`   | `<Gather>`    |
//! | `Redirect` | `<Redirect>`  |
//! | `Hangup`   | `<Hangup/>`   |
//!
//! The renderer is purely structural. Deciding which verbs to emit is the
//! job of [`crate::conversation::CallFlow`].

use std::fmt::{self, Write};

/// XML prolog emitted ahead of every document.
pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Content type the provider expects for voice documents.
pub const TWIML_CONTENT_TYPE: &str = "text/xml";

/// Spoken text with the synthesized voice that reads it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Say {
    pub text: String,
    pub language: String,
    pub voice: String,
}

impl Say {
    pub fn new(
        text: impl Into<String>,
        language: impl Into<String>,
        voice: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            language: language.into(),
            voice: voice.into(),
        }
    }
}

/// Input modes a `<Gather>` listens for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatherInput {
    Speech,
    Dtmf,
    DtmfSpeech,
}

impl GatherInput {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatherInput::Speech => "speech",
            GatherInput::Dtmf => "dtmf",
            GatherInput::DtmfSpeech => "dtmf speech",
        }
    }
}

/// Collect caller input and POST it to `action`.
///
/// Nested prompts are spoken while the provider is listening, so the caller
/// can barge in before they finish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gather {
    pub input: GatherInput,
    pub timeout_secs: u32,
    pub language: String,
    pub action: String,
    pub prompts: Vec<Say>,
}

impl Gather {
    /// Speech gather with no nested prompts
    pub fn speech(
        action: impl Into<String>,
        timeout_secs: u32,
        language: impl Into<String>,
    ) -> Self {
        Self {
            input: GatherInput::Speech,
            timeout_secs,
            language: language.into(),
            action: action.into(),
            prompts: Vec::new(),
        }
    }

    /// Add a prompt spoken while listening
    pub fn with_prompt(mut self, say: Say) -> Self {
        self.prompts.push(say);
        self
    }
}

/// A single voice directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verb {
    Say(Say),
    Gather(Gather),
    Redirect(String),
    Hangup,
}

impl Verb {
    /// Element name used in the markup
    pub fn tag(&self) -> &'static str {
        match self {
            Verb::Say(_) => "Say",
            Verb::Gather(_) => "Gather",
            Verb::Redirect(_) => "Redirect",
            Verb::Hangup => "Hangup",
        }
    }
}

/// Ordered voice document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoiceResponse {
    verbs: Vec<Verb>,
}

impl VoiceResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn say(mut self, say: Say) -> Self {
        self.verbs.push(Verb::Say(say));
        self
    }

    pub fn gather(mut self, gather: Gather) -> Self {
        self.verbs.push(Verb::Gather(gather));
        self
    }

    pub fn redirect(mut self, path: impl Into<String>) -> Self {
        self.verbs.push(Verb::Redirect(path.into()));
        self
    }

    pub fn hangup(mut self) -> Self {
        self.verbs.push(Verb::Hangup);
        self
    }

    pub fn verbs(&self) -> &[Verb] {
        &self.verbs
    }

    pub fn is_empty(&self) -> bool {
        self.verbs.is_empty()
    }

    /// Every spoken line in document order, including prompts nested in gathers
    pub fn spoken_text(&self) -> Vec<&str> {
        let mut lines = Vec::new();
        for verb in &self.verbs {
            match verb {
                Verb::Say(say) => lines.push(say.text.as_str()),
                Verb::Gather(gather) => {
                    lines.extend(gather.prompts.iter().map(|say| say.text.as_str()))
                }
                Verb::Redirect(_) | Verb::Hangup => {}
            }
        }
        lines
    }

    /// First gather directive, if any
    pub fn first_gather(&self) -> Option<&Gather> {
        self.verbs.iter().find_map(|verb| match verb {
            Verb::Gather(gather) => Some(gather),
            _ => None,
        })
    }

    /// Target of the first redirect, if any
    pub fn redirect_target(&self) -> Option<&str> {
        self.verbs.iter().find_map(|verb| match verb {
            Verb::Redirect(path) => Some(path.as_str()),
            _ => None,
        })
    }

    pub fn has_hangup(&self) -> bool {
        self.verbs.iter().any(|verb| matches!(verb, Verb::Hangup))
    }

    /// Serialize to provider markup
    pub fn to_xml(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for VoiceResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(XML_DECLARATION)?;
        f.write_str("<Response>")?;
        for verb in &self.verbs {
            write_verb(f, verb)?;
        }
        f.write_str("</Response>")
    }
}

fn write_verb(f: &mut fmt::Formatter<'_>, verb: &Verb) -> fmt::Result {
    match verb {
        Verb::Say(say) => write_say(f, say),
        Verb::Gather(gather) => {
            f.write_str("<Gather action=\"")?;
            write_escaped(f, &gather.action)?;
            f.write_str("\" input=\"")?;
            f.write_str(gather.input.as_str())?;
            f.write_str("\" language=\"")?;
            write_escaped(f, &gather.language)?;
            write!(f, "\" timeout=\"{}\">", gather.timeout_secs)?;
            for say in &gather.prompts {
                write_say(f, say)?;
            }
            f.write_str("</Gather>")
        }
        Verb::Redirect(path) => {
            f.write_str("<Redirect>")?;
            write_escaped(f, path)?;
            f.write_str("</Redirect>")
        }
        Verb::Hangup => f.write_str("<Hangup/>"),
    }
}

fn write_say(f: &mut fmt::Formatter<'_>, say: &Say) -> fmt::Result {
    f.write_str("<Say language=\"")?;
    write_escaped(f, &say.language)?;
    f.write_str("\" voice=\"")?;
    write_escaped(f, &say.voice)?;
    f.write_str("\">")?;
    write_escaped(f, &say.text)?;
    f.write_str("</Say>")
}

/// Escape the five XML special characters. Used for text and attribute values.
fn write_escaped(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    for c in value.chars() {
        match c {
            '&' => f.write_str("&amp;")?,
            '<' => f.write_str("&lt;")?,
            '>' => f.write_str("&gt;")?,
            '"' => f.write_str("&quot;")?,
            '\'' => f.write_str("&apos;")?,
            _ => f.write_char(c)?,
        }
    }
    Ok(())
}
