//! Structured events streamed to a response channel.
//!
//! Events are produced by participants and the tool layer and consumed
//! by the transport for wire translation. They are plain data; nothing
//! owns them beyond the call that creates them.

use serde_json::Value;

/// A structured event streamed into a response channel.
#[derive(Debug, Clone)]
pub enum ResponseEvent {
    /// A complete markdown block, recorded into history immediately.
    Markdown {
        content: String,
        detail: Option<Value>,
    },
    /// A markdown fragment; fragments accumulate and are recorded into
    /// history as one assistant message on finish.
    MarkdownPart { content: String },
    /// An image, as a data URL.
    Image { content: String },
    /// An embedded HTML frame.
    HtmlFrame { source: String, height: u32 },
    /// A hyperlink.
    Anchor { uri: String, title: String },
    /// A button bound to a front-end command.
    Button {
        title: String,
        command_id: String,
        args: Value,
    },
    /// A progress note.
    Progress { title: String },
    /// A confirmation request with correlated confirm/cancel payloads.
    Confirmation {
        title: String,
        message: String,
        confirm_args: Value,
        cancel_args: Value,
        confirm_label: Option<String>,
        cancel_label: Option<String>,
    },
    /// A raw model chunk, passed through with minimal wrapping.
    Raw(Value),
}

impl ResponseEvent {
    /// Create a markdown event.
    pub fn markdown(content: impl Into<String>) -> Self {
        Self::Markdown {
            content: content.into(),
            detail: None,
        }
    }

    /// Create a markdown event with detail payload.
    pub fn markdown_with_detail(content: impl Into<String>, detail: Option<Value>) -> Self {
        Self::Markdown {
            content: content.into(),
            detail,
        }
    }

    /// Create a markdown fragment event.
    pub fn markdown_part(content: impl Into<String>) -> Self {
        Self::MarkdownPart {
            content: content.into(),
        }
    }

    /// Create a progress event.
    pub fn progress(title: impl Into<String>) -> Self {
        Self::Progress {
            title: title.into(),
        }
    }

    /// Wire name of the event type, used in the `nbiContent` wrapper.
    pub fn data_type(&self) -> &'static str {
        match self {
            ResponseEvent::Markdown { .. } => "markdown",
            ResponseEvent::MarkdownPart { .. } => "markdown-part",
            ResponseEvent::Image { .. } => "image",
            ResponseEvent::HtmlFrame { .. } => "html-frame",
            ResponseEvent::Anchor { .. } => "anchor",
            ResponseEvent::Button { .. } => "button",
            ResponseEvent::Progress { .. } => "progress",
            ResponseEvent::Confirmation { .. } => "confirmation",
            ResponseEvent::Raw(_) => "llm-raw",
        }
    }
}
