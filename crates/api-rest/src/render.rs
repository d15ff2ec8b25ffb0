//! HTML pages.
//!
//! Templates are compiled into the binary and registered once at startup. Handlebars escapes
//! every interpolated value.

use handlebars::{Handlebars, RenderError, TemplateError};
use rh_core::translate::{MessageLevel, Page, UserMessage};
use serde::Serialize;
use serde_json::json;

pub type RenderResult<T> = std::result::Result<T, RenderError>;

#[derive(Serialize)]
struct PanelContext<'a> {
    kind: &'a str,
    text: &'a str,
    level: &'a str,
    clickable: bool,
    needs_correction: bool,
}

impl<'a> From<&'a UserMessage> for PanelContext<'a> {
    fn from(message: &'a UserMessage) -> Self {
        Self {
            kind: message.kind,
            text: message.text,
            level: message.level.as_str(),
            clickable: message.clickable,
            needs_correction: message.level == MessageLevel::Error,
        }
    }
}

/// Per-request values shared by every page.
#[derive(Clone, Copy, Debug)]
pub struct Frame<'a> {
    /// Post target of the access code form.
    pub action: &'a str,
    /// Script nonce matching the response's content security policy.
    pub nonce: &'a str,
}

pub struct Pages {
    registry: Handlebars<'static>,
}

impl Pages {
    /// Registers all templates.
    ///
    /// # Errors
    ///
    /// Returns a [`TemplateError`] if a template fails to parse.
    pub fn new() -> Result<Self, TemplateError> {
        let mut registry = Handlebars::new();
        registry.register_partial("header", include_str!("../templates/header.hbs"))?;
        registry.register_partial("footer", include_str!("../templates/footer.hbs"))?;
        registry.register_template_string("index", include_str!("../templates/index.hbs"))?;
        registry.register_template_string("notice", include_str!("../templates/notice.hbs"))?;
        registry.register_template_string("error", include_str!("../templates/error.hbs"))?;
        Ok(Self { registry })
    }

    /// The access code form, optionally with a message panel.
    pub fn index(&self, frame: Frame<'_>, message: Option<&UserMessage>) -> RenderResult<String> {
        let message = message.map(PanelContext::from);
        self.registry.render(
            "index",
            &json!({ "action": frame.action, "nonce": frame.nonce, "message": message }),
        )
    }

    pub fn notice(&self, frame: Frame<'_>, title: &str, text: &str) -> RenderResult<String> {
        self.registry.render(
            "notice",
            &json!({ "nonce": frame.nonce, "title": title, "text": text }),
        )
    }

    pub fn error(&self, frame: Frame<'_>, summary: &str) -> RenderResult<String> {
        self.registry.render(
            "error",
            &json!({ "action": frame.action, "nonce": frame.nonce, "summary": summary }),
        )
    }

    /// Renders the page for a translated failure.
    pub fn page(&self, frame: Frame<'_>, page: &Page) -> RenderResult<String> {
        match page {
            Page::Panel(message) => self.index(frame, Some(message)),
            Page::Notice { title, text } => self.notice(frame, title, text),
            Page::Error { summary } => self.error(frame, summary),
        }
    }
}
