//! Markdown answer text to a standalone, styled HTML document.

use askama::Template;
use comrak::{Arena, Options, format_html, parse_document};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("markdown rendering failed: {message}")]
    Markdown { message: String },
    #[error("document template failed: {0}")]
    Template(#[from] askama::Error),
}

#[derive(Template)]
#[template(path = "answer.html")]
struct AnswerTemplate<'a> {
    body: &'a str,
}

/// CommonMark + GFM renderer. Raw HTML in the answer passes through untouched.
pub struct DocumentRenderer {
    options: Options<'static>,
}

impl DocumentRenderer {
    pub fn new() -> Self {
        Self {
            options: default_options(),
        }
    }

    /// Render `markdown` and wrap the fragment in the answer page.
    pub fn render(&self, markdown: &str) -> Result<String, DocumentError> {
        let body = self.render_fragment(markdown)?;
        Ok(AnswerTemplate { body: &body }.render()?)
    }

    pub fn render_fragment(&self, markdown: &str) -> Result<String, DocumentError> {
        let arena = Arena::new();
        let root = parse_document(&arena, markdown, &self.options);
        let mut html = String::new();
        format_html(root, &self.options, &mut html).map_err(|err| DocumentError::Markdown {
            message: err.to_string(),
        })?;
        Ok(html)
    }
}

impl Default for DocumentRenderer {
    fn default() -> Self {
        Self::new()
    }
}

fn default_options() -> Options<'static> {
    let mut options = Options::default();

    let ext = &mut options.extension;
    ext.strikethrough = true;
    ext.tagfilter = false;
    ext.table = true;
    ext.autolink = true;
    ext.tasklist = true;
    ext.footnotes = true;
    ext.cjk_friendly_emphasis = true;

    let render = &mut options.render;
    render.github_pre_lang = true;
    render.tasklist_classes = true;
    render.r#unsafe = true;

    options
}
