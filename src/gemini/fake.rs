//! In-process stand-in for the Gemini API, for tests above the client.

use std::cell::RefCell;

use super::client::ContentGenerator;
use super::error::GeminiError;
use super::types::{Candidate, Content, GenerateRequest, GenerateResponse, Part};

type Responder = Box<dyn Fn(&GenerateRequest) -> Result<GenerateResponse, GeminiError>>;

/// Answers every request with `responder` and keeps a copy of each request.
pub struct FakeGenerator {
    responder: Responder,
    requests: RefCell<Vec<GenerateRequest>>,
}

impl FakeGenerator {
    pub fn new(
        responder: impl Fn(&GenerateRequest) -> Result<GenerateResponse, GeminiError> + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.borrow().len()
    }

    /// Text of the last segment of every request, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.requests
            .borrow()
            .iter()
            .map(|r| last_segment(r).to_string())
            .collect()
    }
}

impl ContentGenerator for FakeGenerator {
    async fn generate(&self, req: &GenerateRequest) -> Result<GenerateResponse, GeminiError> {
        self.requests.borrow_mut().push(req.clone());
        (self.responder)(req)
    }
}

pub fn last_segment(req: &GenerateRequest) -> &str {
    req.contents
        .last()
        .and_then(|c| c.parts.last())
        .map(|p| p.text.as_str())
        .unwrap_or("")
}

pub fn text_response(text: &str) -> GenerateResponse {
    GenerateResponse {
        candidates: vec![Candidate {
            content: Some(Content {
                role: Some("model".into()),
                parts: vec![Part { text: text.into() }],
            }),
            finish_reason: Some("STOP".into()),
        }],
        usage_metadata: None,
    }
}
