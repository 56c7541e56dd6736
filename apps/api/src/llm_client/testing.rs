//! Scripted `ChatTransport` for unit tests: no network, every call recorded.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ChatRequest, ChatTransport, LlmError};

type Responder = Box<dyn Fn(&ChatRequest<'_>) -> Result<String, LlmError> + Send + Sync>;

pub struct ScriptedTransport {
    responder: Responder,
    calls: AtomicUsize,
    prompts: Mutex<Vec<(String, String)>>,
}

impl ScriptedTransport {
    /// Answers each request with a function of the request itself.
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&ChatRequest<'_>) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Replays the given outcomes in order, then fails with `EmptyContent`.
    pub fn queue(outcomes: Vec<Result<String, LlmError>>) -> Self {
        let queue = Mutex::new(VecDeque::from(outcomes));
        Self::new(move |_| {
            queue
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(LlmError::EmptyContent))
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// `(system, prompt)` pairs in arrival order.
    pub fn requests(&self) -> Vec<(String, String)> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &ChatRequest<'_>) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap()
            .push((request.system.to_string(), request.prompt.to_string()));
        (self.responder)(request)
    }
}
