//! Shared test utilities for the `inference` module.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use crate::inference::client::{
    ClientMetadata, FinishReason, InferenceTransport, RawCompletion, TransportRequest,
};
use crate::inference::error::InferenceError;

/// One request as recorded by [`ScriptedTransport`].
#[derive(Debug, Clone)]
pub(crate) struct RecordedCall {
    pub(crate) key: String,
    pub(crate) system_context: String,
    pub(crate) prompt: String,
    pub(crate) output_ceiling: usize,
}

type Responder = Box<dyn Fn(&RecordedCall) -> Result<RawCompletion, InferenceError> + Send + Sync>;

enum Script {
    Queue(Mutex<VecDeque<Result<RawCompletion, InferenceError>>>),
    Function(Responder),
}

/// Mock transport with a pre-programmed script.
///
/// A queued script answers in FIFO order and returns a transient error once
/// exhausted. A function script answers each call from the recorded request,
/// which keeps concurrent tests independent of completion order.
pub(crate) struct ScriptedTransport {
    script: Script,
    metadata: ClientMetadata,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl ScriptedTransport {
    /// Creates a transport that returns the given responses in order.
    pub(crate) fn queued(responses: Vec<Result<RawCompletion, InferenceError>>) -> Self {
        Self::with_script(Script::Queue(Mutex::new(VecDeque::from(responses))))
    }

    /// Creates a transport that answers every call with `responder`.
    pub(crate) fn from_fn<F>(responder: F) -> Self
    where
        F: Fn(&RecordedCall) -> Result<RawCompletion, InferenceError> + Send + Sync + 'static,
    {
        Self::with_script(Script::Function(Box::new(responder)))
    }

    fn with_script(script: Script) -> Self {
        Self {
            script,
            metadata: ClientMetadata {
                provider: "Mock".to_string(),
                model: "mock-model".to_string(),
                max_context_length: 200_000,
                max_response_length: 8_192,
            },
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Returns the transport with a custom response ceiling.
    pub(crate) fn with_max_response_length(mut self, max_response_length: usize) -> Self {
        self.metadata.max_response_length = max_response_length;
        self
    }

    /// Returns the transport with a custom context window size.
    pub(crate) fn with_context_length(mut self, max_context_length: usize) -> Self {
        self.metadata.max_context_length = max_context_length;
        self
    }

    /// Returns a handle for inspecting calls after the transport is moved.
    pub(crate) fn call_handle(&self) -> CallRecordHandle {
        CallRecordHandle {
            calls: self.calls.clone(),
        }
    }
}

/// Shared handle to a scripted transport's recorded calls.
pub(crate) struct CallRecordHandle {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl CallRecordHandle {
    /// Returns all recorded calls.
    pub(crate) fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Returns the number of calls made.
    pub(crate) fn request_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl InferenceTransport for ScriptedTransport {
    fn generate<'a>(
        &'a self,
        key: &'a str,
        request: &'a TransportRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<RawCompletion, InferenceError>> + Send + 'a>> {
        let call = RecordedCall {
            key: key.to_string(),
            system_context: request.system_context.to_string(),
            prompt: request.prompt.to_string(),
            output_ceiling: request.output_ceiling,
        };
        Box::pin(async move {
            self.calls.lock().unwrap().push(call.clone());
            match &self.script {
                Script::Queue(queue) => queue.lock().unwrap().pop_front().unwrap_or_else(|| {
                    Err(InferenceError::Transient("no more mock responses".to_string()))
                }),
                Script::Function(responder) => responder(&call),
            }
        })
    }

    fn metadata(&self) -> ClientMetadata {
        self.metadata.clone()
    }
}

/// A normal completion with `text`.
pub(crate) fn stop(text: impl Into<String>) -> Result<RawCompletion, InferenceError> {
    Ok(RawCompletion {
        text: text.into(),
        finish_reason: FinishReason::Stop,
    })
}

/// A size-limit completion with partial `text`.
pub(crate) fn max_tokens(text: impl Into<String>) -> Result<RawCompletion, InferenceError> {
    Ok(RawCompletion {
        text: text.into(),
        finish_reason: FinishReason::MaxTokens,
    })
}
