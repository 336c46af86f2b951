//! Model invoker integration.
//!
//! Stages talk to the external language model through the [`ModelInvoker`]
//! trait; the pipeline treats it as an opaque, potentially nondeterministic
//! collaborator with no retry policy of its own beyond per-stage parse
//! retries. [`HttpInvoker`] is a thin OpenAI-compatible chat-completions
//! client for production use.

pub mod extract;
pub mod invoker;

pub use extract::extract_json;
pub use invoker::{
    Choice, GenerationRequest, GenerationResponse, HttpInvoker, Message, ModelInvoker, Usage,
};
