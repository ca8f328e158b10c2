pub mod client;

pub use client::{FragmentStream, LlmError, LlmServices, Provider};
