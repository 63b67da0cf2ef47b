//! Test modules for the messaging layer
//!
//! Pure data-structure suites run without a runtime; engine and session
//! suites drive a full context on a multi-threaded tokio runtime.

mod engine;
mod processor_state;
mod support;
