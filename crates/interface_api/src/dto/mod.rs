//! Request and response bodies
//!
//! Request bodies are the validated commands from `domain_automation`; this
//! module holds the response shapes.

pub mod invoice;
