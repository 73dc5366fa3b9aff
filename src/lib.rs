//! Sponsor Assist — sponsorship-inbox triage assistant.
//!
//! Polls a mailbox for unread messages from a configured sender, classifies
//! each with a language model, optionally generates an illustrative image,
//! replies automatically, and records every decision in a local log.

pub mod config;
pub mod dashboard;
pub mod error;
pub mod llm;
pub mod mailbox;
pub mod pipeline;
pub mod poller;
pub mod store;
pub mod taxonomy;
