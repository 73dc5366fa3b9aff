//! Classification pipeline.
//!
//! Every matching inbound message flows through a fixed sequence:
//! 1. Topic-relatedness gate — keyword pre-filter, then one model call
//! 2. Detail extraction — only when related
//! 3. Disposition — attachment short-circuit, else one model call
//! 4. Reply drafting — one creative-temperature model call
//! 5. Illustration — only when related, never fatal
//!
//! Failures stay scoped to the message: the poller catches `PipelineError`
//! and moves on.

pub mod classifier;
pub mod illustrator;
pub mod types;

pub use classifier::EmailClassifier;
pub use illustrator::Illustrator;
pub use types::PipelineOutcome;
