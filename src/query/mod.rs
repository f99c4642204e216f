//! Question answering over a published graph version

pub mod oracle;

pub use oracle::{Answer, AskOutcome, Citation, Oracle, validate_question};
