//! Typed answers and their persistence
//!
//! The panel hands the answer buffer to an `AnswerStore` on save. Records
//! carry the interview question they answer and the expressions detected
//! at the moment of saving.

pub mod schema;
pub mod store;

pub use schema::{AnswerRecord, InterviewContext};
pub use store::{AnswerStore, JsonAnswerStore, PersistenceError};
