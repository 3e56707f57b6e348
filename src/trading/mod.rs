//! Trading module - transaction construction and submission
//!
//! Three collaborators with one seam between them: builders produce a
//! [`TransactionRequest`](crate::types::TransactionRequest), the submission
//! state machine consumes one. Transfers are assembled locally; swaps come
//! back prebuilt from the aggregator.

pub mod submit;
pub mod swap;
pub mod transfer;

pub use submit::SubmissionStateMachine;
pub use swap::{SwapOrchestrator, SwapQuote};
pub use transfer::TransferBuilder;
