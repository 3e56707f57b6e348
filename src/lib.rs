//! Solana Wallet Core Library
//!
//! Non-custodial wallet engine: key derivation and import, portfolio
//! aggregation with multi-tier pricing, native and SPL token transfers,
//! aggregator swaps, and a bounded submission state machine.

pub mod config;
pub mod error;
pub mod portfolio;
pub mod price;
pub mod rpc;
pub mod trading;
pub mod types;
pub mod wallet;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
pub use portfolio::BalanceAggregator;
pub use price::PriceOracle;
pub use rpc::{ChainRpc, HttpRpcClient};
pub use trading::{SubmissionStateMachine, SwapOrchestrator, TransferBuilder};
pub use types::{PortfolioSnapshot, SubmissionResult, SubmissionStatus, TransactionRequest};
pub use wallet::WalletSession;
