//! Price module - multi-tier price and metadata resolution
//!
//! An ordered waterfall of price sources: a batch aggregator API first, a
//! pair-based DEX lookup second, a hand-pinned table last. Lookups never
//! raise; whatever could not be priced is absent from the result.

pub mod dexscreener;
pub mod jupiter;
pub mod oracle;

pub use dexscreener::DexScreenerClient;
pub use jupiter::JupiterPriceClient;
pub use oracle::{PinnedToken, PriceOracle, PriceSource};
