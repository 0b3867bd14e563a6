/// Hyperliquid perpetual futures data adapter.
pub mod hyperliquid;
