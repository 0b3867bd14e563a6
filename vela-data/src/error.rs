use rust_decimal::Decimal;
use thiserror::Error;
use vela_integration::error::SocketError;

/// All errors generated by the market data pipeline.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("socket error: {0}")]
    Socket(#[from] SocketError),

    #[error("order book delta sequence gap: last applied {last}, received {received}")]
    SequenceGap { last: u64, received: u64 },

    #[error("order book update would cross the book: bid {bid} >= ask {ask}")]
    CrossedBook { bid: Decimal, ask: Decimal },

    #[error("unknown venue channel: {0}")]
    UnknownChannel(String),

    #[error("unknown venue symbol: {0}")]
    UnknownSymbol(String),

    #[error("invalid decimal on venue frame: {0}")]
    InvalidDecimal(String),

    #[error("reconnect attempts exhausted after {attempts}")]
    ReconnectExhausted { attempts: u32 },
}

impl DataError {
    /// True if recovering requires tearing down the book state and
    /// resubscribing for a fresh snapshot.
    pub fn requires_resubscribe(&self) -> bool {
        matches!(
            self,
            DataError::SequenceGap { .. } | DataError::CrossedBook { .. }
        )
    }
}
