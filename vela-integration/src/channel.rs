use derive_more::Constructor;
use tracing::warn;

/// Minimal sender abstraction implemented by every channel producer half.
///
/// Components that publish events (venue adapters, the backtest feed) are
/// generic over a [`Tx`] so they can target the live bus queue, a test
/// collector, or a no-op sink without caring which.
pub trait Tx
where
    Self: Clone + Send,
{
    type Item;

    fn send(&self, item: Self::Item) -> Result<(), SendDropped>;
}

/// Error returned by [`Tx::send`] when the receiver half has been dropped.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SendDropped;

/// Unbounded tokio MPSC sender implementing [`Tx`].
#[derive(Debug)]
pub struct UnboundedTx<T> {
    pub tx: tokio::sync::mpsc::UnboundedSender<T>,
}

impl<T> Clone for UnboundedTx<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> Tx for UnboundedTx<T>
where
    T: Send,
{
    type Item = T;

    fn send(&self, item: Self::Item) -> Result<(), SendDropped> {
        self.tx.send(item).map_err(|_| SendDropped)
    }
}

/// Unbounded tokio MPSC receiver half paired with [`UnboundedTx`].
#[derive(Debug, Constructor)]
pub struct UnboundedRx<T> {
    pub rx: tokio::sync::mpsc::UnboundedReceiver<T>,
}

impl<T> UnboundedRx<T> {
    /// Drain every item currently queued without waiting.
    pub fn drain(&mut self) -> Vec<T> {
        let mut drained = Vec::new();
        while let Ok(item) = self.rx.try_recv() {
            drained.push(item);
        }
        drained
    }

    pub fn into_stream(self) -> tokio_stream::wrappers::UnboundedReceiverStream<T> {
        tokio_stream::wrappers::UnboundedReceiverStream::new(self.rx)
    }
}

/// Construct an unbounded MPSC channel pair.
pub fn mpsc_unbounded<T>() -> (UnboundedTx<T>, UnboundedRx<T>) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    (UnboundedTx { tx }, UnboundedRx::new(rx))
}

/// [`Tx`] wrapper that disables itself after the receiver is dropped,
/// instead of surfacing the error to every subsequent caller.
#[derive(Debug, Clone)]
pub struct TxDroppable<ChannelTx> {
    state: TxState<ChannelTx>,
}

#[derive(Debug, Clone)]
enum TxState<ChannelTx> {
    Active(ChannelTx),
    Disabled,
}

impl<ChannelTx> TxDroppable<ChannelTx>
where
    ChannelTx: Tx,
{
    pub fn new(tx: ChannelTx) -> Self {
        Self {
            state: TxState::Active(tx),
        }
    }

    pub fn send(&mut self, item: ChannelTx::Item) {
        let TxState::Active(tx) = &self.state else {
            return;
        };

        if tx.send(item).is_err() {
            warn!(
                item = std::any::type_name::<ChannelTx::Item>(),
                "TxDroppable receiver dropped - items will no longer be sent"
            );
            self.state = TxState::Disabled;
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, TxState::Active(_))
    }
}
