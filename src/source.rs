use futures::{future::BoxFuture, FutureExt};
use tokio::sync::mpsc;
use tracing::debug;

use crate::{topic::TopicFilter, Record};

/// Stream of records the dispatcher pulls from.
///
/// `next_record` resolving to `Ok(None)` means the source is exhausted and no
/// further records will arrive.
pub trait MessageSource: Send + 'static {
    fn subscribe<'a>(&'a mut self, filter: &'a TopicFilter) -> BoxFuture<'a, anyhow::Result<()>>;

    fn next_record(&mut self) -> BoxFuture<'_, anyhow::Result<Option<Record>>>;
}

/// In-process source fed through a channel. Ends once every sender is dropped.
pub struct ChannelSource {
    rx: mpsc::Receiver<Record>,
}

impl ChannelSource {
    pub fn channel(capacity: usize) -> (mpsc::Sender<Record>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx })
    }
}

impl MessageSource for ChannelSource {
    fn subscribe<'a>(&'a mut self, filter: &'a TopicFilter) -> BoxFuture<'a, anyhow::Result<()>> {
        async move {
            debug!(%filter, "channel source subscribed");
            Ok(())
        }
        .boxed()
    }

    fn next_record(&mut self) -> BoxFuture<'_, anyhow::Result<Option<Record>>> {
        async move { Ok(self.rx.recv().await) }.boxed()
    }
}
