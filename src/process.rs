//! Business processes receive decoded messages, one at a time.
//!
//! Processes are usually not called directly by the dispatcher but through a
//! [`LoggingProcess`] wrapper, obtained from a [`ProcessCache`] keyed by topic name.

mod cache;
mod logging;

use std::{fmt, future::Future, sync::Arc};

use futures::{future::BoxFuture, FutureExt};

pub use cache::ProcessCache;
pub use logging::LoggingProcess;

pub trait BusinessProcess<M>: Send + Sync {
    fn process(&self, message: M) -> BoxFuture<'_, anyhow::Result<()>>;
}

impl<M, P> BusinessProcess<M> for Arc<P>
where
    P: BusinessProcess<M> + ?Sized,
{
    fn process(&self, message: M) -> BoxFuture<'_, anyhow::Result<()>> {
        (**self).process(message)
    }
}

/// Adapts an async closure into a [`BusinessProcess`].
pub struct FnProcess<F>(F);

pub fn from_fn<F>(f: F) -> FnProcess<F> {
    FnProcess(f)
}

impl<M, F, Fut> BusinessProcess<M> for FnProcess<F>
where
    F: Fn(M) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn process(&self, message: M) -> BoxFuture<'_, anyhow::Result<()>> {
        (self.0)(message).boxed()
    }
}

/// Writes every message to stdout.
#[derive(Clone, Copy, Debug, Default)]
pub struct PrintProcess;

impl<M> BusinessProcess<M> for PrintProcess
where
    M: fmt::Display + Send + 'static,
{
    fn process(&self, message: M) -> BoxFuture<'_, anyhow::Result<()>> {
        println!("{message}");
        futures::future::ok(()).boxed()
    }
}
