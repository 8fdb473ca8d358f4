use std::{fmt, time::Instant};

use futures::{future::BoxFuture, FutureExt};
use tracing::{debug, debug_span, warn, Instrument};

use super::BusinessProcess;

/// Decorator logging every call made to the wrapped process.
pub struct LoggingProcess<P> {
    inner: P,
    topic: String,
    handler: &'static str,
}

impl<P> LoggingProcess<P> {
    pub fn new(topic: impl Into<String>, inner: P) -> Self {
        Self {
            inner,
            topic: topic.into(),
            handler: std::any::type_name::<P>(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

impl<M, P> BusinessProcess<M> for LoggingProcess<P>
where
    M: fmt::Debug + Send + 'static,
    P: BusinessProcess<M>,
{
    fn process(&self, message: M) -> BoxFuture<'_, anyhow::Result<()>> {
        let span = debug_span!("business_process", topic = %self.topic, handler = self.handler);

        async move {
            debug!(?message, "invoking business process");
            let started = Instant::now();
            let result = self.inner.process(message).await;
            match &result {
                Ok(()) => debug!(elapsed = ?started.elapsed(), "business process done"),
                Err(error) => warn!(elapsed = ?started.elapsed(), "business process failed: {error:#}"),
            }
            result
        }
        .instrument(span)
        .boxed()
    }
}

impl<P> fmt::Debug for LoggingProcess<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingProcess")
            .field("topic", &self.topic)
            .field("handler", &self.handler)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::process::from_fn;

    #[tokio::test]
    async fn forwards_message_and_result() {
        let seen = std::sync::Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let process = LoggingProcess::new(
            "orders",
            from_fn(move |message: String| {
                let sink = sink.clone();
                async move {
                    anyhow::ensure!(message != "bad", "rejected {message}");
                    sink.lock().unwrap().push(message);
                    Ok::<_, anyhow::Error>(())
                }
            }),
        );

        process.process("good".to_string()).await.unwrap();
        let error = process.process("bad".to_string()).await.unwrap_err();

        assert_eq!(error.to_string(), "rejected bad");
        assert_eq!(*seen.lock().unwrap(), vec!["good".to_string()]);
        assert_eq!(process.topic(), "orders");
    }
}
