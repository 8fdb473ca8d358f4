use anyhow::Context;
use tracing::info;

use crate::{
    configuration::ConsumerSettings,
    decode::Decoded,
    dispatch::{self, DispatchError},
    process::{PrintProcess, ProcessCache},
};

/// Consumes the configured topic, printing every message, until Ctrl-C or until
/// the consumption task ends on its own.
pub async fn run_until_signal(settings: ConsumerSettings) -> anyhow::Result<()> {
    let topic = settings.topic_info();
    let cache = ProcessCache::<Decoded>::new();
    let process = cache.get_or_insert::<PrintProcess>(&topic);

    let mut handle = dispatch::launch(
        settings.client_properties(),
        topic,
        settings.decoder,
        process,
        settings.trace_id(),
        settings.on_error,
    )?;
    info!(trace_id = handle.trace_id(), "consumption launched");

    let result = tokio::select! {
        result = handle.wait() => result,
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            info!("Ctrl-C received, stopping consumption");
            handle.stop().await
        }
    };

    match result {
        Ok(processed) => {
            info!(processed, "consumption finished");
            Ok(())
        }
        Err(DispatchError::Aborted) => Ok(()),
        Err(error) => Err(error).context("consumption failed"),
    }
}
