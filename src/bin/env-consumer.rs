use anyhow::Context;
use topic_dispatch::{configuration::ConsumerSettings, runner, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();

    let settings = ConsumerSettings::from_env().context("invalid consumer settings")?;
    runner::run_until_signal(settings).await
}
