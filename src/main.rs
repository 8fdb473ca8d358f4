use std::collections::HashMap;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use topic_dispatch::{
    configuration::ConsumerSettings, decode::DecoderKind, dispatch::ErrorPolicy, runner,
    telemetry, topic::TopicFilter,
};

#[derive(Parser)]
struct MainArgs {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Consume a topic and print every message until Ctrl-C.
    Consume(ConsumeArgs),

    /// Check which topic names a whitelist allows.
    CheckWhitelist(CheckWhitelistArgs),
}

#[derive(Args)]
struct ConsumeArgs {
    #[arg(long, short)]
    topic: String,

    #[arg(long, short)]
    group: String,

    #[arg(long, short)]
    bootstrap_servers: String,

    #[arg(long)]
    trace_id: Option<String>,

    #[arg(long, value_enum, default_value_t = DecoderKind::Text)]
    decoder: DecoderKind,

    #[arg(long, value_enum, default_value_t = ErrorPolicy::Stop)]
    on_error: ErrorPolicy,

    /// Extra librdkafka property, as `key=value`.
    #[arg(long = "property", short = 'X')]
    properties: Vec<String>,
}

#[derive(Args)]
struct CheckWhitelistArgs {
    #[arg(long, short)]
    whitelist: String,

    topics: Vec<String>,
}

fn consumer_settings(args: ConsumeArgs) -> anyhow::Result<ConsumerSettings> {
    let mut consumer_props = args
        .properties
        .into_iter()
        .map(|property| {
            let (key, value) = property
                .split_once('=')
                .with_context(|| format!("invalid property {property}"))?;
            Ok::<_, anyhow::Error>((key.to_string(), value.to_string()))
        })
        .collect::<Result<HashMap<_, _>, _>>()?;
    consumer_props.insert("bootstrap.servers".to_string(), args.bootstrap_servers);

    Ok(ConsumerSettings {
        topic: args.topic,
        group: args.group,
        trace_id: args.trace_id,
        on_error: args.on_error,
        decoder: args.decoder,
        consumer_props,
    })
}

fn check_whitelist(args: CheckWhitelistArgs) -> anyhow::Result<()> {
    let filter = TopicFilter::whitelist(&args.whitelist)?;
    println!("subscription: {}", filter.subscription());

    for topic in args.topics {
        let verdict = if filter.matches(&topic) {
            "allowed"
        } else {
            "rejected"
        };
        println!("{topic}: {verdict}");
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();

    let MainArgs { command } = MainArgs::parse();
    match command {
        Command::Consume(args) => runner::run_until_signal(consumer_settings(args)?).await,
        Command::CheckWhitelist(args) => check_whitelist(args),
    }
}
