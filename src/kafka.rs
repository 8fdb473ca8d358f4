mod consumer;

pub use consumer::KafkaConsumer;
