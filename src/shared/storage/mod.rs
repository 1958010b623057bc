pub mod elasticsearch_sink;
pub mod memory_sink;

pub use elasticsearch_sink::ElasticsearchSink;
pub use memory_sink::MemorySink;
