//! Streaming module
//!
//! Ollama client, incremental JSON parser, the event channel that carries
//! pipeline updates to a consumer, and the per-run cumulative log.

pub mod channel;
pub mod client;
pub mod log;
pub mod parser;

pub use channel::{event_channel, EventReceiver, EventSender, PipelineEvent, EVENT_CHANNEL_CAPACITY};
pub use client::{GenerateOptions, OllamaClient, DEFAULT_MODEL, DEFAULT_OLLAMA_URL};
pub use log::RunLog;
pub use parser::{extract_first_object, JsonParser, MAX_BUFFER_SIZE};
