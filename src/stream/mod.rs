//! Decoding of the chat endpoint's line-framed event stream

mod decoder;

pub use decoder::{DATA_PREFIX, DONE_SENTINEL, LineDecoder, StreamEvent, decode_stream};
