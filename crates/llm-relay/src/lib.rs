// llm-relay: wire-protocol translation core for LLM chat APIs.
//
// The crate is a hub-and-spoke translator: inbound protocols parse into a
// canonical IR (`to_ir`), outbound protocols emit from it (`from_ir`),
// and per-stream state machines (`stream`, `pipeline`) keep incremental
// translation correct across chunk boundaries. Transport is out of scope:
// the core consumes bytes and yields bytes.

pub mod cache;
pub mod config;
pub mod from_ir;
pub mod pipeline;
pub mod registry;
pub mod stream;
pub mod to_ir;
pub mod translate;
pub mod util;

pub use llm_relay_types as types;

pub use config::Config;
pub use stream::UnifiedStreamState;
pub use translate::{
    emit_request, parse_request_to_ir, parse_response_auto, translate_request,
    translate_response_non_stream_auto, Format, StreamTranslator,
};
