// Parsers: provider wire formats -> IR.
//
// One module per protocol. Each exposes request parsing (client bytes ->
// UnifiedRequest), response parsing (upstream bytes -> messages + usage)
// and chunk parsing (one upstream frame -> IR events). Protocols with
// cross-chunk state (Claude, Kiro) carry an explicit state struct.

pub mod antigravity;
pub mod claude;
pub mod codex;
pub mod gemini;
pub mod kiro;
pub mod ollama;
pub mod openai;
