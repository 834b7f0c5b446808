pub mod chunker;
pub mod context;
pub mod engine;
pub mod errors;
pub mod interrupt;
pub mod model;
pub mod tools;

pub use chunker::{extract_complete_sentences, SentenceChunker};
pub use context::{ConversationContext, Message, MessageRole};
pub use engine::{StreamingTurnEngine, TurnEvent, TurnOptions, VOICE_SYSTEM_PROMPT};
pub use errors::{AgentError, Result};
pub use interrupt::InterruptCoordinator;
pub use model::{ChatBackend, ChatMessage, ChatRequest, StreamDelta, ToolCallDelta, ToolCallPayload};
pub use tools::{Tool, ToolRegistry, ToolResult};
