pub mod capability;
pub mod config;
pub mod error;
pub mod stream;
pub mod tokens;
pub mod tool;
pub mod trace;

pub use capability::{LlmCapabilities, ToolSupport};
pub use config::Config;
pub use error::{Error, Result};
pub use stream::{BoxStream, StreamEvent, Usage};
pub use tokens::{ApproxTokenizer, TokenCounter, Tokenizer};
pub use tool::{Message, Role, ToolCall, ToolDefinition};
pub use trace::TraceEvent;
