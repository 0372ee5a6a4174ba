pub mod chain;
pub mod decisions;
pub mod openai_compat;
pub mod traits;
pub(crate) mod sse;
pub mod util;

pub use chain::ProviderChain;
pub use decisions::{Decision, DecisionLog, DecisionOutcome};
pub use openai_compat::OpenAiCompatProvider;
pub use traits::{ChatRequest, ChatResponse, LlmProvider};
