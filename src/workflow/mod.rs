pub mod completion;
pub mod provider_context;
pub mod question_ctx;
pub mod question_flow;

pub use completion::{CompletionPhase, CompletionTracker, TickOutcome};
pub use provider_context::ProviderContext;
pub use question_ctx::QuestionCtx;
pub use question_flow::{CompletionReport, ProviderAdapter, QuestionRun};
