pub mod answer;
pub mod batch;
pub mod loaders;
pub mod messages;
pub mod provider;
pub mod question_type;
pub mod quiz;
pub mod target;

pub use answer::{AggregationResult, Decision, QuestionAnswer, VoteGroup};
pub use batch::{
    BatchId, BatchReport, ChatStrategy, DispatchBatch, PendingSet, ProviderOutcome, RunMode,
};
pub use loaders::{load_quiz_file, QuizFile};
pub use messages::{BusEvent, BusRequest, BusResponse, LifecycleEvent};
pub use provider::{ProviderConfig, ProviderId, ProviderRoster, DEFAULT_WEIGHT, FAVORITE_WEIGHT};
pub use question_type::{structure_answer, AnswerStructure, Choice, QuestionType};
pub use quiz::{compose_prompt, AnswerTemplate, QuizQuestion};
pub use target::{AutomationTarget, ContextHandle, Rect, TargetState, WindowHandle};
