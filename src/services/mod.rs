pub mod answer_parser;
pub mod dom_scripts;
pub mod normalizer;
pub mod providers;
pub mod strategy;
pub mod voting;

pub use answer_parser::{parse_answer, AnswerFragment};
pub use normalizer::{is_placeholder, normalize_answer};
pub use providers::{CompletionTiming, ProviderProfile};
pub use strategy::{AdapterStrategy, DomStrategy, Observation, SubmitReceipt};
pub use voting::{comparison_key, tally, Ballot, Tally};
