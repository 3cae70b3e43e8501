pub mod host;
pub mod js_executor;
pub mod message_bus;

pub use host::{HostEnvironment, WindowInfo, WindowSpec};
pub use js_executor::{eval_as, JsExecutor, ScriptRunner};
pub use message_bus::{ContextEndpoint, EventPublisher, LocalBus, MessageBus};
