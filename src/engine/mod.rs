mod cancel;
mod context;
mod disposal;
mod entries;
mod events;
mod guard;
mod orchestrator;
mod report;
mod result;
mod retry;
mod runner;

pub use cancel::{CancelReason, Cancellation};
pub use context::{Resources, SharedResources, SharedStore, StepContext, Store};
pub use events::EngineEvent;
pub use orchestrator::{RunOptions, run};
pub use report::{
    ChannelReporter, FanoutReporter, NoopReporter, Reporter, SharedReporter, TracingReporter,
};
pub use result::{
    RunSummary, ScenarioResult, ScenarioStatus, StepResult, StepStatus, StopReason,
};
pub use retry::retry;
pub use runner::run_scenario;
