//! 선언형 Scenario 실행 엔진.
//!
//! Scenario는 리소스, Setup, Step 엔트리를 선언 순서대로 실행하며
//! 획득한 리소스와 Setup 정리 작업은 어떤 결과로 끝나든 역순으로 정리된다.
//! Step마다 제한 시간과 재시도 정책을 둘 수 있고, 여러 Scenario는
//! 배치 단위로 동시에 실행된다.

pub mod config;
pub mod engine;
pub mod error;
pub mod scenario;
pub mod suite;

pub use engine::{
    Cancellation, RunOptions, RunSummary, ScenarioResult, ScenarioStatus, StepContext, run,
    run_scenario,
};
pub use error::{EngineError, EntryResult, Interrupt, skip};
pub use scenario::{Resource, ScenarioBuilder, ScenarioDefinition, StepOptions, Teardown};
