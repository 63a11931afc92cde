use super::result::ScenarioStatus;
use std::time::Duration;

/// 엔진에서 채널 구독자(UI, 테스트 등)로 전달되는 라이프사이클 이벤트이다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// 전체 실행 시작.
    RunStarted { scenarios: Vec<String> },
    /// Scenario 시작.
    ScenarioStarted { scenario: String },
    /// 리소스 획득 시작.
    ResourceStarted { scenario: String, resource: String },
    /// 리소스 획득 완료.
    ResourceFinished { scenario: String, resource: String },
    /// 리소스 획득 실패.
    ResourceFailed {
        scenario: String,
        resource: String,
        error: String,
    },
    /// Setup 시작.
    SetupStarted { scenario: String, setup: String },
    /// Setup 완료.
    SetupFinished { scenario: String, setup: String },
    /// Setup 실패.
    SetupFailed {
        scenario: String,
        setup: String,
        error: String,
    },
    /// Step 시작.
    StepStarted { scenario: String, step: String },
    /// Step 성공.
    StepFinished {
        scenario: String,
        step: String,
        duration: Duration,
    },
    /// Step 실패.
    StepFailed {
        scenario: String,
        step: String,
        error: String,
        duration: Duration,
    },
    /// Scenario 건너뜀.
    ScenarioSkipped {
        scenario: String,
        reason: String,
        duration: Duration,
    },
    /// Scenario 종료.
    ScenarioFinished {
        scenario: String,
        status: ScenarioStatus,
    },
    /// 전체 실행 종료.
    RunFinished {
        total: usize,
        passed: usize,
        failed: usize,
        skipped: usize,
    },
}

impl EngineEvent {
    /// 이벤트가 속한 Scenario 이름. 실행 단위 이벤트는 `None`이다.
    pub fn scenario(&self) -> Option<&str> {
        match self {
            EngineEvent::RunStarted { .. } | EngineEvent::RunFinished { .. } => None,
            EngineEvent::ScenarioStarted { scenario }
            | EngineEvent::ResourceStarted { scenario, .. }
            | EngineEvent::ResourceFinished { scenario, .. }
            | EngineEvent::ResourceFailed { scenario, .. }
            | EngineEvent::SetupStarted { scenario, .. }
            | EngineEvent::SetupFinished { scenario, .. }
            | EngineEvent::SetupFailed { scenario, .. }
            | EngineEvent::StepStarted { scenario, .. }
            | EngineEvent::StepFinished { scenario, .. }
            | EngineEvent::StepFailed { scenario, .. }
            | EngineEvent::ScenarioSkipped { scenario, .. }
            | EngineEvent::ScenarioFinished { scenario, .. } => Some(scenario),
        }
    }
}
