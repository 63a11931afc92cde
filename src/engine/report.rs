use super::events::EngineEvent;
use super::result::{RunSummary, ScenarioResult, ScenarioStatus, StepResult};
use crate::error::EngineError;
use crate::scenario::{ScenarioDefinition, StepMeta};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

/// 엔진 라이프사이클 알림을 받는 수동 소비자이다.
///
/// 모든 훅은 기본 구현이 no-op이므로 필요한 것만 구현하면 된다.
/// 엔진은 순서를 보장하기 위해 각 훅을 await한 뒤 다음으로 진행한다.
#[async_trait]
pub trait Reporter: Send + Sync {
    async fn on_run_start(&self, _scenarios: &[ScenarioDefinition]) {}

    async fn on_scenario_start(&self, _scenario: &ScenarioDefinition) {}

    async fn on_resource_start(&self, _resource: &str, _scenario: &ScenarioDefinition) {}

    async fn on_resource_end(&self, _resource: &str, _scenario: &ScenarioDefinition) {}

    async fn on_resource_error(
        &self,
        _resource: &str,
        _error: &EngineError,
        _scenario: &ScenarioDefinition,
    ) {
    }

    async fn on_setup_start(&self, _setup: &str, _scenario: &ScenarioDefinition) {}

    async fn on_setup_end(&self, _setup: &str, _scenario: &ScenarioDefinition) {}

    async fn on_setup_error(
        &self,
        _setup: &str,
        _error: &EngineError,
        _scenario: &ScenarioDefinition,
    ) {
    }

    async fn on_step_start(&self, _step: &StepMeta, _scenario: &ScenarioDefinition) {}

    async fn on_step_end(
        &self,
        _step: &StepMeta,
        _result: &StepResult,
        _scenario: &ScenarioDefinition,
    ) {
    }

    async fn on_step_error(
        &self,
        _step: &StepMeta,
        _error: &EngineError,
        _duration: Duration,
        _scenario: &ScenarioDefinition,
    ) {
    }

    async fn on_scenario_skip(
        &self,
        _scenario: &ScenarioDefinition,
        _reason: &str,
        _duration: Duration,
    ) {
    }

    async fn on_scenario_end(&self, _scenario: &ScenarioDefinition, _result: &ScenarioResult) {}

    async fn on_run_end(&self, _summary: &RunSummary) {}
}

/// Reporter를 공유하기 위한 Arc 타입 별칭이다.
pub type SharedReporter = Arc<dyn Reporter>;

/// 아무것도 하지 않는 기본 리포터이다.
#[derive(Debug, Default, Clone)]
pub struct NoopReporter;

impl Reporter for NoopReporter {}

/// 알림을 `EngineEvent`로 바꿔 채널로 내보낸다.
///
/// 수신 측이 닫혀도 엔진 실행에는 영향이 없다.
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    sender: UnboundedSender<EngineEvent>,
}

impl ChannelReporter {
    pub fn new(sender: UnboundedSender<EngineEvent>) -> Self {
        Self { sender }
    }

    fn send(&self, event: EngineEvent) {
        let _ = self.sender.send(event);
    }
}

#[async_trait]
impl Reporter for ChannelReporter {
    async fn on_run_start(&self, scenarios: &[ScenarioDefinition]) {
        self.send(EngineEvent::RunStarted {
            scenarios: scenarios.iter().map(|s| s.name().to_string()).collect(),
        });
    }

    async fn on_scenario_start(&self, scenario: &ScenarioDefinition) {
        self.send(EngineEvent::ScenarioStarted {
            scenario: scenario.name().to_string(),
        });
    }

    async fn on_resource_start(&self, resource: &str, scenario: &ScenarioDefinition) {
        self.send(EngineEvent::ResourceStarted {
            scenario: scenario.name().to_string(),
            resource: resource.to_string(),
        });
    }

    async fn on_resource_end(&self, resource: &str, scenario: &ScenarioDefinition) {
        self.send(EngineEvent::ResourceFinished {
            scenario: scenario.name().to_string(),
            resource: resource.to_string(),
        });
    }

    async fn on_resource_error(
        &self,
        resource: &str,
        error: &EngineError,
        scenario: &ScenarioDefinition,
    ) {
        self.send(EngineEvent::ResourceFailed {
            scenario: scenario.name().to_string(),
            resource: resource.to_string(),
            error: error.to_string(),
        });
    }

    async fn on_setup_start(&self, setup: &str, scenario: &ScenarioDefinition) {
        self.send(EngineEvent::SetupStarted {
            scenario: scenario.name().to_string(),
            setup: setup.to_string(),
        });
    }

    async fn on_setup_end(&self, setup: &str, scenario: &ScenarioDefinition) {
        self.send(EngineEvent::SetupFinished {
            scenario: scenario.name().to_string(),
            setup: setup.to_string(),
        });
    }

    async fn on_setup_error(&self, setup: &str, error: &EngineError, scenario: &ScenarioDefinition) {
        self.send(EngineEvent::SetupFailed {
            scenario: scenario.name().to_string(),
            setup: setup.to_string(),
            error: error.to_string(),
        });
    }

    async fn on_step_start(&self, step: &StepMeta, scenario: &ScenarioDefinition) {
        self.send(EngineEvent::StepStarted {
            scenario: scenario.name().to_string(),
            step: step.name.clone(),
        });
    }

    async fn on_step_end(&self, step: &StepMeta, result: &StepResult, scenario: &ScenarioDefinition) {
        self.send(EngineEvent::StepFinished {
            scenario: scenario.name().to_string(),
            step: step.name.clone(),
            duration: result.duration,
        });
    }

    async fn on_step_error(
        &self,
        step: &StepMeta,
        error: &EngineError,
        duration: Duration,
        scenario: &ScenarioDefinition,
    ) {
        self.send(EngineEvent::StepFailed {
            scenario: scenario.name().to_string(),
            step: step.name.clone(),
            error: error.to_string(),
            duration,
        });
    }

    async fn on_scenario_skip(&self, scenario: &ScenarioDefinition, reason: &str, duration: Duration) {
        self.send(EngineEvent::ScenarioSkipped {
            scenario: scenario.name().to_string(),
            reason: reason.to_string(),
            duration,
        });
    }

    async fn on_scenario_end(&self, scenario: &ScenarioDefinition, result: &ScenarioResult) {
        self.send(EngineEvent::ScenarioFinished {
            scenario: scenario.name().to_string(),
            status: result.status,
        });
    }

    async fn on_run_end(&self, summary: &RunSummary) {
        self.send(EngineEvent::RunFinished {
            total: summary.total,
            passed: summary.passed,
            failed: summary.failed,
            skipped: summary.skipped,
        });
    }
}

/// 알림을 구조화된 `tracing` 이벤트로 남긴다.
#[derive(Debug, Default, Clone)]
pub struct TracingReporter;

#[async_trait]
impl Reporter for TracingReporter {
    async fn on_run_start(&self, scenarios: &[ScenarioDefinition]) {
        tracing::info!(count = scenarios.len(), "실행 시작");
    }

    async fn on_scenario_start(&self, scenario: &ScenarioDefinition) {
        tracing::info!(scenario = scenario.name(), "Scenario 시작");
    }

    async fn on_resource_error(
        &self,
        resource: &str,
        error: &EngineError,
        scenario: &ScenarioDefinition,
    ) {
        tracing::error!(scenario = scenario.name(), resource, error = %error, "리소스 획득 실패");
    }

    async fn on_setup_error(&self, setup: &str, error: &EngineError, scenario: &ScenarioDefinition) {
        tracing::error!(scenario = scenario.name(), setup, error = %error, "Setup 실패");
    }

    async fn on_step_start(&self, step: &StepMeta, scenario: &ScenarioDefinition) {
        tracing::debug!(scenario = scenario.name(), step = %step.name, "Step 시작");
    }

    async fn on_step_end(&self, step: &StepMeta, result: &StepResult, scenario: &ScenarioDefinition) {
        tracing::info!(
            scenario = scenario.name(),
            step = %step.name,
            elapsed_ms = result.duration.as_millis() as u64,
            "Step 성공"
        );
    }

    async fn on_step_error(
        &self,
        step: &StepMeta,
        error: &EngineError,
        duration: Duration,
        scenario: &ScenarioDefinition,
    ) {
        let location = step.location.as_ref().map(ToString::to_string);
        tracing::error!(
            scenario = scenario.name(),
            step = %step.name,
            location = location.as_deref().unwrap_or("-"),
            elapsed_ms = duration.as_millis() as u64,
            error = %error,
            "Step 실패"
        );
    }

    async fn on_scenario_skip(&self, scenario: &ScenarioDefinition, reason: &str, duration: Duration) {
        tracing::warn!(
            scenario = scenario.name(),
            reason,
            elapsed_ms = duration.as_millis() as u64,
            "Scenario 건너뜀"
        );
    }

    async fn on_scenario_end(&self, scenario: &ScenarioDefinition, result: &ScenarioResult) {
        let elapsed_ms = result.duration.as_millis() as u64;
        match result.status {
            ScenarioStatus::Failed => {
                let error = result.error.as_ref().map(ToString::to_string);
                tracing::error!(
                    scenario = scenario.name(),
                    elapsed_ms,
                    error = error.as_deref().unwrap_or("-"),
                    "Scenario 실패"
                );
            }
            status => {
                tracing::info!(scenario = scenario.name(), %status, elapsed_ms, "Scenario 종료");
            }
        }
    }

    async fn on_run_end(&self, summary: &RunSummary) {
        tracing::info!(
            total = summary.total,
            passed = summary.passed,
            failed = summary.failed,
            skipped = summary.skipped,
            elapsed_ms = summary.duration.as_millis() as u64,
            "실행 종료"
        );
    }
}

/// 여러 리포터에 같은 알림을 순서대로 전달한다.
#[derive(Clone, Default)]
pub struct FanoutReporter {
    reporters: Vec<SharedReporter>,
}

impl FanoutReporter {
    pub fn new(reporters: Vec<SharedReporter>) -> Self {
        Self { reporters }
    }

    /// 리포터를 추가한다.
    pub fn with(mut self, reporter: SharedReporter) -> Self {
        self.reporters.push(reporter);
        self
    }
}

#[async_trait]
impl Reporter for FanoutReporter {
    async fn on_run_start(&self, scenarios: &[ScenarioDefinition]) {
        for reporter in &self.reporters {
            reporter.on_run_start(scenarios).await;
        }
    }

    async fn on_scenario_start(&self, scenario: &ScenarioDefinition) {
        for reporter in &self.reporters {
            reporter.on_scenario_start(scenario).await;
        }
    }

    async fn on_resource_start(&self, resource: &str, scenario: &ScenarioDefinition) {
        for reporter in &self.reporters {
            reporter.on_resource_start(resource, scenario).await;
        }
    }

    async fn on_resource_end(&self, resource: &str, scenario: &ScenarioDefinition) {
        for reporter in &self.reporters {
            reporter.on_resource_end(resource, scenario).await;
        }
    }

    async fn on_resource_error(
        &self,
        resource: &str,
        error: &EngineError,
        scenario: &ScenarioDefinition,
    ) {
        for reporter in &self.reporters {
            reporter.on_resource_error(resource, error, scenario).await;
        }
    }

    async fn on_setup_start(&self, setup: &str, scenario: &ScenarioDefinition) {
        for reporter in &self.reporters {
            reporter.on_setup_start(setup, scenario).await;
        }
    }

    async fn on_setup_end(&self, setup: &str, scenario: &ScenarioDefinition) {
        for reporter in &self.reporters {
            reporter.on_setup_end(setup, scenario).await;
        }
    }

    async fn on_setup_error(&self, setup: &str, error: &EngineError, scenario: &ScenarioDefinition) {
        for reporter in &self.reporters {
            reporter.on_setup_error(setup, error, scenario).await;
        }
    }

    async fn on_step_start(&self, step: &StepMeta, scenario: &ScenarioDefinition) {
        for reporter in &self.reporters {
            reporter.on_step_start(step, scenario).await;
        }
    }

    async fn on_step_end(&self, step: &StepMeta, result: &StepResult, scenario: &ScenarioDefinition) {
        for reporter in &self.reporters {
            reporter.on_step_end(step, result, scenario).await;
        }
    }

    async fn on_step_error(
        &self,
        step: &StepMeta,
        error: &EngineError,
        duration: Duration,
        scenario: &ScenarioDefinition,
    ) {
        for reporter in &self.reporters {
            reporter.on_step_error(step, error, duration, scenario).await;
        }
    }

    async fn on_scenario_skip(&self, scenario: &ScenarioDefinition, reason: &str, duration: Duration) {
        for reporter in &self.reporters {
            reporter.on_scenario_skip(scenario, reason, duration).await;
        }
    }

    async fn on_scenario_end(&self, scenario: &ScenarioDefinition, result: &ScenarioResult) {
        for reporter in &self.reporters {
            reporter.on_scenario_end(scenario, result).await;
        }
    }

    async fn on_run_end(&self, summary: &RunSummary) {
        for reporter in &self.reporters {
            reporter.on_run_end(summary).await;
        }
    }
}
