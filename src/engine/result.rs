use crate::error::EngineError;
use crate::scenario::{Location, ScenarioDefinition, StepMeta, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

/// Step 실행 결과 상태이다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// 정상 종료.
    Passed,
    /// 실패.
    Failed,
}

/// 실행된 Step 하나의 결과이다.
#[derive(Debug, Clone)]
pub struct StepResult {
    /// Step 메타데이터.
    pub step: StepMeta,
    /// 결과 상태.
    pub status: StepStatus,
    /// 재시도를 포함한 전체 소요 시간.
    pub duration: Duration,
    /// 성공 시 반환값.
    pub value: Option<Value>,
    /// 실패 시 오류.
    pub error: Option<EngineError>,
}

impl StepResult {
    pub(crate) fn passed(step: StepMeta, duration: Duration, value: Value) -> Self {
        Self {
            step,
            status: StepStatus::Passed,
            duration,
            value: Some(value),
            error: None,
        }
    }

    pub(crate) fn failed(step: StepMeta, duration: Duration, error: EngineError) -> Self {
        Self {
            step,
            status: StepStatus::Failed,
            duration,
            value: None,
            error: Some(error),
        }
    }

    /// Step 이름.
    pub fn name(&self) -> &str {
        &self.step.name
    }

    pub fn is_passed(&self) -> bool {
        self.status == StepStatus::Passed
    }
}

/// Scenario 실행 결과 상태이다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioStatus {
    Passed,
    Failed,
    Skipped,
}

impl fmt::Display for ScenarioStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ScenarioStatus::Passed => "passed",
            ScenarioStatus::Failed => "failed",
            ScenarioStatus::Skipped => "skipped",
        };
        f.write_str(text)
    }
}

/// Scenario 하나의 실행 결과이다.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario 이름.
    pub name: String,
    /// Scenario 태그.
    pub tags: BTreeSet<String>,
    /// 선언 위치.
    pub location: Option<Location>,
    /// 결과 상태.
    pub status: ScenarioStatus,
    /// 실제로 실행된 Step 결과(선언 순서).
    pub steps: Vec<StepResult>,
    /// 실패 원인. 리소스/Setup 실패도 여기에 담긴다.
    pub error: Option<EngineError>,
    /// 건너뛴 이유.
    pub skip_reason: Option<String>,
    /// 시작 알림부터 정리 작업 완료까지의 시간.
    pub duration: Duration,
    /// 정리 작업 중 발생한 오류.
    pub disposal_errors: Vec<EngineError>,
}

impl ScenarioResult {
    pub(crate) fn empty(scenario: &ScenarioDefinition, status: ScenarioStatus) -> Self {
        Self {
            name: scenario.name().to_string(),
            tags: scenario.options().tags.clone(),
            location: scenario.location().cloned(),
            status,
            steps: Vec::new(),
            error: None,
            skip_reason: None,
            duration: Duration::ZERO,
            disposal_errors: Vec::new(),
        }
    }

    /// 실행 태스크 자체가 비정상 종료된 Scenario의 결과를 만든다.
    pub(crate) fn crashed(scenario: &ScenarioDefinition, error: EngineError) -> Self {
        Self {
            error: Some(error),
            ..Self::empty(scenario, ScenarioStatus::Failed)
        }
    }

    /// 실패한 Step 결과들.
    pub fn failed_steps(&self) -> impl Iterator<Item = &StepResult> {
        self.steps.iter().filter(|step| !step.is_passed())
    }

    pub fn is_failed(&self) -> bool {
        self.status == ScenarioStatus::Failed
    }
}

/// 실행이 조기 중단된 이유이다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// 취소 토큰이 발화했다.
    Cancelled,
    /// 실패 한도에 도달했다.
    FailureThreshold { failures: usize, limit: usize },
}

/// 전체 실행 요약이다.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// 실행 전체의 벽시계 시간.
    pub duration: Duration,
    /// 실제로 실행된 Scenario 결과(입력 순서).
    pub scenarios: Vec<ScenarioResult>,
    /// 조기 중단 이유. 모든 배치를 실행했으면 `None`이다.
    pub stopped: Option<StopReason>,
}

impl RunSummary {
    pub(crate) fn from_results(
        scenarios: Vec<ScenarioResult>,
        duration: Duration,
        stopped: Option<StopReason>,
    ) -> Self {
        let count = |status| scenarios.iter().filter(|s| s.status == status).count();
        Self {
            total: scenarios.len(),
            passed: count(ScenarioStatus::Passed),
            failed: count(ScenarioStatus::Failed),
            skipped: count(ScenarioStatus::Skipped),
            duration,
            scenarios,
            stopped,
        }
    }

    /// 실패한 Scenario가 없는지 확인한다.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::ScenarioBuilder;

    #[test]
    fn summary_counts_each_status() {
        let scenario = ScenarioBuilder::new("s").build();
        let results = vec![
            ScenarioResult::empty(&scenario, ScenarioStatus::Passed),
            ScenarioResult::empty(&scenario, ScenarioStatus::Failed),
            ScenarioResult::empty(&scenario, ScenarioStatus::Skipped),
            ScenarioResult::crashed(&scenario, EngineError::msg("join failed")),
        ];
        let summary = RunSummary::from_results(results, Duration::from_millis(5), None);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.skipped, 1);
        assert!(!summary.is_success());
    }
}
