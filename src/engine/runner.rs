use super::cancel::Cancellation;
use super::entries::{EntryRun, execute_entries};
use super::report::Reporter;
use super::result::{ScenarioResult, ScenarioStatus};
use crate::error::Interrupt;
use crate::scenario::ScenarioDefinition;
use std::time::Instant;
use tracing::Instrument;

/// Scenario 하나를 처음부터 끝까지 실행하고 결과를 만든다.
///
/// 시작 알림부터 정리 작업 완료까지를 소요 시간으로 기록하며,
/// 종료 시 `on_scenario_skip` 또는 `on_scenario_end` 중 하나만 호출한다.
pub async fn run_scenario(
    scenario: &ScenarioDefinition,
    cancel: &Cancellation,
    reporter: &dyn Reporter,
) -> ScenarioResult {
    let span = tracing::info_span!("scenario", name = scenario.name());
    async move {
        let started = Instant::now();
        reporter.on_scenario_start(scenario).await;
        let run = execute_entries(scenario, cancel, reporter).await;
        let mut result = classify(scenario, run);
        result.duration = started.elapsed();
        match result.skip_reason.as_deref() {
            Some(reason) => {
                reporter
                    .on_scenario_skip(scenario, reason, result.duration)
                    .await;
            }
            None => reporter.on_scenario_end(scenario, &result).await,
        }
        tracing::debug!(status = %result.status, steps = result.steps.len(), "Scenario 완료");
        result
    }
    .instrument(span)
    .await
}

/// 엔트리 실행 결과를 Scenario 상태로 분류한다.
///
/// Skip이 최우선이고, 그다음 실패 Step, 엔트리 오류, 정리 오류 순으로 실패를 판정한다.
fn classify(scenario: &ScenarioDefinition, run: EntryRun) -> ScenarioResult {
    let EntryRun {
        steps,
        halt,
        disposal_errors,
    } = run;
    let mut result = ScenarioResult::empty(scenario, ScenarioStatus::Passed);
    match halt {
        Some(Interrupt::Skip(reason)) => {
            result.status = ScenarioStatus::Skipped;
            result.skip_reason = Some(reason);
        }
        Some(Interrupt::Fail(err)) => {
            result.status = ScenarioStatus::Failed;
            result.error = Some(err);
        }
        None => {
            if let Some(failed) = steps.iter().find(|step| !step.is_passed()) {
                result.status = ScenarioStatus::Failed;
                result.error = failed.error.clone();
            }
        }
    }
    if result.status == ScenarioStatus::Passed && !disposal_errors.is_empty() {
        result.status = ScenarioStatus::Failed;
        result.error = disposal_errors.first().cloned();
    }
    result.steps = steps;
    result.disposal_errors = disposal_errors;
    result
}
