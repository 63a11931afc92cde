use super::cancel::Cancellation;
use super::report::{NoopReporter, SharedReporter};
use super::result::{RunSummary, ScenarioResult, StopReason};
use super::runner::run_scenario;
use crate::error::EngineError;
use crate::scenario::ScenarioDefinition;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;

/// 전체 실행 옵션이다.
#[derive(Clone)]
pub struct RunOptions {
    /// 라이프사이클 알림을 받을 리포터.
    pub reporter: SharedReporter,
    /// 한 배치에서 동시에 실행할 Scenario 수. 0이면 전부 한 번에 실행한다.
    pub max_concurrency: usize,
    /// 누적 실패 수가 이 값 이상이면 다음 배치를 시작하지 않는다. 0이면 제한이 없다.
    pub max_failures: usize,
    /// 실행 전체에 공유되는 취소 토큰.
    pub cancel: Cancellation,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            reporter: Arc::new(NoopReporter),
            max_concurrency: 0,
            max_failures: 0,
            cancel: Cancellation::new(),
        }
    }
}

impl RunOptions {
    pub fn with_reporter(mut self, reporter: SharedReporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_max_failures(mut self, max_failures: usize) -> Self {
        self.max_failures = max_failures;
        self
    }

    pub fn with_cancel(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Scenario 목록을 배치 단위로 실행하고 요약을 만든다.
///
/// - 입력 순서를 유지한 채 `max_concurrency` 크기의 배치로 나눈다.
/// - 배치 안의 Scenario는 각각 별도 태스크로 동시에 실행되고, 배치 전체가 끝나야 다음으로 넘어간다.
/// - 배치 시작 전 취소 여부를, 배치 종료 후 누적 실패 수를 확인한다.
///   실패 한도는 배치 단위로만 확인하므로 한도를 넘길 수 있다.
/// - 시작하지 않은 Scenario는 결과에 포함되지 않는다.
pub async fn run(scenarios: Vec<ScenarioDefinition>, options: RunOptions) -> RunSummary {
    let started = Instant::now();
    let reporter = options.reporter.clone();
    reporter.on_run_start(&scenarios).await;

    let concurrency = if options.max_concurrency > 0 {
        options.max_concurrency
    } else {
        scenarios.len().max(1)
    };
    let mut results: Vec<ScenarioResult> = Vec::with_capacity(scenarios.len());
    let mut failures = 0usize;
    let mut stopped = None;

    for (index, batch) in scenarios.chunks(concurrency).enumerate() {
        if options.cancel.is_cancelled() {
            tracing::warn!(batch = index, "취소 요청으로 남은 배치를 실행하지 않습니다");
            stopped = Some(StopReason::Cancelled);
            break;
        }
        tracing::debug!(batch = index, size = batch.len(), "배치 시작");
        let batch_results = run_batch(batch, &options).await;
        failures += batch_results.iter().filter(|r| r.is_failed()).count();
        results.extend(batch_results);

        let has_more = (index + 1) * concurrency < scenarios.len();
        if options.max_failures > 0 && failures >= options.max_failures && has_more {
            tracing::warn!(
                failures,
                limit = options.max_failures,
                "실패 한도에 도달해 남은 배치를 실행하지 않습니다"
            );
            stopped = Some(StopReason::FailureThreshold {
                failures,
                limit: options.max_failures,
            });
            break;
        }
    }

    let summary = RunSummary::from_results(results, started.elapsed(), stopped);
    reporter.on_run_end(&summary).await;
    summary
}

/// 배치의 모든 Scenario를 태스크로 띄우고 입력 순서대로 결과를 모은다.
async fn run_batch(batch: &[ScenarioDefinition], options: &RunOptions) -> Vec<ScenarioResult> {
    let handles: Vec<_> = batch
        .iter()
        .cloned()
        .map(|scenario| {
            let reporter = options.reporter.clone();
            let cancel = options.cancel.clone();
            tokio::spawn(async move { run_scenario(&scenario, &cancel, reporter.as_ref()).await })
        })
        .collect();
    join_all(handles)
        .await
        .into_iter()
        .zip(batch)
        .map(|(joined, scenario)| match joined {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(scenario = scenario.name(), error = %err, "Scenario 태스크 비정상 종료");
                ScenarioResult::crashed(scenario, EngineError::msg(err))
            }
        })
        .collect()
}
