use super::cancel::Cancellation;
use super::context::ScenarioContext;
use super::disposal::DisposalStack;
use super::guard::guarded_entry;
use super::report::Reporter;
use super::result::StepResult;
use super::retry::retry;
use crate::error::{EngineError, EntryResult, Interrupt};
use crate::scenario::{Entry, ResourceEntry, ScenarioDefinition, SetupEntry, StepEntry};
use std::time::Instant;

/// 한 Scenario의 엔트리 실행 결과이다.
#[derive(Debug)]
pub(crate) struct EntryRun {
    /// 실제로 실행된 Step 결과(선언 순서).
    pub steps: Vec<StepResult>,
    /// 실행을 멈춘 원인. 모든 엔트리를 끝까지 실행했으면 `None`이다.
    pub halt: Option<Interrupt>,
    /// 정리 작업 중 발생한 오류.
    pub disposal_errors: Vec<EngineError>,
}

/// Scenario의 엔트리를 선언 순서대로 실행한다.
///
/// 실패 또는 Skip이 발생하면 남은 엔트리는 실행하지 않는다.
/// 어떤 경우에도 반환 전에 정리 스택을 역순으로 모두 실행한다.
pub(crate) async fn execute_entries(
    scenario: &ScenarioDefinition,
    cancel: &Cancellation,
    reporter: &dyn Reporter,
) -> EntryRun {
    let mut executor = EntryExecutor {
        scenario,
        reporter,
        ctx: ScenarioContext::new(scenario, cancel.clone()),
        disposals: DisposalStack::new(),
        steps: Vec::new(),
    };
    let mut halt = None;
    for entry in scenario.entries() {
        let outcome = match entry {
            Entry::Resource(resource) => executor.acquire(resource).await,
            Entry::Setup(setup) => executor.prepare(setup).await,
            Entry::Step(step) => executor.run_step(step).await,
        };
        if let Err(interrupt) = outcome {
            tracing::debug!(
                scenario = scenario.name(),
                entry = entry.label(),
                cause = %interrupt,
                "엔트리 실행 중단"
            );
            halt = Some(interrupt);
            break;
        }
    }
    let disposal_errors = executor.disposals.unwind().await;
    EntryRun {
        steps: executor.steps,
        halt,
        disposal_errors,
    }
}

struct EntryExecutor<'a> {
    scenario: &'a ScenarioDefinition,
    reporter: &'a dyn Reporter,
    ctx: ScenarioContext,
    disposals: DisposalStack,
    steps: Vec<StepResult>,
}

impl EntryExecutor<'_> {
    /// 리소스를 획득해 이름으로 등록하고 정리 작업이 있으면 스택에 넣는다.
    async fn acquire(&mut self, entry: &ResourceEntry) -> EntryResult<()> {
        self.reporter.on_resource_start(&entry.name, self.scenario).await;
        let acquired = if self.ctx.has_resource(&entry.name).await {
            Err(Interrupt::Fail(EngineError::DuplicateResource(entry.name.clone())))
        } else {
            let step_ctx = self.ctx.step_context(self.ctx.cancel().clone());
            guarded_entry(|| (entry.factory)(step_ctx)).await
        };
        let resource = match acquired {
            Ok(resource) => resource,
            Err(Interrupt::Skip(reason)) => return Err(Interrupt::Skip(reason)),
            Err(Interrupt::Fail(err)) => {
                self.reporter
                    .on_resource_error(&entry.name, &err, self.scenario)
                    .await;
                return Err(Interrupt::Fail(err));
            }
        };
        if let Some(disposer) = resource.disposer {
            self.disposals.push(format!("resource:{}", entry.name), disposer);
        }
        if let Err(err) = self.ctx.insert_resource(&entry.name, resource.value).await {
            self.reporter
                .on_resource_error(&entry.name, &err, self.scenario)
                .await;
            return Err(Interrupt::Fail(err));
        }
        self.reporter.on_resource_end(&entry.name, self.scenario).await;
        Ok(())
    }

    /// Setup을 실행하고 돌려받은 정리 작업을 스택에 넣는다.
    async fn prepare(&mut self, entry: &SetupEntry) -> EntryResult<()> {
        self.reporter.on_setup_start(&entry.label, self.scenario).await;
        let step_ctx = self.ctx.step_context(self.ctx.cancel().clone());
        match guarded_entry(|| (entry.func)(step_ctx)).await {
            Ok(teardown) => {
                if let Some(cleanup) = teardown.into_cleanup() {
                    self.disposals.push(entry.label.clone(), cleanup);
                }
                self.reporter.on_setup_end(&entry.label, self.scenario).await;
                Ok(())
            }
            Err(Interrupt::Skip(reason)) => Err(Interrupt::Skip(reason)),
            Err(Interrupt::Fail(err)) => {
                self.reporter
                    .on_setup_error(&entry.label, &err, self.scenario)
                    .await;
                Err(Interrupt::Fail(err))
            }
        }
    }

    /// Step을 시도별 제한 시간과 재시도 정책으로 실행한다.
    ///
    /// 실패하면 결과를 기록하고 오류를 다시 돌려줘 Scenario를 멈춘다.
    async fn run_step(&mut self, entry: &StepEntry) -> EntryResult<()> {
        let meta = &entry.meta;
        self.reporter.on_step_start(meta, self.scenario).await;
        let started = Instant::now();
        let ctx = &self.ctx;
        let outcome = retry(&meta.name, &meta.options.retry, ctx.cancel(), |attempt| {
            let deadline = ctx.cancel().with_timeout(meta.options.timeout);
            let step_ctx = ctx.step_context(deadline.clone());
            async move {
                tracing::trace!(step = %meta.name, attempt, "Step 시도");
                tokio::select! {
                    biased;
                    result = guarded_entry(|| (entry.func)(step_ctx)) => result,
                    reason = deadline.cancelled() => {
                        Err(Interrupt::Fail(reason.into_error(&meta.name)))
                    }
                }
            }
        })
        .await;
        let duration = started.elapsed();
        match outcome {
            Ok(value) => {
                self.ctx.push_result(value.clone());
                let result = StepResult::passed(meta.clone(), duration, value);
                self.reporter.on_step_end(meta, &result, self.scenario).await;
                self.steps.push(result);
                Ok(())
            }
            Err(Interrupt::Skip(reason)) => Err(Interrupt::Skip(reason)),
            Err(Interrupt::Fail(err)) => {
                self.steps
                    .push(StepResult::failed(meta.clone(), duration, err.clone()));
                self.reporter
                    .on_step_error(meta, &err, duration, self.scenario)
                    .await;
                Err(Interrupt::Fail(err))
            }
        }
    }
}
