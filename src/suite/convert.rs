use super::model::{ResourceKind, ScenarioFile, SetupSpec, ShellConfig, StepSpec};
use super::shell::run_shell;
use crate::engine::{Cancellation, SharedStore, StepContext};
use crate::error::{EntryResult, Interrupt, skip};
use crate::scenario::{Dispose, Resource, ScenarioBuilder, ScenarioDefinition, StepOptions, Teardown};
use anyhow::Context;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// YAML Scenario를 엔진이 실행할 정의로 변환한다.
///
/// 실행 순서는 리소스, Setup, Step 순이다. `base`는 실행 전체 기본 정책이다.
pub fn to_definition(file: &ScenarioFile, source: &Path, base: StepOptions) -> ScenarioDefinition {
    let scenario_default = file.defaults.apply(base);
    let mut builder = ScenarioBuilder::new(file.name.clone())
        .location(source.display().to_string(), 1)
        .tags(file.tags.iter().cloned())
        .step_options(scenario_default);

    for resource in &file.resources {
        let name = resource.name.clone();
        builder = match resource.kind.clone() {
            ResourceKind::TempDir => builder.resource(name.clone(), move |ctx: StepContext| {
                acquire_temp_dir(ctx, name.clone())
            }),
            ResourceKind::Env { var, default } => {
                builder.resource(name.clone(), move |ctx: StepContext| {
                    acquire_env(ctx, name.clone(), var.clone(), default.clone())
                })
            }
            ResourceKind::Value(raw) => builder.resource(name.clone(), move |ctx: StepContext| {
                acquire_value(ctx, name.clone(), raw.clone())
            }),
        };
    }

    for (index, setup) in file.setup.iter().enumerate() {
        let label = setup
            .name
            .clone()
            .unwrap_or_else(|| format!("setup #{}", index + 1));
        let spec = Arc::new(setup.clone());
        let setup_label = label.clone();
        builder = builder.named_setup(label, move |ctx: StepContext| {
            run_setup(ctx, spec.clone(), setup_label.clone())
        });
    }

    for step in &file.steps {
        let options = step.options(scenario_default);
        let spec = Arc::new(step.clone());
        builder = builder.step_with(step.name.clone(), options, move |ctx: StepContext| {
            run_step(ctx, spec.clone())
        });
    }
    builder.build()
}

/// Scenario 종료 시 삭제되는 임시 디렉터리이다.
#[derive(Debug)]
pub struct TempDir {
    path: PathBuf,
}

impl TempDir {
    /// 실행마다 겹치지 않는 이름으로 디렉터리를 만든다.
    async fn create(scenario: &str, name: &str) -> anyhow::Result<Self> {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let sequence = COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir_name = format!(
            "scenario_{}_{}_{}_{timestamp}_{sequence}",
            sanitize(scenario),
            sanitize(name),
            std::process::id()
        );
        let path = std::env::temp_dir().join(dir_name);
        tokio::fs::create_dir_all(&path)
            .await
            .with_context(|| format!("임시 디렉터리 생성 실패: {}", path.display()))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Dispose for TempDir {
    async fn dispose(&self) -> anyhow::Result<()> {
        tracing::debug!(path = %self.path.display(), "임시 디렉터리 삭제");
        tokio::fs::remove_dir_all(&self.path)
            .await
            .with_context(|| format!("임시 디렉터리 삭제 실패: {}", self.path.display()))
    }
}

fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

async fn acquire_temp_dir(ctx: StepContext, name: String) -> EntryResult<Resource> {
    let dir = TempDir::create(&ctx.scenario, &name).await?;
    ctx.store
        .write()
        .await
        .set_var(name, dir.path().to_string_lossy().to_string());
    Ok(Resource::disposable(dir))
}

async fn acquire_env(
    ctx: StepContext,
    name: String,
    var: String,
    default: Option<String>,
) -> EntryResult<Resource> {
    let Some(value) = std::env::var(&var).ok().or(default) else {
        return Err(skip(format!("환경 변수 {var}가 설정되지 않았습니다.")));
    };
    ctx.store.write().await.set_var(name, value.clone());
    Ok(Resource::new(value))
}

async fn acquire_value(ctx: StepContext, name: String, raw: String) -> EntryResult<Resource> {
    let value = ctx.expand(&raw, "resource.value").await?;
    ctx.store.write().await.set_var(name, value.clone());
    Ok(Resource::new(value))
}

async fn run_setup(ctx: StepContext, spec: Arc<SetupSpec>, label: String) -> EntryResult<Teardown> {
    let output = run_shell(&spec.shell, &ctx.store, &label, &ctx.cancel).await?;
    if output.code != Some(0) {
        return Err(Interrupt::from(anyhow::anyhow!(
            "Setup '{label}' 명령 종료 코드: {:?}",
            output.code
        )));
    }
    let Some(cleanup) = &spec.cleanup else {
        return Ok(Teardown::None);
    };
    let config = spec.shell.with_script(cleanup.clone());
    let store = ctx.store.clone();
    Ok(Teardown::cleanup(move || run_cleanup(config, store, label)))
}

/// 정리 명령은 취소 여부와 관계없이 끝까지 실행한다.
async fn run_cleanup(config: ShellConfig, store: SharedStore, label: String) -> anyhow::Result<()> {
    let output = run_shell(&config, &store, &label, &Cancellation::new())
        .await
        .map_err(|interrupt| anyhow::anyhow!("{interrupt}"))?;
    if output.code != Some(0) {
        anyhow::bail!("정리 명령 종료 코드: {:?}", output.code);
    }
    Ok(())
}

async fn run_step(ctx: StepContext, spec: Arc<StepSpec>) -> EntryResult<String> {
    let output = run_shell(&spec.shell, &ctx.store, &spec.name, &ctx.cancel).await?;
    if spec.skip_exit.is_some() && output.code == spec.skip_exit {
        return Err(skip(format!(
            "Step '{}'이 건너뜀 종료 코드 {:?}로 끝났습니다.",
            spec.name, output.code
        )));
    }
    if output.code != Some(spec.expect_exit) {
        return Err(Interrupt::from(anyhow::anyhow!(
            "Step '{}' 종료 코드 {:?} (기대값 {})",
            spec.name,
            output.code,
            spec.expect_exit
        )));
    }
    if let Some(key) = &spec.save_as {
        ctx.store.write().await.set_var(key.clone(), output.stdout.clone());
    }
    Ok(output.stdout)
}
