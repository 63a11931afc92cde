use clap::Parser;
use scenario_engine::config::{Overrides, RunConfig};
use scenario_engine::engine::{Cancellation, RunSummary, ScenarioStatus, TracingReporter};
use scenario_engine::{run, suite};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "scenario-engine")]
#[command(about = "YAML로 작성한 Shell Scenario를 실행합니다")]
struct Args {
    /// Scenario 파일 glob 패턴
    #[arg(required = true)]
    patterns: Vec<String>,

    /// 실행 설정 파일(YAML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// 한 배치에서 동시에 실행할 Scenario 수 (0이면 전부)
    #[arg(long)]
    max_concurrency: Option<usize>,

    /// 누적 실패가 이 값에 도달하면 다음 배치를 시작하지 않음 (0이면 제한 없음)
    #[arg(long)]
    max_failures: Option<usize>,

    /// 이 태그가 붙은 Scenario만 실행 (여러 번 지정 가능)
    #[arg(long = "tag")]
    tags: Vec<String>,

    /// 이 태그가 붙은 Scenario는 제외 (여러 번 지정 가능)
    #[arg(long = "exclude-tag")]
    exclude_tags: Vec<String>,

    /// 로그를 debug 수준으로 출력
    #[arg(short, long)]
    verbose: bool,
}

/// 설정을 읽고 Scenario를 실행하는 진입점이다.
///
/// 종료 코드는 실패가 없으면 0, 실패한 Scenario가 있으면 1, 준비 단계 오류는 2이다.
fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            tracing::error!(error = %err, "tokio 런타임 생성 실패");
            return ExitCode::from(2);
        }
    };
    match runtime.block_on(execute(args)) {
        Ok(summary) if summary.is_success() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(1),
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::from(2)
        }
    }
}

/// `RUST_LOG`가 없으면 `info`(또는 `-v`일 때 `debug`)로 로그를 초기화한다.
fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn execute(args: Args) -> anyhow::Result<RunSummary> {
    let config = match &args.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    }
    .with_overrides(Overrides {
        max_concurrency: args.max_concurrency,
        max_failures: args.max_failures,
        include_tags: args.tags,
        exclude_tags: args.exclude_tags,
    });

    let paths = suite::discover(&args.patterns)?;
    if paths.is_empty() {
        anyhow::bail!("실행할 Scenario 파일이 없습니다: {:?}", args.patterns);
    }
    let scenarios = config.select(suite::load_suite(&paths, config.step_options())?);
    tracing::info!(
        files = paths.len(),
        selected = scenarios.len(),
        "Scenario 로드 완료"
    );

    let cancel = Cancellation::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("중단 요청을 받았습니다. 진행 중인 배치가 끝나면 종료합니다.");
            interrupt.cancel();
        }
    });

    let summary = run(
        scenarios,
        config.run_options(Arc::new(TracingReporter), cancel),
    )
    .await;
    print_summary(&summary);
    Ok(summary)
}

fn print_summary(summary: &RunSummary) {
    for scenario in &summary.scenarios {
        let detail = match scenario.status {
            ScenarioStatus::Failed => scenario
                .error
                .as_ref()
                .map(|err| format!(" - {err}"))
                .unwrap_or_default(),
            ScenarioStatus::Skipped => scenario
                .skip_reason
                .as_ref()
                .map(|reason| format!(" - {reason}"))
                .unwrap_or_default(),
            ScenarioStatus::Passed => String::new(),
        };
        println!(
            "[{}] {} ({}ms){detail}",
            scenario.status,
            scenario.name,
            scenario.duration.as_millis()
        );
        for step in scenario.failed_steps() {
            let error = step.error.as_ref().map(ToString::to_string).unwrap_or_default();
            println!("    실패 Step: {} - {error}", step.name());
        }
    }
    println!(
        "총 {}개: 성공 {}, 실패 {}, 건너뜀 {} ({}ms)",
        summary.total,
        summary.passed,
        summary.failed,
        summary.skipped,
        summary.duration.as_millis()
    );
    if let Some(reason) = summary.stopped {
        println!("조기 종료: {reason:?}");
    }
}
