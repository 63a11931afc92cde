use super::model::ShellConfig;
use crate::engine::{Cancellation, SharedStore};
use crate::error::{EntryResult, Interrupt};
use anyhow::Context;
use futures::StreamExt;
use std::collections::HashMap;
use std::process::Stdio;
use tokio::io::AsyncRead;
use tokio::process::Command;
use tokio_util::codec::{FramedRead, LinesCodec};

/// Shell 명령 실행 결과이다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellOutput {
    /// 종료 코드. 시그널로 종료되면 `None`이다.
    pub code: Option<i32>,
    /// 줄 단위로 모은 표준 출력.
    pub stdout: String,
}

/// 저장소 값으로 플레이스홀더를 치환한 뒤 Shell 명령을 실행한다.
///
/// 표준 출력은 결과로 모으고 표준 에러는 `debug` 로그로 내보낸다.
/// `cancel`이 발화하거나 호출 future가 버려지면 자식 프로세스를 종료한다.
pub(crate) async fn run_shell(
    config: &ShellConfig,
    store: &SharedStore,
    label: &str,
    cancel: &Cancellation,
) -> EntryResult<ShellOutput> {
    let (script, env_map, working_dir) = {
        let guard = store.read().await;
        let script = guard.expand_required(&config.script, "shell")?;
        let mut env_map = HashMap::new();
        for (key, value) in &config.env {
            env_map.insert(key.clone(), guard.expand_required(value, "shell.env")?);
        }
        let working_dir = match &config.working_dir {
            Some(dir) => Some(guard.expand_required(dir, "shell.working_dir")?),
            None => None,
        };
        (script, env_map, working_dir)
    };
    let program = config.shell_program.clone().unwrap_or_else(|| {
        if cfg!(target_os = "windows") {
            "cmd"
        } else {
            "sh"
        }
        .to_string()
    });

    let mut command = Command::new(&program);
    if cfg!(target_os = "windows") {
        command.arg("/C");
    } else {
        command.arg("-c");
    }
    command.arg(&script);
    if let Some(dir) = &working_dir {
        command.current_dir(dir);
    }
    command
        .envs(&env_map)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    tracing::debug!(label, script = %script, "Shell 명령 실행");
    let mut child = command
        .spawn()
        .with_context(|| format!("쉘 명령 실행 실패: {script}"))?;
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(stderr_forwarder(stderr, label.to_string()));
    }
    let stdout = child
        .stdout
        .take()
        .context("표준 출력 파이프를 열 수 없습니다.")?;

    tokio::select! {
        biased;
        reason = cancel.cancelled() => Err(Interrupt::Fail(reason.into_error(label))),
        (status, stdout) = async { tokio::join!(child.wait(), collect_lines(stdout)) } => {
            let status = status.with_context(|| format!("쉘 명령 대기 실패: {script}"))?;
            Ok(ShellOutput {
                code: status.code(),
                stdout: stdout?,
            })
        }
    }
}

/// 파이프를 끝까지 읽어 줄 단위로 합친다.
async fn collect_lines<R>(reader: R) -> anyhow::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut lines = FramedRead::new(reader, LinesCodec::new());
    let mut collected = Vec::new();
    while let Some(line) = lines.next().await {
        collected.push(line.context("표준 출력 읽기 오류")?);
    }
    Ok(collected.join("\n"))
}

/// 표준 에러를 읽어 로그로 중계한다.
async fn stderr_forwarder<R>(reader: R, label: String)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut lines = FramedRead::new(reader, LinesCodec::new());
    while let Some(line_result) = lines.next().await {
        match line_result {
            Ok(line) => tracing::debug!(label = %label, "STDERR: {line}"),
            Err(err) => {
                tracing::warn!(label = %label, error = %err, "STDERR 읽기 오류");
                break;
            }
        }
    }
}
