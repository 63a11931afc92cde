use crate::scenario::{RetryPolicy, StepOptions};
use anyhow::Context;
use serde::de::{self, Deserializer};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

/// YAML 파일 하나에 정의된 Scenario이다.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioFile {
    /// Scenario 표시 이름.
    pub name: String,
    /// 실행 대상 선택에 쓰이는 태그.
    #[serde(default)]
    pub tags: Vec<String>,
    /// 개별 정책이 없는 Step에 적용할 기본값.
    #[serde(default)]
    pub defaults: StepDefaults,
    /// 선언 순서대로 획득할 리소스.
    #[serde(default)]
    pub resources: Vec<ResourceSpec>,
    /// 리소스 다음, Step 이전에 실행할 Setup 명령.
    #[serde(default)]
    pub setup: Vec<SetupSpec>,
    /// Step 목록.
    #[serde(default)]
    pub steps: Vec<StepSpec>,
}

/// Step 정책 기본값이다. 비어 있는 항목은 상위 설정을 따른다.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StepDefaults {
    /// 시도 하나당 제한 시간(밀리초).
    pub timeout_ms: Option<u64>,
    /// 재시도 정책.
    pub retry: Option<RetryPolicy>,
}

impl StepDefaults {
    /// `base` 위에 지정된 항목만 덮어쓴다.
    pub fn apply(&self, base: StepOptions) -> StepOptions {
        let mut options = base;
        if let Some(ms) = self.timeout_ms {
            options = options.with_timeout(Duration::from_millis(ms));
        }
        if let Some(retry) = self.retry {
            options = options.with_retry(retry);
        }
        options
    }
}

/// Shell 명령 실행 설정이다.
#[derive(Debug, Clone, Deserialize)]
pub struct ShellConfig {
    /// 실행할 스크립트. `${VAR}` 플레이스홀더를 사용할 수 있다.
    #[serde(rename = "shell", alias = "command")]
    pub script: String,
    /// 사용할 셸 프로그램 경로.
    pub shell_program: Option<String>,
    /// 스크립트 실행 시 적용할 환경 변수.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// 실행 전 변경할 작업 디렉터리.
    pub working_dir: Option<String>,
}

impl ShellConfig {
    /// 같은 실행 환경에서 다른 스크립트를 실행하는 설정을 만든다.
    pub fn with_script(&self, script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            ..self.clone()
        }
    }
}

/// 리소스 선언이다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSpec {
    /// 리소스 이름. 값은 같은 이름의 변수로도 저장된다.
    pub name: String,
    pub kind: ResourceKind,
}

/// 리소스 종류이다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKind {
    /// 고유한 임시 디렉터리. Scenario 종료 시 삭제된다.
    TempDir,
    /// 환경 변수 값. 없고 기본값도 없으면 Scenario를 건너뛴다.
    Env {
        var: String,
        default: Option<String>,
    },
    /// 고정 문자열 값.
    Value(String),
}

impl<'de> Deserialize<'de> for ResourceSpec {
    /// `temp_dir`, `env`, `value` 중 정확히 하나를 가진 매핑을 역직렬화한다.
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Helper {
            name: String,
            #[serde(default)]
            temp_dir: bool,
            env: Option<String>,
            default: Option<String>,
            value: Option<String>,
        }

        let helper = Helper::deserialize(deserializer)?;
        let kind = match (helper.temp_dir, helper.env, helper.value) {
            (true, None, None) => ResourceKind::TempDir,
            (false, Some(var), None) => ResourceKind::Env {
                var,
                default: helper.default,
            },
            (false, None, Some(value)) => ResourceKind::Value(value),
            (false, None, None) => {
                return Err(de::Error::custom(format!(
                    "리소스 '{}'에 temp_dir, env, value 중 하나가 필요합니다.",
                    helper.name
                )));
            }
            _ => {
                return Err(de::Error::custom(format!(
                    "리소스 '{}'에는 temp_dir, env, value 중 하나만 지정할 수 있습니다.",
                    helper.name
                )));
            }
        };
        Ok(ResourceSpec {
            name: helper.name,
            kind,
        })
    }
}

/// Setup 명령 선언이다.
#[derive(Debug, Clone, Deserialize)]
pub struct SetupSpec {
    /// 표시 이름. 없으면 순번으로 이름이 붙는다.
    pub name: Option<String>,
    #[serde(flatten)]
    pub shell: ShellConfig,
    /// Scenario 종료 시 실행할 정리 명령.
    pub cleanup: Option<String>,
}

/// Shell Step 선언이다.
#[derive(Debug, Clone, Deserialize)]
pub struct StepSpec {
    /// Step 이름.
    pub name: String,
    #[serde(flatten)]
    pub shell: ShellConfig,
    /// 표준 출력을 저장할 변수명.
    pub save_as: Option<String>,
    /// 성공으로 간주할 종료 코드.
    #[serde(default)]
    pub expect_exit: i32,
    /// 이 종료 코드로 끝나면 Scenario를 건너뛴다.
    pub skip_exit: Option<i32>,
    /// 시도 하나당 제한 시간(밀리초).
    pub timeout_ms: Option<u64>,
    /// 재시도 정책.
    pub retry: Option<RetryPolicy>,
}

impl StepSpec {
    /// Scenario 기본값 위에 Step 개별 설정을 덮어쓴다.
    pub fn options(&self, scenario_default: StepOptions) -> StepOptions {
        StepDefaults {
            timeout_ms: self.timeout_ms,
            retry: self.retry,
        }
        .apply(scenario_default)
    }
}

/// YAML 파일을 읽어 ScenarioFile로 역직렬화한다.
pub fn load_scenario_file(path: &Path) -> anyhow::Result<ScenarioFile> {
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("Scenario 파일을 열 수 없습니다: {}", path.display()))?;
    load_scenario_from_reader(&mut file)
        .with_context(|| format!("Scenario 파일 파싱 실패: {}", path.display()))
}

/// Reader에서 YAML을 읽어 ScenarioFile로 파싱한다.
pub fn load_scenario_from_reader<R: Read>(reader: &mut R) -> anyhow::Result<ScenarioFile> {
    let mut buf = String::new();
    reader.read_to_string(&mut buf)?;
    let file: ScenarioFile = serde_yaml::from_str(&buf)?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::Backoff;

    const SMOKE: &str = r#"
name: smoke
tags: [fast]
defaults:
  timeout_ms: 5000
  retry: { max_attempts: 2, backoff: linear, delay_ms: 10 }
resources:
  - { name: WORK, temp_dir: true }
  - { name: API_URL, env: API_URL, default: "http://localhost" }
  - { name: GREETING, value: hello }
setup:
  - { shell: "mkdir -p ${WORK}/data", cleanup: "echo done" }
steps:
  - { name: list, shell: "ls ${WORK}", save_as: LISTING }
  - name: flaky
    command: "exit 3"
    skip_exit: 3
    timeout_ms: 100
    retry: 4
"#;

    #[test]
    fn parses_full_scenario_file() {
        let file = load_scenario_from_reader(&mut SMOKE.as_bytes()).expect("파싱 실패");
        assert_eq!(file.name, "smoke");
        assert_eq!(file.tags, vec!["fast"]);
        assert_eq!(
            file.resources.iter().map(|r| r.kind.clone()).collect::<Vec<_>>(),
            vec![
                ResourceKind::TempDir,
                ResourceKind::Env {
                    var: "API_URL".into(),
                    default: Some("http://localhost".into())
                },
                ResourceKind::Value("hello".into()),
            ]
        );
        assert_eq!(file.setup[0].cleanup.as_deref(), Some("echo done"));
        assert_eq!(file.setup[0].shell.script, "mkdir -p ${WORK}/data");
        assert_eq!(file.steps[0].expect_exit, 0);
        assert_eq!(file.steps[0].save_as.as_deref(), Some("LISTING"));
        assert_eq!(file.steps[1].shell.script, "exit 3");
        assert_eq!(file.steps[1].skip_exit, Some(3));
    }

    /// Step 개별 설정은 Scenario 기본값을, Scenario 기본값은 실행 기본값을 덮어쓴다.
    #[test]
    fn step_options_layer_over_defaults() {
        let file = load_scenario_from_reader(&mut SMOKE.as_bytes()).expect("파싱 실패");
        let scenario_default = file.defaults.apply(StepOptions::default());
        assert_eq!(scenario_default.timeout, Duration::from_millis(5000));
        assert_eq!(scenario_default.retry.max_attempts, 2);
        assert_eq!(scenario_default.retry.backoff, Backoff::Linear);

        let inherited = file.steps[0].options(scenario_default);
        assert_eq!(inherited, scenario_default);

        let custom = file.steps[1].options(scenario_default);
        assert_eq!(custom.timeout, Duration::from_millis(100));
        assert_eq!(custom.retry.max_attempts, 4);
    }

    #[test]
    fn resource_requires_exactly_one_kind() {
        let missing = "name: r\nsteps: []\nresources:\n  - { name: X }\n";
        let err = load_scenario_from_reader(&mut missing.as_bytes()).expect_err("실패해야 한다");
        assert!(err.to_string().contains("하나가 필요합니다"));

        let both = "name: r\nresources:\n  - { name: X, temp_dir: true, value: v }\n";
        let err = load_scenario_from_reader(&mut both.as_bytes()).expect_err("실패해야 한다");
        assert!(err.to_string().contains("하나만"));
    }
}
