use crate::engine::{Cancellation, RunOptions, SharedReporter};
use crate::scenario::{DEFAULT_TIMEOUT_SECS, RetryPolicy, ScenarioDefinition, StepOptions};
use anyhow::Context;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// 실행 설정 파일(YAML) 내용이다. 빠진 항목은 기본값을 쓴다.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// 배치 크기. 0이면 모든 Scenario를 한 번에 실행한다.
    pub max_concurrency: usize,
    /// 실패 한도. 0이면 제한이 없다.
    pub max_failures: usize,
    /// 하나라도 붙어 있어야 실행하는 태그. 비어 있으면 모두 실행한다.
    pub include_tags: Vec<String>,
    /// 하나라도 붙어 있으면 제외하는 태그.
    pub exclude_tags: Vec<String>,
    /// Step 시도 하나당 기본 제한 시간(밀리초).
    pub default_timeout_ms: u64,
    /// Step 기본 재시도 정책. 없으면 한 번만 시도한다.
    pub default_retry: Option<RetryPolicy>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 0,
            max_failures: 0,
            include_tags: Vec::new(),
            exclude_tags: Vec::new(),
            default_timeout_ms: DEFAULT_TIMEOUT_SECS * 1000,
            default_retry: None,
        }
    }
}

/// 명령행에서 받은 설정 덮어쓰기 값이다.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub max_concurrency: Option<usize>,
    pub max_failures: Option<usize>,
    /// 비어 있지 않으면 파일의 `include_tags`를 대체한다.
    pub include_tags: Vec<String>,
    /// 파일의 `exclude_tags`에 추가된다.
    pub exclude_tags: Vec<String>,
}

impl RunConfig {
    /// YAML 설정 파일을 읽는다.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("설정 파일을 읽을 수 없습니다: {}", path.display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("설정 파일 파싱 실패: {}", path.display()))
    }

    /// 명령행 값을 반영한다.
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        if let Some(max) = overrides.max_concurrency {
            self.max_concurrency = max;
        }
        if let Some(max) = overrides.max_failures {
            self.max_failures = max;
        }
        if !overrides.include_tags.is_empty() {
            self.include_tags = overrides.include_tags;
        }
        self.exclude_tags.extend(overrides.exclude_tags);
        self
    }

    /// 실행 전체에 적용할 Step 기본 정책.
    pub fn step_options(&self) -> StepOptions {
        StepOptions::new(Duration::from_millis(self.default_timeout_ms))
            .with_retry(self.default_retry.unwrap_or_default())
    }

    /// 엔진 실행 옵션을 만든다.
    pub fn run_options(&self, reporter: SharedReporter, cancel: Cancellation) -> RunOptions {
        RunOptions::default()
            .with_reporter(reporter)
            .with_max_concurrency(self.max_concurrency)
            .with_max_failures(self.max_failures)
            .with_cancel(cancel)
    }

    /// 태그 조건에 맞는 Scenario만 입력 순서대로 남긴다.
    pub fn select(&self, scenarios: Vec<ScenarioDefinition>) -> Vec<ScenarioDefinition> {
        scenarios
            .into_iter()
            .filter(|scenario| {
                let included = self.include_tags.is_empty()
                    || self.include_tags.iter().any(|tag| scenario.has_tag(tag));
                let excluded = self.exclude_tags.iter().any(|tag| scenario.has_tag(tag));
                included && !excluded
            })
            .collect()
    }
}
