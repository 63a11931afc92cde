//! YAML 파일로 작성한 Shell 기반 Scenario 묶음이다.

mod convert;
mod model;
mod shell;

pub use convert::{TempDir, to_definition};
pub use model::{
    ResourceKind, ResourceSpec, ScenarioFile, SetupSpec, ShellConfig, StepDefaults, StepSpec,
    load_scenario_file, load_scenario_from_reader,
};
pub use shell::ShellOutput;

use crate::scenario::{ScenarioDefinition, StepOptions};
use anyhow::Context;
use glob::glob;
use std::collections::BTreeSet;
use std::path::PathBuf;

/// glob 패턴을 Scenario 파일 목록으로 펼친다.
///
/// 결과는 경로 순으로 정렬되고 중복이 제거된다. 아무 파일도 찾지 못한 패턴은 경고만 남긴다.
pub fn discover<S: AsRef<str>>(patterns: &[S]) -> anyhow::Result<Vec<PathBuf>> {
    let mut found = BTreeSet::new();
    for pattern in patterns {
        let pattern = pattern.as_ref();
        let mut matched = 0usize;
        for entry in glob(pattern).with_context(|| format!("glob 패턴 파싱 실패: {pattern}"))? {
            let path = entry?;
            if path.is_file() {
                found.insert(path);
                matched += 1;
            }
        }
        if matched == 0 {
            tracing::warn!(pattern, "패턴에 해당하는 Scenario 파일이 없습니다");
        }
    }
    Ok(found.into_iter().collect())
}

/// Scenario 파일들을 읽어 실행 가능한 정의로 변환한다.
pub fn load_suite(paths: &[PathBuf], base: StepOptions) -> anyhow::Result<Vec<ScenarioDefinition>> {
    paths
        .iter()
        .map(|path| {
            let file = load_scenario_file(path)?;
            tracing::debug!(path = %path.display(), scenario = %file.name, "Scenario 파일 로드");
            Ok(to_definition(&file, path, base))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    fn temp_suite_dir(tag: &str) -> PathBuf {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("시스템 시간이 UTC epoch 이전입니다.")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("suite_{tag}_{timestamp}"));
        std::fs::create_dir_all(&dir).expect("임시 디렉터리 생성 실패");
        dir
    }

    /// 겹치는 패턴은 한 번만, 경로 순으로 반환한다.
    #[test]
    fn discover_sorts_and_deduplicates() {
        let dir = temp_suite_dir("discover");
        for name in ["b.yaml", "a.yaml", "notes.txt"] {
            std::fs::write(dir.join(name), "name: x\n").expect("파일 작성 실패");
        }
        let patterns = vec![
            format!("{}/*.yaml", dir.display()),
            format!("{}/a.*", dir.display()),
            format!("{}/missing_*.yaml", dir.display()),
        ];
        let found = discover(&patterns).expect("탐색 실패");
        assert_eq!(found, vec![dir.join("a.yaml"), dir.join("b.yaml")]);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn discover_rejects_invalid_pattern() {
        assert!(discover(&["[unclosed"]).is_err());
    }

    #[test]
    fn load_suite_applies_base_options_and_reports_bad_files() {
        let dir = temp_suite_dir("load");
        let good = dir.join("good.yaml");
        std::fs::write(
            &good,
            "name: good\ntags: [smoke]\nsteps:\n  - { name: one, shell: \"true\" }\n",
        )
        .expect("파일 작성 실패");
        let base = StepOptions::new(Duration::from_secs(3));
        let suite = load_suite(std::slice::from_ref(&good), base).expect("로드 실패");
        assert_eq!(suite.len(), 1);
        assert_eq!(suite[0].name(), "good");
        assert!(suite[0].has_tag("smoke"));
        assert_eq!(suite[0].step_count(), 1);

        let bad = dir.join("bad.yaml");
        std::fs::write(&bad, "steps: [").expect("파일 작성 실패");
        let err = load_suite(&[good, bad.clone()], base).expect_err("파싱 실패여야 한다");
        assert!(format!("{err:#}").contains(&bad.display().to_string()));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
