//! Scenario 정의 모델이다. 빌더가 한 번 만들고 엔진은 읽기만 한다.

mod builder;
mod options;

pub use builder::ScenarioBuilder;
pub use options::{Backoff, DEFAULT_BACKOFF_DELAY_MS, DEFAULT_TIMEOUT_SECS, RetryPolicy, StepOptions};

use crate::engine::StepContext;
use crate::error::EntryResult;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Step 반환값과 리소스 값을 담는 동적 값이다.
pub type Value = Arc<dyn Any + Send + Sync>;

/// 임의의 값을 `Value`로 감싼다.
pub fn value<T: Any + Send + Sync>(inner: T) -> Value {
    Arc::new(inner)
}

/// 정리(dispose) 기능을 가진 값이다.
#[async_trait]
pub trait Dispose: Send + Sync {
    /// 값이 잡고 있는 자원을 해제한다.
    async fn dispose(&self) -> anyhow::Result<()>;
}

/// 정리 작업이 반환하는 future이다.
pub type CleanupFuture = BoxFuture<'static, anyhow::Result<()>>;

/// 한 번만 호출되는 지연 정리 작업이다.
pub type Cleanup = Box<dyn FnOnce() -> CleanupFuture + Send>;

/// 리소스 팩토리가 돌려주는 값과 선택적 정리 작업이다.
pub struct Resource {
    pub(crate) value: Value,
    pub(crate) disposer: Option<Cleanup>,
}

impl Resource {
    /// 정리가 필요 없는 일반 값을 리소스로 만든다.
    pub fn new<T: Any + Send + Sync>(inner: T) -> Self {
        Self {
            value: value(inner),
            disposer: None,
        }
    }

    /// `Dispose`를 구현한 값을 리소스로 만든다. Scenario 종료 시 정리된다.
    pub fn disposable<T: Dispose + Any>(inner: T) -> Self {
        let shared = Arc::new(inner);
        let handle = shared.clone();
        Self {
            value: shared,
            disposer: Some(Box::new(move || {
                Box::pin(async move { handle.dispose().await })
            })),
        }
    }

    /// 임의의 값에 정리 작업을 붙인다.
    pub fn with_cleanup<T, F, Fut>(inner: T, cleanup: F) -> Self
    where
        T: Any + Send + Sync,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            value: value(inner),
            disposer: Some(Box::new(move || Box::pin(cleanup()))),
        }
    }
}

/// Setup 함수가 돌려주는 정리 방법이다.
pub enum Teardown {
    /// 정리할 것이 없다.
    None,
    /// 인자 없는 정리 작업.
    Cleanup(Cleanup),
    /// 정리 가능한 값.
    Dispose(Arc<dyn Dispose>),
}

impl Teardown {
    /// 정리 작업 클로저로 Teardown을 만든다.
    pub fn cleanup<F, Fut>(cleanup: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Teardown::Cleanup(Box::new(move || Box::pin(cleanup())))
    }

    /// 정리 가능한 값으로 Teardown을 만든다.
    pub fn dispose<T: Dispose + 'static>(inner: T) -> Self {
        Teardown::Dispose(Arc::new(inner))
    }

    /// 정리 스택에 넣을 작업으로 변환한다.
    pub(crate) fn into_cleanup(self) -> Option<Cleanup> {
        match self {
            Teardown::None => None,
            Teardown::Cleanup(cleanup) => Some(cleanup),
            Teardown::Dispose(handle) => Some(Box::new(move || {
                Box::pin(async move { handle.dispose().await })
            })),
        }
    }
}

impl From<()> for Teardown {
    fn from(_: ()) -> Self {
        Teardown::None
    }
}

/// 리소스 팩토리 함수 타입이다.
pub type ResourceFn = Arc<dyn Fn(StepContext) -> BoxFuture<'static, EntryResult<Resource>> + Send + Sync>;
/// Setup 함수 타입이다.
pub type SetupFn = Arc<dyn Fn(StepContext) -> BoxFuture<'static, EntryResult<Teardown>> + Send + Sync>;
/// Step 함수 타입이다. 재시도를 위해 여러 번 호출될 수 있다.
pub type StepFn = Arc<dyn Fn(StepContext) -> BoxFuture<'static, EntryResult<Value>> + Send + Sync>;

/// 소스 코드 위치(진단용)이다.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    /// 파일 경로.
    pub file: String,
    /// 1 기반 줄 번호.
    pub line: u32,
}

impl Location {
    /// 호출 지점의 위치를 기록한다.
    #[track_caller]
    pub fn caller() -> Self {
        let caller = std::panic::Location::caller();
        Self {
            file: caller.file().to_string(),
            line: caller.line(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Step의 실행 코드 없는 메타데이터이다. 결과와 리포터 알림에 함께 실린다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepMeta {
    /// Step 이름.
    pub name: String,
    /// 적용된 실행 정책.
    pub options: StepOptions,
    /// 선언 위치.
    pub location: Option<Location>,
}

/// 이름 있는 값을 획득하는 엔트리이다.
#[derive(Clone)]
pub struct ResourceEntry {
    pub(crate) name: String,
    pub(crate) factory: ResourceFn,
}

impl ResourceEntry {
    /// 리소스 이름.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// 준비 작업 엔트리이다.
#[derive(Clone)]
pub struct SetupEntry {
    pub(crate) label: String,
    pub(crate) func: SetupFn,
}

impl SetupEntry {
    /// 알림과 로그에 쓰이는 표시 이름.
    pub fn label(&self) -> &str {
        &self.label
    }
}

/// 검증 대상 Step 엔트리이다.
#[derive(Clone)]
pub struct StepEntry {
    pub(crate) meta: StepMeta,
    pub(crate) func: StepFn,
}

impl StepEntry {
    /// Step 메타데이터.
    pub fn meta(&self) -> &StepMeta {
        &self.meta
    }

    /// Step 이름.
    pub fn name(&self) -> &str {
        &self.meta.name
    }
}

/// Scenario를 구성하는 엔트리이다.
#[derive(Clone)]
pub enum Entry {
    /// 리소스 획득.
    Resource(ResourceEntry),
    /// 준비 작업.
    Setup(SetupEntry),
    /// Step.
    Step(StepEntry),
}

impl Entry {
    /// 엔트리의 표시 이름을 반환한다.
    pub fn label(&self) -> &str {
        match self {
            Entry::Resource(entry) => entry.name(),
            Entry::Setup(entry) => entry.label(),
            Entry::Step(entry) => entry.name(),
        }
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entry::Resource(entry) => f.debug_tuple("Resource").field(&entry.name).finish(),
            Entry::Setup(entry) => f.debug_tuple("Setup").field(&entry.label).finish(),
            Entry::Step(entry) => f.debug_tuple("Step").field(&entry.meta).finish(),
        }
    }
}

// 함수는 비교할 수 없으므로 메타데이터만 비교한다.
impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Entry::Resource(a), Entry::Resource(b)) => a.name == b.name,
            (Entry::Setup(a), Entry::Setup(b)) => a.label == b.label,
            (Entry::Step(a), Entry::Step(b)) => a.meta == b.meta,
            _ => false,
        }
    }
}

/// Scenario 수준 옵션이다.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScenarioOptions {
    /// 분류 태그.
    pub tags: BTreeSet<String>,
    /// Step 기본 실행 정책.
    pub step_options: StepOptions,
}

/// 빌드가 끝난 불변 Scenario 정의이다.
///
/// 복제해도 엔트리 목록은 공유되지만 수정할 방법이 없으므로 안전하다.
#[derive(Clone, Debug, PartialEq)]
pub struct ScenarioDefinition {
    name: String,
    options: ScenarioOptions,
    entries: Arc<[Entry]>,
    location: Option<Location>,
}

impl ScenarioDefinition {
    /// Scenario 이름.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Scenario 옵션.
    pub fn options(&self) -> &ScenarioOptions {
        &self.options
    }

    /// 선언 순서대로 정렬된 엔트리 목록.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// 선언 위치.
    pub fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }

    /// 지정한 태그가 붙어 있는지 확인한다.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.options.tags.contains(tag)
    }

    /// Step 엔트리 수를 반환한다.
    pub fn step_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| matches!(entry, Entry::Step(_)))
            .count()
    }

    #[cfg(test)]
    pub(crate) fn shares_entries_with(&self, other: &ScenarioDefinition) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries)
    }
}
