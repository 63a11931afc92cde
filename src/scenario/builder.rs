use super::{
    Entry, Location, Resource, ResourceEntry, ScenarioDefinition, ScenarioOptions, SetupEntry,
    StepEntry, StepFn, StepMeta, StepOptions, Teardown, value,
};
use crate::engine::StepContext;
use crate::error::EntryResult;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::sync::Arc;

/// 빌드 시점에 기본 정책이 확정되는 Step 선언이다.
enum Pending {
    Ready(Entry),
    Step {
        name: String,
        options: Option<StepOptions>,
        location: Location,
        func: StepFn,
    },
}

/// Scenario 정의를 선언형으로 조립한다.
///
/// ```ignore
/// let scenario = ScenarioBuilder::new("login")
///     .tag("smoke")
///     .resource("db", |_| async { Ok(Resource::new(42_u32)) })
///     .step("connect", |ctx| async move { Ok(ctx.index) })
///     .build();
/// ```
pub struct ScenarioBuilder {
    name: String,
    options: ScenarioOptions,
    location: Location,
    pending: Vec<Pending>,
    setup_count: usize,
}

impl ScenarioBuilder {
    /// 이름을 지정해 빈 빌더를 만든다.
    #[track_caller]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: ScenarioOptions::default(),
            location: Location::caller(),
            pending: Vec::new(),
            setup_count: 0,
        }
    }

    /// 태그를 추가한다.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.options.tags.insert(tag.into());
        self
    }

    /// 여러 태그를 추가한다.
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// 개별 정책이 없는 Step에 적용할 기본 정책을 지정한다.
    pub fn step_options(mut self, options: StepOptions) -> Self {
        self.options.step_options = options;
        self
    }

    /// 선언 위치를 명시적으로 지정한다. 파일에서 읽은 Scenario에 쓰인다.
    pub fn location(mut self, file: impl Into<String>, line: u32) -> Self {
        self.location = Location {
            file: file.into(),
            line,
        };
        self
    }

    /// 이름 있는 리소스 엔트리를 추가한다.
    pub fn resource<F, Fut>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(StepContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = EntryResult<Resource>> + Send + 'static,
    {
        self.pending.push(Pending::Ready(Entry::Resource(ResourceEntry {
            name: name.into(),
            factory: Arc::new(move |ctx: StepContext| factory(ctx).boxed()),
        })));
        self
    }

    /// Setup 엔트리를 추가한다. 반환값이 `()`이면 정리할 것이 없다는 뜻이다.
    pub fn setup<F, Fut, T>(self, func: F) -> Self
    where
        F: Fn(StepContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = EntryResult<T>> + Send + 'static,
        T: Into<Teardown> + 'static,
    {
        let label = format!("setup #{}", self.setup_count + 1);
        self.named_setup(label, func)
    }

    /// 표시 이름을 지정해 Setup 엔트리를 추가한다.
    pub fn named_setup<F, Fut, T>(mut self, label: impl Into<String>, func: F) -> Self
    where
        F: Fn(StepContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = EntryResult<T>> + Send + 'static,
        T: Into<Teardown> + 'static,
    {
        self.setup_count += 1;
        self.pending.push(Pending::Ready(Entry::Setup(SetupEntry {
            label: label.into(),
            func: Arc::new(move |ctx: StepContext| {
                func(ctx)
                    .map(|res| res.map(Into::<Teardown>::into))
                    .boxed()
            }),
        })));
        self
    }

    /// Scenario 기본 정책으로 실행되는 Step을 추가한다.
    #[track_caller]
    pub fn step<F, Fut, T>(self, name: impl Into<String>, func: F) -> Self
    where
        F: Fn(StepContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = EntryResult<T>> + Send + 'static,
        T: Any + Send + Sync,
    {
        self.push_step(name.into(), None, Location::caller(), func)
    }

    /// 개별 정책을 지정해 Step을 추가한다.
    #[track_caller]
    pub fn step_with<F, Fut, T>(
        self,
        name: impl Into<String>,
        options: StepOptions,
        func: F,
    ) -> Self
    where
        F: Fn(StepContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = EntryResult<T>> + Send + 'static,
        T: Any + Send + Sync,
    {
        self.push_step(name.into(), Some(options), Location::caller(), func)
    }

    fn push_step<F, Fut, T>(
        mut self,
        name: String,
        options: Option<StepOptions>,
        location: Location,
        func: F,
    ) -> Self
    where
        F: Fn(StepContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = EntryResult<T>> + Send + 'static,
        T: Any + Send + Sync,
    {
        let func: StepFn =
            Arc::new(move |ctx: StepContext| func(ctx).map(|res| res.map(value)).boxed());
        self.pending.push(Pending::Step {
            name,
            options,
            location,
            func,
        });
        self
    }

    /// 불변 Scenario 정의를 만든다.
    pub fn build(self) -> ScenarioDefinition {
        let defaults = self.options.step_options;
        let entries: Vec<Entry> = self
            .pending
            .into_iter()
            .map(|pending| match pending {
                Pending::Ready(entry) => entry,
                Pending::Step {
                    name,
                    options,
                    location,
                    func,
                } => Entry::Step(StepEntry {
                    meta: StepMeta {
                        name,
                        options: options.unwrap_or(defaults),
                        location: Some(location),
                    },
                    func,
                }),
            })
            .collect();
        ScenarioDefinition {
            name: self.name,
            options: self.options,
            entries: entries.into(),
            location: Some(self.location),
        }
    }
}
