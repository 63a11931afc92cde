use super::cancel::Cancellation;
use crate::error::EngineError;
use crate::scenario::{ScenarioDefinition, Value};
use anyhow::Context;
use once_cell::sync::Lazy;
use regex::Regex;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Scenario 안의 모든 엔트리가 공유하는 키-값 저장소이다.
#[derive(Debug, Default)]
pub struct Store {
    /// 키별 값이다. 문자열 값은 플레이스홀더 치환에 쓰인다.
    vars: HashMap<String, Value>,
}

impl Store {
    /// 비어 있는 저장소를 생성한다.
    pub fn new() -> Self {
        Self {
            vars: HashMap::new(),
        }
    }

    /// 임의 타입의 값을 저장한다.
    pub fn set<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.vars.insert(key.into(), Arc::new(value));
    }

    /// 문자열 변수를 저장한다.
    ///
    /// # 매개변수
    /// - `key`: 저장할 변수명.
    /// - `value`: 저장할 문자열 값.
    pub fn set_var(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.set(key, value.into());
    }

    /// 값을 지정한 타입으로 조회한다. 타입이 다르면 `None`이다.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.vars.get(key).cloned()?.downcast::<T>().ok()
    }

    /// 문자열 변수를 조회한다.
    ///
    /// # 반환값
    /// 존재하고 문자열이면 슬라이스를, 아니면 `None`을 반환한다.
    pub fn get_var(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .and_then(|value| value.downcast_ref::<String>())
            .map(String::as_str)
    }

    /// 키가 존재하는지 확인한다.
    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    /// 저장소 또는 환경 변수에서 값을 조회한다.
    ///
    /// 우선 저장소에서 찾고 없으면 환경 변수에서 조회한다.
    pub fn get_or_env(&self, key: &str) -> Option<String> {
        if let Some(value) = self.get_var(key) {
            return Some(value.to_string());
        }
        std::env::var(key).ok()
    }

    /// `${VAR}` 패턴을 실제 값으로 치환한다.
    ///
    /// 치환되지 않은 플레이스홀더가 남으면 오류를 반환한다.
    pub fn expand_placeholders(&self, template: &str) -> anyhow::Result<String> {
        static PLACEHOLDER: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"\$\{([A-Za-z0-9_]+)\}").expect("정규식 컴파일 실패"));
        let result = PLACEHOLDER.replace_all(template, |caps: &regex::Captures| {
            let key = &caps[1];
            self.get_or_env(key)
                .unwrap_or_else(|| format!("${{{key}}}"))
        });
        let result = result.to_string();
        if PLACEHOLDER.is_match(&result) {
            anyhow::bail!("플레이스홀더 치환 실패: {result}");
        }
        Ok(result)
    }

    /// `template`을 치환하되 실패하면 필드 이름을 담은 오류를 돌려준다.
    pub fn expand_required(&self, template: &str, field: &str) -> anyhow::Result<String> {
        self.expand_placeholders(template)
            .with_context(|| format!("{field} 필드의 플레이스홀더를 치환할 수 없습니다."))
    }
}

/// Store를 비동기 환경에서 공유하기 위한 타입 별칭이다.
pub type SharedStore = Arc<RwLock<Store>>;

/// 이름별로 획득한 리소스 값이다.
#[derive(Debug, Default)]
pub struct Resources {
    values: HashMap<String, Value>,
}

impl Resources {
    /// 리소스 값을 지정한 타입으로 조회한다.
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.values.get(name).cloned()?.downcast::<T>().ok()
    }

    /// 리소스가 등록됐는지 확인한다.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    fn insert(&mut self, name: &str, value: Value) -> Result<(), EngineError> {
        if self.values.contains_key(name) {
            return Err(EngineError::DuplicateResource(name.to_string()));
        }
        self.values.insert(name.to_string(), value);
        Ok(())
    }
}

/// Resources를 공유하기 위한 타입 별칭이다.
pub type SharedResources = Arc<RwLock<Resources>>;

/// Scenario 한 번의 실행 동안 엔트리 실행기가 독점하는 상태이다.
#[derive(Debug)]
pub struct ScenarioContext {
    name: String,
    results: Vec<Value>,
    store: SharedStore,
    resources: SharedResources,
    cancel: Cancellation,
}

impl ScenarioContext {
    /// Scenario 정의와 취소 토큰으로 새 컨텍스트를 만든다.
    pub fn new(scenario: &ScenarioDefinition, cancel: Cancellation) -> Self {
        Self {
            name: scenario.name().to_string(),
            results: Vec::new(),
            store: Arc::new(RwLock::new(Store::new())),
            resources: Arc::new(RwLock::new(Resources::default())),
            cancel,
        }
    }

    /// Scenario 전체 취소 토큰.
    pub fn cancel(&self) -> &Cancellation {
        &self.cancel
    }

    /// 현재 상태로부터 엔트리 호출용 컨텍스트를 만든다.
    ///
    /// `cancel`은 리소스/Setup이면 Scenario 토큰, Step이면 시도별 제한 시간이 걸린 토큰이다.
    pub fn step_context(&self, cancel: Cancellation) -> StepContext {
        StepContext {
            scenario: self.name.clone(),
            index: self.results.len(),
            previous: self.results.last().cloned(),
            results: self.results.clone().into(),
            store: self.store.clone(),
            resources: self.resources.clone(),
            cancel,
        }
    }

    pub(crate) fn push_result(&mut self, value: Value) {
        self.results.push(value);
    }

    pub(crate) async fn insert_resource(&self, name: &str, value: Value) -> Result<(), EngineError> {
        self.resources.write().await.insert(name, value)
    }

    pub(crate) async fn has_resource(&self, name: &str) -> bool {
        self.resources.read().await.contains(name)
    }
}

/// 엔트리 호출 직전에 새로 만들어지는 컨텍스트이다.
#[derive(Debug, Clone)]
pub struct StepContext {
    /// 소속 Scenario 이름.
    pub scenario: String,
    /// 지금까지 누적된 Step 값의 개수.
    pub index: usize,
    /// 직전 Step 값.
    pub previous: Option<Value>,
    /// 누적된 Step 값. 이후 Step의 값은 보이지 않는다.
    pub results: Arc<[Value]>,
    /// Scenario 공유 저장소.
    pub store: SharedStore,
    /// Scenario 리소스.
    pub resources: SharedResources,
    /// 호출에 적용되는 취소 토큰.
    pub cancel: Cancellation,
}

impl StepContext {
    /// 직전 Step 값을 지정한 타입으로 꺼낸다.
    pub fn previous_as<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.previous.clone()?.downcast::<T>().ok()
    }

    /// `index`번째 Step 값을 지정한 타입으로 꺼낸다.
    pub fn result_as<T: Any + Send + Sync>(&self, index: usize) -> Option<Arc<T>> {
        self.results.get(index).cloned()?.downcast::<T>().ok()
    }

    /// 리소스를 지정한 타입으로 조회한다.
    pub async fn resource<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, EngineError> {
        self.resources
            .read()
            .await
            .get::<T>(name)
            .ok_or_else(|| EngineError::MissingResource(name.to_string()))
    }

    /// 저장소 기준으로 `${VAR}`를 치환한다.
    pub async fn expand(&self, template: &str, field: &str) -> anyhow::Result<String> {
        self.store.read().await.expand_required(template, field)
    }

    /// 호출이 취소됐는지 확인한다.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{ScenarioBuilder, value};

    #[test]
    fn expand_placeholders_prefers_store_then_env() {
        let mut store = Store::new();
        store.set_var("TABLE", "orders");
        let sql = store
            .expand_placeholders("SELECT * FROM ${TABLE}")
            .expect("치환 실패");
        assert_eq!(sql, "SELECT * FROM orders");

        let err = store
            .expand_required("${SCENARIO_ENGINE_SURELY_UNSET_VAR}", "sql")
            .expect_err("치환되지 않은 변수는 오류여야 한다");
        assert!(format!("{err:#}").contains("sql 필드"));
    }

    #[test]
    fn typed_store_values_round_trip() {
        let mut store = Store::new();
        store.set("count", 3_u64);
        assert_eq!(store.get::<u64>("count").as_deref(), Some(&3));
        assert!(store.get::<String>("count").is_none());
        assert!(store.get_var("count").is_none());
    }

    #[tokio::test]
    async fn step_context_snapshots_accumulated_results() {
        let scenario = ScenarioBuilder::new("ctx").build();
        let mut ctx = ScenarioContext::new(&scenario, Cancellation::new());
        let first = ctx.step_context(Cancellation::new());
        assert_eq!(first.index, 0);
        assert!(first.previous.is_none());

        ctx.push_result(value(10_i32));
        ctx.push_result(value(20_i32));
        let third = ctx.step_context(Cancellation::new());
        assert_eq!(third.index, 2);
        assert_eq!(third.previous_as::<i32>().as_deref(), Some(&20));
        assert_eq!(third.result_as::<i32>(0).as_deref(), Some(&10));

        ctx.push_result(value(30_i32));
        assert_eq!(third.results.len(), 2, "이미 만든 컨텍스트는 이후 값을 보지 않는다");
    }

    #[tokio::test]
    async fn duplicate_resource_names_are_rejected() {
        let scenario = ScenarioBuilder::new("dup").build();
        let ctx = ScenarioContext::new(&scenario, Cancellation::new());
        ctx.insert_resource("db", value("primary".to_string()))
            .await
            .expect("첫 등록은 성공해야 한다");
        let err = ctx
            .insert_resource("db", value("replica".to_string()))
            .await
            .expect_err("중복 등록은 실패해야 한다");
        assert!(matches!(err, EngineError::DuplicateResource(ref name) if name == "db"));

        let step = ctx.step_context(Cancellation::new());
        let db = step.resource::<String>("db").await.expect("리소스 조회 실패");
        assert_eq!(db.as_str(), "primary");
        assert!(step.resource::<u8>("db").await.is_err());
    }
}
