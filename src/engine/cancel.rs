use crate::error::EngineError;
use futures::future::{BoxFuture, FutureExt, select_all};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

/// 취소가 일어난 원인이다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// 외부에서 명시적으로 취소했다.
    Cancelled,
    /// 제한 시간이 지나 스스로 취소됐다.
    DeadlineExceeded(Duration),
}

impl CancelReason {
    /// 취소 원인을 Step 오류로 변환한다.
    pub fn into_error(self, step: &str) -> EngineError {
        match self {
            CancelReason::Cancelled => EngineError::Cancelled,
            CancelReason::DeadlineExceeded(timeout) => EngineError::Timeout {
                step: step.to_string(),
                timeout,
            },
        }
    }
}

/// 합성 가능한 취소 토큰이다.
///
/// `tokio_util`의 `CancellationToken` 위에 취소 원인과 마감 시각을 얹었다.
/// 파생 토큰은 부모 중 하나라도 취소되면 취소된 것으로 본다.
/// 마감 시각은 타이머 태스크 없이 조회 시점에 평가한다.
/// 원인이 여럿이면 먼저 일어난 쪽을 기록하며, 한 번 기록된 원인은 바뀌지 않는다.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    token: CancellationToken,
    /// 확정된 취소 원인과 그 시각.
    fired: OnceLock<(CancelReason, Instant)>,
    deadline: Option<(Instant, Duration)>,
    parents: Vec<Cancellation>,
}

impl Cancellation {
    /// 외부에서 취소할 수 있는 새 토큰을 만든다.
    pub fn new() -> Self {
        Self::default()
    }

    fn derived(parents: Vec<Cancellation>, deadline: Option<(Instant, Duration)>) -> Self {
        Self {
            inner: Arc::new(Inner {
                token: CancellationToken::new(),
                fired: OnceLock::new(),
                deadline,
                parents,
            }),
        }
    }

    /// 지금부터 `timeout` 뒤에 스스로 취소되는 자식 토큰을 만든다.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self::derived(vec![self.clone()], Some((Instant::now() + timeout, timeout)))
    }

    /// 주어진 토큰 중 하나라도 취소되면 취소되는 토큰을 만든다.
    pub fn merge<I>(tokens: I) -> Self
    where
        I: IntoIterator<Item = Cancellation>,
    {
        Self::derived(tokens.into_iter().collect(), None)
    }

    /// 토큰을 취소한다. 이미 취소됐다면 원인은 바뀌지 않는다.
    pub fn cancel(&self) {
        let _ = self.inner.fired.set((CancelReason::Cancelled, Instant::now()));
        self.inner.token.cancel();
    }

    /// 취소 여부를 확인한다.
    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    /// 취소됐다면 원인을 반환한다.
    ///
    /// 명시적 취소가 있으면 그것이 원인이다. 없으면 부모의 취소와 마감 시각 경과 중
    /// 먼저 일어난 쪽이 원인이 된다. 늦게 관찰해도 결과는 같다.
    pub fn reason(&self) -> Option<CancelReason> {
        self.fired().map(|(reason, _)| reason)
    }

    fn fired(&self) -> Option<(CancelReason, Instant)> {
        if let Some(fired) = self.inner.fired.get() {
            return Some(*fired);
        }
        let parent = self
            .inner
            .parents
            .iter()
            .filter_map(Cancellation::fired)
            .min_by_key(|(_, at)| *at);
        let expired = self
            .inner
            .deadline
            .filter(|(deadline, _)| Instant::now() >= *deadline)
            .map(|(deadline, timeout)| (CancelReason::DeadlineExceeded(timeout), deadline));
        let first = match (parent, expired) {
            (Some(parent), Some(expired)) if expired.1 < parent.1 => expired,
            (Some(parent), _) => parent,
            (None, expired) => expired?,
        };
        Some(*self.inner.fired.get_or_init(|| first))
    }

    /// 남은 시간을 반환한다. 마감 시각이 없으면 `None`이다.
    pub fn remaining(&self) -> Option<Duration> {
        self.inner
            .deadline
            .map(|(deadline, _)| deadline.saturating_duration_since(Instant::now()))
    }

    /// 취소될 때까지 기다린 뒤 원인을 반환한다.
    pub async fn cancelled(&self) -> CancelReason {
        self.wait().await;
        self.reason().unwrap_or(CancelReason::Cancelled)
    }

    fn wait(&self) -> BoxFuture<'_, ()> {
        if self.reason().is_some() {
            return futures::future::ready(()).boxed();
        }
        let mut waiters: Vec<BoxFuture<'_, ()>> = Vec::with_capacity(self.inner.parents.len() + 2);
        waiters.push(self.inner.token.cancelled().boxed());
        if let Some((deadline, _)) = self.inner.deadline {
            waiters.push(sleep_until(deadline).boxed());
        }
        for parent in &self.inner.parents {
            waiters.push(parent.wait());
        }
        async move {
            select_all(waiters).await;
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn external_cancel_reports_cancelled() {
        let source = Cancellation::new();
        assert!(!source.is_cancelled());
        source.cancel();
        assert_eq!(source.reason(), Some(CancelReason::Cancelled));
        assert_eq!(source.cancelled().await, CancelReason::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_token_fires_after_duration() {
        let source = Cancellation::new();
        let scoped = source.with_timeout(Duration::from_millis(50));
        assert!(!scoped.is_cancelled());
        let reason = scoped.cancelled().await;
        assert_eq!(reason, CancelReason::DeadlineExceeded(Duration::from_millis(50)));
        assert!(!source.is_cancelled(), "부모는 자식 마감에 영향받지 않아야 한다");
    }

    #[tokio::test(start_paused = true)]
    async fn parent_cancel_propagates_to_timeout_child() {
        let source = Cancellation::new();
        let scoped = source.with_timeout(Duration::from_secs(60));
        let waiter = {
            let scoped = scoped.clone();
            tokio::spawn(async move { scoped.cancelled().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        source.cancel();
        let reason = waiter.await.expect("대기 태스크 실패");
        assert_eq!(reason, CancelReason::Cancelled);
    }

    /// 부모 취소가 마감보다 먼저였다면 마감이 지난 뒤 조회해도 Cancelled이다.
    #[tokio::test(start_paused = true)]
    async fn earlier_parent_cancel_wins_over_later_observed_deadline() {
        let source = Cancellation::new();
        let scoped = source.with_timeout(Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(10)).await;
        source.cancel();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(scoped.reason(), Some(CancelReason::Cancelled));
        assert_eq!(scoped.cancelled().await, CancelReason::Cancelled);
    }

    /// 마감이 먼저 지났다면 이후의 부모 취소가 원인을 바꾸지 않는다.
    #[tokio::test(start_paused = true)]
    async fn earlier_deadline_wins_over_later_parent_cancel() {
        let source = Cancellation::new();
        let scoped = source.with_timeout(Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(100)).await;
        source.cancel();
        assert_eq!(
            scoped.reason(),
            Some(CancelReason::DeadlineExceeded(Duration::from_millis(50)))
        );
    }

    #[tokio::test]
    async fn merged_token_fires_when_any_parent_fires() {
        let a = Cancellation::new();
        let b = Cancellation::new();
        let merged = Cancellation::merge([a.clone(), b.clone()]);
        assert!(!merged.is_cancelled());
        b.cancel();
        assert!(merged.is_cancelled());
        assert_eq!(merged.cancelled().await, CancelReason::Cancelled);
        assert!(!a.is_cancelled());
    }

    #[test]
    fn cancel_reason_maps_to_distinct_errors() {
        let timeout = CancelReason::DeadlineExceeded(Duration::from_millis(5)).into_error("load");
        assert!(matches!(timeout, EngineError::Timeout { ref step, .. } if step == "load"));
        assert!(matches!(
            CancelReason::Cancelled.into_error("load"),
            EngineError::Cancelled
        ));
    }
}
