use crate::error::{EngineError, EntryResult, Interrupt};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

/// 사용자 함수를 호출해 future를 실행하고 panic을 `EngineError::Panicked`로 바꾼다.
///
/// 호출 자체도 `catch_unwind` 안에서 일어나므로 future를 돌려주기 전의 panic도 잡힌다.
pub(crate) async fn guarded<T, F, Fut>(call: F) -> Result<T, EngineError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    match AssertUnwindSafe(async move { call().await })
        .catch_unwind()
        .await
    {
        Ok(result) => result.map_err(EngineError::from),
        Err(payload) => Err(EngineError::Panicked(panic_message(payload.as_ref()))),
    }
}

/// 엔트리 함수를 호출해 실행한다. Skip은 그대로 두고 panic만 실패로 바꾼다.
pub(crate) async fn guarded_entry<T, F, Fut>(call: F) -> EntryResult<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = EntryResult<T>>,
{
    match AssertUnwindSafe(async move { call().await })
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(payload) => Err(Interrupt::Fail(EngineError::Panicked(panic_message(
            payload.as_ref(),
        )))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "알 수 없는 panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn panics_become_errors() {
        let result: EntryResult<u8> = guarded_entry(|| async {
            let value: Option<u8> = None;
            Ok(value.expect("값이 없습니다"))
        })
        .await;
        match result {
            Err(Interrupt::Fail(EngineError::Panicked(message))) => {
                assert!(message.contains("값이 없습니다"));
            }
            other => panic!("panic이 실패로 바뀌어야 한다: {other:?}"),
        }
    }

    #[tokio::test]
    async fn ordinary_results_pass_through() {
        let ok = guarded(|| async { Ok::<_, anyhow::Error>(5) }).await;
        assert!(matches!(ok, Ok(5)));
        let err = guarded(|| async { Err::<(), _>(anyhow::anyhow!("nope")) }).await;
        assert_eq!(err.expect_err("오류여야 한다").to_string(), "nope");
    }

    /// future를 만들기 전에 호출 단계에서 일어난 panic도 실패로 바뀐다.
    #[tokio::test]
    async fn panics_before_future_is_created_are_caught() {
        let result: EntryResult<()> = guarded_entry(|| {
            let missing: Option<u8> = None;
            missing.expect("호출 중 panic");
            std::future::ready(Ok(()))
        })
        .await;
        assert!(matches!(
            result,
            Err(Interrupt::Fail(EngineError::Panicked(ref message))) if message.contains("호출 중 panic")
        ));

        let disposed = guarded(|| -> std::future::Ready<anyhow::Result<()>> {
            panic!("정리 함수 panic")
        })
        .await;
        assert!(matches!(disposed, Err(EngineError::Panicked(_))));
    }
}
