use super::cancel::Cancellation;
use crate::error::{EntryResult, Interrupt};
use crate::scenario::RetryPolicy;
use std::future::Future;

/// `attempt`를 최대 `policy.max_attempts`번 실행한다.
///
/// - 성공하면 즉시 반환한다.
/// - `Interrupt::Skip`은 재시도하지 않고 그대로 돌려준다.
/// - 시도 사이 대기는 `cancel`을 관찰하며, 취소되면 시도를 더 쓰지 않고 취소 오류를 돌려준다.
/// - 마지막 시도의 실패는 감싸지 않고 그대로 전파한다.
///
/// `attempt`에는 1부터 시작하는 시도 번호가 전달된다.
pub async fn retry<T, F, Fut>(
    label: &str,
    policy: &RetryPolicy,
    cancel: &Cancellation,
    mut attempt: F,
) -> EntryResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = EntryResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut number: u32 = 1;
    loop {
        if let Some(reason) = cancel.reason() {
            return Err(Interrupt::Fail(reason.into_error(label)));
        }
        let err = match attempt(number).await {
            Ok(value) => return Ok(value),
            Err(Interrupt::Skip(reason)) => return Err(Interrupt::Skip(reason)),
            Err(Interrupt::Fail(err)) => err,
        };
        if number >= max_attempts {
            return Err(Interrupt::Fail(err));
        }
        let delay = policy.backoff.delay_after(policy.delay, number);
        tracing::debug!(
            step = label,
            attempt = number,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "시도 실패, 대기 후 재시도"
        );
        tokio::select! {
            biased;
            reason = cancel.cancelled() => {
                return Err(Interrupt::Fail(reason.into_error(label)));
            }
            _ = tokio::time::sleep(delay) => {}
        }
        number += 1;
    }
}
