use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Step 제한 시간 기본값(초 단위)이다.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// 재시도 간 대기 시간의 기준값(밀리초)이다.
pub const DEFAULT_BACKOFF_DELAY_MS: u64 = 100;

/// 재시도 사이 대기 시간 전략이다.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// 기준 대기 시간에 시도 번호를 곱한다.
    Linear,
    /// 기준 대기 시간에 2^(시도 번호 - 1)을 곱한다.
    #[default]
    Exponential,
}

impl Backoff {
    /// `attempt`번째 시도가 실패한 뒤 기다릴 시간을 계산한다.
    ///
    /// `attempt`는 1부터 시작한다.
    pub fn delay_after(self, base: Duration, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match self {
            Backoff::Linear => base.saturating_mul(attempt),
            Backoff::Exponential => {
                let factor = 2_u32.checked_pow(attempt - 1).unwrap_or(u32::MAX);
                base.saturating_mul(factor)
            }
        }
    }
}

/// Step 재시도 정책이다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 최대 시도 횟수이며 항상 1 이상이다.
    pub max_attempts: u32,
    /// 대기 시간 전략.
    pub backoff: Backoff,
    /// 대기 시간 기준값.
    pub delay: Duration,
}

impl RetryPolicy {
    /// 재시도 없이 한 번만 실행하는 정책이다.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            backoff: Backoff::default(),
            delay: Duration::from_millis(DEFAULT_BACKOFF_DELAY_MS),
        }
    }

    /// 최대 시도 횟수와 전략을 지정해 정책을 만든다.
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::once()
        }
        .with_backoff(backoff)
    }

    /// 전략을 교체한다.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// 대기 시간 기준값을 교체한다.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::once()
    }
}

impl<'de> Deserialize<'de> for RetryPolicy {
    /// 숫자(최대 시도 횟수) 또는 구조체 형태의 설정을 모두 지원하도록 역직렬화한다.
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Helper {
            Attempts(u32),
            Detailed {
                max_attempts: u32,
                #[serde(default)]
                backoff: Backoff,
                delay_ms: Option<u64>,
            },
        }

        let (max_attempts, backoff, delay_ms) = match Helper::deserialize(deserializer)? {
            Helper::Attempts(max_attempts) => (max_attempts, Backoff::default(), None),
            Helper::Detailed {
                max_attempts,
                backoff,
                delay_ms,
            } => (max_attempts, backoff, delay_ms),
        };
        if max_attempts == 0 {
            return Err(de::Error::custom("max_attempts는 1 이상이어야 합니다."));
        }
        Ok(RetryPolicy::new(max_attempts, backoff).with_delay(Duration::from_millis(
            delay_ms.unwrap_or(DEFAULT_BACKOFF_DELAY_MS),
        )))
    }
}

/// Step 실행 정책(제한 시간 + 재시도)이다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepOptions {
    /// 시도 하나당 제한 시간이며 0보다 크다.
    pub timeout: Duration,
    /// 재시도 정책.
    pub retry: RetryPolicy,
}

impl StepOptions {
    /// 제한 시간을 지정해 단일 시도 정책을 만든다.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout: clamp_timeout(timeout),
            retry: RetryPolicy::once(),
        }
    }

    /// 제한 시간을 교체한다.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = clamp_timeout(timeout);
        self
    }

    /// 재시도 정책을 교체한다.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for StepOptions {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }
}

fn clamp_timeout(timeout: Duration) -> Duration {
    if timeout.is_zero() {
        Duration::from_millis(1)
    } else {
        timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_backoff_scales_by_attempt_number() {
        let base = Duration::from_millis(100);
        assert_eq!(Backoff::Linear.delay_after(base, 1), Duration::from_millis(100));
        assert_eq!(Backoff::Linear.delay_after(base, 3), Duration::from_millis(300));
    }

    #[test]
    fn exponential_backoff_doubles_each_attempt() {
        let base = Duration::from_millis(100);
        assert_eq!(Backoff::Exponential.delay_after(base, 1), Duration::from_millis(100));
        assert_eq!(Backoff::Exponential.delay_after(base, 2), Duration::from_millis(200));
        assert_eq!(Backoff::Exponential.delay_after(base, 4), Duration::from_millis(800));
    }

    #[test]
    fn retry_policy_never_drops_below_one_attempt() {
        assert_eq!(RetryPolicy::new(0, Backoff::Linear).max_attempts, 1);
        assert_eq!(StepOptions::new(Duration::ZERO).timeout, Duration::from_millis(1));
    }

    #[test]
    fn retry_policy_accepts_plain_number_or_struct() {
        let plain: RetryPolicy = serde_yaml::from_str("3").expect("숫자 파싱 실패");
        assert_eq!(plain.max_attempts, 3);
        assert_eq!(plain.backoff, Backoff::Exponential);

        let detailed: RetryPolicy =
            serde_yaml::from_str("{ max_attempts: 2, backoff: linear, delay_ms: 20 }")
                .expect("구조체 파싱 실패");
        assert_eq!(detailed.max_attempts, 2);
        assert_eq!(detailed.backoff, Backoff::Linear);
        assert_eq!(detailed.delay, Duration::from_millis(20));

        assert!(serde_yaml::from_str::<RetryPolicy>("{ max_attempts: 0 }").is_err());
    }
}
