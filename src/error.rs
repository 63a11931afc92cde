use std::sync::Arc;
use std::time::Duration;

/// 엔진 실행 중 발생 가능한 오류를 표현한다.
///
/// Step 결과와 Scenario 결과가 같은 오류를 함께 보관하므로 `Clone`이 가능해야 한다.
/// 사용자 오류는 `Arc`로 감싸 공유한다.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    /// 사용자 함수가 반환한 일반 실패이다.
    #[error("{0:#}")]
    Failed(Arc<anyhow::Error>),
    /// Step 시도가 제한 시간을 넘긴 경우이다.
    #[error("Step '{step}' 시간 초과 ({}ms)", .timeout.as_millis())]
    Timeout { step: String, timeout: Duration },
    /// 외부 취소 토큰이 발화한 경우이다.
    #[error("사용자에 의해 실행이 중단되었습니다.")]
    Cancelled,
    /// 사용자 함수 또는 정리 작업에서 panic이 발생한 경우이다.
    #[error("panic 발생: {0}")]
    Panicked(String),
    /// 같은 이름의 리소스가 이미 등록된 경우이다.
    #[error("중복된 리소스 이름입니다: {0}")]
    DuplicateResource(String),
    /// 요청한 리소스가 없거나 타입이 맞지 않는 경우이다.
    #[error("리소스를 찾을 수 없습니다: {0}")]
    MissingResource(String),
    /// 정리 작업이 실패한 경우이다.
    #[error("정리 작업 '{label}' 실패: {source}")]
    Dispose {
        label: String,
        #[source]
        source: Box<EngineError>,
    },
}

impl EngineError {
    /// 임의의 메시지로 일반 실패를 만든다.
    pub fn msg(message: impl std::fmt::Display) -> Self {
        EngineError::Failed(Arc::new(anyhow::anyhow!("{message}")))
    }

    /// 시간 초과 또는 외부 취소로 인한 오류인지 확인한다.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, EngineError::Timeout { .. } | EngineError::Cancelled)
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        EngineError::Failed(Arc::new(err))
    }
}

/// 사용자 함수가 Scenario 흐름을 멈추는 두 가지 방식을 구분한다.
///
/// `Skip`은 오류가 아니다. 모든 catch 지점은 두 variant를 명시적으로 매칭해야 하며
/// `Skip`은 재시도, 오류 알림, Step 결과 기록 대상이 되지 않는다.
#[derive(Debug, Clone)]
pub enum Interrupt {
    /// Scenario를 skipped로 끝내달라는 협조적 요청이다.
    Skip(String),
    /// 실패로 Scenario를 끝낸다.
    Fail(EngineError),
}

impl Interrupt {
    /// 실패 오류를 반환하며 Skip이면 `None`이다.
    pub fn as_failure(&self) -> Option<&EngineError> {
        match self {
            Interrupt::Fail(err) => Some(err),
            Interrupt::Skip(_) => None,
        }
    }
}

impl std::fmt::Display for Interrupt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Interrupt::Skip(reason) => write!(f, "skip: {reason}"),
            Interrupt::Fail(err) => write!(f, "{err}"),
        }
    }
}

impl From<EngineError> for Interrupt {
    fn from(err: EngineError) -> Self {
        Interrupt::Fail(err)
    }
}

impl From<anyhow::Error> for Interrupt {
    fn from(err: anyhow::Error) -> Self {
        Interrupt::Fail(EngineError::from(err))
    }
}

/// Scenario를 건너뛰도록 요청하는 `Interrupt`를 만든다.
///
/// ```ignore
/// return Err(skip("API_URL이 설정되지 않았습니다"));
/// ```
pub fn skip(reason: impl Into<String>) -> Interrupt {
    Interrupt::Skip(reason.into())
}

/// 사용자 함수가 반환하는 결과 타입이다.
pub type EntryResult<T> = Result<T, Interrupt>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anyhow_errors_convert_into_failures() {
        let interrupt: Interrupt = anyhow::anyhow!("boom").into();
        let err = interrupt.as_failure().expect("실패여야 한다");
        assert_eq!(err.to_string(), "boom");
        assert!(!err.is_cancellation());
    }

    #[test]
    fn skip_is_not_a_failure() {
        let interrupt = skip("no database");
        assert!(interrupt.as_failure().is_none());
        assert_eq!(interrupt.to_string(), "skip: no database");
    }

    #[test]
    fn timeout_message_names_step_and_limit() {
        let err = EngineError::Timeout {
            step: "login".into(),
            timeout: Duration::from_millis(250),
        };
        assert!(err.is_cancellation());
        assert_eq!(err.to_string(), "Step 'login' 시간 초과 (250ms)");
    }
}
