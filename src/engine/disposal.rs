use super::guard::guarded;
use crate::error::EngineError;
use crate::scenario::Cleanup;

/// 등록된 정리 작업 하나이다.
struct Disposer {
    label: String,
    action: Cleanup,
}

/// Scenario 동안 등록된 정리 작업을 LIFO로 보관한다.
#[derive(Default)]
pub struct DisposalStack {
    entries: Vec<Disposer>,
}

impl DisposalStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// 정리 작업을 등록한다.
    pub fn push(&mut self, label: impl Into<String>, action: Cleanup) {
        self.entries.push(Disposer {
            label: label.into(),
            action,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 등록 역순으로 모든 정리 작업을 실행한다.
    ///
    /// 한 작업이 실패하거나 panic해도 나머지는 계속 실행되며, 실패는 모아서 돌려준다.
    pub async fn unwind(&mut self) -> Vec<EngineError> {
        let mut errors = Vec::new();
        while let Some(Disposer { label, action }) = self.entries.pop() {
            tracing::debug!(disposer = %label, "정리 작업 실행");
            if let Err(err) = guarded(action).await {
                tracing::warn!(disposer = %label, error = %err, "정리 작업 실패");
                errors.push(EngineError::Dispose {
                    label,
                    source: Box::new(err),
                });
            }
        }
        errors
    }
}

impl Drop for DisposalStack {
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            tracing::warn!(pending = self.entries.len(), "실행되지 않은 정리 작업이 남았습니다");
        }
    }
}
