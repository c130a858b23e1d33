//! 재연결 백오프와 fan-out/join 유틸리티
//!
//! 프로토콜 코어가 아니라 오케스트레이션 계층이 소비합니다.
//! 딜레이어는 재시도 루프마다 하나씩 소유합니다 (전역 공유 없음).

use crate::error::{RelayError, Result};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::sleep;

const AUTO_DELAY_MIN: Duration = Duration::from_millis(5);
const AUTO_DELAY_MAX: Duration = Duration::from_secs(1);

/// 지수 백오프 딜레이어
///
/// 첫 호출은 5ms, 이후 호출마다 2배, 최대 1초.
/// `reset`은 성공 후 간격을 0으로 되돌립니다.
#[derive(Debug, Default)]
pub struct AutoDelayer {
    current: Duration,
}

impl AutoDelayer {
    pub fn new() -> Self {
        AutoDelayer {
            current: Duration::ZERO,
        }
    }

    /// 현재 간격만큼 대기한 뒤 간격을 올린다
    pub async fn delay(&mut self) {
        self.current = if self.current.is_zero() {
            AUTO_DELAY_MIN
        } else {
            (self.current * 2).min(AUTO_DELAY_MAX)
        };
        sleep(self.current).await;
    }

    pub fn reset(&mut self) {
        self.current = Duration::ZERO;
    }

    pub fn current(&self) -> Duration {
        self.current
    }
}

/// `join_all`에 넘기는 태스크
pub type Joinable = Pin<Box<dyn Future<Output = Result<()>> + Send + 'static>>;

/// 태스크별 에러를 원래 순서대로 보존하는 집계 에러
#[derive(Debug)]
pub struct JoinError(pub Vec<Option<RelayError>>);

impl fmt::Display for JoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (i, slot) in self.0.iter().enumerate() {
            if let Some(err) = slot {
                if !first {
                    write!(f, "; ")?;
                }
                write!(f, "task {}: {}", i, err)?;
                first = false;
            }
        }
        Ok(())
    }
}

impl std::error::Error for JoinError {}

/// 태스크를 모두 동시 실행하고 전부 끝날 때까지 기다린다
///
/// 하나라도 실패하면 모든 태스크의 결과를 담은 `JoinError`를 반환합니다
/// (첫 에러만이 아니라 전부 보고).
pub async fn join_all(tasks: Vec<Joinable>) -> std::result::Result<(), JoinError> {
    let handles: Vec<_> = tasks.into_iter().map(tokio::spawn).collect();

    let mut slots = Vec::with_capacity(handles.len());
    let mut failed = false;
    for handle in handles {
        let slot = match handle.await {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err),
            Err(join_err) => Some(RelayError::Other(format!("task panicked: {}", join_err))),
        };
        failed |= slot.is_some();
        slots.push(slot);
    }

    if failed {
        Err(JoinError(slots))
    } else {
        Ok(())
    }
}
