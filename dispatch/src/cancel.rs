//! Caller-driven cancellation of in-flight dispatches.
//!
//! A [`CancelSource`] hands out [`CancelToken`]s; dispatches `select!` on
//! [`CancelToken::cancelled`] alongside their collection loop. Tokens taken
//! after cancellation observe it immediately.

use tokio::sync::watch;

pub struct CancelSource {
    tx: watch::Sender<bool>,
}

impl CancelSource {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }

    /// Cancel every dispatch holding a token from this source.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the source cancels; never resolves if the source is
    /// dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancel_notifies_tokens() {
        let source = CancelSource::new();
        let t1 = source.token();
        let t2 = source.token();
        source.cancel();
        t1.cancelled().await;
        t2.cancelled().await;
        assert!(source.is_cancelled());
    }

    #[tokio::test]
    async fn late_token_sees_cancellation() {
        let source = CancelSource::new();
        source.cancel();
        assert!(source.token().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_source_never_cancels() {
        let source = CancelSource::new();
        let token = source.token();
        drop(source);
        let waited = tokio::time::timeout(Duration::from_secs(5), token.cancelled()).await;
        assert!(waited.is_err());
    }
}
