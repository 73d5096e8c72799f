use async_trait::async_trait;
use tokio::sync::watch;

/// Signal the session bootstrap waits on before doing any work.
#[async_trait]
pub trait ReadySignal: Send + Sync {
    async fn when_ready(&self);
}

/// A signal that is always ready.
pub struct AlreadyReady;

#[async_trait]
impl ReadySignal for AlreadyReady {
    async fn when_ready(&self) {}
}

/// Document loading state, as reported by whatever hosts the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Loading,
    Interactive,
    Complete,
}

/// A settable readiness flag. `when_ready` resolves once the state reaches
/// [`ReadyState::Complete`], immediately if it already has.
pub struct DocumentReady {
    sender: watch::Sender<ReadyState>,
}

impl DocumentReady {
    pub fn new(initial: ReadyState) -> Self {
        let (sender, _) = watch::channel(initial);
        Self { sender }
    }

    pub fn state(&self) -> ReadyState {
        *self.sender.borrow()
    }

    pub fn set_state(&self, state: ReadyState) {
        self.sender.send_replace(state);
    }
}

impl Default for DocumentReady {
    fn default() -> Self {
        Self::new(ReadyState::Loading)
    }
}

#[async_trait]
impl ReadySignal for DocumentReady {
    async fn when_ready(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives in self, so the channel cannot close while we wait.
        let _ = receiver
            .wait_for(|state| *state == ReadyState::Complete)
            .await;
    }
}
