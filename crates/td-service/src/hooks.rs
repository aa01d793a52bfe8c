//! Post-commit side effects.
//!
//! Search indexing and mail notifications run after the document and its
//! event are written. They are spawned on the runtime and never awaited by
//! the mutation: a failure is logged and the mutation stands.

use std::sync::Arc;

use async_trait::async_trait;

use td_core::{BsdId, BsdType};

#[derive(Debug, thiserror::Error)]
#[error("{service} failed: {message}")]
pub struct HookError {
    pub service: &'static str,
    pub message: String,
}

#[async_trait]
pub trait Indexer: Send + Sync + 'static {
    async fn index_document(&self, bsd_type: BsdType, id: &BsdId) -> Result<(), HookError>;
}

/// A notification to the companies on a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mail {
    pub template: &'static str,
    pub bsd_id: BsdId,
    pub recipients: Vec<String>,
}

#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    async fn send_mail(&self, mail: Mail) -> Result<(), HookError>;
}

/// Does nothing. Used when no search index or mail service is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

#[async_trait]
impl Indexer for NoopHooks {
    async fn index_document(&self, _bsd_type: BsdType, _id: &BsdId) -> Result<(), HookError> {
        Ok(())
    }
}

#[async_trait]
impl Mailer for NoopHooks {
    async fn send_mail(&self, _mail: Mail) -> Result<(), HookError> {
        Ok(())
    }
}

/// Fire-and-forget dispatcher for both hooks.
#[derive(Clone)]
pub struct Hooks {
    indexer: Arc<dyn Indexer>,
    mailer: Arc<dyn Mailer>,
}

impl Default for Hooks {
    fn default() -> Self {
        Self::new(Arc::new(NoopHooks), Arc::new(NoopHooks))
    }
}

impl Hooks {
    pub fn new(indexer: Arc<dyn Indexer>, mailer: Arc<dyn Mailer>) -> Self {
        Self { indexer, mailer }
    }

    pub fn index(&self, bsd_type: BsdType, id: &BsdId) {
        let indexer = Arc::clone(&self.indexer);
        let id = id.clone();
        tokio::spawn(async move {
            if let Err(e) = indexer.index_document(bsd_type, &id).await {
                tracing::warn!(bsd_id = %id, error = %e, "indexing failed");
            }
        });
    }

    pub fn mail(&self, mail: Mail) {
        let mailer = Arc::clone(&self.mailer);
        tokio::spawn(async move {
            let bsd_id = mail.bsd_id.clone();
            if let Err(e) = mailer.send_mail(mail).await {
                tracing::warn!(bsd_id = %bsd_id, error = %e, "mail notification failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    struct FailingIndexer(mpsc::UnboundedSender<BsdId>);

    #[async_trait]
    impl Indexer for FailingIndexer {
        async fn index_document(&self, _bsd_type: BsdType, id: &BsdId) -> Result<(), HookError> {
            let _ = self.0.send(id.clone());
            Err(HookError {
                service: "index",
                message: "unreachable".into(),
            })
        }
    }

    #[tokio::test]
    async fn test_failing_indexer_is_called_and_swallowed() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let hooks = Hooks::new(Arc::new(FailingIndexer(tx)), Arc::new(NoopHooks));
        hooks.index(BsdType::Bsda, &BsdId::from("BSDA-1"));
        assert_eq!(rx.recv().await, Some(BsdId::from("BSDA-1")));
    }
}
