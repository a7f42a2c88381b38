//! Out-of-band control protocol between the document and the router.
//!
//! Commands that expect an answer carry a oneshot sender; a dropped
//! receiver is logged, never an error.

use tokio::sync::oneshot;

use crate::cache::CacheStorage;
use crate::fetch::Fetcher;
use crate::router::Router;

#[derive(Debug)]
pub enum ControlMessage {
    /// Activate the waiting router immediately; no reply
    SkipWaiting,
    /// Cache-busted rebuild of the static and dynamic generations
    ForceUpdateCache { reply: oneshot::Sender<ControlReply> },
    GetCacheSize { reply: oneshot::Sender<ControlReply> },
    ClearCache { reply: oneshot::Sender<ControlReply> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlReply {
    CacheUpdated,
    CacheUpdateError(String),
    CacheSize(usize),
    CacheCleared,
}

pub async fn handle_control<F, S>(router: &Router<F, S>, message: ControlMessage)
where
    F: Fetcher + 'static,
    S: CacheStorage + 'static,
{
    match message {
        ControlMessage::SkipWaiting => router.request_skip_waiting(),
        ControlMessage::ForceUpdateCache { reply } => {
            let outcome = match router.force_update_cache().await {
                Ok(rebuilt) => {
                    tracing::info!("Forced cache update rebuilt {rebuilt} entries");
                    ControlReply::CacheUpdated
                }
                Err(error) => ControlReply::CacheUpdateError(error.to_string()),
            };
            send(reply, outcome);
        }
        ControlMessage::GetCacheSize { reply } => {
            let outcome = match router.cache_size() {
                Ok(size) => ControlReply::CacheSize(size),
                Err(error) => {
                    tracing::warn!("Cache size probe failed: {error}");
                    ControlReply::CacheSize(0)
                }
            };
            send(reply, outcome);
        }
        ControlMessage::ClearCache { reply } => {
            let outcome = match router.clear_all() {
                Ok(()) => ControlReply::CacheCleared,
                Err(error) => ControlReply::CacheUpdateError(error.to_string()),
            };
            send(reply, outcome);
        }
    }
}

fn send(reply: oneshot::Sender<ControlReply>, outcome: ControlReply) {
    if reply.send(outcome).is_err() {
        tracing::debug!("Control reply receiver dropped");
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use crate::cache::{cache_name, CacheRole, CachedEntry, MemoryCacheStorage};
    use crate::config::{PrecacheManifest, RouterConfig};
    use crate::fetch::{FetchError, FetchRequest, FetchResponse};

    use super::*;

    /// Answers every request with a fixed 200
    struct StaticFetcher;

    impl Fetcher for StaticFetcher {
        fn fetch(
            &self,
            _request: FetchRequest,
        ) -> impl Future<Output = Result<FetchResponse, FetchError>> + Send {
            async { Ok(FetchResponse::ok("text/html", "body")) }
        }
    }

    fn setup() -> (
        Router<StaticFetcher, MemoryCacheStorage>,
        Arc<MemoryCacheStorage>,
    ) {
        let mut config = RouterConfig::new("v1", "https://app.example.test");
        config.manifest = PrecacheManifest {
            critical: vec!["/index.html".to_string()],
            secondary: Vec::new(),
        };
        let storage = Arc::new(MemoryCacheStorage::new());
        let router = Router::new(config, Arc::new(StaticFetcher), Arc::clone(&storage));
        (router, storage)
    }

    #[tokio::test]
    async fn skip_waiting_sets_the_flag_without_a_reply() {
        let (router, _) = setup();
        assert!(!router.skip_waiting_requested());
        handle_control(&router, ControlMessage::SkipWaiting).await;
        assert!(router.skip_waiting_requested());
    }

    #[tokio::test]
    async fn cache_size_reports_the_aggregate_entry_count() {
        let (router, storage) = setup();
        for key in ["a", "b", "c"] {
            storage
                .put(
                    &cache_name("v1", CacheRole::Dynamic),
                    key,
                    CachedEntry::new(FetchResponse::empty_ok()),
                )
                .unwrap();
        }

        let (tx, rx) = oneshot::channel();
        handle_control(&router, ControlMessage::GetCacheSize { reply: tx }).await;
        assert_eq!(rx.await.unwrap(), ControlReply::CacheSize(3));
    }

    #[tokio::test]
    async fn clear_cache_empties_storage_and_confirms() {
        let (router, storage) = setup();
        storage
            .put(
                &cache_name("v1", CacheRole::Static),
                "k",
                CachedEntry::new(FetchResponse::empty_ok()),
            )
            .unwrap();

        let (tx, rx) = oneshot::channel();
        handle_control(&router, ControlMessage::ClearCache { reply: tx }).await;
        assert_eq!(rx.await.unwrap(), ControlReply::CacheCleared);
        assert_eq!(storage.entry_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn force_update_replies_once_the_rebuild_settles() {
        let (router, storage) = setup();

        let (tx, rx) = oneshot::channel();
        handle_control(&router, ControlMessage::ForceUpdateCache { reply: tx }).await;
        assert_eq!(rx.await.unwrap(), ControlReply::CacheUpdated);
        assert_eq!(storage.entry_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn dropped_reply_receiver_is_tolerated() {
        let (router, _) = setup();
        let (tx, rx) = oneshot::channel();
        drop(rx);
        handle_control(&router, ControlMessage::GetCacheSize { reply: tx }).await;
    }
}
