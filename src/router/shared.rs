use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::warn;

use super::{ConversationMessage, InitializeOutcome, QueryRouter, RoutedQuery};
use crate::cost::CostRecord;
use crate::transcript::TranscriptSegment;
use crate::{Result, RouterError};

/// Cloneable handle to one router session
///
/// Queries are never queued: while one `process_query` is running, another
/// call fails fast with `RouterError::QueryInFlight`.
#[derive(Clone)]
pub struct SharedRouter {
    inner: Arc<Mutex<QueryRouter>>,
}

impl SharedRouter {
    #[inline]
    pub fn new(router: QueryRouter) -> Self {
        Self {
            inner: Arc::new(Mutex::new(router)),
        }
    }

    #[inline]
    pub async fn initialize(
        &self,
        video_id: &str,
        segments: &[TranscriptSegment],
        duration_seconds: f64,
    ) -> InitializeOutcome {
        self.inner
            .lock()
            .await
            .initialize(video_id, segments, duration_seconds)
    }

    #[inline]
    pub async fn process_query(
        &self,
        query: &str,
        history: &[ConversationMessage],
    ) -> Result<RoutedQuery> {
        let Ok(mut router) = self.inner.try_lock() else {
            warn!("Rejected query while another is in flight");
            return Err(RouterError::QueryInFlight);
        };
        router.process_query(query, history).await
    }

    #[inline]
    pub async fn complete(
        &self,
        routed: &RoutedQuery,
        output_tokens: Option<usize>,
    ) -> Result<CostRecord> {
        self.inner.lock().await.complete(routed, output_tokens).await
    }

    /// Run `f` with exclusive access to the router
    #[inline]
    pub async fn with_router<T>(&self, f: impl FnOnce(&QueryRouter) -> T) -> T {
        f(&*self.inner.lock().await)
    }
}
