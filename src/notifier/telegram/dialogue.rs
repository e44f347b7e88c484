// The /add conversation: a small fixed state machine per chat, with a
// timeout as the only recovery path.

use crate::model::ProductInfo;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub enum AddState {
    /// Waiting for an Amazon link or bare ASIN.
    AwaitingProduct,
    /// Product resolved; waiting for the target price.
    AwaitingTarget { info: ProductInfo },
}

#[derive(Debug)]
pub enum SessionPoll {
    /// No add flow in progress for this chat.
    None,
    /// There was one, but it sat idle past the timeout.
    Expired,
    Active(AddState),
}

struct Session {
    state: AddState,
    last_activity: Instant,
}

pub struct DialogueStore {
    timeout: Duration,
    sessions: Mutex<HashMap<i64, Session>>,
}

impl DialogueStore {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Starts (or restarts) the add flow for a chat.
    pub async fn begin(&self, chat_id: i64) {
        self.sessions.lock().await.insert(
            chat_id,
            Session {
                state: AddState::AwaitingProduct,
                last_activity: Instant::now(),
            },
        );
    }

    /// Removes and returns the chat's current state. The caller decides
    /// whether to put a state back (retry) or let the flow end.
    pub async fn take(&self, chat_id: i64) -> SessionPoll {
        let mut sessions = self.sessions.lock().await;
        match sessions.remove(&chat_id) {
            None => SessionPoll::None,
            Some(session) if session.last_activity.elapsed() >= self.timeout => {
                SessionPoll::Expired
            }
            Some(session) => SessionPoll::Active(session.state),
        }
    }

    /// Stores the next state for a chat, refreshing its activity stamp.
    pub async fn put(&self, chat_id: i64, state: AddState) {
        self.sessions.lock().await.insert(
            chat_id,
            Session {
                state,
                last_activity: Instant::now(),
            },
        );
    }

    /// Ends the flow. Returns whether anything was in progress.
    pub async fn cancel(&self, chat_id: i64) -> bool {
        self.sessions.lock().await.remove(&chat_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_info() -> ProductInfo {
        ProductInfo {
            asin: "B000TEST01".to_string(),
            title: "Widget".to_string(),
            url: String::new(),
            current_price: Some(25.0),
            window_low: None,
            window_high: None,
            all_time_low: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn begin_take_walks_the_states() {
        let store = DialogueStore::new(Duration::from_secs(300));
        store.begin(7).await;
        assert!(matches!(
            store.take(7).await,
            SessionPoll::Active(AddState::AwaitingProduct)
        ));

        // take() removed the session; the handler puts the next state back.
        store.put(7, AddState::AwaitingTarget { info: sample_info() }).await;
        match store.take(7).await {
            SessionPoll::Active(AddState::AwaitingTarget { info }) => {
                assert_eq!(info.asin, "B000TEST01");
            }
            other => panic!("unexpected poll: {other:?}"),
        }

        // The flow ended with that take.
        assert!(matches!(store.take(7).await, SessionPoll::None));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_sessions_expire() {
        let store = DialogueStore::new(Duration::from_secs(300));
        store.begin(7).await;
        tokio::time::advance(Duration::from_secs(301)).await;
        assert!(matches!(store.take(7).await, SessionPoll::Expired));
        // Expiry consumed the session.
        assert!(matches!(store.take(7).await, SessionPoll::None));
    }

    #[tokio::test(start_paused = true)]
    async fn put_refreshes_the_activity_stamp() {
        let store = DialogueStore::new(Duration::from_secs(300));
        store.begin(7).await;
        tokio::time::advance(Duration::from_secs(200)).await;
        match store.take(7).await {
            SessionPoll::Active(state) => store.put(7, state).await,
            other => panic!("unexpected poll: {other:?}"),
        }
        tokio::time::advance(Duration::from_secs(200)).await;
        assert!(matches!(store.take(7).await, SessionPoll::Active(_)));
    }

    #[tokio::test]
    async fn cancel_reports_whether_a_flow_existed() {
        let store = DialogueStore::new(Duration::from_secs(300));
        assert!(!store.cancel(7).await);
        store.begin(7).await;
        assert!(store.cancel(7).await);
        assert!(matches!(store.take(7).await, SessionPoll::None));
    }

    #[tokio::test]
    async fn chats_have_independent_sessions() {
        let store = DialogueStore::new(Duration::from_secs(300));
        store.begin(7).await;
        assert!(matches!(store.take(8).await, SessionPoll::None));
        assert!(matches!(store.take(7).await, SessionPoll::Active(_)));
    }
}
