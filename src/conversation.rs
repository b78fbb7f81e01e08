//! Session-scoped conversation history with single-flight admission control.

use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::error::{EarthGuardError, Result};
use crate::gateway::Assistant;
use crate::location::LocationProvider;
use crate::models::{
    AssistantResult, Author, ConversationTurn, EvidenceBundle, LocationState, TurnId, UserQuery,
};
use crate::persona::{GREETING, OFFLINE_FALLBACK};

/// Read-only view handed to the presentation layer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSnapshot {
    pub session_id: Uuid,
    pub greeting: &'static str,
    pub turns: Vec<ConversationTurn>,
    pub pending: bool,
    pub location: LocationState,
}

pub struct ConversationStore {
    session_id: Uuid,
    assistant: Arc<dyn Assistant>,
    max_message_chars: usize,
    turns: Mutex<Vec<ConversationTurn>>,
    next_id: AtomicU64,
    pending: AtomicBool,
    location: OnceCell<LocationState>,
}

/// Holds the pending flag for one submission.
///
/// If the submission is dropped before an answer lands, the offline fallback
/// is recorded so USER/ASSISTANT turns stay paired.
struct InFlight<'a> {
    store: &'a ConversationStore,
    answered: bool,
}

impl<'a> InFlight<'a> {
    fn admit(store: &'a ConversationStore) -> Option<Self> {
        store
            .pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                store,
                answered: false,
            })
    }

    fn answer(mut self, result: AssistantResult) -> ConversationTurn {
        self.answered = true;
        self.store
            .push_turn(Author::Assistant, result.text, result.evidence)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.answered {
            tracing::warn!(session = %self.store.session_id, "Submission abandoned before answer");
            self.store
                .push_turn(Author::Assistant, OFFLINE_FALLBACK.to_string(), None);
        }
        self.store.pending.store(false, Ordering::Release);
    }
}

impl ConversationStore {
    pub fn new(assistant: Arc<dyn Assistant>, max_message_chars: usize) -> Self {
        let session_id = Uuid::new_v4();
        tracing::info!(session = %session_id, "Conversation session started");
        Self {
            session_id,
            assistant,
            max_message_chars,
            turns: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            pending: AtomicBool::new(false),
            location: OnceCell::new(),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Resolves the session location once; later calls return the cached state.
    pub async fn resolve_location(&self, provider: &LocationProvider) -> LocationState {
        self.location
            .get_or_init(|| provider.acquire())
            .await
            .clone()
    }

    /// Submit one user message and wait for the assistant turn.
    ///
    /// Blank or oversized text and submissions made while another one is in
    /// flight are rejected without touching the history.
    pub async fn submit(&self, text: &str) -> Result<ConversationTurn> {
        let query = UserQuery::new(text, self.max_message_chars)?;

        let Some(in_flight) = InFlight::admit(self) else {
            tracing::info!(session = %self.session_id, "Rejected submission while a request is pending");
            return Err(EarthGuardError::RequestPending);
        };

        let location = self.location();
        self.push_turn(Author::User, query.as_str().to_string(), None);

        let result = self.assistant.dispatch(&query, &location).await;
        Ok(in_flight.answer(result))
    }

    pub fn turns(&self) -> Vec<ConversationTurn> {
        self.lock_turns().clone()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Current location snapshot; `Pending` until resolution completes.
    pub fn location(&self) -> LocationState {
        self.location.get().cloned().unwrap_or_default()
    }

    /// True while answers cannot carry map grounding.
    pub fn needs_location_hint(&self) -> bool {
        self.location().coordinates().is_none()
    }

    pub fn snapshot(&self) -> ConversationSnapshot {
        ConversationSnapshot {
            session_id: self.session_id,
            greeting: GREETING,
            turns: self.turns(),
            pending: self.is_pending(),
            location: self.location(),
        }
    }

    fn push_turn(
        &self,
        author: Author,
        text: String,
        evidence: Option<EvidenceBundle>,
    ) -> ConversationTurn {
        let mut turns = self.lock_turns();
        let turn = ConversationTurn {
            id: TurnId(self.next_id.fetch_add(1, Ordering::Relaxed)),
            author,
            text,
            created_at: Utc::now(),
            evidence,
        };
        turns.push(turn.clone());
        turn
    }

    fn lock_turns(&self) -> MutexGuard<'_, Vec<ConversationTurn>> {
        // The history is append-only, so a poisoned lock still holds valid turns.
        self.turns.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{AssistantGateway, MockAssistant};
    use crate::location::MockLocationSource;
    use crate::models::{Coordinates, MapResult};
    use crate::transport::MockTransport;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn echo_assistant() -> Arc<dyn Assistant> {
        let mut assistant = MockAssistant::new();
        assistant.expect_dispatch().returning(|query, _| AssistantResult {
            text: format!("echo: {}", query.as_str()),
            evidence: None,
        });
        Arc::new(assistant)
    }

    /// Blocks every dispatch until released.
    struct GatedAssistant {
        release: Notify,
    }

    #[async_trait]
    impl Assistant for GatedAssistant {
        async fn dispatch(&self, query: &UserQuery, _location: &LocationState) -> AssistantResult {
            self.release.notified().await;
            AssistantResult {
                text: format!("answer to {}", query.as_str()),
                evidence: None,
            }
        }
    }

    /// Remembers the location each dispatch was given.
    struct LocationSpy {
        seen: Mutex<Vec<LocationState>>,
    }

    #[async_trait]
    impl Assistant for LocationSpy {
        async fn dispatch(&self, _query: &UserQuery, location: &LocationState) -> AssistantResult {
            self.seen.lock().unwrap().push(location.clone());
            AssistantResult {
                text: "ok".to_string(),
                evidence: None,
            }
        }
    }

    async fn wait_until_pending(store: &ConversationStore) {
        for _ in 0..200 {
            if store.is_pending() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("store never became pending");
    }

    #[tokio::test]
    async fn test_turns_alternate_and_count_is_twice_submissions() {
        let store = ConversationStore::new(echo_assistant(), 4000);
        let questions = ["Safety tips", "Nearest Hospital", "Emergency Contacts"];

        for (n, q) in questions.iter().enumerate() {
            let turn = store.submit(q).await.unwrap();
            assert_eq!(turn.author, Author::Assistant);
            assert_eq!(store.turns().len(), 2 * (n + 1));
        }

        let turns = store.turns();
        for (i, turn) in turns.iter().enumerate() {
            let expected = if i % 2 == 0 { Author::User } else { Author::Assistant };
            assert_eq!(turn.author, expected);
        }
        assert_eq!(turns[0].text, "Safety tips");
        assert_eq!(turns[1].text, "echo: Safety tips");
        assert!(!store.is_pending());
    }

    #[tokio::test]
    async fn test_turn_ids_are_unique_and_increasing() {
        let store = ConversationStore::new(echo_assistant(), 4000);
        store.submit("one").await.unwrap();
        store.submit("two").await.unwrap();

        let ids: Vec<_> = store.turns().iter().map(|t| t.id).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_empty_submission_is_a_no_op() {
        let mut assistant = MockAssistant::new();
        assistant.expect_dispatch().times(0);
        let store = ConversationStore::new(Arc::new(assistant), 4000);

        for text in ["", "   ", "\n\t"] {
            let err = store.submit(text).await.unwrap_err();
            assert!(matches!(err, EarthGuardError::EmptyMessage));
        }
        assert!(store.turns().is_empty());
        assert!(!store.is_pending());
    }

    #[tokio::test]
    async fn test_empty_submission_issues_no_backend_call() {
        let mut tx = MockTransport::new();
        tx.expect_generate().times(0);
        let gateway = AssistantGateway::new(
            Arc::new(tx),
            "test-model".to_string(),
            Duration::from_secs(1),
        );
        let store = ConversationStore::new(Arc::new(gateway), 4000);

        assert!(store.submit("").await.is_err());
        assert!(store.turns().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_submission_is_rejected() {
        let mut assistant = MockAssistant::new();
        assistant.expect_dispatch().times(0);
        let store = ConversationStore::new(Arc::new(assistant), 10);

        let err = store.submit("this is far too long").await.unwrap_err();
        assert!(matches!(err, EarthGuardError::MessageTooLong(10)));
        assert!(store.turns().is_empty());
    }

    #[tokio::test]
    async fn test_submission_while_pending_is_rejected() {
        let assistant = Arc::new(GatedAssistant {
            release: Notify::new(),
        });
        let store = Arc::new(ConversationStore::new(assistant.clone(), 4000));

        let first = {
            let store = store.clone();
            tokio::spawn(async move { store.submit("Is the building safe?").await })
        };
        wait_until_pending(&store).await;

        let before = store.turns();
        assert_eq!(before.len(), 1);

        let err = store.submit("Hello?").await.unwrap_err();
        assert!(matches!(err, EarthGuardError::RequestPending));
        assert_eq!(store.turns().len(), before.len());
        assert!(store.is_pending());

        assistant.release.notify_one();
        let answer = first.await.unwrap().unwrap();
        assert_eq!(answer.text, "answer to Is the building safe?");
        assert_eq!(store.turns().len(), 2);
        assert!(!store.is_pending());

        // Admission reopens after the answer.
        let next = {
            let store = store.clone();
            tokio::spawn(async move { store.submit("Thanks").await })
        };
        wait_until_pending(&store).await;
        assistant.release.notify_one();
        next.await.unwrap().unwrap();
        assert_eq!(store.turns().len(), 4);
    }

    #[tokio::test]
    async fn test_abandoned_submission_keeps_turns_paired() {
        let assistant = Arc::new(GatedAssistant {
            release: Notify::new(),
        });
        let store = Arc::new(ConversationStore::new(assistant, 4000));

        let task = {
            let store = store.clone();
            tokio::spawn(async move { store.submit("Help").await })
        };
        wait_until_pending(&store).await;
        task.abort();
        let _ = task.await;

        let turns = store.turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].author, Author::Assistant);
        assert_eq!(turns[1].text, OFFLINE_FALLBACK);
        assert!(!store.is_pending());
    }

    #[tokio::test]
    async fn test_location_resolves_once_and_flows_into_dispatch() {
        let spy = Arc::new(LocationSpy {
            seen: Mutex::new(Vec::new()),
        });
        let store = ConversationStore::new(spy.clone(), 4000);
        assert!(store.location().is_pending());
        assert!(store.needs_location_hint());

        store.submit("before location").await.unwrap();

        let mut source = MockLocationSource::new();
        source.expect_is_supported().return_const(true);
        source
            .expect_current_position()
            .times(1)
            .returning(|| Coordinates::new(23.81, 90.41));
        let provider = LocationProvider::new(Arc::new(source), Duration::from_secs(1));

        let first = store.resolve_location(&provider).await;
        let second = store.resolve_location(&provider).await;
        assert_eq!(first, second);
        assert!(!store.needs_location_hint());

        store.submit("after location").await.unwrap();

        let seen = spy.seen.lock().unwrap();
        assert_eq!(seen[0], LocationState::Pending);
        assert_eq!(seen[1].coordinates(), Some(Coordinates::new(23.81, 90.41).unwrap()));
    }

    #[tokio::test]
    async fn test_evidence_is_attached_to_assistant_turn() {
        let mut assistant = MockAssistant::new();
        assistant.expect_dispatch().returning(|_, _| AssistantResult {
            text: "City Hospital is close.".to_string(),
            evidence: Some(EvidenceBundle {
                map_results: vec![MapResult {
                    title: "City Hospital".to_string(),
                    uri: "https://maps.example/x".to_string(),
                }],
                web_citations: vec![],
            }),
        });
        let store = ConversationStore::new(Arc::new(assistant), 4000);
        store.submit("Where is the nearest hospital?").await.unwrap();

        let turns = store.turns();
        assert!(turns[0].evidence.is_none());
        let evidence = turns[1].evidence.as_ref().unwrap();
        assert_eq!(evidence.map_results[0].title, "City Hospital");
    }

    #[tokio::test]
    async fn test_snapshot_reflects_state() {
        let store = ConversationStore::new(echo_assistant(), 4000);
        store.submit("Earthquake Tips").await.unwrap();

        let snapshot = store.snapshot();
        assert_eq!(snapshot.session_id, store.session_id());
        assert_eq!(snapshot.turns.len(), 2);
        assert!(!snapshot.pending);
        assert_eq!(snapshot.greeting, GREETING);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["turns"][0]["author"], "user");
        assert_eq!(json["turns"][1]["author"], "assistant");
        assert_eq!(json["location"]["state"], "pending");
    }
}
