//! The chat relay: one user turn in, one narrator turn out.
//!
//! Order of operations per call:
//! quota check, adventure resolution, history load, user message write,
//! completion call, narrator message write, usage accounting.
//! The writes are independent; a failure part-way leaves earlier writes in
//! place.

use axum::{Extension, Json, extract::State};
use tracing::{info, warn};
use uuid::Uuid;

use bardly_llm::{ChatMessage, CompletionRequest};
use bardly_types::api::{ChatRequest, ChatResponse, Claims};
use bardly_types::models::{Message, Profile, Sender};

use crate::adventures::{DEFAULT_ADVENTURE_TITLE, load_owned_adventure, new_adventure};
use crate::error::{ApiError, ApiResult};
use crate::extract::ApiJson;
use crate::messages::load_history;
use crate::state::{AppState, with_db};

pub const NARRATOR_PROMPT: &str = "\
You are the narrator of a tabletop fantasy role-playing game, acting as an \
experienced Dungeon Master for a single player.

Your job:
- Describe scenes and places vividly, using sight, sound and smell.
- Voice the people and creatures the player meets, each with their own goals.
- Offer meaningful choices and let those choices have consequences.
- Run combat and other challenges fairly, resolving dice rolls when needed.
- Roll with unexpected ideas instead of forcing a fixed plot.

Style:
- Keep each reply to two to four short paragraphs.
- End by asking the player what they do next.
- Stay in character as the narrator at all times.";

/// Fixed parameters sent with every completion call.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".into(),
            max_tokens: 500,
            temperature: 0.8,
        }
    }
}

/// POST /chat
pub async fn chat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<ChatRequest>,
) -> ApiResult<Json<ChatResponse>> {
    let response = relay_turn(&state, claims.sub, req).await?;
    Ok(Json(response))
}

pub async fn relay_turn(state: &AppState, user_id: Uuid, req: ChatRequest) -> ApiResult<ChatResponse> {
    let message = req.message.trim().to_string();
    if message.is_empty() {
        return Err(ApiError::BadRequest("message must not be empty".into()));
    }

    // Quota is enforced here, before anything is written.
    let uid = user_id.to_string();
    let profile = with_db(state, move |db| db.get_profile(&uid)?.map(Profile::try_from).transpose())
        .await?
        .ok_or(ApiError::Unauthorized)?;

    if state.quota.is_exhausted(profile.token_usage, profile.subscription_tier) {
        warn!(
            "User {} is over the free limit ({} tokens used)",
            user_id, profile.token_usage
        );
        return Err(ApiError::LimitExceeded);
    }

    let adventure = match req.adventure_id {
        Some(adventure_id) => load_owned_adventure(state, user_id, adventure_id).await?,
        None => new_adventure(state, user_id, DEFAULT_ADVENTURE_TITLE).await?,
    };

    let history = load_history(state, adventure.id).await?;

    append_message(state, adventure.id, Sender::User, &message).await?;

    let prompt = build_prompt(&history, &message);
    let request = CompletionRequest::new(state.relay.model.clone(), prompt)
        .max_tokens(state.relay.max_tokens)
        .temperature(state.relay.temperature);

    let completion = state.llm.complete(request).await?;

    append_message(state, adventure.id, Sender::Narrator, &completion.text).await?;

    let log_id = Uuid::new_v4().to_string();
    let uid = user_id.to_string();
    let aid = adventure.id.to_string();
    let model = state.relay.model.clone();
    let tokens = completion.total_tokens;
    let total = with_db(state, move |db| {
        db.record_token_usage(&log_id, &uid, Some(aid.as_str()), i64::from(tokens), &model)
    })
    .await?;

    info!(
        user_id = %user_id,
        adventure_id = %adventure.id,
        tokens_used = tokens,
        token_usage_total = total,
        "Relayed turn"
    );

    Ok(ChatResponse {
        response: completion.text,
        adventure_id: adventure.id,
        tokens_used: tokens,
    })
}

/// System prompt, then the prior turns with narrator mapped to the assistant
/// role, then the new user message.
pub fn build_prompt(history: &[Message], new_message: &str) -> Vec<ChatMessage> {
    let mut prompt = Vec::with_capacity(history.len() + 2);
    prompt.push(ChatMessage::system(NARRATOR_PROMPT));
    prompt.extend(history.iter().map(|msg| match msg.sender {
        Sender::User => ChatMessage::user(msg.content.clone()),
        Sender::Narrator => ChatMessage::assistant(msg.content.clone()),
    }));
    prompt.push(ChatMessage::user(new_message));
    prompt
}

async fn append_message(
    state: &AppState,
    adventure_id: Uuid,
    sender: Sender,
    content: &str,
) -> ApiResult<()> {
    let id = Uuid::new_v4().to_string();
    let aid = adventure_id.to_string();
    let content = content.to_string();
    with_db(state, move |db| db.insert_message(&id, &aid, sender, &content).map(|_| ())).await
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use bardly_db::Database;
    use bardly_llm::{Completion, CompletionClient, LlmError, Role};
    use bardly_types::models::SubscriptionTier;

    use super::*;
    use crate::state::AppStateInner;

    /// Replays canned completions and remembers every request it saw.
    #[derive(Default)]
    struct ScriptedClient {
        replies: Mutex<VecDeque<Result<Completion, LlmError>>>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedClient {
        fn replying(replies: Vec<Result<Completion, LlmError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::default(),
            })
        }

        fn requests(&self) -> Vec<CompletionRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError> {
            self.requests.lock().unwrap().push(request);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(LlmError::EmptyCompletion))
        }
    }

    fn reply(text: &str, total_tokens: u32) -> Result<Completion, LlmError> {
        Ok(Completion { text: text.into(), total_tokens })
    }

    fn setup(client: Arc<ScriptedClient>) -> (AppState, Uuid) {
        let db = Database::open_in_memory().unwrap();
        let user_id = Uuid::new_v4();
        db.create_user(&user_id.to_string(), "alice", "hash").unwrap();
        let state = Arc::new(AppStateInner::new(db, "test-secret", client));
        (state, user_id)
    }

    fn create_adventure(state: &AppState, user_id: Uuid, title: &str) -> Uuid {
        let id = Uuid::new_v4();
        state
            .db
            .create_adventure(&id.to_string(), &user_id.to_string(), title)
            .unwrap();
        id
    }

    fn chat_request(adventure_id: Option<Uuid>, message: &str) -> ChatRequest {
        ChatRequest { adventure_id, message: message.into() }
    }

    fn message_count(state: &AppState, adventure_id: Uuid) -> usize {
        state.db.get_messages(&adventure_id.to_string()).unwrap().len()
    }

    fn token_usage(state: &AppState, user_id: Uuid) -> i64 {
        state.db.get_profile(&user_id.to_string()).unwrap().unwrap().token_usage
    }

    #[test]
    fn prompt_alternates_roles_after_system() {
        let adventure_id = Uuid::new_v4();
        let msg = |sender, content: &str| Message {
            id: Uuid::new_v4(),
            adventure_id,
            sender,
            content: content.into(),
            created_at: chrono::Utc::now(),
        };
        let history = vec![msg(Sender::User, "I open the door"), msg(Sender::Narrator, "It creaks.")];

        let prompt = build_prompt(&history, "I step inside");

        let roles: Vec<Role> = prompt.iter().map(|m| m.role).collect();
        assert_eq!(roles, [Role::System, Role::User, Role::Assistant, Role::User]);
        assert_eq!(prompt[0].content, NARRATOR_PROMPT);
        assert_eq!(prompt[2].content, "It creaks.");
        assert_eq!(prompt[3].content, "I step inside");
    }

    #[tokio::test]
    async fn successful_turn_persists_both_messages_and_usage() {
        let client = ScriptedClient::replying(vec![reply("The door swings open.", 321)]);
        let (state, user_id) = setup(client.clone());
        let adventure_id = create_adventure(&state, user_id, "Test");

        let response = relay_turn(&state, user_id, chat_request(Some(adventure_id), "I open the door"))
            .await
            .unwrap();

        assert_eq!(response.response, "The door swings open.");
        assert_eq!(response.adventure_id, adventure_id);
        assert_eq!(response.tokens_used, 321);

        let messages = state.db.get_messages(&adventure_id.to_string()).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!((messages[0].sender.as_str(), messages[0].content.as_str()), ("user", "I open the door"));
        assert_eq!(
            (messages[1].sender.as_str(), messages[1].content.as_str()),
            ("narrator", "The door swings open.")
        );

        assert_eq!(token_usage(&state, user_id), 321);
        let logs = state.db.get_token_usage_logs(&user_id.to_string(), 10).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].model_used, "gpt-4o-mini");
        assert_eq!(logs[0].adventure_id.as_deref(), Some(adventure_id.to_string().as_str()));

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].max_tokens, 500);
        assert_eq!(requests[0].temperature, 0.8);
    }

    #[tokio::test]
    async fn history_is_replayed_in_order() {
        let client = ScriptedClient::replying(vec![reply("First reply", 10), reply("Second reply", 20)]);
        let (state, user_id) = setup(client.clone());
        let adventure_id = create_adventure(&state, user_id, "Test");

        relay_turn(&state, user_id, chat_request(Some(adventure_id), "first")).await.unwrap();
        relay_turn(&state, user_id, chat_request(Some(adventure_id), "second")).await.unwrap();

        let second = &client.requests()[1];
        let turns: Vec<(Role, &str)> = second.messages[1..]
            .iter()
            .map(|m| (m.role, m.content.as_str()))
            .collect();
        assert_eq!(
            turns,
            [(Role::User, "first"), (Role::Assistant, "First reply"), (Role::User, "second")]
        );

        assert_eq!(message_count(&state, adventure_id), 4);
        assert_eq!(token_usage(&state, user_id), 30);
        assert_eq!(state.db.total_logged_tokens(&user_id.to_string()).unwrap(), 30);
    }

    #[tokio::test]
    async fn missing_adventure_id_starts_new_adventure() {
        let client = ScriptedClient::replying(vec![reply("Welcome, traveler.", 15)]);
        let (state, user_id) = setup(client);

        let response = relay_turn(&state, user_id, chat_request(None, "Hello")).await.unwrap();

        let adventure = state.db.get_adventure(&response.adventure_id.to_string()).unwrap().unwrap();
        assert_eq!(adventure.title, DEFAULT_ADVENTURE_TITLE);
        assert_eq!(adventure.user_id, user_id.to_string());
        assert_eq!(message_count(&state, response.adventure_id), 2);
    }

    #[tokio::test]
    async fn over_limit_free_user_is_refused_without_writes() {
        let client = ScriptedClient::replying(vec![reply("unused", 1)]);
        let (state, user_id) = setup(client.clone());
        let adventure_id = create_adventure(&state, user_id, "Test");
        state
            .db
            .record_token_usage(&Uuid::new_v4().to_string(), &user_id.to_string(), None, 100_000, "seed")
            .unwrap();

        let err = relay_turn(&state, user_id, chat_request(Some(adventure_id), "more please"))
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::LimitExceeded));
        assert_eq!(message_count(&state, adventure_id), 0);
        assert_eq!(token_usage(&state, user_id), 100_000);
        assert!(client.requests().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_turns_keep_every_usage_update() {
        const TURNS: u32 = 16;
        let client = ScriptedClient::replying((0..TURNS).map(|_| reply("And so it goes.", 25)).collect());
        let (state, user_id) = setup(client);
        let adventure_id = create_adventure(&state, user_id, "Test");

        let handles: Vec<_> = (0..TURNS)
            .map(|i| {
                let state = state.clone();
                tokio::spawn(async move {
                    relay_turn(&state, user_id, chat_request(Some(adventure_id), &format!("turn {}", i))).await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let expected = i64::from(TURNS * 25);
        assert_eq!(token_usage(&state, user_id), expected);
        assert_eq!(state.db.total_logged_tokens(&user_id.to_string()).unwrap(), expected);
        assert_eq!(
            state.db.get_token_usage_logs(&user_id.to_string(), 100).unwrap().len(),
            TURNS as usize
        );
        assert_eq!(message_count(&state, adventure_id), (TURNS * 2) as usize);
    }

    #[tokio::test]
    async fn premium_user_over_limit_is_served() {
        let client = ScriptedClient::replying(vec![reply("Onward.", 5)]);
        let (state, user_id) = setup(client);
        let adventure_id = create_adventure(&state, user_id, "Test");
        state
            .db
            .record_token_usage(&Uuid::new_v4().to_string(), &user_id.to_string(), None, 150_000, "seed")
            .unwrap();
        state
            .db
            .set_subscription_tier(&user_id.to_string(), SubscriptionTier::Premium)
            .unwrap();

        relay_turn(&state, user_id, chat_request(Some(adventure_id), "go")).await.unwrap();
        assert_eq!(token_usage(&state, user_id), 150_005);
    }

    #[tokio::test]
    async fn other_users_adventure_is_not_found() {
        let client = ScriptedClient::replying(vec![reply("unused", 1)]);
        let (state, user_id) = setup(client.clone());
        let bob = Uuid::new_v4();
        state.db.create_user(&bob.to_string(), "bob", "hash").unwrap();
        let bobs_adventure = create_adventure(&state, bob, "Bob's");

        let err = relay_turn(&state, user_id, chat_request(Some(bobs_adventure), "hi"))
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::NotFound(_)));
        assert_eq!(message_count(&state, bobs_adventure), 0);
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn blank_message_is_rejected() {
        let client = ScriptedClient::replying(vec![]);
        let (state, user_id) = setup(client);

        let err = relay_turn(&state, user_id, chat_request(None, "   ")).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
        assert!(state.db.list_adventures(&user_id.to_string(), None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn upstream_failure_keeps_user_message_only() {
        let client = ScriptedClient::replying(vec![Err(LlmError::Status { status: 503, body: "down".into() })]);
        let (state, user_id) = setup(client);
        let adventure_id = create_adventure(&state, user_id, "Test");

        let err = relay_turn(&state, user_id, chat_request(Some(adventure_id), "hello?"))
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Upstream(_)));
        let messages = state.db.get_messages(&adventure_id.to_string()).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sender, "user");
        assert_eq!(token_usage(&state, user_id), 0);
    }
}
