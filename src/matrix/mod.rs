pub mod api;
pub mod retry;
pub mod sync;
pub mod urls;

pub use api::MatrixClient;
pub use sync::{JoinedRoomSync, SyncResponse, SyncRooms, SyncTimeline, TimelineEvent};
pub use urls::normalize_homeserver_url;

pub const MSGTYPE_TEXT: &str = "m.text";
pub const MSGTYPE_NOTICE: &str = "m.notice";

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("matrix api request failed: {0}")]
    Request(String),
    #[error("matrix api returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("matrix api still rate limited after {attempts} attempts")]
    RateLimitExhausted { attempts: u32 },
    #[error("failed to decode {endpoint} response: {reason}")]
    Decode { endpoint: String, reason: String },
    #[error("login response is missing `{field}`")]
    LoginIncomplete { field: &'static str },
    #[error("homeserver returned identity `{actual}`, expected `{expected}`")]
    IdentityMismatch { expected: String, actual: String },
}

/// Options for one outgoing room message.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub thread_root_event_id: Option<String>,
}

/// The chat-side capability surface the orchestrator depends on. Implemented
/// by `MatrixClient` in production and by recording fakes in tests.
pub trait ChatApi {
    fn verify_connection(&self) -> Result<(), ChatError>;
    fn access_token(&self) -> &str;
    fn ensure_joined_room(&self, room_id: &str) -> Result<(), ChatError>;
    fn create_space(
        &self,
        name: &str,
        topic: Option<&str>,
        invites: &[String],
    ) -> Result<String, ChatError>;
    fn create_room(
        &self,
        name: &str,
        topic: Option<&str>,
        invites: &[String],
    ) -> Result<String, ChatError>;
    fn link_room_under_space(&self, parent_id: &str, child_id: &str) -> Result<(), ChatError>;
    fn ensure_invites(&self, room_id: &str, user_ids: &[String]) -> Result<(), ChatError>;
    fn sync(
        &self,
        since: Option<&str>,
        timeout_ms: u64,
        room_ids: &[String],
    ) -> Result<SyncResponse, ChatError>;
    fn send_message(
        &self,
        room_id: &str,
        body: &str,
        msg_type: &str,
        options: &SendOptions,
    ) -> Result<String, ChatError>;
    fn send_notice(&self, room_id: &str, body: &str) -> Result<String, ChatError> {
        self.send_message(room_id, body, MSGTYPE_NOTICE, &SendOptions::default())
    }
    fn leave_and_forget(&self, room_id: &str);
}
