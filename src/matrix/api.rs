use super::retry::{execute_with_retry, HttpFailure};
use super::sync::SyncResponse;
use super::urls::{normalize_homeserver_url, server_name_from_url_or_user};
use super::{ChatApi, ChatError, SendOptions, MSGTYPE_TEXT};
use crate::shared::time::now_millis;
use crate::shared::truncate_chars;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};

pub const MAX_MESSAGE_CHARS: usize = 30_000;
const TXN_PREFIX: &str = "orc";
const ERROR_BODY_MAX_CHARS: usize = 500;

#[derive(Debug)]
pub struct MatrixClient {
    base_url: String,
    bot_user_id: String,
    access_token: String,
    txn_counter: AtomicU64,
}

#[derive(Debug, Clone, Copy)]
enum Method {
    Get,
    Post,
    Put,
}

impl MatrixClient {
    pub fn with_access_token(homeserver_url: &str, bot_user_id: &str, access_token: &str) -> Self {
        Self {
            base_url: normalize_homeserver_url(homeserver_url),
            bot_user_id: bot_user_id.to_string(),
            access_token: access_token.to_string(),
            txn_counter: AtomicU64::new(0),
        }
    }

    /// Exchanges the bot password for an access token once, at startup.
    pub fn with_password_login(
        homeserver_url: &str,
        bot_user_id: &str,
        password: &str,
    ) -> Result<Self, ChatError> {
        let base_url = normalize_homeserver_url(homeserver_url);
        let body = json!({
            "type": "m.login.password",
            "identifier": {"type": "m.id.user", "user": bot_user_id},
            "password": password,
        });
        let response = request_json(
            Method::Post,
            &format!("{base_url}/_matrix/client/v3/login"),
            None,
            Some(&body),
        )?;

        let access_token = response
            .get("access_token")
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
            .ok_or(ChatError::LoginIncomplete {
                field: "access_token",
            })?;
        response
            .get("user_id")
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
            .ok_or(ChatError::LoginIncomplete { field: "user_id" })?;

        Ok(Self {
            base_url,
            bot_user_id: bot_user_id.to_string(),
            access_token: access_token.to_string(),
            txn_counter: AtomicU64::new(0),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn bot_user_id(&self) -> &str {
        &self.bot_user_id
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn via_server(&self) -> String {
        server_name_from_url_or_user(&self.base_url, &self.bot_user_id)
    }

    fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value, ChatError> {
        let mut url = self.endpoint(path);
        if !query.is_empty() {
            let encoded = query
                .iter()
                .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
                .collect::<Vec<_>>()
                .join("&");
            url = format!("{url}?{encoded}");
        }
        request_json(Method::Get, &url, Some(&self.access_token), None)
    }

    fn post(&self, path: &str, body: &Value) -> Result<Value, ChatError> {
        request_json(
            Method::Post,
            &self.endpoint(path),
            Some(&self.access_token),
            Some(body),
        )
    }

    fn put(&self, path: &str, body: &Value) -> Result<Value, ChatError> {
        request_json(
            Method::Put,
            &self.endpoint(path),
            Some(&self.access_token),
            Some(body),
        )
    }

    fn create_room_internal(
        &self,
        name: &str,
        topic: Option<&str>,
        invites: &[String],
        is_space: bool,
    ) -> Result<String, ChatError> {
        let mut body = json!({
            "name": name,
            "preset": "private_chat",
            "invite": invites,
        });
        if let Some(topic) = topic {
            body["topic"] = json!(topic);
        }
        if is_space {
            body["creation_content"] = json!({"type": "m.space"});
        }

        let response = self.post("/_matrix/client/v3/createRoom", &body)?;
        response
            .get("room_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ChatError::Decode {
                endpoint: "createRoom".to_string(),
                reason: "response has no room_id".to_string(),
            })
    }

    fn next_txn_id(&self) -> String {
        let counter = self.txn_counter.fetch_add(1, Ordering::SeqCst);
        format!("{TXN_PREFIX}-{}-{counter}", now_millis())
    }
}

impl ChatApi for MatrixClient {
    fn verify_connection(&self) -> Result<(), ChatError> {
        request_json(
            Method::Get,
            &self.endpoint("/_matrix/client/versions"),
            None,
            None,
        )?;

        let whoami = self.get("/_matrix/client/v3/account/whoami", &[])?;
        let actual = whoami
            .get("user_id")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if actual != self.bot_user_id {
            return Err(ChatError::IdentityMismatch {
                expected: self.bot_user_id.clone(),
                actual: actual.to_string(),
            });
        }
        Ok(())
    }

    fn access_token(&self) -> &str {
        &self.access_token
    }

    fn ensure_joined_room(&self, room_id: &str) -> Result<(), ChatError> {
        let joined = self.get("/_matrix/client/v3/joined_rooms", &[])?;
        let already_joined = joined
            .get("joined_rooms")
            .and_then(Value::as_array)
            .map(|rooms| rooms.iter().any(|v| v.as_str() == Some(room_id)))
            .unwrap_or(false);
        if already_joined {
            return Ok(());
        }

        self.post(
            &format!("/_matrix/client/v3/join/{}", urlencoding::encode(room_id)),
            &json!({}),
        )?;
        Ok(())
    }

    fn create_space(
        &self,
        name: &str,
        topic: Option<&str>,
        invites: &[String],
    ) -> Result<String, ChatError> {
        self.create_room_internal(name, topic, invites, true)
    }

    fn create_room(
        &self,
        name: &str,
        topic: Option<&str>,
        invites: &[String],
    ) -> Result<String, ChatError> {
        self.create_room_internal(name, topic, invites, false)
    }

    fn link_room_under_space(&self, parent_id: &str, child_id: &str) -> Result<(), ChatError> {
        let via = json!({"via": [self.via_server()]});
        self.put(
            &format!(
                "/_matrix/client/v3/rooms/{}/state/m.space.child/{}",
                urlencoding::encode(parent_id),
                urlencoding::encode(child_id)
            ),
            &via,
        )?;

        let mut parent_content = via;
        parent_content["canonical"] = json!(true);
        self.put(
            &format!(
                "/_matrix/client/v3/rooms/{}/state/m.space.parent/{}",
                urlencoding::encode(child_id),
                urlencoding::encode(parent_id)
            ),
            &parent_content,
        )?;
        Ok(())
    }

    fn ensure_invites(&self, room_id: &str, user_ids: &[String]) -> Result<(), ChatError> {
        let members = self.get(
            &format!(
                "/_matrix/client/v3/rooms/{}/members",
                urlencoding::encode(room_id)
            ),
            &[],
        )?;

        let mut memberships = std::collections::BTreeMap::new();
        if let Some(chunk) = members.get("chunk").and_then(Value::as_array) {
            for event in chunk {
                let Some(user) = event.get("state_key").and_then(Value::as_str) else {
                    continue;
                };
                let membership = event
                    .get("content")
                    .and_then(|c| c.get("membership"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                memberships.insert(user.to_string(), membership.to_string());
            }
        }

        for user_id in user_ids {
            let membership = memberships.get(user_id).map(String::as_str).unwrap_or("");
            if membership == "join" || membership == "invite" {
                continue;
            }
            self.post(
                &format!(
                    "/_matrix/client/v3/rooms/{}/invite",
                    urlencoding::encode(room_id)
                ),
                &json!({"user_id": user_id}),
            )?;
        }
        Ok(())
    }

    fn sync(
        &self,
        since: Option<&str>,
        timeout_ms: u64,
        room_ids: &[String],
    ) -> Result<SyncResponse, ChatError> {
        let filter = json!({
            "room": {
                "rooms": room_ids,
                "timeline": {"types": ["m.room.message"]},
            }
        });
        let mut query = vec![
            ("timeout", timeout_ms.to_string()),
            ("filter", filter.to_string()),
        ];
        if let Some(since) = since.filter(|v| !v.is_empty()) {
            query.push(("since", since.to_string()));
        }

        let response = self.get("/_matrix/client/v3/sync", &query)?;
        serde_json::from_value(response).map_err(|err| ChatError::Decode {
            endpoint: "sync".to_string(),
            reason: err.to_string(),
        })
    }

    fn send_message(
        &self,
        room_id: &str,
        body: &str,
        msg_type: &str,
        options: &SendOptions,
    ) -> Result<String, ChatError> {
        let content = message_content(body, msg_type, options);
        let response = self.put(
            &format!(
                "/_matrix/client/v3/rooms/{}/send/m.room.message/{}",
                urlencoding::encode(room_id),
                self.next_txn_id()
            ),
            &content,
        )?;
        response
            .get("event_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ChatError::Decode {
                endpoint: "send".to_string(),
                reason: "response has no event_id".to_string(),
            })
    }

    fn leave_and_forget(&self, room_id: &str) {
        let encoded = urlencoding::encode(room_id).into_owned();
        let _ = self.post(
            &format!("/_matrix/client/v3/rooms/{encoded}/leave"),
            &json!({}),
        );
        let _ = self.post(
            &format!("/_matrix/client/v3/rooms/{encoded}/forget"),
            &json!({}),
        );
    }
}

/// Builds one m.room.message content body: type, truncated text, and thread
/// relation metadata (with the fallback reply pointer) when a root is given.
pub fn message_content(body: &str, msg_type: &str, options: &SendOptions) -> Value {
    let msg_type = if msg_type.is_empty() {
        MSGTYPE_TEXT
    } else {
        msg_type
    };
    let mut content = json!({
        "msgtype": msg_type,
        "body": truncate_chars(body, MAX_MESSAGE_CHARS),
    });
    if let Some(root) = options
        .thread_root_event_id
        .as_deref()
        .filter(|v| !v.trim().is_empty())
    {
        content["m.relates_to"] = json!({
            "rel_type": "m.thread",
            "event_id": root,
            "is_falling_back": true,
            "m.in_reply_to": {"event_id": root},
        });
    }
    content
}

fn request_json(
    method: Method,
    url: &str,
    token: Option<&str>,
    body: Option<&Value>,
) -> Result<Value, ChatError> {
    execute_with_retry(|| http_call(method, url, token, body), std::thread::sleep)
}

fn http_call(
    method: Method,
    url: &str,
    token: Option<&str>,
    body: Option<&Value>,
) -> Result<Value, HttpFailure> {
    let mut request = match method {
        Method::Get => ureq::get(url),
        Method::Post => ureq::post(url),
        Method::Put => ureq::put(url),
    };
    if let Some(token) = token {
        request = request.set("Authorization", &format!("Bearer {token}"));
    }

    let result = match body {
        Some(body) => request.send_json(body),
        None => request.call(),
    };

    match result {
        Ok(response) => response
            .into_json::<Value>()
            .map_err(|err| HttpFailure::Transport(err.to_string())),
        Err(ureq::Error::Status(429, response)) => {
            let retry_after_ms = response
                .into_json::<Value>()
                .ok()
                .and_then(|v| v.get("retry_after_ms").and_then(Value::as_u64));
            Err(HttpFailure::RateLimited { retry_after_ms })
        }
        Err(ureq::Error::Status(status, response)) => {
            let body = response.into_string().unwrap_or_default();
            Err(HttpFailure::Status {
                status,
                body: truncate_chars(&body, ERROR_BODY_MAX_CHARS).to_string(),
            })
        }
        Err(other) => Err(HttpFailure::Transport(other.to_string())),
    }
}
