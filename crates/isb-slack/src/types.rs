//! Slack API types

use serde::{Deserialize, Serialize};

/// Slack user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackUser {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub real_name: Option<String>,
    #[serde(default)]
    pub profile: Option<UserProfile>,
}

impl SlackUser {
    /// Real name from the profile, falling back to the top-level field
    pub fn display_real_name(&self) -> Option<&str> {
        self.profile
            .as_ref()
            .and_then(|p| p.real_name.as_deref())
            .or(self.real_name.as_deref())
    }
}

/// User profile details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub real_name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Conversation (public/private channel, group or direct message)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackChannel {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Peer user id, set on direct messages only
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub is_im: bool,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub is_archived: bool,
}

/// auth.test response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthTestResponse {
    pub user_id: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub team_id: Option<String>,
}

/// rtm.connect response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RtmConnectResponse {
    pub url: String,
}

/// users.list response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsersListResponse {
    #[serde(default)]
    pub members: Vec<SlackUser>,
}

/// users.info response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsersInfoResponse {
    pub user: SlackUser,
}

/// users.getPresence response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceResponse {
    pub presence: String,
}

/// conversations.list response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationsListResponse {
    #[serde(default)]
    pub channels: Vec<SlackChannel>,
}

/// conversations.open response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationsOpenResponse {
    pub channel: SlackChannel,
}

/// What a conversation id refers to, from the local point of view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelInfo {
    /// Direct message with the named peer
    Im(String),
    /// Public channel or private group, by name
    ChannelOrGroup(String),
    /// Not resolvable; carries the raw id
    Unknown(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_real_name_prefers_profile() {
        let user: SlackUser = serde_json::from_value(serde_json::json!({
            "id": "U1",
            "name": "alice",
            "real_name": "Top Level",
            "profile": { "real_name": "Alice Liddell" }
        }))
        .unwrap();
        assert_eq!(user.display_real_name(), Some("Alice Liddell"));
        assert!(!user.deleted);
    }

    #[test]
    fn test_im_channel_without_name() {
        let open: ConversationsOpenResponse =
            serde_json::from_value(serde_json::json!({ "channel": { "id": "D42" } })).unwrap();
        assert_eq!(open.channel.id, "D42");
        assert!(open.channel.name.is_none());
    }
}
