//! Remote session: one logged-in Slack identity
//!
//! Owns the REST client, the streaming socket, the lookup caches, the roster
//! snapshot and the read-marker. All of it belongs to a single owner; the
//! socket task only talks back through the [`EventSink`].

use futures::future::BoxFuture;
use isb_core::{Debouncer, SlackConfig};
use tracing::{debug, info, warn};

use crate::api::SlackApiClient;
use crate::error::Result;
use crate::event::{EventSink, RemoteEvent, RosterChange, SessionTag};
use crate::lookup::LookupCache;
use crate::roster::{RosterDelta, RosterTracker};
use crate::socket::StreamSocket;
use crate::types::{ChannelInfo, SlackUser};

const IM_TYPES: &str = "im";
const CHANNEL_TYPES: &str = "public_channel,private_channel";

type Pairs = Result<Vec<(String, String)>>;

pub struct RemoteSession {
    tag: SessionTag,
    token: String,
    user_id: String,
    api: SlackApiClient,
    socket: StreamSocket,
    sink: EventSink,
    roster: RosterTracker,
    next_ping_id: u64,
    /// display name <-> user id
    users: LookupCache<SlackApiClient, String, String>,
    /// user id <-> direct message channel id
    ims: LookupCache<SlackApiClient, String, String>,
    /// channel or group name <-> channel id
    channels: LookupCache<SlackApiClient, String, String>,
    /// channel id -> timestamps seen, flushed as one read-mark
    marker: Debouncer<String, String>,
}

impl RemoteSession {
    /// Verify the token, open the streaming socket and start delivering
    /// events to `sink`.
    pub async fn connect(config: &SlackConfig, token: &str, sink: EventSink) -> Result<Self> {
        let tag = SessionTag::next();
        let api = SlackApiClient::new(token, config)?;

        let auth = api.auth_test().await?;
        info!(session = %tag, user_id = %auth.user_id, "Slack identity confirmed");

        let rtm = api.rtm_connect().await?;
        let socket = StreamSocket::connect(&rtm.url, tag, sink.clone()).await?;

        let marker = {
            let api = api.clone();
            Debouncer::new(config.mark_cooldown(), move |channel: String, stamps: Vec<String>| {
                let api = api.clone();
                Box::pin(async move {
                    let Some(latest) = latest_ts(&stamps) else {
                        return Ok(());
                    };
                    debug!(%channel, ts = %latest, "marking read");
                    api.conversations_mark(&channel, &latest).await?;
                    Ok(())
                }) as BoxFuture<'static, anyhow::Result<()>>
            })
        };

        Ok(Self {
            tag,
            token: token.to_string(),
            user_id: auth.user_id,
            api,
            socket,
            sink,
            roster: RosterTracker::new(),
            next_ping_id: 0,
            users: LookupCache::new("user", fetch_users),
            ims: LookupCache::new("direct message with", fetch_ims).with_key_refresh(open_im),
            channels: LookupCache::new("channel", fetch_channels),
            marker,
        })
    }

    pub fn tag(&self) -> SessionTag {
        self.tag
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Own Slack user id
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Keep-alive plus roster poll.
    ///
    /// Every change since the previous poll is also delivered to the sink as
    /// a [`RemoteEvent::Roster`]. The first poll only records the baseline.
    pub async fn heartbeat(&mut self) -> Result<RosterDelta> {
        self.next_ping_id += 1;
        self.socket.send_ping(self.next_ping_id);

        let members = self.api.users_list().await?;
        let mut names = Vec::with_capacity(members.len());
        for SlackUser { id, name, deleted, .. } in members {
            if deleted {
                continue;
            }
            self.users.put(name.clone(), id);
            names.push(name);
        }

        let delta = self.roster.observe(names);
        for name in &delta.added {
            (self.sink)(RemoteEvent::Roster {
                session: self.tag,
                change: RosterChange::Added(name.clone()),
            });
        }
        for name in &delta.removed {
            (self.sink)(RemoteEvent::Roster {
                session: self.tag,
                change: RosterChange::Removed(name.clone()),
            });
        }
        Ok(delta)
    }

    /// Close the socket. Safe to call more than once.
    pub fn terminate(&mut self) {
        if !self.socket.is_terminated() {
            info!(session = %self.tag, "Terminating Slack session");
        }
        self.socket.terminate();
    }

    /// Queue `ts` for the read-marker of `channel`.
    pub fn mark(&self, channel: &str, ts: &str) {
        self.marker.add(channel.to_string(), ts.to_string());
    }

    pub async fn require_user_id(&mut self, name: &str) -> Result<String> {
        self.users.require_forward(&self.api, &name.to_string()).await
    }

    pub async fn find_name(&mut self, user_id: &str) -> Result<Option<String>> {
        self.users.find_reverse(&self.api, &user_id.to_string()).await
    }

    pub async fn require_name(&mut self, user_id: &str) -> Result<String> {
        self.users.require_reverse(&self.api, &user_id.to_string()).await
    }

    /// Direct message channel with the user called `name`
    pub async fn require_im_by_name(&mut self, name: &str) -> Result<String> {
        let user_id = self.require_user_id(name).await?;
        self.ims.require_forward(&self.api, &user_id).await
    }

    pub async fn require_channel_id(&mut self, name: &str) -> Result<String> {
        self.channels.require_forward(&self.api, &name.to_string()).await
    }

    /// Classify a conversation id. Lookup failures are logged and yield
    /// [`ChannelInfo::Unknown`].
    pub async fn channel_info(&mut self, id: &str) -> ChannelInfo {
        let id = id.to_string();

        if let Some(name) = self.channels.get_reverse(&id) {
            return ChannelInfo::ChannelOrGroup(name.clone());
        }

        match self.im_peer(&id).await {
            Ok(Some(name)) => return ChannelInfo::Im(name),
            Ok(None) => {}
            Err(e) => warn!(channel = %id, "direct message lookup failed: {}", e),
        }

        match self.channels.find_reverse(&self.api, &id).await {
            Ok(Some(name)) => return ChannelInfo::ChannelOrGroup(name),
            Ok(None) => {}
            Err(e) => warn!(channel = %id, "channel lookup failed: {}", e),
        }

        ChannelInfo::Unknown(id)
    }

    async fn im_peer(&mut self, id: &String) -> Result<Option<String>> {
        match self.ims.find_reverse(&self.api, id).await? {
            Some(user_id) => self.find_name(&user_id).await,
            None => Ok(None),
        }
    }

    pub async fn post_message(&self, channel_id: &str, text: &str) -> Result<()> {
        self.api.post_message(channel_id, text).await
    }

    /// `auto` or `away`
    pub async fn set_presence(&self, presence: &str) -> Result<()> {
        self.api.users_set_presence(presence).await
    }

    pub async fn user_real_name(&self, user_id: &str) -> Result<String> {
        let user = self.api.users_info(user_id).await?;
        Ok(user.display_real_name().unwrap_or(&user.name).to_string())
    }

    pub async fn user_presence(&self, user_id: &str) -> Result<String> {
        self.api.users_get_presence(user_id).await
    }
}

impl Drop for RemoteSession {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn fetch_users(api: &SlackApiClient) -> BoxFuture<'_, Pairs> {
    Box::pin(async move {
        let members = api.users_list().await?;
        Ok(members
            .into_iter()
            .filter(|u| !u.deleted)
            .map(|u| (u.name, u.id))
            .collect())
    })
}

fn fetch_ims(api: &SlackApiClient) -> BoxFuture<'_, Pairs> {
    Box::pin(async move {
        let ims = api.conversations_list(IM_TYPES).await?;
        Ok(ims
            .into_iter()
            .filter_map(|c| c.user.map(|user| (user, c.id)))
            .collect())
    })
}

fn open_im<'a>(api: &'a SlackApiClient, user_id: &'a String) -> BoxFuture<'a, Pairs> {
    Box::pin(async move {
        let channel = api.conversations_open(user_id).await?;
        Ok(vec![(user_id.clone(), channel)])
    })
}

fn fetch_channels(api: &SlackApiClient) -> BoxFuture<'_, Pairs> {
    Box::pin(async move {
        let channels = api.conversations_list(CHANNEL_TYPES).await?;
        Ok(channels
            .into_iter()
            .filter_map(|c| c.name.map(|name| (name, c.id)))
            .collect())
    })
}

/// Slack timestamps are `seconds.micros`; compare them as numbers.
fn ts_key(ts: &str) -> Option<(u64, u64)> {
    let (secs, frac) = ts.split_once('.').unwrap_or((ts, ""));
    if frac.len() > 6 || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let micros = if frac.is_empty() {
        0
    } else {
        format!("{:0<6}", frac).parse().ok()?
    };
    Some((secs.parse().ok()?, micros))
}

fn latest_ts(stamps: &[String]) -> Option<String> {
    stamps
        .iter()
        .filter_map(|ts| ts_key(ts).map(|key| (key, ts)))
        .max_by_key(|(key, _)| *key)
        .map(|(_, ts)| ts.clone())
}
