//! Connection actor
//!
//! One [`Bridge`] per IRC client connection. It owns every piece of
//! connection state (nick, joined channels, the remote session) and is the
//! only thing that touches it: the line reader and the remote session's
//! socket task just enqueue [`Event`]s into its mailbox. Handlers run one at
//! a time; a failing handler is reported to `root` and the loop goes on.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use isb_core::mailbox::{self, Mailbox, MailboxSender};
use isb_core::Config;
use isb_irc::line::{read_lines, write_lines};
use isb_irc::Message;
use isb_slack::{ChannelInfo, EventSink, RemoteEvent, RemoteSession, RosterChange, SlackError};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::control::{ControlCommand, ROOT};
use crate::error::{BridgeError, Result};
use crate::event::Event;
use crate::translate::{self, Translation};

pub struct Bridge {
    id: Uuid,
    settings: Arc<Config>,
    nick: Option<String>,
    joined: HashSet<String>,
    slack: Option<RemoteSession>,
    events: MailboxSender<Event>,
    lines: MailboxSender<String>,
}

/// Serve one IRC client until it disconnects.
pub async fn serve<S>(stream: S, settings: Arc<Config>)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let id = Uuid::new_v4();
    info!(connection = %id, "Client connected");

    let (reader, writer) = tokio::io::split(stream);
    let (events_tx, events) = mailbox::channel();
    let (lines_tx, lines) = mailbox::channel();

    let inbound = events_tx.clone();
    tokio::spawn(async move {
        read_lines(
            BufReader::new(reader),
            |line| {
                debug!(connection = %id, "Received: {}", line);
                inbound.put(Event::IrcLine(line));
            },
            |err| {
                debug!(connection = %id, "Terminated read: {:?}", err);
                inbound.close();
            },
        )
        .await
    });

    let writer_task = tokio::spawn(write_lines(writer, lines, move |err| {
        debug!(connection = %id, "Terminated write: {:?}", err);
    }));

    Bridge::new(id, settings, events_tx, lines_tx).run(events).await;

    if let Err(e) = writer_task.await {
        debug!(connection = %id, "Writer task failed: {}", e);
    }
    info!(connection = %id, "Client disconnected");
}

impl Bridge {
    pub fn new(id: Uuid, settings: Arc<Config>, events: MailboxSender<Event>, lines: MailboxSender<String>) -> Self {
        Self {
            id,
            settings,
            nick: None,
            joined: HashSet::new(),
            slack: None,
            events,
            lines,
        }
    }

    /// Handle events until the mailbox closes, then shut down.
    pub async fn run(mut self, mut events: Mailbox<Event>) {
        while let Some(event) = events.take().await {
            self.dispatch(event).await;
        }
        self.shutdown();
    }

    /// Handle one event. Errors never escape.
    pub async fn dispatch(&mut self, event: Event) {
        let context = format!("While handling: {}", event);
        let result = match event {
            Event::IrcLine(line) => self.on_irc_line(&line).await,
            Event::Remote(remote) => self.on_remote(remote).await,
        };
        if let Err(e) = result {
            self.err(&context, &e);
        }
    }

    fn shutdown(&mut self) {
        self.lines.close();
        if let Some(mut session) = self.slack.take() {
            session.terminate();
        }
    }

    fn server_name(&self) -> &str {
        &self.settings.server.server_name
    }

    fn nick_or_star(&self) -> String {
        self.nick.clone().unwrap_or_else(|| "*".to_string())
    }

    fn session_mut(&mut self) -> Result<&mut RemoteSession> {
        self.slack.as_mut().ok_or(BridgeError::NotLoggedIn)
    }

    /// Sink handed to remote sessions: tags stay attached, nothing but enqueueing.
    fn sink(&self) -> EventSink {
        let events = self.events.clone();
        Arc::new(move |event: RemoteEvent| events.put(Event::Remote(event)))
    }

    fn put<I, A>(&self, prefix: Option<&str>, command: &str, args: I) -> Result<()>
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        let line = Message::new(prefix.map(str::to_string), command, args).deparse()?;
        self.lines.put(line);
        Ok(())
    }

    /// Private message to the client from `from`. Dropped before NICK.
    fn im_message(&self, from: &str, text: &str) {
        let Some(nick) = &self.nick else {
            error!(connection = %self.id, "Message before NICK: <{}> {}", from, text);
            return;
        };
        if let Err(e) = self.put(Some(from), "PRIVMSG", [nick.as_str(), text]) {
            error!(connection = %self.id, "Cannot relay <{}> {}: {}", from, text, e);
        }
    }

    fn err(&self, context: &str, e: &BridgeError) {
        debug!(connection = %self.id, "{}: {}", context, e);
        self.im_message(ROOT, &format!("{} -- {}", context, e));
    }

    async fn on_irc_line(&mut self, line: &str) -> Result<()> {
        let msg = Message::parse(line)?;

        match msg.command() {
            "NICK" => {
                let nick = required(&msg, 0)?.to_string();
                let welcome = format!("Welcome to the IRC/Slack bridge, {}", nick);
                self.put(Some(self.server_name()), "001", [nick.as_str(), welcome.as_str()])?;
                self.nick = Some(nick);
            }
            "PRIVMSG" => {
                let to = required(&msg, 0)?;
                let text = required(&msg, 1)?;
                if let Some(channel) = to.strip_prefix('#') {
                    let session = self.session_mut()?;
                    let channel_id = session.require_channel_id(channel).await?;
                    session.post_message(&channel_id, text).await?;
                } else if to == ROOT {
                    self.control(text).await?;
                } else {
                    let session = self.session_mut()?;
                    let channel_id = session.require_im_by_name(to).await?;
                    session.post_message(&channel_id, text).await?;
                }
            }
            "PING" => {
                if let Some(session) = self.slack.as_mut() {
                    if let Err(e) = session.heartbeat().await {
                        self.err("slack.poke failed", &e.into());
                    }
                }
                let server = self.server_name();
                self.put(Some(server), "PONG", [server, server])?;
            }
            "AWAY" => self.on_away(msg.arg(0).unwrap_or_default()).await?,
            "JOIN" => {
                for channel in required(&msg, 0)?.split(',') {
                    self.joined.insert(channel.to_string());
                    self.put(self.nick.as_deref(), "JOIN", [channel])?;
                }
            }
            "PART" => {
                for channel in required(&msg, 0)?.split(',') {
                    self.joined.remove(channel);
                    self.put(self.nick.as_deref(), "PART", [channel])?;
                }
            }
            "WHOIS" => {
                if msg.args().len() != 1 {
                    self.im_message(ROOT, &format!("Unintelligible WHOIS: {}", line));
                    return Ok(());
                }
                self.on_whois(required(&msg, 0)?).await?;
            }
            "USER" | "MODE" => {}
            _ => self.im_message(ROOT, &format!("Unexpected IRC line: {}", line)),
        }

        Ok(())
    }

    async fn on_away(&mut self, text: &str) -> Result<()> {
        let (presence, code, reply) = if text.is_empty() {
            ("auto", "305", "You are no longer marked as being away")
        } else {
            ("away", "306", "You have been marked as being away")
        };
        if let Some(session) = &self.slack {
            session.set_presence(presence).await?;
        }
        let nick = self.nick_or_star();
        self.put(Some(self.server_name()), code, [nick.as_str(), reply])
    }

    async fn on_whois(&mut self, name: &str) -> Result<()> {
        let session = self.session_mut()?;
        let user_id = session.require_user_id(name).await?;
        let real_name = session.user_real_name(&user_id).await?;
        let presence = session.user_presence(&user_id).await?;

        let nick = self.nick_or_star();
        let server = self.server_name();
        self.put(Some(server), "311", [nick.as_str(), name, "slack", "slack", "*", real_name.as_str()])?;
        if presence != "active" {
            let away = format!("Away: {}", presence);
            self.put(Some(server), "301", [nick.as_str(), name, away.as_str()])?;
        }
        self.put(Some(server), "318", [nick.as_str(), name, "End of WHOIS list"])
    }

    async fn control(&mut self, text: &str) -> Result<()> {
        match ControlCommand::parse(text) {
            ControlCommand::Login(token) => {
                if let Some(mut previous) = self.slack.take() {
                    previous.terminate();
                }
                let session = RemoteSession::connect(&self.settings.slack, &token, self.sink()).await?;
                info!(connection = %self.id, session = %session.tag(), "Logged in");
                self.slack = Some(session);
                self.im_message(ROOT, "Token accepted.");
            }
            ControlCommand::Logout => match self.slack.take() {
                Some(mut session) => {
                    session.terminate();
                    self.im_message(ROOT, "Logged out.");
                }
                None => self.im_message(ROOT, "Not logged in."),
            },
            ControlCommand::Poke => {
                if let Some(session) = self.slack.as_mut() {
                    session.heartbeat().await?;
                }
            }
            ControlCommand::Unknown => self.im_message(ROOT, "?"),
        }
        Ok(())
    }

    async fn on_remote(&mut self, event: RemoteEvent) -> Result<()> {
        let current = self.slack.as_ref().map(RemoteSession::tag);
        if current != Some(event.session()) {
            debug!(connection = %self.id, session = %event.session(), "Dropping event from stale session");
            return Ok(());
        }

        match event {
            RemoteEvent::Payload { payload, .. } => {
                if translate::is_message(&payload) {
                    self.on_slack_message(&payload).await?;
                }
            }
            RemoteEvent::Roster { change, .. } => {
                let text = match change {
                    RosterChange::Added(name) => format!("singularity: +{}", name),
                    RosterChange::Removed(name) => format!("singularity: -{}", name),
                };
                self.im_message(ROOT, &text);
            }
            RemoteEvent::Closed { status, reason, .. } => self.reconnect(status, reason).await?,
            RemoteEvent::Malformed { detail, .. } => {
                self.im_message(ROOT, &format!("websocket error -- {}", detail));
            }
        }
        Ok(())
    }

    async fn reconnect(&mut self, status: u16, reason: String) -> Result<()> {
        let closed = SlackError::StreamClosed { status, reason };
        info!(connection = %self.id, "{}", closed);
        self.im_message(ROOT, &closed.to_string());

        // cleared before reconnecting so a failure leaves no session behind
        let Some(mut previous) = self.slack.take() else {
            return Ok(());
        };
        previous.terminate();
        let token = previous.token().to_string();
        drop(previous);

        let session = RemoteSession::connect(&self.settings.slack, &token, self.sink()).await?;
        info!(connection = %self.id, session = %session.tag(), "Reconnected to Slack");
        self.slack = Some(session);
        self.im_message(ROOT, "Reconnected.");
        Ok(())
    }

    async fn on_slack_message(&mut self, payload: &Value) -> Result<()> {
        let relay_bot_ids = &self.settings.slack.relay_bot_ids;
        let session = self.slack.as_ref().ok_or(BridgeError::NotLoggedIn)?;

        if let Some((channel, ts)) = translate::mark_target(payload) {
            session.mark(channel, ts);
        }

        match translate::classify(payload, relay_bot_ids) {
            Translation::Display { channel, user, text } => self.show_message(&channel, &user, &text).await,
            Translation::Suppress => Ok(()),
            Translation::Unexpected => {
                self.im_message(ROOT, &format!("Unexpected websocket message event: {}", payload));
                Ok(())
            }
        }
    }

    async fn show_message(&mut self, channel_id: &str, from_user: &str, text: &str) -> Result<()> {
        let (info, lines, from) = {
            let session = self.session_mut()?;
            if session.user_id() == from_user {
                return Ok(());
            }
            let info = session.channel_info(channel_id).await;
            let lines = mangle(session, text).await;
            let from = match info {
                ChannelInfo::ChannelOrGroup(_) => Some(session.require_name(from_user).await?),
                _ => None,
            };
            (info, lines, from)
        };

        match (info, from) {
            (ChannelInfo::Im(peer), _) => {
                for line in &lines {
                    self.im_message(&peer, line);
                }
            }
            (ChannelInfo::ChannelOrGroup(name), Some(from)) => {
                let channel = format!("#{}", name);
                if self.joined.insert(channel.clone()) {
                    self.put(self.nick.as_deref(), "JOIN", [channel.as_str()])?;
                }
                for line in &lines {
                    self.put(Some(from.as_str()), "PRIVMSG", [channel.as_str(), line.as_str()])?;
                }
            }
            (info, _) => {
                self.im_message(
                    ROOT,
                    &format!("Unexpected websocket message event: [{:?}] {}", info, text),
                );
            }
        }
        Ok(())
    }
}

fn required<'a>(msg: &'a Message, index: usize) -> Result<&'a str> {
    msg.arg(index).ok_or_else(|| BridgeError::MissingArgument {
        command: msg.command().to_string(),
        index,
    })
}

/// Resolve mentioned users, then rewrite the text line by line.
async fn mangle(session: &mut RemoteSession, text: &str) -> Vec<String> {
    let mut names = HashMap::new();
    for user_id in translate::mentioned_user_ids(text) {
        match session.find_name(&user_id).await {
            Ok(Some(name)) => {
                names.insert(user_id, name);
            }
            Ok(None) => {}
            Err(e) => debug!("Cannot resolve mention {}: {}", user_id, e),
        }
    }
    translate::mangle(text, |id| names.get(id).cloned())
}
