use std::time::Duration;

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::common::{ConnectionState, NetworkEvent, ServerEvent};
use crate::config::AppConfig;
use crate::error::Result;
use crate::network::{ApiClient, ChatApi, SessionChannel};
use crate::store::{ActiveChatSession, ChatListStore, PresenceTracker, Session};

use super::components::input::{self, InputAction};
use super::components::{chat_list, conversation, presence};
use super::state::ActivityLog;

/// Terminal front end. Owns every store and applies channel events on one task in
/// arrival order.
pub struct ChatApp {
    session: Session,
    channel: SessionChannel,
    event_receiver: mpsc::Receiver<NetworkEvent>,
    api: Box<dyn ChatApi>,
    presence: PresenceTracker,
    chat_list: ChatListStore,
    active_chat: ActiveChatSession,
    activity: ActivityLog,
    clear_presence_on_disconnect: bool,
}

impl ChatApp {
    pub fn new(config: &AppConfig, session: Session) -> Self {
        let (channel, event_receiver) =
            SessionChannel::connect(config.channel_settings(), session.token());
        let api = ApiClient::new(config.api_base_url.clone(), session.token());
        Self::with_parts(config, session, channel, event_receiver, Box::new(api))
    }

    fn with_parts(
        config: &AppConfig,
        session: Session,
        channel: SessionChannel,
        event_receiver: mpsc::Receiver<NetworkEvent>,
        api: Box<dyn ChatApi>,
    ) -> Self {
        let mut presence = PresenceTracker::new();
        presence.attach(channel.router());
        let mut chat_list = ChatListStore::new();
        chat_list.attach(channel.router());

        Self {
            session,
            channel,
            event_receiver,
            api,
            presence,
            chat_list,
            active_chat: ActiveChatSession::new(
                config.peer_lookup_timeout(),
                config.send_ack_timeout(),
            ),
            activity: ActivityLog::new(),
            clear_presence_on_disconnect: config.clear_presence_on_disconnect,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        log::info!("Client started for user {}", self.session.user_id());
        self.reload_chats().await;
        println!("{}", chat_list::render(&self.chat_list.snapshot()));
        println!("Type /help for commands");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut ticker = tokio::time::interval(Duration::from_secs(1));

        loop {
            tokio::select! {
                event = self.event_receiver.recv() => match event {
                    Some(event) => self.handle_network_event(event),
                    None => {
                        log::warn!("Channel task stopped");
                        break;
                    }
                },
                line = lines.next_line() => match line? {
                    Some(line) => {
                        if !self.handle_input(&line).await {
                            break;
                        }
                    }
                    None => break,
                },
                _ = ticker.tick() => self.active_chat.check_timeouts(Utc::now()),
            }
        }

        self.active_chat.close();
        self.event_receiver.close();
        self.channel.disconnect().await;
        Ok(())
    }

    pub fn handle_network_event(&mut self, event: NetworkEvent) {
        match event {
            NetworkEvent::Received(event) => self.handle_server_event(&event),
            NetworkEvent::StateChanged(state) => self.handle_state_change(state),
        }
    }

    fn handle_server_event(&mut self, event: &ServerEvent) {
        let shown_before = self.shown_messages();
        let delivered = self.channel.dispatch(event);
        log::trace!("`{}` delivered to {delivered} handlers", event.kind().name());

        match event {
            ServerEvent::UsersConnected(users) => {
                self.activity
                    .record("PRESENCE", format!("{} users online", users.0.len()));
            }
            ServerEvent::NewMessage(incoming) => {
                if !self.chat_list.contains(&incoming.chat_id) {
                    self.activity.record(
                        "PUSH_DROPPED",
                        format!("message for unknown chat {}", incoming.chat_id),
                    );
                }
            }
            ServerEvent::PeerInfo(info) => {
                self.activity
                    .record("PEER_INFO", format!("{} is {}", info.user_id, info.username));
                self.print_conversation();
            }
        }

        if self.shown_messages() > shown_before {
            let view = self.active_chat.snapshot();
            if let Some(entry) = view
                .conversation
                .as_ref()
                .and_then(|conversation| conversation.messages.last())
            {
                let mut line = String::new();
                conversation::render_entry(&mut line, entry, self.session.user_id());
                println!("{line}");
            }
        }
    }

    fn handle_state_change(&mut self, state: ConnectionState) {
        if !self.session.set_connection_state(state) {
            return;
        }
        self.activity.record("CONNECTION", format!("{state:?}"));
        if state == ConnectionState::Disconnected && self.clear_presence_on_disconnect {
            self.presence.clear();
        }
        match state {
            ConnectionState::Connected => println!("* connected"),
            ConnectionState::Disconnected => println!("* disconnected, retrying"),
            ConnectionState::Connecting => {}
        }
    }

    /// Returns false when the user asked to quit.
    pub async fn handle_input(&mut self, line: &str) -> bool {
        match input::parse(line) {
            InputAction::Send(text) => {
                if let Err(err) =
                    self.active_chat
                        .send_message(self.session.user_id(), &text, &self.channel)
                {
                    println!("! {err}");
                }
            }
            InputAction::ListChats => {
                println!("{}", chat_list::render(&self.chat_list.snapshot()));
            }
            InputAction::Reload => {
                self.reload_chats().await;
                println!("{}", chat_list::render(&self.chat_list.snapshot()));
            }
            InputAction::Open { chat_id, peer_id } => {
                self.active_chat
                    .open(chat_id, peer_id, self.channel.router(), &self.channel);
                self.print_conversation();
            }
            InputAction::Close => self.active_chat.close(),
            InputAction::Retry => {
                if let Err(err) = self.active_chat.retry_lookup(&self.channel) {
                    println!("! {err}");
                }
            }
            InputAction::Online => println!("{}", presence::render(&self.presence.snapshot())),
            InputAction::Events => {
                for event in self.activity.recent(20) {
                    println!(
                        "[{}] {} {}",
                        event.timestamp.format("%H:%M:%S"),
                        event.event_type,
                        event.message
                    );
                }
            }
            InputAction::Help => println!("{}", input::HELP),
            InputAction::Quit => return false,
            InputAction::Invalid(message) => println!("! {message}"),
            InputAction::Empty => {}
        }
        true
    }

    async fn reload_chats(&mut self) {
        match self.chat_list.load(self.api.as_ref()).await {
            Ok(count) => self
                .activity
                .record("CHATS_LOADED", format!("{count} conversations")),
            Err(err) => println!("! could not load chats: {err}"),
        }
    }

    fn print_conversation(&self) {
        let view = self.active_chat.snapshot();
        let peer_online = view
            .conversation
            .as_ref()
            .is_some_and(|conversation| self.presence.is_online(&conversation.peer_id));
        println!(
            "{}",
            conversation::render(&view, self.session.user_id(), peer_online)
        );
    }

    fn shown_messages(&self) -> usize {
        self.active_chat
            .snapshot()
            .conversation
            .map_or(0, |conversation| conversation.messages.len())
    }
}
