use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::common::{ClientEvent, ConnectionState, EventKind, NetworkEvent, ServerEvent};

use super::client::{Backoff, ChannelClient};
use super::router::{EventRouter, Subscription};

/// Fire-and-forget outbound events.
pub trait Emitter {
    fn emit(&self, event: ClientEvent);
}

#[derive(Debug, Clone)]
pub struct ChannelSettings {
    pub url: String,
    pub event_buffer: usize,
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
}

/// The application's single real-time channel.
///
/// Acquired once at start-up and released by [`SessionChannel::disconnect`] or on drop,
/// so no socket outlives the application. Views only add and remove handlers on top
/// of it through [`SessionChannel::on`].
pub struct SessionChannel {
    command_sender: mpsc::Sender<ClientEvent>,
    shutdown: watch::Sender<bool>,
    state: watch::Receiver<ConnectionState>,
    router: EventRouter,
    task: Option<JoinHandle<()>>,
}

impl SessionChannel {
    /// Spawns the channel task. Inbound events and state changes arrive on the returned
    /// receiver and must be fed back through [`SessionChannel::dispatch`] by the caller's loop.
    pub fn connect(settings: ChannelSettings, token: &str) -> (Self, mpsc::Receiver<NetworkEvent>) {
        let (command_sender, command_receiver) = mpsc::channel(settings.event_buffer);
        let (event_sender, event_receiver) = mpsc::channel(settings.event_buffer);
        let (state_sender, state) = watch::channel(ConnectionState::Disconnected);
        let (shutdown, shutdown_receiver) = watch::channel(false);

        let client = ChannelClient::new(
            settings.url,
            token.to_string(),
            Backoff::new(settings.reconnect_initial, settings.reconnect_max),
            state_sender,
            event_sender,
            command_receiver,
            shutdown_receiver,
        );
        let task = tokio::spawn(async move {
            if let Err(err) = client.run().await {
                log::error!("Channel terminated: {err}");
            }
        });

        let channel = Self {
            command_sender,
            shutdown,
            state,
            router: EventRouter::new(),
            task: Some(task),
        };
        (channel, event_receiver)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    pub fn on<F>(&self, kind: EventKind, subscriber: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        self.router.on(kind, subscriber, handler)
    }

    pub fn off(&self, kind: EventKind, subscriber: &str) -> bool {
        self.router.off(kind, subscriber)
    }

    pub fn dispatch(&self, event: &ServerEvent) -> usize {
        self.router.dispatch(event)
    }

    /// Closes the socket and waits for the channel task to finish. Completes even
    /// when nobody is draining the event receiver.
    pub async fn disconnect(mut self) {
        self.shutdown.send_replace(true);
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                log::warn!("Channel task ended abnormally: {err}");
            }
        }
    }
}

impl Emitter for SessionChannel {
    fn emit(&self, event: ClientEvent) {
        let name = event.name();
        if let Err(err) = self.command_sender.try_send(event) {
            log::warn!("Failed to queue `{name}` for the channel: {err}");
        }
    }
}

impl Drop for SessionChannel {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}


#[cfg(test)]
mod tests {
    use futures::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    use super::*;

    fn settings() -> ChannelSettings {
        ChannelSettings {
            url: "ws://127.0.0.1:9".into(),
            event_buffer: 16,
            reconnect_initial: Duration::from_secs(30),
            reconnect_max: Duration::from_secs(30),
        }
    }

    #[tokio::test]
    async fn disconnect_releases_the_channel_task() {
        let (channel, mut events) = SessionChannel::connect(settings(), "token");
        let mut state = channel.watch_state();

        // Drain notifications so the task never blocks on a full buffer.
        let drain = tokio::spawn(async move { while events.recv().await.is_some() {} });

        channel.disconnect().await;
        assert_eq!(*state.borrow_and_update(), ConnectionState::Disconnected);
        drain.await.unwrap();
    }

    #[tokio::test]
    async fn emit_while_down_does_not_block() {
        let (channel, _events) = SessionChannel::connect(settings(), "token");
        for _ in 0..64 {
            channel.emit(ClientEvent::GetUserId("u1".into()));
        }
        assert_eq!(channel.router().handler_count(EventKind::PeerInfo), 0);
    }

    /// Accepts one client and pushes `frames` presence events at it without pause.
    async fn flooding_server(frames: usize) -> (String, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut socket = tokio_tungstenite::accept_async(stream).await.unwrap();
            for i in 0..frames {
                let frame = format!(r#"{{"event":"users connected","data":["u{i}"]}}"#);
                if socket.send(Message::Text(frame.into())).await.is_err() {
                    return;
                }
            }
            while let Some(Ok(_)) = socket.next().await {}
        });
        (url, server)
    }

    #[tokio::test]
    async fn disconnect_completes_while_the_event_buffer_is_full() {
        let (url, server) = flooding_server(50).await;
        let (channel, _events) = SessionChannel::connect(
            ChannelSettings {
                url,
                event_buffer: 4,
                ..settings()
            },
            "token",
        );
        let mut state = channel.watch_state();
        tokio::time::timeout(
            Duration::from_secs(3),
            state.wait_for(|state| *state == ConnectionState::Connected),
        )
        .await
        .expect("channel never connected to the local server")
        .unwrap();
        // Let the pump fill the buffer and block on it.
        tokio::time::sleep(Duration::from_millis(200)).await;

        tokio::time::timeout(Duration::from_secs(3), channel.disconnect())
            .await
            .expect("disconnect should not wait for the application to drain events");
        assert_eq!(*state.borrow(), ConnectionState::Disconnected);
        server.abort();
    }
}
