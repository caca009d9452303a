use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, sleep_until};
use tokio_tungstenite::tungstenite::Message;

use crate::common::{ClientEvent, ConnectionState, NetworkEvent, ServerEvent};
use crate::error::Result;

use super::transport::{ChannelStream, build_transport};

/// Exponential reconnect delay, reset after every successful handshake.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let max = max.max(initial);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Owns the websocket for the lifetime of the application: dials, pumps frames in
/// both directions and redials after a drop until `shutdown` flips to true.
///
/// Every await point also watches `shutdown`, so a caller that stopped draining
/// `event_sender` can still tear the task down.
pub struct ChannelClient {
    url: String,
    token: String,
    backoff: Backoff,
    state: watch::Sender<ConnectionState>,
    event_sender: mpsc::Sender<NetworkEvent>,
    command_receiver: mpsc::Receiver<ClientEvent>,
    shutdown: watch::Receiver<bool>,
}

impl ChannelClient {
    pub fn new(
        url: String,
        token: String,
        backoff: Backoff,
        state: watch::Sender<ConnectionState>,
        event_sender: mpsc::Sender<NetworkEvent>,
        command_receiver: mpsc::Receiver<ClientEvent>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            url,
            token,
            backoff,
            state,
            event_sender,
            command_receiver,
            shutdown,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        log::info!("Channel event loop started for {}", self.url);

        loop {
            if self.publish(ConnectionState::Connecting).await == Flow::Stop {
                break;
            }

            let connected = tokio::select! {
                biased;
                _ = stopped(&mut self.shutdown) => break,
                connected = build_transport(&self.url, &self.token) => connected,
            };

            match connected {
                Ok(stream) => {
                    self.backoff.reset();
                    if self.publish(ConnectionState::Connected).await == Flow::Stop {
                        break;
                    }
                    let flow = self.pump(stream).await;
                    self.publish(ConnectionState::Disconnected).await;
                    if flow == Flow::Stop {
                        break;
                    }
                }
                Err(err) => {
                    log::warn!("Channel connect to {} failed: {err}", self.url);
                    if self.publish(ConnectionState::Disconnected).await == Flow::Stop {
                        break;
                    }
                }
            }

            let delay = self.backoff.next_delay();
            log::debug!("Reconnecting in {delay:?}");
            if self.wait_before_retry(delay).await == Flow::Stop {
                break;
            }
        }

        self.state.send_replace(ConnectionState::Disconnected);
        log::info!("Channel event loop stopped");
        Ok(())
    }

    async fn pump(&mut self, stream: ChannelStream) -> Flow {
        let (mut write, mut read) = stream.split();

        loop {
            // Queued emits go out before a pending shutdown closes the socket.
            let stop = tokio::select! {
                biased;
                command = self.command_receiver.recv() => match command {
                    Some(event) => match event.to_frame() {
                        Ok(frame) => {
                            log::trace!("-> {frame}");
                            if let Err(err) = write.send(Message::Text(frame.into())).await {
                                log::warn!("Failed to emit `{}`: {err}", event.name());
                                return Flow::Continue;
                            }
                            false
                        }
                        Err(err) => {
                            log::warn!("Failed to serialize `{}`: {err}", event.name());
                            false
                        }
                    },
                    None => true,
                },
                _ = stopped(&mut self.shutdown) => true,
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.handle_frame(&text).await == Flow::Stop,
                    Some(Ok(Message::Close(frame))) => {
                        log::info!("Server closed the channel: {frame:?}");
                        return Flow::Continue;
                    }
                    Some(Ok(_)) => false,
                    Some(Err(err)) => {
                        log::warn!("Channel read error: {err}");
                        return Flow::Continue;
                    }
                    None => return Flow::Continue,
                },
            };

            if stop {
                if let Err(err) = write.send(Message::Close(None)).await {
                    log::debug!("Close frame not delivered: {err}");
                }
                return Flow::Stop;
            }
        }
    }

    async fn handle_frame(&mut self, text: &str) -> Flow {
        log::trace!("<- {text}");
        match ServerEvent::decode(text) {
            Ok(event) => self.forward(NetworkEvent::Received(event)).await,
            Err(err) => {
                log::warn!("Dropping inbound frame: {err}");
                Flow::Continue
            }
        }
    }

    async fn publish(&mut self, state: ConnectionState) -> Flow {
        self.state.send_replace(state);
        self.forward(NetworkEvent::StateChanged(state)).await
    }

    /// Waits for room in the event buffer unless shutdown is requested first.
    async fn forward(&mut self, event: NetworkEvent) -> Flow {
        tokio::select! {
            biased;
            sent = self.event_sender.send(event) => {
                if sent.is_err() {
                    log::debug!("Application loop is gone; stopping channel");
                    return Flow::Stop;
                }
                Flow::Continue
            }
            _ = stopped(&mut self.shutdown) => {
                log::debug!("Shutdown requested while the event buffer was full");
                Flow::Stop
            }
        }
    }

    async fn wait_before_retry(&mut self, delay: Duration) -> Flow {
        let deadline = Instant::now() + delay;
        loop {
            tokio::select! {
                biased;
                _ = stopped(&mut self.shutdown) => return Flow::Stop,
                _ = sleep_until(deadline) => return Flow::Continue,
                command = self.command_receiver.recv() => match command {
                    Some(event) => {
                        log::warn!("Dropping `{}` while the channel is down", event.name());
                    }
                    None => return Flow::Stop,
                },
            }
        }
    }
}

/// Resolves once shutdown is requested or its sender is gone.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
