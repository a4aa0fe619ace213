//! `SessionControllerActor` - runs a joined [`SessionController`] on a task.
//!
//! The actor is the page's single event loop. It owns the controller and
//! serialises everything that touches it:
//! - UI commands from [`SessionControllerHandle`]
//! - session events (streams, archives, signals)
//! - screen publisher events
//! - the resize debounce and the delayed relayout after a stream leaves
//!
//! # Lifecycle
//!
//! 1. Spawned after `SessionController::initialize` returned `Joined`
//! 2. Runs until `EndCall`, cancellation, or every handle is dropped
//! 3. `EndCall` tears down, waits `TEARDOWN_DELAY`, then publishes the
//!    navigation target on the handle's watch channel

use super::{
    ControllerCommand, ControllerState, FollowUp, Navigation, RecordingIndicator,
    SessionController, STREAM_DESTROYED_RELAYOUT_DELAY, TEARDOWN_DELAY,
};
use crate::chat::ChatEntry;
use crate::errors::ClientError;
use crate::layout::{Debouncer, DelayQueue, TilePlacement, RESIZE_DEBOUNCE};
use crate::sdk::{PublisherEvent, SessionEvent};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Mailbox size for UI commands.
const CONTROLLER_CHANNEL_BUFFER: usize = 64;

/// Point-in-time view of the controller for rendering.
#[derive(Debug, Clone)]
pub struct ControllerSnapshot {
    pub state: ControllerState,
    pub recording: RecordingIndicator,
    pub sharing: bool,
    pub chat_visible: bool,
    pub unread: usize,
    pub chat: Vec<ChatEntry>,
    pub placements: Vec<TilePlacement>,
}

impl ControllerSnapshot {
    fn of(controller: &SessionController) -> Self {
        Self {
            state: controller.state(),
            recording: controller.recording().clone(),
            sharing: controller.is_sharing(),
            chat_visible: controller.chat().is_visible(),
            unread: controller.chat().unread(),
            chat: controller.chat().entries().to_vec(),
            placements: controller.placements().to_vec(),
        }
    }
}

enum ControllerMessage {
    Command {
        command: ControllerCommand,
        respond_to: oneshot::Sender<Result<(), ClientError>>,
    },
    Snapshot {
        respond_to: oneshot::Sender<ControllerSnapshot>,
    },
}

/// Handle to a running `SessionControllerActor`.
#[derive(Clone, Debug)]
pub struct SessionControllerHandle {
    sender: mpsc::Sender<ControllerMessage>,
    cancel_token: CancellationToken,
    navigation: watch::Receiver<Option<Navigation>>,
}

impl std::fmt::Debug for ControllerMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerMessage::Command { command, .. } => {
                f.debug_struct("Command").field("command", command).finish()
            }
            ControllerMessage::Snapshot { .. } => f.write_str("Snapshot"),
        }
    }
}

impl SessionControllerHandle {
    /// Apply a UI command and wait for its result.
    ///
    /// # Errors
    ///
    /// The command's own error, or `ClientError::ControllerClosed` if the
    /// actor has stopped.
    pub async fn command(&self, command: ControllerCommand) -> Result<(), ClientError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ControllerMessage::Command {
                command,
                respond_to: tx,
            })
            .await
            .map_err(|_| ClientError::ControllerClosed)?;

        rx.await.map_err(|_| ClientError::ControllerClosed)?
    }

    pub async fn snapshot(&self) -> Result<ControllerSnapshot, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ControllerMessage::Snapshot { respond_to: tx })
            .await
            .map_err(|_| ClientError::ControllerClosed)?;

        rx.await.map_err(|_| ClientError::ControllerClosed)
    }

    /// Navigation target, set once after the call ends.
    pub fn navigation(&self) -> watch::Receiver<Option<Navigation>> {
        self.navigation.clone()
    }

    /// Cancel the actor. The session is torn down without navigating.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// Event loop around a [`SessionController`].
pub struct SessionControllerActor {
    controller: SessionController,
    receiver: mpsc::Receiver<ControllerMessage>,
    cancel_token: CancellationToken,
    navigation: watch::Sender<Option<Navigation>>,
    session_events: Option<broadcast::Receiver<SessionEvent>>,
    screen_events: Option<broadcast::Receiver<PublisherEvent>>,
    resize: Debouncer,
    delayed_relayout: DelayQueue,
}

impl SessionControllerActor {
    /// Spawn the actor.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        mut controller: SessionController,
        cancel_token: CancellationToken,
    ) -> (SessionControllerHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(CONTROLLER_CHANNEL_BUFFER);
        let (navigation_tx, navigation_rx) = watch::channel(None);

        let actor = Self {
            session_events: controller.take_session_events(),
            screen_events: controller.take_screen_events(),
            controller,
            receiver,
            cancel_token: cancel_token.clone(),
            navigation: navigation_tx,
            resize: Debouncer::new(RESIZE_DEBOUNCE),
            delayed_relayout: DelayQueue::new(STREAM_DESTROYED_RELAYOUT_DELAY),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = SessionControllerHandle {
            sender,
            cancel_token,
            navigation: navigation_rx,
        };

        (handle, task_handle)
    }

    #[instrument(skip_all, name = "client.actor.controller")]
    async fn run(mut self) {
        debug!(target: "client.actor.controller", "SessionControllerActor started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(target: "client.actor.controller", "SessionControllerActor received cancellation signal");
                    self.controller.teardown().await;
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            if self.handle_message(message).await {
                                break;
                            }
                        }
                        None => {
                            debug!(target: "client.actor.controller", "All handles dropped, exiting");
                            self.controller.teardown().await;
                            break;
                        }
                    }
                }

                event = next_event(&mut self.session_events) => {
                    match event {
                        Some(event) => {
                            let follow_up = self.controller.handle_session_event(event).await;
                            self.schedule(follow_up);
                        }
                        None => self.session_events = None,
                    }
                }

                event = next_event(&mut self.screen_events) => {
                    match event {
                        Some(event) => {
                            let follow_up = self.controller.handle_publisher_event(event);
                            self.schedule(follow_up);
                        }
                        None => self.screen_events = None,
                    }
                }

                () = self.resize.wait() => {
                    self.controller.relayout();
                }

                () = self.delayed_relayout.wait() => {
                    self.controller.relayout();
                }
            }
        }

        info!(
            target: "client.actor.controller",
            state = ?self.controller.state(),
            "SessionControllerActor stopped"
        );
    }

    /// Handle a single message. Returns true if the actor should exit.
    async fn handle_message(&mut self, message: ControllerMessage) -> bool {
        match message {
            ControllerMessage::Command {
                command,
                respond_to,
            } => {
                let result = self.controller.handle_command(command).await;

                // A new screen publisher brings its own event stream.
                if let Some(events) = self.controller.take_screen_events() {
                    self.screen_events = Some(events);
                } else if !self.controller.is_sharing() {
                    self.screen_events = None;
                }

                match result {
                    Ok(FollowUp::Navigate(navigation)) => {
                        let _ = respond_to.send(Ok(()));
                        tokio::time::sleep(TEARDOWN_DELAY).await;
                        let _ = self.navigation.send(Some(navigation));
                        true
                    }
                    Ok(follow_up) => {
                        self.schedule(follow_up);
                        let _ = respond_to.send(Ok(()));
                        false
                    }
                    Err(e) => {
                        warn!(target: "client.actor.controller", error = %e, "Command failed");
                        let _ = respond_to.send(Err(e));
                        false
                    }
                }
            }

            ControllerMessage::Snapshot { respond_to } => {
                let _ = respond_to.send(ControllerSnapshot::of(&self.controller));
                false
            }
        }
    }

    fn schedule(&mut self, follow_up: FollowUp) {
        match follow_up {
            FollowUp::None => {}
            FollowUp::DelayedRelayout => self.delayed_relayout.schedule(),
            FollowUp::DebouncedRelayout => self.resize.schedule(),
            // Only commands navigate.
            FollowUp::Navigate(_) => {}
        }
    }
}

/// Next event from an optional broadcast receiver.
///
/// Pending forever when there is no receiver. `None` once the sender is gone.
async fn next_event<T: Clone>(receiver: &mut Option<broadcast::Receiver<T>>) -> Option<T> {
    let Some(receiver) = receiver.as_mut() else {
        return std::future::pending().await;
    };
    loop {
        match receiver.recv().await {
            Ok(event) => return Some(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(target: "client.actor.controller", skipped, "Event receiver lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}
