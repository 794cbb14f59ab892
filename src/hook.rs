//! Frame hook: binds a stream session to the host's per-channel hook.
//!
//! The host calls [`FrameSink::on_frame`] for every frame read from or
//! written to the channel, and [`FrameSink::on_teardown`] once when the hook
//! is destroyed (hangup, masquerade, module unload...). Frames always pass
//! through unchanged; forking is a side channel.
//!
//! Lifecycle: `Idle -> Attached -> Destroyed`. The session sits behind a
//! read/write lock: frame delivery holds the read side for the duration of a
//! send, teardown takes the write side, so the socket is never closed under
//! an in-flight send.

use std::sync::atomic::{AtomicU8, Ordering};

use log::{debug, error, info, log, warn};
use parking_lot::RwLock;

use crate::args::ForkArgs;
use crate::config;
use crate::error::{ForkError, ForkResult};
use crate::session::{StatsSnapshot, StreamSession};
use crate::stream_id::StreamIdGenerator;
use crate::tlv::{Direction, StreamMetadata};

/// Host hook events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookEvent {
    /// Frame read from the channel
    Read,
    /// Frame written to the channel
    Write,
    /// Hook was attached to the channel
    Attached,
    /// Hook was detached from the channel
    Detached,
}

impl HookEvent {
    /// Audio direction for frame events, `None` for the rest.
    pub fn direction(&self) -> Option<Direction> {
        match self {
            HookEvent::Read => Some(Direction::Rx),
            HookEvent::Write => Some(Direction::Tx),
            HookEvent::Attached | HookEvent::Detached => None,
        }
    }
}

/// Host frame classification. Only voice frames are forked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Voice,
    Video,
    Dtmf,
    Control,
    Other,
}

/// A frame as seen by the hook. The payload is opaque codec bytes.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub kind: FrameKind,
    pub data: &'a [u8],
}

impl<'a> Frame<'a> {
    pub fn voice(data: &'a [u8]) -> Self {
        Self {
            kind: FrameKind::Voice,
            data,
        }
    }
}

/// Interface the host drives for one hooked channel.
pub trait FrameSink: Send + Sync {
    /// Observe one frame and hand it back unchanged.
    fn on_frame<'a>(&self, event: HookEvent, frame: Frame<'a>) -> Frame<'a>;

    /// Release everything bound to the hook.
    ///
    /// Returns true for the single call that actually performed destruction.
    fn on_teardown(&self) -> bool;
}

/// Hook lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HookState {
    /// Created, no session yet
    Idle = 0,
    /// Session running, frames are forked
    Attached = 1,
    /// Terminal; the session is gone
    Destroyed = 2,
}

impl HookState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => HookState::Idle,
            1 => HookState::Attached,
            _ => HookState::Destroyed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HookState::Idle => "IDLE",
            HookState::Attached => "ATTACHED",
            HookState::Destroyed => "DESTROYED",
        }
    }
}

/// Fork stream hook for one channel.
pub struct ForkHook {
    state: AtomicU8,
    session: RwLock<Option<StreamSession>>,
    channel_name: String,
}

impl ForkHook {
    /// Create an idle hook for `channel_name`.
    pub fn new(channel_name: &str) -> Self {
        Self {
            state: AtomicU8::new(HookState::Idle as u8),
            session: RwLock::new(None),
            channel_name: channel_name.to_string(),
        }
    }

    /// Create a hook and start forking right away.
    pub fn attach(
        args: &ForkArgs,
        channel_name: &str,
        ids: &StreamIdGenerator,
    ) -> ForkResult<Self> {
        let hook = Self::new(channel_name);
        hook.start(args, ids)?;
        Ok(hook)
    }

    /// Open the session, announce both directions and enter `Attached`.
    ///
    /// A setup failure moves the hook straight to `Destroyed`.
    pub fn start(&self, args: &ForkArgs, ids: &StreamIdGenerator) -> ForkResult<()> {
        let mut slot = self.session.write();
        if self.state() != HookState::Idle {
            return Err(ForkError::NotIdle);
        }

        let metadata = if args.needs_channel_name() {
            StreamMetadata::new(
                &self.channel_name,
                &args.metadata.exten,
                &args.metadata.caller_id,
                &args.metadata.called_id,
            )
        } else {
            args.metadata.clone()
        };

        let session = match StreamSession::open(args.destination, metadata, ids) {
            Ok(session) => session,
            Err(e) => {
                self.state.store(HookState::Destroyed as u8, Ordering::Release);
                error!(
                    "ForkStream: Failed to set up stream to {} on channel {}: {}",
                    args.destination, self.channel_name, e
                );
                return Err(e);
            }
        };

        for direction in [Direction::Rx, Direction::Tx] {
            if let Err(e) = session.send_signaling(direction) {
                warn!(
                    "ForkStream: Failed to send signaling packet (direction: {}): {}",
                    direction.as_str(),
                    e
                );
            }
        }

        let stream_id = session.stream_id();

        // Teardown may have raced setup; it wins and the fresh session is dropped
        if self
            .state
            .compare_exchange(
                HookState::Idle as u8,
                HookState::Attached as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Err(ForkError::NotIdle);
        }
        *slot = Some(session);

        info!(
            "ForkStream: Successfully initialized for {} on channel {} (stream_id: {})",
            args.destination, self.channel_name, stream_id
        );
        Ok(())
    }

    pub fn state(&self) -> HookState {
        HookState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Run `f` against the running session under one read lock.
    ///
    /// Teardown cannot interleave, so everything `f` reads belongs to the
    /// same live session. `None` once the hook is idle or destroyed.
    pub fn with_session<R>(&self, f: impl FnOnce(&StreamSession) -> R) -> Option<R> {
        self.session.read().as_ref().map(f)
    }

    /// Stream id of the running session.
    pub fn stream_id(&self) -> Option<u32> {
        self.with_session(|s| s.stream_id())
    }

    /// Current sequence counter for `direction`.
    pub fn sequence(&self, direction: Direction) -> Option<u32> {
        self.with_session(|s| s.sequence(direction))
    }

    pub fn stats(&self) -> Option<StatsSnapshot> {
        self.with_session(|s| s.stats())
    }

    /// Fork one frame. Returns true if a packet was sent.
    pub fn forward(&self, direction: Direction, data: &[u8]) -> bool {
        if self.state() != HookState::Attached {
            return false;
        }

        let slot = self.session.read();
        // Torn down between the state check and the lock
        let Some(session) = slot.as_ref() else {
            return false;
        };

        let sequence = session.record_frame(direction);
        match session.send_sequenced(direction, sequence, data) {
            Ok(_) => {
                if config::frame_logging_enabled() {
                    log!(
                        config::FRAME_LOG_LEVEL,
                        "ForkStream: Sent {} frame on channel {}: {} bytes (seq: {})",
                        direction.as_str(),
                        self.channel_name,
                        data.len(),
                        sequence
                    );
                }
                true
            }
            Err(ForkError::OversizedFrame { len }) => {
                warn!(
                    "ForkStream: Dropping oversized {} frame on channel {}: {} bytes (seq: {})",
                    direction.as_str(),
                    self.channel_name,
                    len,
                    sequence
                );
                false
            }
            Err(e) => {
                warn!(
                    "ForkStream: Failed to send audio packet (direction: {}, seq: {}): {}",
                    direction.as_str(),
                    sequence,
                    e
                );
                false
            }
        }
    }

    /// Filter a host event and fork it if it carries voice.
    ///
    /// Returns true if a packet was sent.
    pub fn observe(&self, event: HookEvent, frame: &Frame<'_>) -> bool {
        if frame.kind != FrameKind::Voice || frame.data.is_empty() {
            return false;
        }

        match event.direction() {
            Some(direction) => self.forward(direction, frame.data),
            None => false,
        }
    }

    /// Tear the hook down. Only the first caller does any work.
    pub fn teardown(&self) -> bool {
        let previous = HookState::from_u8(
            self.state
                .swap(HookState::Destroyed as u8, Ordering::AcqRel),
        );
        if previous == HookState::Destroyed {
            return false;
        }

        // Waits for in-flight sends to release the read side
        let session = self.session.write().take();
        let stream_id = session.as_ref().map(|s| s.stream_id());
        drop(session);

        match stream_id {
            Some(id) => info!(
                "ForkStream: Resource cleanup completed on channel {} (stream_id: {})",
                self.channel_name, id
            ),
            None => debug!(
                "ForkStream: Hook on channel {} destroyed before attaching",
                self.channel_name
            ),
        }
        true
    }
}

impl FrameSink for ForkHook {
    fn on_frame<'a>(&self, event: HookEvent, frame: Frame<'a>) -> Frame<'a> {
        self.observe(event, &frame);
        frame
    }

    fn on_teardown(&self) -> bool {
        self.teardown()
    }
}

impl Drop for ForkHook {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for ForkHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForkHook")
            .field("channel_name", &self.channel_name)
            .field("state", &self.state())
            .finish()
    }
}
