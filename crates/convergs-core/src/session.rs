//! Async driver for [`CallMachine`]: owns the timers and backend calls.
//!
//! Operations are fire-and-forget. They apply their immediate state change
//! synchronously and spawn the deferred part onto the tokio runtime, so they
//! must be called from within one. Every spawned step races the session's
//! cancellation token and re-checks its epoch before applying anything.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use convergs_provider::AgentBackend;
use convergs_schema::{AgentState, CallState, Message};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{CallConfig, PlaygroundConfig};
use crate::machine::{CallEvent, CallMachine, Epoch, PendingTurn, TurnOutcome, ValidationError};
use crate::qualification::default_qualification_keys;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub call: CallConfig,
    pub qualification_keys: Vec<String>,
    pub persona_prompt: Option<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            call: CallConfig::default(),
            qualification_keys: default_qualification_keys(),
            persona_prompt: None,
        }
    }
}

impl SessionOptions {
    pub fn from_config(config: &PlaygroundConfig, persona_prompt: Option<String>) -> Self {
        Self {
            call: config.call.clone(),
            qualification_keys: config.qualification_keys.clone(),
            persona_prompt,
        }
    }
}

/// Read-only view of a call for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct CallSnapshot {
    pub call_state: CallState,
    pub agent_state: AgentState,
    pub session_id: Option<String>,
    pub initial_prompt: Option<String>,
    pub transcript: Vec<Message>,
    pub qualification: BTreeMap<String, String>,
    pub qualification_complete: bool,
    pub pending_keys: Vec<String>,
}

struct Inner {
    machine: Mutex<CallMachine>,
    backend: Arc<dyn AgentBackend>,
    call: CallConfig,
    events: broadcast::Sender<CallEvent>,
    cancel: CancellationToken,
}

/// Handle to one live call/conversation instance. Clones share the instance.
#[derive(Clone)]
pub struct CallSession {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CallSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSession")
            .field("call_state", &self.call_state())
            .field("agent_state", &self.agent_state())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl CallSession {
    pub fn new(backend: Arc<dyn AgentBackend>, options: SessionOptions) -> Self {
        let mut machine = CallMachine::new(options.call.greeting.clone(), options.qualification_keys);
        machine.set_persona_prompt(options.persona_prompt);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                machine: Mutex::new(machine),
                backend,
                call: options.call,
                events,
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.inner.events.subscribe()
    }

    pub fn call_state(&self) -> CallState {
        self.machine().call_state()
    }

    pub fn agent_state(&self) -> AgentState {
        self.machine().agent_state()
    }

    pub fn snapshot(&self) -> CallSnapshot {
        let m = self.machine();
        let qualification = m.qualification();
        CallSnapshot {
            call_state: m.call_state(),
            agent_state: m.agent_state(),
            session_id: m
                .session()
                .map(|s| s.session_id.clone())
                .filter(|id| !id.is_empty()),
            initial_prompt: m.session().and_then(|s| s.initial_prompt.clone()),
            transcript: m.transcript().to_vec(),
            qualification: qualification.fields().clone(),
            qualification_complete: qualification.is_complete(),
            pending_keys: qualification
                .pending_keys()
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }

    /// Persona for the next call started on this instance.
    pub fn set_persona_prompt(&self, prompt: Option<String>) {
        self.machine().set_persona_prompt(prompt);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Cancel every pending timer and in-flight request of this instance.
    /// Late completions are dropped; further operations are refused.
    pub fn shutdown(&self) {
        if !self.inner.cancel.is_cancelled() {
            debug!("call session shut down");
            self.inner.cancel.cancel();
        }
    }

    // ------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------

    /// idle -> ringing; after the ring delay the backend session is created
    /// and the call connects, or falls back to idle on failure.
    pub fn start_call(&self) -> Result<(), ValidationError> {
        let epoch = self.apply(|m| m.start_call())?;
        info!("call ringing");
        let this = self.clone();
        tokio::spawn(async move { this.ring(epoch).await });
        Ok(())
    }

    /// connected -> ended; after the hang-up delay everything is cleared.
    pub fn end_call(&self) -> Result<(), ValidationError> {
        let epoch = self.apply(|m| m.end_call())?;
        info!("call ended");
        let this = self.clone();
        tokio::spawn(async move { this.hang_up(epoch).await });
        Ok(())
    }

    /// Append the user's message and ask the backend for a reply.
    pub fn submit_user_message(&self, text: &str) -> Result<(), ValidationError> {
        let turn = self.apply(|m| m.begin_turn(text))?;
        debug!(chars = turn.request.text.chars().count(), "user turn submitted");
        let this = self.clone();
        tokio::spawn(async move { this.run_turn(turn).await });
        Ok(())
    }

    // ------------------------------------------------------------
    // Deferred steps
    // ------------------------------------------------------------

    async fn ring(self, epoch: Epoch) {
        if !self.sleep(self.inner.call.ring_delay()).await {
            return;
        }
        let ready = self.apply_step(|m| m.ring_elapsed(epoch)).flatten();
        let Some(prompt) = ready else {
            debug!("ring timer superseded");
            return;
        };

        let result = tokio::select! {
            _ = self.inner.cancel.cancelled() => return,
            result = self.inner.backend.create_session(prompt.as_deref()) => result,
        };

        match result {
            Ok(created) => {
                let session_id = created.session_id;
                let greeting = self
                    .apply_step(|m| m.connect(epoch, session_id.clone()))
                    .flatten();
                if let Some(greeting_epoch) = greeting {
                    info!(%session_id, "call connected");
                    self.schedule_finish_speaking(greeting_epoch, self.inner.call.greeting_delay());
                }
            }
            Err(err) => {
                let error = err.to_string();
                if self
                    .apply_step(|m| m.connect_failed(epoch, error.clone()))
                    .unwrap_or(false)
                {
                    warn!(kind = ?err.kind(), "call failed to connect: {error}");
                }
            }
        }
    }

    async fn hang_up(self, epoch: Epoch) {
        if !self.sleep(self.inner.call.hangup_delay()).await {
            return;
        }
        if self.apply_step(|m| m.hang_up(epoch)).unwrap_or(false) {
            info!("call reset to idle");
        }
    }

    async fn run_turn(self, turn: PendingTurn) {
        let result = tokio::select! {
            _ = self.inner.cancel.cancelled() => return,
            result = self.inner.backend.send_message(&turn.request) => result,
        };

        match result {
            Ok(response) => match self
                .apply_step(|m| m.complete_turn(turn.epoch, response))
                .unwrap_or(TurnOutcome::Stale)
            {
                TurnOutcome::Replied { epoch, message } => {
                    let delay = self.inner.call.speaking.delay_for(&message.content);
                    debug!(delay_ms = delay.as_millis() as u64, "agent speaking");
                    self.schedule_finish_speaking(epoch, delay);
                }
                TurnOutcome::Rejected => warn!("agent reported an unsuccessful turn"),
                TurnOutcome::Stale => debug!("reply for a superseded turn dropped"),
            },
            Err(err) => {
                let error = err.to_string();
                if self
                    .apply_step(|m| m.fail_turn(turn.epoch, error.clone()))
                    .unwrap_or(false)
                {
                    warn!(kind = ?err.kind(), "turn failed: {error}");
                }
            }
        }
    }

    fn schedule_finish_speaking(&self, epoch: Epoch, delay: Duration) {
        let this = self.clone();
        tokio::spawn(async move {
            if this.sleep(delay).await {
                this.apply_step(|m| m.finish_speaking(epoch));
            }
        });
    }

    // ------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------

    fn machine(&self) -> MutexGuard<'_, CallMachine> {
        // The machine never panics mid-update, so a poisoned lock still holds
        // a consistent state.
        self.inner
            .machine
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Run a user operation against the machine and publish its events.
    fn apply<T>(
        &self,
        op: impl FnOnce(&mut CallMachine) -> Result<T, ValidationError>,
    ) -> Result<T, ValidationError> {
        if self.is_closed() {
            return Err(ValidationError::Closed);
        }
        let result = self.apply_quiet(op);
        if let Err(err) = &result {
            debug!("operation ignored: {err}");
        }
        result
    }

    /// Run a deferred step. A step that outlived its instance is dropped.
    fn apply_step<T>(&self, op: impl FnOnce(&mut CallMachine) -> T) -> Option<T> {
        if self.is_closed() {
            debug!("deferred step dropped after shutdown");
            return None;
        }
        Some(self.apply_quiet(op))
    }

    fn apply_quiet<T>(&self, op: impl FnOnce(&mut CallMachine) -> T) -> T {
        let (result, events) = {
            let mut m = self.machine();
            let result = op(&mut m);
            (result, m.take_events())
        };
        for event in events {
            let _ = self.inner.events.send(event);
        }
        result
    }

    async fn sleep(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = self.inner.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}
