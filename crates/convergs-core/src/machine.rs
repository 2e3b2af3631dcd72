//! Pure call and conversation state machine.
//!
//! No I/O and no timers live here. Every step that the async driver schedules
//! for later (ring delay, speaking delay, hang-up delay, a pending backend
//! reply) carries the [`Epoch`] it was scheduled under. The epoch advances on
//! every state change, so a step whose epoch is no longer current is stale and
//! is dropped without touching state.

use std::collections::BTreeMap;

use convergs_schema::{AgentState, CallState, Message, SendMessageRequest, SendMessageResponse};

use crate::qualification::QualificationTracker;

/// Identifies the machine state a deferred step was scheduled against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Epoch(u64);

/// The conversation with the remote agent for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Empty until the backend issues one.
    pub session_id: String,
    pub initial_prompt: Option<String>,
}

/// Operation refused because of the current state or its input. Callers may
/// ignore it; the state is untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{operation} ignored while call is {state}")]
    InvalidCallState {
        operation: &'static str,
        state: CallState,
    },
    #[error("message ignored while agent is {0}")]
    AgentBusy(AgentState),
    #[error("message is empty")]
    EmptyMessage,
    #[error("call session has been shut down")]
    Closed,
}

/// State change notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum CallEvent {
    CallStateChanged(CallState),
    AgentStateChanged(AgentState),
    MessageAppended(Message),
    QualificationUpdated {
        fields: BTreeMap<String, String>,
        complete: bool,
    },
    /// The call could not be connected and went back to idle.
    CallFailed { error: String },
    /// A turn produced no reply; the agent is listening again.
    TurnFailed { error: String },
    /// Session, transcript and qualification were discarded.
    SessionCleared,
}

/// A user turn waiting for the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTurn {
    pub epoch: Epoch,
    pub request: SendMessageRequest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Reply appended; the agent speaks until the returned epoch's timer fires.
    Replied { epoch: Epoch, message: Message },
    /// The backend answered `success = false`; the agent listens again.
    Rejected,
    /// The turn was superseded (call ended, instance reset).
    Stale,
}

#[derive(Debug)]
pub struct CallMachine {
    call_state: CallState,
    agent_state: AgentState,
    epoch: u64,
    greeting: String,
    persona_prompt: Option<String>,
    session: Option<Session>,
    transcript: Vec<Message>,
    qualification: QualificationTracker,
    outbox: Vec<CallEvent>,
}

impl CallMachine {
    pub fn new(greeting: impl Into<String>, qualification_keys: Vec<String>) -> Self {
        Self {
            call_state: CallState::Idle,
            agent_state: AgentState::Idle,
            epoch: 0,
            greeting: greeting.into(),
            persona_prompt: None,
            session: None,
            transcript: Vec::new(),
            qualification: QualificationTracker::new(qualification_keys),
            outbox: Vec::new(),
        }
    }

    // ------------------------------------------------------------
    // Read access
    // ------------------------------------------------------------

    pub fn call_state(&self) -> CallState {
        self.call_state
    }

    pub fn agent_state(&self) -> AgentState {
        self.agent_state
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn qualification(&self) -> &QualificationTracker {
        &self.qualification
    }

    pub fn persona_prompt(&self) -> Option<&str> {
        self.persona_prompt.as_deref()
    }

    pub fn is_current(&self, epoch: Epoch) -> bool {
        self.epoch == epoch.0
    }

    /// Drain the events produced since the last call.
    pub fn take_events(&mut self) -> Vec<CallEvent> {
        std::mem::take(&mut self.outbox)
    }

    // ------------------------------------------------------------
    // Persona
    // ------------------------------------------------------------

    /// Prompt used by the next `start_call`. A live session keeps the prompt
    /// it was created with.
    pub fn set_persona_prompt(&mut self, prompt: Option<String>) {
        self.persona_prompt = prompt.filter(|p| !p.trim().is_empty());
    }

    // ------------------------------------------------------------
    // Call lifecycle
    // ------------------------------------------------------------

    /// idle -> ringing. The returned epoch guards the ring timer.
    pub fn start_call(&mut self) -> Result<Epoch, ValidationError> {
        self.require_call_state("start_call", CallState::Idle)?;
        self.session = Some(Session {
            session_id: String::new(),
            initial_prompt: self.persona_prompt.clone(),
        });
        self.set_call_state(CallState::Ringing);
        Ok(self.advance())
    }

    /// Persona prompt to create the backend session with, if the ring timer
    /// scheduled under `epoch` is still current.
    pub fn ring_elapsed(&self, epoch: Epoch) -> Option<Option<String>> {
        if !self.is_current(epoch) || self.call_state != CallState::Ringing {
            return None;
        }
        Some(self.session.as_ref().and_then(|s| s.initial_prompt.clone()))
    }

    /// ringing -> connected with the scripted greeting. Returns the epoch that
    /// guards the greeting timer, or `None` if the ring was superseded.
    pub fn connect(&mut self, epoch: Epoch, session_id: impl Into<String>) -> Option<Epoch> {
        if !self.is_current(epoch) || self.call_state != CallState::Ringing {
            return None;
        }
        // start_call opened the session; only the backend id is missing.
        let persona = &self.persona_prompt;
        self.session
            .get_or_insert_with(|| Session {
                session_id: String::new(),
                initial_prompt: persona.clone(),
            })
            .session_id = session_id.into();
        self.set_call_state(CallState::Connected);
        self.set_agent_state(AgentState::Speaking);
        let greeting = Message::assistant(self.greeting.clone());
        self.append(greeting);
        Some(self.advance())
    }

    /// ringing -> idle after the backend refused to open a session.
    pub fn connect_failed(&mut self, epoch: Epoch, error: impl Into<String>) -> bool {
        if !self.is_current(epoch) || self.call_state != CallState::Ringing {
            return false;
        }
        self.session = None;
        self.set_call_state(CallState::Idle);
        self.outbox.push(CallEvent::CallFailed {
            error: error.into(),
        });
        self.advance();
        true
    }

    /// connected -> ended. The returned epoch guards the hang-up timer.
    pub fn end_call(&mut self) -> Result<Epoch, ValidationError> {
        self.require_call_state("end_call", CallState::Connected)?;
        self.set_call_state(CallState::Ended);
        Ok(self.advance())
    }

    /// ended -> idle, discarding session, transcript and qualification.
    pub fn hang_up(&mut self, epoch: Epoch) -> bool {
        if !self.is_current(epoch) || self.call_state != CallState::Ended {
            return false;
        }
        self.clear_session();
        self.set_call_state(CallState::Idle);
        self.set_agent_state(AgentState::Idle);
        self.advance();
        true
    }

    // ------------------------------------------------------------
    // Conversation turns
    // ------------------------------------------------------------

    /// speaking -> listening once the spoken reply (or greeting) is done.
    pub fn finish_speaking(&mut self, epoch: Epoch) -> bool {
        if !self.is_current(epoch)
            || self.call_state != CallState::Connected
            || self.agent_state != AgentState::Speaking
        {
            return false;
        }
        self.set_agent_state(AgentState::Listening);
        self.advance();
        true
    }

    /// listening -> thinking. The user message is appended before the request
    /// is handed back for dispatch.
    pub fn begin_turn(&mut self, text: &str) -> Result<PendingTurn, ValidationError> {
        self.require_call_state("submit_user_message", CallState::Connected)?;
        if self.agent_state != AgentState::Listening {
            return Err(ValidationError::AgentBusy(self.agent_state));
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(ValidationError::EmptyMessage);
        }
        let session_id = self
            .session
            .as_ref()
            .map(|s| s.session_id.clone())
            .unwrap_or_default();

        self.append(Message::user(text));
        self.set_agent_state(AgentState::Thinking);
        Ok(PendingTurn {
            epoch: self.advance(),
            request: SendMessageRequest::new(session_id, text),
        })
    }

    /// Apply the backend's answer to the turn scheduled under `epoch`.
    pub fn complete_turn(&mut self, epoch: Epoch, response: SendMessageResponse) -> TurnOutcome {
        if !self.is_thinking_at(epoch) {
            return TurnOutcome::Stale;
        }
        if !response.success {
            self.set_agent_state(AgentState::Listening);
            self.outbox.push(CallEvent::TurnFailed {
                error: "agent did not produce a reply".into(),
            });
            self.advance();
            return TurnOutcome::Rejected;
        }

        let message = Message::assistant(response.response);
        self.append(message.clone());
        if self.qualification.merge(
            response.qualification.as_ref(),
            response.qualification_complete,
        ) {
            self.outbox.push(CallEvent::QualificationUpdated {
                fields: self.qualification.fields().clone(),
                complete: self.qualification.is_complete(),
            });
        }
        self.set_agent_state(AgentState::Speaking);
        TurnOutcome::Replied {
            epoch: self.advance(),
            message,
        }
    }

    /// thinking -> listening after a transport or service failure. Nothing is
    /// appended to the transcript.
    pub fn fail_turn(&mut self, epoch: Epoch, error: impl Into<String>) -> bool {
        if !self.is_thinking_at(epoch) {
            return false;
        }
        self.set_agent_state(AgentState::Listening);
        self.outbox.push(CallEvent::TurnFailed {
            error: error.into(),
        });
        self.advance();
        true
    }

    // ------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------

    fn is_thinking_at(&self, epoch: Epoch) -> bool {
        self.is_current(epoch)
            && self.call_state == CallState::Connected
            && self.agent_state == AgentState::Thinking
    }

    fn require_call_state(
        &self,
        operation: &'static str,
        expected: CallState,
    ) -> Result<(), ValidationError> {
        if self.call_state == expected {
            Ok(())
        } else {
            Err(ValidationError::InvalidCallState {
                operation,
                state: self.call_state,
            })
        }
    }

    fn advance(&mut self) -> Epoch {
        self.epoch += 1;
        Epoch(self.epoch)
    }

    fn set_call_state(&mut self, state: CallState) {
        if self.call_state != state {
            self.call_state = state;
            self.outbox.push(CallEvent::CallStateChanged(state));
        }
    }

    fn set_agent_state(&mut self, state: AgentState) {
        if self.agent_state != state {
            self.agent_state = state;
            self.outbox.push(CallEvent::AgentStateChanged(state));
        }
    }

    fn append(&mut self, message: Message) {
        self.transcript.push(message.clone());
        self.outbox.push(CallEvent::MessageAppended(message));
    }

    fn clear_session(&mut self) {
        self.session = None;
        self.transcript.clear();
        self.qualification.clear();
        self.outbox.push(CallEvent::SessionCleared);
    }
}
