//! Terminal stand-in for the phone UI: typed lines are the user's speech,
//! slash commands drive the call controls.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use convergs_core::{
    AuthContext, CallEvent, CallSession, Playground, PlaygroundConfig, StaticIdentity, UserProfile,
};
use convergs_provider::{create_backend, AgentBackend, StubAgentBackend};
use convergs_schema::{qualification_label, AgentState, CallState, Role};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Env var seeding the locally signed-in user's display name.
pub const USER_ENV: &str = "CONVERGS_USER";

const OFFLINE_LATENCY: Duration = Duration::from_millis(800);

pub struct CallOptions {
    pub preset: Option<String>,
    pub prompt: Option<String>,
    pub offline: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Say(String),
    Start,
    End,
    Restart,
    Preset(String),
    Prompt(String),
    Status,
    Login(Option<String>),
    Logout,
    Whoami,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    if line == "quit" || line == "exit" {
        return Input::Quit;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Say(line.to_string());
    };
    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };
    let arg = (!arg.is_empty()).then(|| arg.to_string());
    match (name, arg) {
        ("start", _) => Input::Start,
        ("end", _) => Input::End,
        ("restart", _) => Input::Restart,
        ("preset", Some(key)) => Input::Preset(key),
        ("prompt", Some(text)) => Input::Prompt(text),
        ("status", _) => Input::Status,
        ("login", name) => Input::Login(name),
        ("logout", _) => Input::Logout,
        ("whoami", _) => Input::Whoami,
        ("help", _) => Input::Help,
        ("quit" | "exit", _) => Input::Quit,
        _ => Input::Unknown(line.to_string()),
    }
}

/// One line of output for an event, `None` for events the user already sees.
fn render_event(event: &CallEvent) -> Option<String> {
    match event {
        CallEvent::CallStateChanged(CallState::Ringing) => Some("[call] ringing...".into()),
        CallEvent::CallStateChanged(CallState::Connected) => Some("[call] connected".into()),
        CallEvent::CallStateChanged(CallState::Ended) => Some("[call] hanging up".into()),
        CallEvent::CallStateChanged(CallState::Idle) => None,
        CallEvent::AgentStateChanged(AgentState::Thinking) => Some("[agent] thinking...".into()),
        CallEvent::AgentStateChanged(AgentState::Listening) => Some("[agent] listening".into()),
        CallEvent::AgentStateChanged(_) => None,
        CallEvent::MessageAppended(message) => match message.role {
            Role::Assistant => Some(format!("Emma: {}", message.content)),
            Role::User => None,
        },
        CallEvent::QualificationUpdated { fields, complete } => {
            let mut parts: Vec<String> = fields
                .iter()
                .map(|(key, value)| format!("{}: {value}", qualification_label(key)))
                .collect();
            if *complete {
                parts.push("complete".into());
            }
            Some(format!("[qualification] {}", parts.join(", ")))
        }
        CallEvent::CallFailed { error } => Some(format!("[call] could not connect: {error}")),
        CallEvent::TurnFailed { error } => Some(format!("[agent] no reply: {error}")),
        CallEvent::SessionCleared => Some("[call] session cleared".into()),
    }
}

fn watch(session: &CallSession) -> JoinHandle<()> {
    let mut rx = session.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(line) = render_event(&event) {
                        println!("{line}");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event display fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn print_status(playground: &Playground, auth: &AuthContext) {
    let snap = playground.session().snapshot();
    println!(
        "call: {}  agent: {}  session: {}",
        snap.call_state,
        snap.agent_state,
        snap.session_id.as_deref().unwrap_or("-")
    );
    println!(
        "persona: {}  generation: {}  user: {}",
        playground
            .active_preset()
            .map(|p| p.name)
            .unwrap_or("custom prompt"),
        playground.generation(),
        auth.display_name().unwrap_or("guest")
    );
    println!("transcript: {} messages", snap.transcript.len());
    for key in &playground.config().qualification_keys {
        let value = snap.qualification.get(key).map(String::as_str);
        println!(
            "  {:<14} {}",
            qualification_label(key),
            value.unwrap_or("(pending)")
        );
    }
    if snap.qualification_complete {
        println!("  qualification complete");
    }
}

fn print_help() {
    println!("Type to talk to the agent once it is listening.");
    println!("  /start  /end  /restart  /status");
    println!("  /preset ID  /prompt TEXT");
    println!("  /login [NAME]  /logout  /whoami  /quit");
}

fn build_backend(config: &PlaygroundConfig, offline: bool) -> Arc<dyn AgentBackend> {
    if offline {
        Arc::new(StubAgentBackend::new().with_latency(OFFLINE_LATENCY))
    } else {
        create_backend(&config.backend)
    }
}

async fn sign_in(identity: &StaticIdentity, auth: &mut AuthContext, name: &str) {
    identity.sign_in(UserProfile::new(format!("local:{name}"), name));
    auth.refresh().await;
    println!("Signed in as {name}.");
}

pub async fn run(config: PlaygroundConfig, options: CallOptions) -> Result<()> {
    let backend = build_backend(&config, options.offline);
    let mut playground = Playground::new(backend, config);
    if let Some(key) = &options.preset {
        playground.select_preset(key)?;
    }
    if let Some(prompt) = options.prompt {
        if prompt.trim().is_empty() {
            bail!("--prompt must not be empty");
        }
        playground.set_prompt(prompt);
    }

    let seeded = std::env::var(USER_ENV)
        .ok()
        .filter(|name| !name.trim().is_empty())
        .map(|name| UserProfile::new(format!("local:{name}"), name));
    let identity = Arc::new(StaticIdentity::new(seeded));
    let mut auth = AuthContext::new(identity.clone());
    auth.refresh().await;

    println!(
        "convergs playground ({}). Type /help for commands, /start to call.",
        playground
            .active_preset()
            .map(|p| p.name)
            .unwrap_or("custom prompt")
    );
    if let Some(name) = auth.display_name() {
        println!("Signed in as {name}.");
    }
    println!("---");

    let mut watcher = watch(playground.session());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let input = parse_input(&line);

        // A bare line answers an open sign-in prompt.
        if auth.sign_in_prompt_open() {
            match input {
                Input::Say(name) => {
                    sign_in(&identity, &mut auth, &name).await;
                    continue;
                }
                Input::Empty => {
                    auth.close_sign_in_prompt();
                    println!("Sign-in cancelled.");
                    continue;
                }
                _ => auth.close_sign_in_prompt(),
            }
        }

        let outcome = match input {
            Input::Empty => Ok(()),
            Input::Quit => break,
            Input::Say(text) => playground.session().submit_user_message(&text),
            Input::Start => playground.session().start_call(),
            Input::End => playground.session().end_call(),
            Input::Restart => {
                watcher.abort();
                let generation = playground.restart();
                watcher = watch(playground.session());
                println!("[playground] session restarted (generation {generation})");
                Ok(())
            }
            Input::Preset(key) => {
                match playground.select_preset(&key) {
                    Ok(preset) => println!("[playground] persona: {}", preset.name),
                    Err(err) => println!("({err})"),
                }
                Ok(())
            }
            Input::Prompt(text) => {
                playground.set_prompt(text);
                println!("[playground] custom prompt set, applies to the next call");
                Ok(())
            }
            Input::Status => {
                print_status(&playground, &auth);
                Ok(())
            }
            Input::Login(Some(name)) => {
                sign_in(&identity, &mut auth, &name).await;
                Ok(())
            }
            Input::Login(None) => {
                auth.open_sign_in_prompt();
                println!("Name to sign in with (empty line cancels):");
                Ok(())
            }
            Input::Logout => {
                match auth.sign_out().await {
                    Ok(()) => println!("Signed out."),
                    Err(err) => println!("(sign out failed: {err:#})"),
                }
                Ok(())
            }
            Input::Whoami => {
                println!("{}", auth.display_name().unwrap_or("not signed in"));
                Ok(())
            }
            Input::Help => {
                print_help();
                Ok(())
            }
            Input::Unknown(line) => {
                println!("(unknown command: {line}, try /help)");
                Ok(())
            }
        };
        if let Err(err) = outcome {
            println!("({err})");
        }
    }

    watcher.abort();
    playground.session().shutdown();
    Ok(())
}
