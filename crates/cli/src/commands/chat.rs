//! Console chat loop: prints every tool call, result and hand-off of a turn
//! followed by the assistant's reply.

use std::io::{self, BufRead, Write};

use anyhow::Context;
use freddie_agent::roles::role_profile;
use freddie_agent::{build_gateway, ChatGateway, ChatRequest, TurnEvent};
use freddie_core::config::{AppConfig, LoadOptions};
use tracing_subscriber::EnvFilter;

use super::CommandResult;

const EXIT_WORDS: &[&str] = &["exit", "quit", "bye"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatOptions {
    pub user_id: String,
    pub contact: Option<String>,
}

pub fn run(options: ChatOptions) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "config_validation",
                format!("config validation failed: {error}"),
                2,
            )
        }
    };

    // Logs go to stderr so they never interleave with the transcript.
    let filter = EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .compact()
        .try_init();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => return CommandResult::failure("chat", "runtime", error.to_string(), 1),
    };

    let result = runtime.block_on(async {
        let gateway = build_gateway(&config).await.context("could not assemble chat gateway")?;
        let stdin = io::stdin();
        let mut stdout = io::stdout();
        writeln!(stdout, "Chatting with Freddie at {}. Type 'exit' to leave.", config.store.name)?;
        run_session(&gateway, &options, stdin.lock(), &mut stdout).await
    });

    match result {
        Ok(turns) => CommandResult::success("chat", format!("session ended after {turns} turn(s)")),
        Err(error) => CommandResult::failure("chat", "chat_session", format!("{error:#}"), 1),
    }
}

/// Reads one message per line until EOF or an exit word. Failed turns are
/// reported inline and the session continues. Returns the completed turns.
pub async fn run_session<R, W>(
    gateway: &ChatGateway,
    options: &ChatOptions,
    input: R,
    output: &mut W,
) -> anyhow::Result<usize>
where
    R: BufRead,
    W: Write,
{
    let mut turns = 0;
    for (index, line) in input.lines().enumerate() {
        let line = line?;
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if EXIT_WORDS.contains(&message.to_ascii_lowercase().as_str()) {
            break;
        }

        let correlation_id = format!("cli-{}", index + 1);
        let request = ChatRequest {
            message: message.to_string(),
            user_id: options.user_id.clone(),
            contact: options.contact.clone(),
        };
        match gateway.handle_text(request, &correlation_id).await {
            Ok(reply) => {
                for event in &reply.events {
                    writeln!(output, "{}", render_event(event))?;
                }
                if reply.response.is_empty() {
                    writeln!(output, "(no reply)")?;
                }
                turns += 1;
            }
            Err(error) => {
                let interface = error.into_interface(correlation_id);
                writeln!(output, "error: {} ({})", interface.message(), interface.user_message())?;
            }
        }
        output.flush()?;
    }
    Ok(turns)
}

pub fn render_event(event: &TurnEvent) -> String {
    match event {
        TurnEvent::AssistantMessage { role, content } => {
            format!("{}: {content}", role_profile(*role).display_name)
        }
        TurnEvent::ToolInvoked { role, tool, arguments } => {
            format!("  [{}] calling {tool} {arguments}", role_profile(*role).display_name)
        }
        TurnEvent::ToolCompleted { role, tool, status, message } => format!(
            "  [{}] {tool} -> {}: {message}",
            role_profile(*role).display_name,
            status.as_str()
        ),
        TurnEvent::SpecialistConsulted { specialist, request } => {
            format!("  consulting {}: {request}", role_profile(*specialist).display_name)
        }
        TurnEvent::Handoff { from, to } => format!(
            "  handed off from {} to {}",
            role_profile(*from).display_name,
            role_profile(*to).display_name
        ),
    }
}
