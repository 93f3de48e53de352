mod remote;
mod render;

use agent::{AgentEvent, ChatService};
use colored::Colorize;
use config::ChatConfig;
use tracing_subscriber::EnvFilter;

use crate::remote::RemoteChat;
use crate::render::render_tool_output;

const EXIT_COMMAND: &str = "exit";

enum Backend {
    Local(ChatService),
    Remote(RemoteChat),
}

impl Backend {
    async fn ask(&self, question: &str) -> String {
        match self {
            Backend::Remote(remote) => remote.ask(question).await,
            Backend::Local(service) => {
                let agent = match service.agent() {
                    Ok(agent) => agent,
                    Err(err) => return format!("Error: {err}"),
                };

                let result = agent
                    .run_with_events(question, |event| async move {
                        match event {
                            AgentEvent::ToolCall(call) => {
                                println!(
                                    "   {} {}",
                                    "calling tool:".yellow(),
                                    call.name.yellow().bold()
                                );
                            }
                            AgentEvent::ToolResult { content, .. } => {
                                println!("{}", render_tool_output(&content).dimmed());
                            }
                            AgentEvent::Answer(_) => {}
                        }
                    })
                    .await;

                match result {
                    Ok(outcome) => outcome.answer,
                    Err(err) => format!("Error: {err}"),
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let conf = ChatConfig::get_or_default();

    let backend = match &conf.ui.endpoint {
        Some(endpoint) => {
            println!("Using chat service at {endpoint}");
            Backend::Remote(RemoteChat::new(endpoint.clone()))
        }
        None => {
            println!("Loading agent...");
            Backend::Local(ChatService::start(&conf).await?)
        }
    };

    println!(
        "{}",
        format!(
            "Ask questions about '{}'. Type '{EXIT_COMMAND}' to quit.",
            conf.database.path.display()
        )
        .bold()
    );

    while let Ok(prompt) = inquire::Text::new("You:").prompt() {
        let question = prompt.trim();
        if question.eq_ignore_ascii_case(EXIT_COMMAND) {
            break;
        }
        if question.is_empty() {
            continue;
        }

        let answer = backend.ask(question).await;
        println!("\n{} {}\n", "[Assistant]".blue(), answer);
    }

    Ok(())
}
