// Terminal chat against a running `mentor serve`.
//
// Every submitted line becomes a user message and, once its request resolves,
// exactly one assistant reply. Requests may overlap; replies are appended in
// the order they arrive.

use anyhow::{Context, Result};
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{error, info, instrument, warn};

use crate::plan::{self, WeeklyPlan};

pub const EMPTY_PLAN_MESSAGE: &str =
    "Received an empty plan or could not find tasks in the response.";
pub const NO_TASKS_MESSAGE: &str =
    "No specific weekly tasks were generated. Try rephrasing your goal or be more specific.";
pub const TRANSPORT_ERROR_MESSAGE: &str =
    "Sorry, something went wrong. Please check your connection and try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    User,
    Assistant,
}

impl Sender {
    pub fn label(&self) -> &'static str {
        match self {
            Sender::User => "You",
            Sender::Assistant => "Mentor",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: i64,
    pub text: String,
    pub sender: Sender,
}

/// Append-only conversation for one chat session.
#[derive(Debug, Default)]
pub struct ChatSession {
    messages: Vec<ChatMessage>,
    last_id: i64,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    // Millisecond clock, bumped so ids stay strictly increasing.
    fn next_id(&mut self) -> i64 {
        let now = Utc::now().timestamp_millis();
        self.last_id = now.max(self.last_id + 1);
        self.last_id
    }

    fn push(&mut self, text: String, sender: Sender) -> &ChatMessage {
        let id = self.next_id();
        self.messages.push(ChatMessage { id, text, sender });
        &self.messages[self.messages.len() - 1]
    }

    /// Records user input. Blank input is ignored and returns `None`.
    pub fn submit(&mut self, input: &str) -> Option<&ChatMessage> {
        if input.trim().is_empty() {
            return None;
        }
        Some(self.push(input.to_string(), Sender::User))
    }

    pub fn reply(&mut self, text: String) -> &ChatMessage {
        self.push(text, Sender::Assistant)
    }
}

/// "week3" -> "Week 3". Other ids are kept as-is after the "Week " prefix.
pub fn week_label(week_id: &str) -> String {
    let number = week_id
        .get(..4)
        .filter(|prefix| prefix.eq_ignore_ascii_case("week"))
        .map(|_| &week_id[4..])
        .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()));
    format!("Week {}", number.unwrap_or(week_id))
}

pub fn format_plan(plan: Option<&WeeklyPlan>) -> String {
    let Some(plan) = plan else {
        return EMPTY_PLAN_MESSAGE.to_string();
    };
    if !plan.has_tasks() {
        return NO_TASKS_MESSAGE.to_string();
    }

    let mut formatted = String::from("Weekly Tasks:");
    for week in plan.weeks().iter().filter(|week| !week.tasks.is_empty()) {
        formatted.push_str(&format!(
            "\n{}: {}",
            week_label(&week.id),
            week.tasks.join(", ")
        ));
    }
    formatted
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("server responded with status {0}")]
    Status(u16),
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// The assistant message shown for a finished request.
pub fn reply_for(result: &Result<Option<WeeklyPlan>, ChatError>) -> String {
    match result {
        Ok(plan) => format_plan(plan.as_ref()),
        Err(ChatError::Status(status)) => format!(
            "Sorry, I couldn't process that ({}). Please try again.",
            status
        ),
        Err(ChatError::Transport { .. }) => TRANSPORT_ERROR_MESSAGE.to_string(),
    }
}

/// HTTP client for `POST /api/decompose`.
#[derive(Debug, Clone)]
pub struct DecomposeClient {
    http: reqwest::Client,
    endpoint: String,
}

impl DecomposeClient {
    pub fn new(server_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: format!("{}/api/decompose", server_url.trim_end_matches('/')),
        }
    }

    /// `Ok(None)` when the server answered 200 without a usable `weeklyPlan`.
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    pub async fn decompose(&self, goal: &str) -> Result<Option<WeeklyPlan>, ChatError> {
        let transport = |source: reqwest::Error| ChatError::Transport {
            url: self.endpoint.clone(),
            source,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .json(&json!({ "goal": goal }))
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(%status, %body, "API error");
            return Err(ChatError::Status(status.as_u16()));
        }

        let body: Value = response.json().await.map_err(transport)?;
        match plan::validate(&body) {
            Ok(plan) => Ok(Some(plan)),
            Err(violation) => {
                warn!(%violation, "Response did not contain a weekly plan");
                Ok(None)
            }
        }
    }
}

/// Drives a chat session from `input`, one goal per line.
///
/// `on_message` sees every message as it is appended. Returns once input is
/// exhausted and every submitted goal has its reply.
pub async fn run_session<R, F>(
    client: &DecomposeClient,
    input: R,
    mut on_message: F,
) -> Result<ChatSession>
where
    R: AsyncBufRead + Unpin,
    F: FnMut(&ChatMessage),
{
    let mut session = ChatSession::new();
    let mut lines = input.lines();
    let mut in_flight = FuturesUnordered::new();
    let mut input_open = true;

    loop {
        tokio::select! {
            line = lines.next_line(), if input_open => {
                match line.context("Failed to read chat input")? {
                    Some(line) => {
                        if let Some(message) = session.submit(&line) {
                            on_message(message);
                            let client = client.clone();
                            in_flight.push(async move { client.decompose(&line).await });
                        }
                    }
                    None => input_open = false,
                }
            }
            Some(result) = in_flight.next(), if !in_flight.is_empty() => {
                if let Err(e) = &result {
                    error!("Decompose request failed: {}", e);
                }
                on_message(session.reply(reply_for(&result)));
            }
            else => break,
        }
    }

    Ok(session)
}

/// Interactive chat on stdin/stdout.
pub async fn run_chat(server_url: &str) -> Result<()> {
    info!(server_url, "Starting chat session");
    println!("Type your goal and press Enter (Ctrl-D to quit).");

    let client = DecomposeClient::new(server_url);
    let stdin = BufReader::new(tokio::io::stdin());
    let session = run_session(&client, stdin, |message| {
        if message.sender == Sender::Assistant {
            println!("{}: {}\n", message.sender.label(), message.text);
        }
    })
    .await?;

    info!(messages = session.messages().len(), "Chat session finished");
    Ok(())
}
