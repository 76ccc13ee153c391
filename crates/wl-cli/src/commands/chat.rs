//! Chat command: a conversation about your work, with tool access to the
//! configured sources.

use anyhow::{Context, Result};
use chrono::{Datelike, Local, NaiveDateTime};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::runtime::Runtime;
use wl_core::{DateRange, Source, parse_date};
use wl_llm::{Client, Conversation, ToolDefinition, ToolHandler, WorkDigest, prompt};
use wl_sources::{LinearClient, SourceClient, SourceSettings, WorkspaceQuery};

use crate::Config;
use crate::commands::gather_from;

const HELP: &str = "\
Commands:
  exit, quit   End the conversation
  clear        Start a new conversation
  help         Show this help

Example questions:
  What did I work on today?
  Generate my standup notes
  Create a weekly report
  How many commits did I make this week?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatCommand {
    Exit,
    Clear,
    Help,
}

/// Recognizes the REPL's own commands; anything else goes to the model.
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    match input.trim().to_lowercase().as_str() {
        "exit" | "quit" | "q" => Some(ChatCommand::Exit),
        "clear" => Some(ChatCommand::Clear),
        "help" => Some(ChatCommand::Help),
        _ => None,
    }
}

/// Date context for the `get_current_date` tool.
pub fn current_date(now: NaiveDateTime) -> Value {
    json!({
        "current_date": now.format("%Y-%m-%d").to_string(),
        "current_time": now.format("%H:%M:%S").to_string(),
        "day_of_week": now.format("%A").to_string(),
        "week_number": now.iso_week().week(),
    })
}

#[derive(Debug, Deserialize)]
struct WorkDataInput {
    start_date: String,
    #[serde(default)]
    end_date: Option<String>,
    #[serde(default)]
    sources: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct LinearInput {
    query_type: String,
    #[serde(default)]
    search_text: Option<String>,
    #[serde(default)]
    team_key: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    start_date: Option<String>,
    #[serde(default)]
    end_date: Option<String>,
}

/// Turns `query_linear` tool input into a workspace query.
pub fn linear_query(input: &Value) -> Result<WorkspaceQuery, String> {
    let input: LinearInput =
        serde_json::from_value(input.clone()).map_err(|err| format!("invalid input: {err}"))?;
    let non_blank = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
    let date = |value: Option<String>| {
        non_blank(value)
            .map(|d| parse_date(&d).map_err(|err| err.to_string()))
            .transpose()
    };

    match input.query_type.as_str() {
        "my_issues" => Ok(WorkspaceQuery::MyIssues {
            state: non_blank(input.state),
        }),
        "search_issues" => non_blank(input.search_text)
            .map(|text| WorkspaceQuery::SearchIssues { text })
            .ok_or_else(|| "search_text is required for search_issues".to_string()),
        "projects" => Ok(WorkspaceQuery::Projects {
            team_key: non_blank(input.team_key),
        }),
        "teams" => Ok(WorkspaceQuery::Teams),
        "audit_logs" => Ok(WorkspaceQuery::AuditLogs {
            since: date(input.start_date)?,
            until: date(input.end_date)?,
        }),
        other => Err(format!("unknown query_type: {other}")),
    }
}

async fn run_linear_query(client: &LinearClient, input: &Value) -> Result<Value, String> {
    let query = linear_query(input)?;
    client
        .query_workspace(&query)
        .await
        .map_err(|err| err.to_string())
}

/// Chat tools backed by the configured sources.
#[derive(Debug)]
pub struct WorkTools {
    settings: SourceSettings,
}

impl WorkTools {
    pub const fn new(settings: SourceSettings) -> Self {
        Self { settings }
    }

    async fn work_data(&self, input: &Value) -> Result<Value, String> {
        let input: WorkDataInput =
            serde_json::from_value(input.clone()).map_err(|err| format!("invalid input: {err}"))?;
        let start = parse_date(&input.start_date).map_err(|err| err.to_string())?;
        let end = match input.end_date.as_deref() {
            Some(end) => parse_date(end).map_err(|err| err.to_string())?,
            None => start,
        };
        let range = DateRange::new(start, end).map_err(|err| err.to_string())?;

        let wanted = input
            .sources
            .iter()
            .map(|name| name.parse::<Source>().map_err(|err| err.to_string()))
            .collect::<Result<Vec<_>, _>>()?;
        let clients: Vec<_> = self
            .settings
            .build_clients()
            .map_err(|err| err.to_string())?
            .into_iter()
            .filter(|client| wanted.is_empty() || wanted.contains(&client.source()))
            .collect();
        if clients.is_empty() {
            return Err("none of the requested sources are configured".to_string());
        }

        let aggregation = gather_from(clients, range).await;
        serde_json::to_value(WorkDigest::from_aggregation(&aggregation)).map_err(|err| err.to_string())
    }

    async fn linear(&self, input: &Value) -> Result<Value, String> {
        let key = self
            .settings
            .linear_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or("Linear API key is not configured; run `worklog setup`")?;
        let client = LinearClient::new(key).map_err(|err| err.to_string())?;
        run_linear_query(&client, input).await
    }
}

impl ToolHandler for WorkTools {
    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                name: "get_work_data",
                description: "Fetch work activity for a date range: calendar events, browser \
                              history, GitHub commits, Slack messages and Linear issues. Use it \
                              to analyze what the user worked on or to write reports.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "start_date": {
                            "type": "string",
                            "description": "Start date in YYYY-MM-DD format"
                        },
                        "end_date": {
                            "type": "string",
                            "description": "End date in YYYY-MM-DD format (inclusive)"
                        },
                        "sources": {
                            "type": "array",
                            "items": {
                                "type": "string",
                                "enum": ["calendar", "browser", "github", "slack", "linear"]
                            },
                            "description": "Sources to fetch. Defaults to all configured sources."
                        }
                    },
                    "required": ["start_date", "end_date"]
                }),
            },
            ToolDefinition {
                name: "get_current_date",
                description: "Get the current date and time, to resolve references like \
                              'today', 'yesterday' or 'this week'.",
                input_schema: json!({"type": "object", "properties": {}, "required": []}),
            },
            ToolDefinition {
                name: "query_linear",
                description: "Query the Linear workspace for issues, projects, teams or audit \
                              logs. Use it for questions about project status, team members \
                              or security audit logs.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "query_type": {
                            "type": "string",
                            "enum": ["my_issues", "search_issues", "projects", "teams", "audit_logs"],
                            "description": "Type of query to run"
                        },
                        "search_text": {
                            "type": "string",
                            "description": "Search text (for search_issues)"
                        },
                        "team_key": {
                            "type": "string",
                            "description": "Team key to filter projects by (e.g. 'ENG')"
                        },
                        "state": {
                            "type": "string",
                            "description": "Issue state filter for my_issues (e.g. 'In Progress')"
                        },
                        "start_date": {
                            "type": "string",
                            "description": "Start date for audit logs (YYYY-MM-DD)"
                        },
                        "end_date": {
                            "type": "string",
                            "description": "End date for audit logs (YYYY-MM-DD, inclusive)"
                        }
                    },
                    "required": ["query_type"]
                }),
            },
        ]
    }

    async fn call(&self, name: &str, input: &Value) -> Result<Value, String> {
        match name {
            "get_work_data" => self.work_data(input).await,
            "get_current_date" => Ok(current_date(Local::now().naive_local())),
            "query_linear" => self.linear(input).await,
            other => Err(format!("unknown tool: {other}")),
        }
    }
}

/// Runs a single query, or the interactive loop when `query` is `None`.
pub fn run(runtime: &Runtime, config: &Config, query: Option<&str>, model: Option<&str>) -> Result<()> {
    let key = config
        .anthropic_key()
        .context("chat needs anthropic_api_key; run `worklog setup`")?;
    let client = Client::new(key)?;

    let settings = config.source_settings();
    if let Err(err) = settings.build_clients() {
        eprintln!("Warning: {err}");
    }
    let tools = WorkTools::new(settings);

    let model = model.unwrap_or(&config.model);
    let system = prompt::chat_system_prompt(Local::now().naive_local());
    let mut conversation = Conversation::new(model, system);

    if let Some(query) = query {
        let answer = runtime.block_on(conversation.send(&client, &tools, query))?;
        println!("{answer}");
        return Ok(());
    }

    println!("Worklog chat ({model})");
    println!("Type 'help' for commands, 'exit' to quit.");
    println!();

    let mut editor = DefaultEditor::new().context("failed to initialize line editor")?;
    loop {
        match editor.readline("you> ") {
            Ok(line) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(input);

                match parse_command(input) {
                    Some(ChatCommand::Exit) => break,
                    Some(ChatCommand::Clear) => {
                        conversation.clear();
                        println!("Started a new conversation.");
                    }
                    Some(ChatCommand::Help) => println!("{HELP}"),
                    None => match runtime.block_on(conversation.send(&client, &tools, input)) {
                        Ok(answer) => println!("\n{answer}\n"),
                        Err(err) => eprintln!("Error: {err}"),
                    },
                }
            }
            Err(ReadlineError::Interrupted) => {}
            Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err).context("failed to read input"),
        }
    }

    Ok(())
}
