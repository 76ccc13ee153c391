//! Linear issues assigned to the user that changed during the range.
//!
//! The same client answers read-only [`WorkspaceQuery`]s about issues,
//! projects, teams and audit logs for the chat agent.

use std::fmt;

use chrono::{DateTime, Local, NaiveDate, SecondsFormat, Utc};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use wl_core::{DateRange, IssueRecord, RawRecord, Source};

use crate::client::{SourceClient, http_client, read_body, truncate};
use crate::error::SourceError;

const LINEAR_API_URL: &str = "https://api.linear.app/graphql";
const MAX_PAGES: usize = 10;

const ASSIGNED_ISSUES_QUERY: &str = "
query AssignedIssues($since: DateTimeOrDuration!, $until: DateTimeOrDuration!, $cursor: String) {
  viewer {
    assignedIssues(
      first: 50
      after: $cursor
      orderBy: updatedAt
      filter: { updatedAt: { gte: $since, lt: $until } }
    ) {
      nodes {
        identifier
        title
        updatedAt
        state { name }
        team { name }
      }
      pageInfo { hasNextPage endCursor }
    }
  }
}
";

const MY_ISSUES_QUERY: &str = "
query MyIssues($filter: IssueFilter) {
  viewer {
    assignedIssues(first: 50, filter: $filter) {
      nodes {
        identifier
        title
        description
        priority
        createdAt
        updatedAt
        state { name }
        project { name }
        team { name }
        labels { nodes { name } }
      }
    }
  }
}
";

const SEARCH_ISSUES_QUERY: &str = "
query SearchIssues($term: String!) {
  searchIssues(term: $term, first: 20) {
    nodes {
      identifier
      title
      description
      state { name }
      team { name }
      assignee { name }
    }
  }
}
";

const PROJECTS_QUERY: &str = "
query Projects($filter: ProjectFilter) {
  projects(first: 50, filter: $filter) {
    nodes {
      name
      description
      state
      progress
      startDate
      targetDate
      lead { name }
      teams { nodes { name } }
    }
  }
}
";

const TEAMS_QUERY: &str = "
query Teams {
  teams {
    nodes {
      name
      key
      description
      members { nodes { name email } }
    }
  }
}
";

const AUDIT_ENTRIES_QUERY: &str = "
query AuditEntries($filter: AuditEntryFilter) {
  auditEntries(first: 100, filter: $filter) {
    nodes {
      id
      type
      createdAt
      ip
      countryCode
      actor { name email }
      metadata
    }
  }
}
";

const ISSUE_DESCRIPTION_CHARS: usize = 200;
const SEARCH_DESCRIPTION_CHARS: usize = 150;

pub struct LinearClient {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl fmt::Debug for LinearClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinearClient")
            .field("api_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl LinearClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, SourceError> {
        Ok(Self {
            http: http_client()?,
            api_key: api_key.into(),
            endpoint: LINEAR_API_URL.to_string(),
        })
    }

    /// Sends queries to `endpoint` instead of the public GraphQL URL.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn post<V: Serialize + Send>(
        &self,
        query: &'static str,
        variables: V,
    ) -> Result<String, SourceError> {
        let response = self
            .http
            .post(&self.endpoint)
            .header(reqwest::header::AUTHORIZATION, &self.api_key)
            .json(&GraphQlRequest { query, variables })
            .send()
            .await?;
        read_body(response, parse_graphql_error).await
    }

    /// Runs `query` and returns its results as `{"<kind>": [...], "count": n}`.
    pub async fn query_workspace(&self, query: &WorkspaceQuery) -> Result<Value, SourceError> {
        let (document, variables) = query.request();
        let body = self.post(document, variables).await?;
        query.parse(&body)
    }
}

/// Read-only questions about the Linear workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceQuery {
    /// Issues assigned to the user, optionally in one workflow state.
    MyIssues { state: Option<String> },
    SearchIssues { text: String },
    /// Projects, optionally only those visible to one team.
    Projects { team_key: Option<String> },
    Teams,
    /// Audit log entries created between the two local dates, inclusive.
    AuditLogs {
        since: Option<NaiveDate>,
        until: Option<NaiveDate>,
    },
}

impl WorkspaceQuery {
    fn request(&self) -> (&'static str, Value) {
        match self {
            Self::MyIssues { state } => {
                let filter = state
                    .as_ref()
                    .map(|state| json!({"state": {"name": {"eqIgnoreCase": state}}}));
                (MY_ISSUES_QUERY, json!({"filter": filter}))
            }
            Self::SearchIssues { text } => (SEARCH_ISSUES_QUERY, json!({"term": text})),
            Self::Projects { team_key } => {
                let filter = team_key
                    .as_ref()
                    .map(|key| json!({"accessibleTeams": {"some": {"key": {"eq": key}}}}));
                (PROJECTS_QUERY, json!({"filter": filter}))
            }
            Self::Teams => (TEAMS_QUERY, json!({})),
            Self::AuditLogs { since, until } => {
                let mut created_at = Map::new();
                if let Some(day) = since {
                    let (start, _) = DateRange::day(*day).bounds(&Local);
                    created_at.insert("gte".to_string(), json!(rfc3339(start)));
                }
                if let Some(day) = until {
                    let (_, end) = DateRange::day(*day).bounds(&Local);
                    created_at.insert("lt".to_string(), json!(rfc3339(end)));
                }
                let filter = (!created_at.is_empty()).then(|| json!({"createdAt": created_at}));
                (AUDIT_ENTRIES_QUERY, json!({"filter": filter}))
            }
        }
    }

    fn parse(&self, body: &str) -> Result<Value, SourceError> {
        let (key, items) = match self {
            Self::MyIssues { .. } => {
                let data: MyIssuesData = parse_data(body)?;
                let issues = data.viewer.assigned_issues.nodes.into_iter();
                ("issues", to_values(issues.map(|i| i.summarize(ISSUE_DESCRIPTION_CHARS)))?)
            }
            Self::SearchIssues { .. } => {
                let data: SearchData = parse_data(body)?;
                let issues = data.search_issues.nodes.into_iter();
                ("issues", to_values(issues.map(|i| i.summarize(SEARCH_DESCRIPTION_CHARS)))?)
            }
            Self::Projects { .. } => {
                let data: ProjectsData = parse_data(body)?;
                ("projects", to_values(data.projects.nodes.into_iter().map(ProjectSummary::from))?)
            }
            Self::Teams => {
                let data: TeamsData = parse_data(body)?;
                ("teams", to_values(data.teams.nodes.into_iter().map(TeamSummary::from))?)
            }
            Self::AuditLogs { .. } => {
                let data: AuditData = parse_data(body)?;
                let entries = data.audit_entries.nodes.into_iter();
                ("audit_logs", to_values(entries.map(AuditSummary::from))?)
            }
        };
        let mut result = Map::new();
        result.insert("count".to_string(), json!(items.len()));
        result.insert(key.to_string(), Value::Array(items));
        Ok(Value::Object(result))
    }
}

fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn to_values<T: Serialize>(items: impl Iterator<Item = T>) -> Result<Vec<Value>, SourceError> {
    items
        .map(|item| serde_json::to_value(item).map_err(SourceError::invalid))
        .collect()
}

impl SourceClient for LinearClient {
    fn source(&self) -> Source {
        Source::Issue
    }

    async fn fetch(&self, range: &DateRange) -> Result<Vec<RawRecord>, SourceError> {
        let (start, end) = range.bounds(&Local);
        let since = rfc3339(start);
        let until = rfc3339(end);

        let mut records = Vec::new();
        let mut cursor: Option<String> = None;
        for _ in 0..MAX_PAGES {
            let variables = Variables {
                since: &since,
                until: &until,
                cursor: cursor.as_deref(),
            };
            let body = self.post(ASSIGNED_ISSUES_QUERY, variables).await?;
            let page = parse_issues_page(&body)?;
            records.extend(page.records);

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(records),
            }
        }

        tracing::warn!(pages = MAX_PAGES, "linear results truncated");
        Ok(records)
    }
}

#[derive(Serialize)]
struct GraphQlRequest<V> {
    query: &'static str,
    variables: V,
}

#[derive(Serialize)]
struct Variables<'a> {
    since: &'a str,
    until: &'a str,
    cursor: Option<&'a str>,
}

#[derive(Debug)]
struct IssuesPage {
    records: Vec<RawRecord>,
    next_cursor: Option<String>,
}

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Deserialize)]
struct Data {
    viewer: Viewer,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Viewer {
    assigned_issues: Connection,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Connection {
    #[serde(default)]
    nodes: Vec<Node>,
    page_info: Option<PageInfo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Node {
    identifier: String,
    title: Option<String>,
    updated_at: Option<String>,
    state: Option<Named>,
    team: Option<Named>,
}

#[derive(Deserialize)]
struct Named {
    name: String,
}

/// Decodes `data`, turning a non-empty `errors` list into an API error.
fn parse_data<T: DeserializeOwned>(body: &str) -> Result<T, SourceError> {
    let response: GraphQlResponse<T> = serde_json::from_str(body).map_err(SourceError::invalid)?;
    if !response.errors.is_empty() {
        return Err(SourceError::Api {
            message: join_errors(&response.errors),
        });
    }
    response
        .data
        .ok_or_else(|| SourceError::InvalidResponse("missing data".to_string()))
}

fn parse_issues_page(body: &str) -> Result<IssuesPage, SourceError> {
    let connection = parse_data::<Data>(body)?.viewer.assigned_issues;

    let next_cursor = connection
        .page_info
        .filter(|info| info.has_next_page)
        .and_then(|info| info.end_cursor);
    let records = connection
        .nodes
        .into_iter()
        .map(|node| {
            RawRecord::Issue(IssueRecord {
                identifier: node.identifier,
                title: node.title,
                state: node.state.map(|s| s.name),
                team: node.team.map(|t| t.name),
                updated_at: node.updated_at,
            })
        })
        .collect();
    Ok(IssuesPage {
        records,
        next_cursor,
    })
}

fn join_errors(errors: &[GraphQlError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

fn parse_graphql_error(body: &str) -> Option<String> {
    serde_json::from_str::<GraphQlResponse<IgnoredAny>>(body)
        .ok()
        .filter(|r| !r.errors.is_empty())
        .map(|r| join_errors(&r.errors))
}

#[derive(Deserialize)]
#[serde(bound = "T: Deserialize<'de>")]
struct Nodes<T> {
    #[serde(default)]
    nodes: Vec<T>,
}

#[derive(Deserialize)]
struct MyIssuesData {
    viewer: AssignedIssues,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignedIssues {
    assigned_issues: Nodes<IssueNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchData {
    search_issues: Nodes<IssueNode>,
}

#[derive(Deserialize)]
struct ProjectsData {
    projects: Nodes<ProjectNode>,
}

#[derive(Deserialize)]
struct TeamsData {
    teams: Nodes<TeamNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuditData {
    audit_entries: Nodes<AuditNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueNode {
    identifier: String,
    title: Option<String>,
    description: Option<String>,
    priority: Option<f64>,
    created_at: Option<String>,
    updated_at: Option<String>,
    state: Option<Named>,
    project: Option<Named>,
    team: Option<Named>,
    assignee: Option<Named>,
    labels: Option<Nodes<Named>>,
}

#[derive(Debug, Serialize)]
struct IssueSummary {
    id: String,
    title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<f64>,
    state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    project: Option<String>,
    team: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    assignee: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    labels: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at: Option<String>,
}

impl IssueNode {
    fn summarize(self, description_chars: usize) -> IssueSummary {
        IssueSummary {
            id: self.identifier,
            title: self.title,
            description: self
                .description
                .map(|d| truncate(&d, description_chars))
                .filter(|d| !d.is_empty()),
            priority: self.priority,
            state: self.state.map(|s| s.name),
            project: self.project.map(|p| p.name),
            team: self.team.map(|t| t.name),
            assignee: self.assignee.map(|a| a.name),
            labels: self
                .labels
                .map(|l| l.nodes.into_iter().map(|n| n.name).collect())
                .unwrap_or_default(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectNode {
    name: String,
    description: Option<String>,
    state: Option<String>,
    progress: Option<f64>,
    start_date: Option<String>,
    target_date: Option<String>,
    lead: Option<Named>,
    teams: Option<Nodes<Named>>,
}

#[derive(Debug, Serialize)]
struct ProjectSummary {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    state: Option<String>,
    progress: Option<f64>,
    start_date: Option<String>,
    target_date: Option<String>,
    lead: Option<String>,
    teams: Vec<String>,
}

impl From<ProjectNode> for ProjectSummary {
    fn from(node: ProjectNode) -> Self {
        Self {
            name: node.name,
            description: node
                .description
                .map(|d| truncate(&d, ISSUE_DESCRIPTION_CHARS))
                .filter(|d| !d.is_empty()),
            state: node.state,
            progress: node.progress,
            start_date: node.start_date,
            target_date: node.target_date,
            lead: node.lead.map(|l| l.name),
            teams: node
                .teams
                .map(|t| t.nodes.into_iter().map(|n| n.name).collect())
                .unwrap_or_default(),
        }
    }
}

#[derive(Deserialize)]
struct TeamNode {
    name: String,
    key: String,
    description: Option<String>,
    members: Option<Nodes<Person>>,
}

#[derive(Debug, Deserialize, Serialize)]
struct Person {
    name: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Serialize)]
struct TeamSummary {
    name: String,
    key: String,
    description: Option<String>,
    members: Vec<Person>,
}

impl From<TeamNode> for TeamSummary {
    fn from(node: TeamNode) -> Self {
        Self {
            name: node.name,
            key: node.key,
            description: node.description,
            members: node.members.map(|m| m.nodes).unwrap_or_default(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuditNode {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    created_at: String,
    ip: Option<String>,
    country_code: Option<String>,
    actor: Option<Person>,
    metadata: Option<Value>,
}

#[derive(Debug, Serialize)]
struct AuditSummary {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    timestamp: String,
    ip: Option<String>,
    country: Option<String>,
    actor: Option<String>,
    actor_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<Value>,
}

impl From<AuditNode> for AuditSummary {
    fn from(node: AuditNode) -> Self {
        let (name, email) = node
            .actor
            .map(|a| (a.name, a.email))
            .unwrap_or_default();
        Self {
            id: node.id,
            kind: node.kind,
            timestamp: node.created_at,
            ip: node.ip,
            country: node.country_code,
            actor: name.or_else(|| email.clone()),
            actor_email: email,
            metadata: node.metadata,
        }
    }
}
