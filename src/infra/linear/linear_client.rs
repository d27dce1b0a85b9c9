// =============================================================================
// LINEAR CLIENT - GraphQL API Integration
// =============================================================================
//
// Every call is a single POST to https://api.linear.app/graphql with the
// personal API key in the `Authorization` header (no "Bearer" prefix).
// GraphQL reports failures inside a 200 response, so `errors` is checked
// before `data` is trusted.
//
// **Environment Variables:**
// - `LINEAR_API_KEY` - Personal API key from Linear settings

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

pub const LINEAR_API_URL: &str = "https://api.linear.app/graphql";

#[derive(Debug, Error)]
pub enum LinearError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Linear API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("{0}")]
    GraphQl(String),

    #[error("Linear response had no data")]
    MissingData,
}

// =============================================================================
// LINEAR DATA TYPES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    /// Present only when the query asked for it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teams: Option<Connection<Team>>,
}

impl Project {
    pub fn belongs_to(&self, team_id: &str) -> bool {
        self.teams
            .as_ref()
            .map(|teams| teams.nodes.iter().any(|t| t.id == team_id))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub state_type: Option<String>,
    #[serde(default)]
    pub position: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedRef {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub identifier: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub state: Option<NamedRef>,
    #[serde(default)]
    pub assignee: Option<NamedRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<Team>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection<T> {
    pub nodes: Vec<T>,
}

/// Fields for `issueCreate`. IDs must already be resolved.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueCreateInput {
    pub title: String,
    pub team_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub label_ids: Vec<String>,
}

/// Result of `issueCreate` / `issueUpdate`.
#[derive(Debug, Clone, Deserialize)]
pub struct IssuePayload {
    pub success: bool,
    pub issue: Option<Issue>,
}

// =============================================================================
// GRAPHQL ENVELOPE
// =============================================================================

#[derive(Debug, Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
    variables: Value,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

// =============================================================================
// QUERIES
// =============================================================================

const ISSUE_FIELDS: &str = "id identifier title url state { name } assignee { name }";

const TEAMS_QUERY: &str = "query { teams { nodes { id name key } } }";

const PROJECTS_QUERY: &str =
    "query { projects { nodes { id name state url teams { nodes { id name key } } } } }";

const USERS_QUERY: &str = "query { users { nodes { id name displayName email } } }";

const TEAM_STATES_QUERY: &str = "query($teamId: String!) { team(id: $teamId) { id name states { nodes { id name type position } } } }";

#[derive(Debug, Deserialize)]
struct TeamsData {
    teams: Connection<Team>,
}

#[derive(Debug, Deserialize)]
struct ProjectsData {
    projects: Connection<Project>,
}

#[derive(Debug, Deserialize)]
struct UsersData {
    users: Connection<User>,
}

#[derive(Debug, Deserialize)]
struct TeamStatesData {
    team: Option<TeamWithStates>,
}

#[derive(Debug, Deserialize)]
struct TeamWithStates {
    states: Connection<WorkflowState>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchIssuesData {
    search_issues: Connection<Issue>,
}

#[derive(Debug, Deserialize)]
struct IssueData {
    issue: Option<Issue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueCreateData {
    issue_create: IssuePayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueUpdateData {
    issue_update: IssuePayload,
}

// =============================================================================
// LINEAR CLIENT IMPLEMENTATION
// =============================================================================

pub struct LinearClient {
    client: Client,
    api_key: String,
    api_url: String,
}

impl LinearClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            api_url: LINEAR_API_URL.to_string(),
        }
    }

    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.to_string();
        self
    }

    /// Runs one GraphQL operation and decodes its `data`.
    async fn request<T: DeserializeOwned>(&self, query: &str, variables: Value) -> Result<T, LinearError> {
        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", &self.api_key)
            .json(&GraphQlRequest { query, variables })
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        let parsed: Result<GraphQlResponse<T>, _> = serde_json::from_str(&text);
        match parsed {
            Ok(body) if !body.errors.is_empty() => {
                let messages: Vec<String> = body.errors.into_iter().map(|e| e.message).collect();
                Err(LinearError::GraphQl(messages.join("; ")))
            }
            Ok(_) if !status.is_success() => Err(LinearError::Api {
                status: status.as_u16(),
                message: text,
            }),
            Ok(body) => body.data.ok_or(LinearError::MissingData),
            Err(_) if !status.is_success() => Err(LinearError::Api {
                status: status.as_u16(),
                message: text,
            }),
            Err(e) => Err(LinearError::GraphQl(format!("unreadable response: {}", e))),
        }
    }

    pub async fn teams(&self) -> Result<Vec<Team>, LinearError> {
        let data: TeamsData = self.request(TEAMS_QUERY, json!({})).await?;
        Ok(data.teams.nodes)
    }

    pub async fn projects(&self) -> Result<Vec<Project>, LinearError> {
        let data: ProjectsData = self.request(PROJECTS_QUERY, json!({})).await?;
        Ok(data.projects.nodes)
    }

    pub async fn users(&self) -> Result<Vec<User>, LinearError> {
        let data: UsersData = self.request(USERS_QUERY, json!({})).await?;
        Ok(data.users.nodes)
    }

    /// Workflow states of a team; empty when the team does not exist.
    pub async fn team_states(&self, team_id: &str) -> Result<Vec<WorkflowState>, LinearError> {
        let data: TeamStatesData = self
            .request(TEAM_STATES_QUERY, json!({ "teamId": team_id }))
            .await?;
        Ok(data.team.map(|t| t.states.nodes).unwrap_or_default())
    }

    pub async fn search_issues(&self, query: &str, first: u32) -> Result<Vec<Issue>, LinearError> {
        let gql = format!(
            "query($query: String!, $first: Int!) {{ searchIssues(term: $query, first: $first) {{ nodes {{ {} team {{ id name key }} }} }} }}",
            ISSUE_FIELDS
        );
        let data: SearchIssuesData = self
            .request(&gql, json!({ "query": query, "first": first }))
            .await?;
        Ok(data.search_issues.nodes)
    }

    pub async fn issue(&self, id: &str) -> Result<Option<Issue>, LinearError> {
        let gql = format!(
            "query($id: String!) {{ issue(id: $id) {{ {} description team {{ id name key }} }} }}",
            ISSUE_FIELDS
        );
        let data: IssueData = self.request(&gql, json!({ "id": id })).await?;
        Ok(data.issue)
    }

    pub async fn create_issue(&self, input: &IssueCreateInput) -> Result<IssuePayload, LinearError> {
        let gql = format!(
            "mutation($input: IssueCreateInput!) {{ issueCreate(input: $input) {{ success issue {{ {} }} }} }}",
            ISSUE_FIELDS
        );
        let data: IssueCreateData = self.request(&gql, json!({ "input": input })).await?;
        Ok(data.issue_create)
    }

    pub async fn update_issue_state(
        &self,
        issue_id: &str,
        state_id: &str,
    ) -> Result<IssuePayload, LinearError> {
        let gql = format!(
            "mutation($id: String!, $stateId: String!) {{ issueUpdate(id: $id, input: {{ stateId: $stateId }}) {{ success issue {{ {} }} }} }}",
            ISSUE_FIELDS
        );
        let data: IssueUpdateData = self
            .request(&gql, json!({ "id": issue_id, "stateId": state_id }))
            .await?;
        Ok(data.issue_update)
    }
}
