// =============================================================================
// LINEAR TOOLS
// =============================================================================
//
// Registers the Linear operations with the tool registry. Team, project,
// assignee and state arguments accept either an ID or a name; names are
// resolved with `name_resolution::best_match` against the lists Linear
// returns.

use super::linear_client::{
    Issue, IssueCreateInput, LinearClient, LinearError, Project, WorkflowState,
};
use super::name_resolution::{best_match, is_likely_uuid, strip_filler_words};
use crate::core::ai::{
    with_state, PropertyDef, RegistryError, ToolArgs, ToolDescriptor, ToolError, ToolRegistry,
    ToolResult,
};
use serde_json::json;
use std::sync::Arc;

pub const TEAM_NOT_FOUND: &str = "Team not found. Provide a team name, key, or ID.";
pub const PROJECT_NOT_FOUND: &str = "Project not found. Provide a project name or ID.";
pub const ASSIGNEE_NOT_FOUND: &str = "Assignee not found. Provide a name, email, or ID.";
pub const STATE_NOT_FOUND: &str = "State not found. Provide a state name or ID.";
pub const ISSUE_NOT_FOUND: &str = "No issue found for that identifier";

const DEFAULT_SEARCH_LIMIT: u32 = 10;

fn failed(message: &str, error: LinearError) -> ToolResult {
    tracing::error!("{}: {}", message, error);
    ToolResult::failed_with(message, error)
}

// =============================================================================
// RESOLUTION
// =============================================================================

async fn resolve_team(linear: &LinearClient, needle: &str) -> Result<Option<String>, LinearError> {
    if is_likely_uuid(needle) {
        return Ok(Some(needle.trim().to_string()));
    }
    let teams = linear.teams().await?;
    let found = best_match(needle, &teams, |t| vec![t.key.as_str(), t.name.as_str()]);
    if let Some((team, tier)) = found {
        tracing::debug!("Resolved team '{}' to {} ({:?})", needle, team.id, tier);
    }
    Ok(found.map(|(team, _)| team.id.clone()))
}

async fn resolve_project(linear: &LinearClient, needle: &str) -> Result<Option<String>, LinearError> {
    if is_likely_uuid(needle) {
        return Ok(Some(needle.trim().to_string()));
    }
    let cleaned = strip_filler_words(needle);
    // A needle made only of filler words is matched as typed
    let needle = if cleaned.is_empty() { needle } else { cleaned.as_str() };

    let projects = linear.projects().await?;
    Ok(best_match(needle, &projects, |p| vec![p.name.as_str()]).map(|(p, _)| p.id.clone()))
}

async fn resolve_assignee(linear: &LinearClient, needle: &str) -> Result<Option<String>, LinearError> {
    if is_likely_uuid(needle) {
        return Ok(Some(needle.trim().to_string()));
    }
    let users = linear.users().await?;
    Ok(best_match(needle, &users, |u| {
        vec![u.email.as_str(), u.display_name.as_str(), u.name.as_str()]
    })
    .map(|(u, _)| u.id.clone()))
}

async fn resolve_state(
    linear: &LinearClient,
    team_id: &str,
    needle: &str,
) -> Result<Option<String>, LinearError> {
    if is_likely_uuid(needle) {
        return Ok(Some(needle.trim().to_string()));
    }
    let states = linear.team_states(team_id).await?;
    Ok(best_match(needle, &states, |s| vec![s.name.as_str()]).map(|(s, _)| s.id.clone()))
}

/// Looks an issue up by UUID, or by key/text through search.
async fn find_issue(linear: &LinearClient, id_or_key: &str) -> Result<Option<Issue>, LinearError> {
    if is_likely_uuid(id_or_key) {
        return linear.issue(id_or_key.trim()).await;
    }
    Ok(linear.search_issues(id_or_key, 1).await?.into_iter().next())
}

// =============================================================================
// HANDLERS
// =============================================================================

async fn list_teams(linear: Arc<LinearClient>, _args: ToolArgs) -> Result<ToolResult, ToolError> {
    Ok(match linear.teams().await {
        Ok(teams) => ToolResult::ok(
            format!("Found {} teams", teams.len()),
            json!({ "teams": teams }),
        ),
        Err(e) => failed("Failed to list Linear teams", e),
    })
}

/// Projects, optionally narrowed to one team. `None` when the team is unknown.
async fn projects_for_team(
    linear: &LinearClient,
    team: Option<&str>,
) -> Result<Option<Vec<Project>>, LinearError> {
    let team_id = match team {
        Some(needle) => match resolve_team(linear, needle).await? {
            Some(id) => Some(id),
            None => return Ok(None),
        },
        None => None,
    };

    let mut projects = linear.projects().await?;
    if let Some(team_id) = &team_id {
        projects.retain(|p| p.belongs_to(team_id));
    }
    Ok(Some(projects))
}

async fn list_projects(linear: Arc<LinearClient>, args: ToolArgs) -> Result<ToolResult, ToolError> {
    Ok(match projects_for_team(&linear, args.opt_str("teamId")).await {
        Ok(Some(projects)) => ToolResult::ok(
            format!("Found {} projects", projects.len()),
            json!({ "projects": projects }),
        ),
        Ok(None) => ToolResult::failure(TEAM_NOT_FOUND),
        Err(e) => failed("Failed to list Linear projects", e),
    })
}

async fn states_for_team(
    linear: &LinearClient,
    team: &str,
) -> Result<Option<Vec<WorkflowState>>, LinearError> {
    match resolve_team(linear, team).await? {
        Some(team_id) => Ok(Some(linear.team_states(&team_id).await?)),
        None => Ok(None),
    }
}

async fn list_issue_states(linear: Arc<LinearClient>, args: ToolArgs) -> Result<ToolResult, ToolError> {
    let team = args.str("teamId")?;

    Ok(match states_for_team(&linear, team).await {
        Ok(Some(states)) => ToolResult::ok(
            format!("Found {} states", states.len()),
            json!({ "states": states }),
        ),
        Ok(None) => ToolResult::failure(TEAM_NOT_FOUND),
        Err(e) => failed("Failed to list Linear issue states", e),
    })
}

async fn search_issues(linear: Arc<LinearClient>, args: ToolArgs) -> Result<ToolResult, ToolError> {
    let query = args.str("query")?;
    let first = args
        .opt_u32("first")?
        .unwrap_or(DEFAULT_SEARCH_LIMIT)
        .clamp(1, 50);

    Ok(match linear.search_issues(query, first).await {
        Ok(issues) => ToolResult::ok(
            format!("Found {} issues", issues.len()),
            json!({ "issues": issues }),
        ),
        Err(e) => failed("Failed to search Linear issues", e),
    })
}

async fn get_issue(linear: Arc<LinearClient>, args: ToolArgs) -> Result<ToolResult, ToolError> {
    let id_or_key = args.str("issueIdOrKey")?;

    Ok(match find_issue(&linear, id_or_key).await {
        Ok(Some(issue)) => ToolResult::ok(
            format!("Found issue {}", issue.identifier),
            json!({ "issue": issue }),
        ),
        Ok(None) => ToolResult::failure(ISSUE_NOT_FOUND),
        Err(e) => failed("Failed to get Linear issue", e),
    })
}

/// Why an issue could not be created before reaching Linear.
enum Unresolved {
    Team,
    Project,
    Assignee,
    State,
}

impl Unresolved {
    fn message(&self) -> &'static str {
        match self {
            Unresolved::Team => TEAM_NOT_FOUND,
            Unresolved::Project => PROJECT_NOT_FOUND,
            Unresolved::Assignee => ASSIGNEE_NOT_FOUND,
            Unresolved::State => STATE_NOT_FOUND,
        }
    }
}

async fn build_create_input(
    linear: &LinearClient,
    title: &str,
    team: &str,
    args: &ToolArgs,
) -> Result<Result<IssueCreateInput, Unresolved>, LinearError> {
    let Some(team_id) = resolve_team(linear, team).await? else {
        return Ok(Err(Unresolved::Team));
    };

    let mut input = IssueCreateInput {
        title: title.to_string(),
        team_id,
        description: args.opt_str("description").map(str::to_string),
        label_ids: args.str_list("labelIds"),
        ..Default::default()
    };

    if let Some(project) = args.opt_str("projectId") {
        match resolve_project(linear, project).await? {
            Some(id) => input.project_id = Some(id),
            None => return Ok(Err(Unresolved::Project)),
        }
    }

    if let Some(assignee) = args.opt_str("assigneeId") {
        match resolve_assignee(linear, assignee).await? {
            Some(id) => input.assignee_id = Some(id),
            None => return Ok(Err(Unresolved::Assignee)),
        }
    }

    if let Some(state) = args.opt_str("stateId") {
        match resolve_state(linear, &input.team_id, state).await? {
            Some(id) => input.state_id = Some(id),
            None => return Ok(Err(Unresolved::State)),
        }
    }

    Ok(Ok(input))
}

async fn create_issue(linear: Arc<LinearClient>, args: ToolArgs) -> Result<ToolResult, ToolError> {
    let title = args.str("title")?;
    let team = args.str("teamId")?;

    let input = match build_create_input(&linear, title, team, &args).await {
        Ok(Ok(input)) => input,
        Ok(Err(unresolved)) => return Ok(ToolResult::failure(unresolved.message())),
        Err(e) => return Ok(failed("Failed to create Linear issue", e)),
    };

    Ok(match linear.create_issue(&input).await {
        Ok(payload) => match payload.issue {
            Some(issue) if payload.success => {
                tracing::info!("Created Linear issue {}", issue.identifier);
                ToolResult::ok(
                    format!("Issue created: {}", issue.identifier),
                    json!({ "issue": issue }),
                )
            }
            _ => ToolResult::failure("Linear did not create the issue"),
        },
        Err(e) => failed("Failed to create Linear issue", e),
    })
}

/// Resolves the issue and target state to IDs, or names what was missing.
async fn resolve_status_update(
    linear: &LinearClient,
    id_or_key: &str,
    state: &str,
) -> Result<Result<(String, String), &'static str>, LinearError> {
    let Some(issue) = find_issue(linear, id_or_key).await? else {
        return Ok(Err(ISSUE_NOT_FOUND));
    };

    let state_id = if is_likely_uuid(state) {
        Some(state.trim().to_string())
    } else {
        match &issue.team {
            Some(team) => resolve_state(linear, &team.id, state).await?,
            None => None,
        }
    };

    Ok(state_id.map(|state_id| (issue.id, state_id)).ok_or(STATE_NOT_FOUND))
}

async fn update_issue_status(linear: Arc<LinearClient>, args: ToolArgs) -> Result<ToolResult, ToolError> {
    let id_or_key = args.str("issueIdOrKey")?;
    let state = args.str("stateId")?;

    let (issue_id, state_id) = match resolve_status_update(&linear, id_or_key, state).await {
        Ok(Ok(ids)) => ids,
        Ok(Err(message)) => return Ok(ToolResult::failure(message)),
        Err(e) => return Ok(failed("Failed to update Linear issue status", e)),
    };

    Ok(match linear.update_issue_state(&issue_id, &state_id).await {
        Ok(payload) => match payload.issue {
            Some(issue) if payload.success => {
                let state_name = issue
                    .state
                    .as_ref()
                    .map(|s| s.name.clone())
                    .unwrap_or_else(|| state_id.clone());
                ToolResult::ok(
                    format!("Issue updated to {}", state_name),
                    json!({ "issue": issue }),
                )
            }
            _ => ToolResult::failure("Linear did not update the issue"),
        },
        Err(e) => failed("Failed to update Linear issue status", e),
    })
}

// =============================================================================
// REGISTRATION
// =============================================================================

pub fn register_linear_tools(
    registry: &mut ToolRegistry,
    linear: Arc<LinearClient>,
) -> Result<(), RegistryError> {
    registry.register_fn(
        ToolDescriptor::new("list_linear_teams", "List teams in Linear."),
        with_state(&linear, list_teams),
    )?;

    registry.register_fn(
        ToolDescriptor::new(
            "list_linear_projects",
            "List projects in Linear. You can filter by team by passing teamId as a team key (e.g. INT), name, or UUID.",
        )
        .optional(
            "teamId",
            PropertyDef::string("Optional team key/name/UUID to filter projects (e.g. INT)"),
        ),
        with_state(&linear, list_projects),
    )?;

    registry.register_fn(
        ToolDescriptor::new("list_linear_issue_states", "List issue states for a Linear team.")
            .param(
                "teamId",
                PropertyDef::string("Team name, key, or ID to list issue states for"),
            ),
        with_state(&linear, list_issue_states),
    )?;

    registry.register_fn(
        ToolDescriptor::new("search_linear_issues", "Search for Linear issues using a text query.")
            .param(
                "query",
                PropertyDef::string("Search text or issue identifier (e.g. ENG-123)"),
            )
            .optional(
                "first",
                PropertyDef::number("Maximum number of issues to return (default: 10)"),
            ),
        with_state(&linear, search_issues),
    )?;

    registry.register_fn(
        ToolDescriptor::new(
            "get_linear_issue",
            "Get a Linear issue by ID or identifier (e.g. ENG-123).",
        )
        .param("issueIdOrKey", PropertyDef::string("Issue UUID or identifier")),
        with_state(&linear, get_issue),
    )?;

    registry.register_fn(
        ToolDescriptor::new("create_linear_issue", "Create a new Linear issue.")
            .param("title", PropertyDef::string("Issue title"))
            .param(
                "teamId",
                PropertyDef::string("Team name, key, or ID to create the issue in"),
            )
            .optional("description", PropertyDef::string("Issue description (optional)"))
            .optional("projectId", PropertyDef::string("Optional project name or ID"))
            .optional("stateId", PropertyDef::string("Optional issue state name or ID"))
            .optional(
                "assigneeId",
                PropertyDef::string("Optional assignee name, email, or ID"),
            )
            .optional("labelIds", PropertyDef::string_list("Optional list of label IDs")),
        with_state(&linear, create_issue),
    )?;

    registry.register_fn(
        ToolDescriptor::new(
            "update_linear_issue_status",
            "Update a Linear issue status by issue ID/key and state name or ID.",
        )
        .param(
            "issueIdOrKey",
            PropertyDef::string("Issue UUID or identifier (e.g. ENG-123)"),
        )
        .param("stateId", PropertyDef::string("Target state name or ID")),
        with_state(&linear, update_issue_status),
    )?;

    Ok(())
}
