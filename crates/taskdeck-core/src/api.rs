use chrono::{
  DateTime,
  Utc
};
use chrono_tz::Tz;
use serde::Serialize;
use serde::de::IgnoredAny;
use serde_json::json;
use taskdeck_shared::{
  Credentials,
  SigninResponse,
  TaskCreate,
  TaskDto,
  TaskPatch,
  TasksPage,
  UserDto
};
use tracing::{
  info,
  instrument,
  warn
};
use url::form_urlencoded;

use crate::cache::TASKS_TAG;
use crate::client::{
  ApiClient,
  CallOptions
};
use crate::datetime::parse_instant;
use crate::envelope::{
  Envelope,
  RequestError
};
use crate::listing::TaskListQuery;
use crate::pagination::{
  PaginationView,
  compute
};
use crate::query::FilterState;
use crate::session::Session;

#[derive(Debug, Clone)]
pub struct SignedIn {
  pub session: Session,
  pub user:    UserDto
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
  pub page:       TasksPage,
  pub pagination: PaginationView,
  pub query:      String
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
)]
pub enum TaskState {
  Completed,
  Late,
  InProgress
}

impl TaskState {
  pub fn of(
    task: &TaskDto,
    now: DateTime<Utc>
  ) -> Self {
    if task.completed {
      return TaskState::Completed;
    }
    match parse_instant(&task.deadline) {
      | Ok(deadline) if deadline < now => {
        TaskState::Late
      }
      | _ => TaskState::InProgress
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      | TaskState::Completed => "Completed",
      | TaskState::Late => "Late",
      | TaskState::InProgress => {
        "In progress"
      }
    }
  }
}

fn task_path(id: &str) -> String {
  let encoded: String =
    form_urlencoded::byte_serialize(
      id.as_bytes()
    )
    .collect();
  format!("/tasks/{encoded}")
}

fn to_json<T: Serialize>(
  value: &T
) -> Result<serde_json::Value, RequestError>
{
  serde_json::to_value(value).map_err(
    |err| {
      RequestError::Protocol(format!(
        "failed to encode request body: \
         {err}"
      ))
    }
  )
}

#[instrument(skip(client, creds), fields(username = %creds.username))]
pub async fn signin(
  client: &ApiClient,
  creds: &Credentials
) -> Envelope<SignedIn> {
  let body = match to_json(creds) {
    | Ok(body) => body,
    | Err(err) => return Envelope::Err(err)
  };
  let env: Envelope<SigninResponse> =
    client
      .call(
        "/users/login",
        CallOptions::post(body)
      )
      .await;

  let resp = match env {
    | Envelope::Ok(resp) => resp,
    | Envelope::Err(err) => {
      return Envelope::Err(err);
    }
  };

  match parse_instant(
    &resp.access_token_expire_at
  ) {
    | Ok(expires_at) => {
      info!(user = %resp.user.username, %expires_at, "signed in");
      Envelope::Ok(SignedIn {
        session: Session {
          token: resp.access_token,
          expires_at
        },
        user:    resp.user
      })
    }
    | Err(err) => {
      Envelope::Err(RequestError::Protocol(
        err.to_string()
      ))
    }
  }
}

/// Registers the account, then signs in
/// with the same credentials.
#[instrument(skip(client, creds), fields(username = %creds.username))]
pub async fn signup(
  client: &ApiClient,
  creds: &Credentials
) -> Envelope<SignedIn> {
  let body = match to_json(creds) {
    | Ok(body) => body,
    | Err(err) => return Envelope::Err(err)
  };
  let created: Envelope<UserDto> = client
    .call("/users", CallOptions::post(body))
    .await;
  if let Envelope::Err(err) = created {
    return Envelope::Err(err);
  }
  signin(client, creds).await
}

/// Any failure, including "not found",
/// reads as absent.
#[instrument(skip(client))]
pub async fn find_task(
  client: &ApiClient,
  id: &str
) -> Option<TaskDto> {
  let env: Envelope<TaskDto> = client
    .call(
      &task_path(id),
      CallOptions::get()
        .authenticated()
        .tagged(TASKS_TAG)
    )
    .await;
  match env {
    | Envelope::Ok(task) => Some(task),
    | Envelope::Err(err) => {
      warn!(error = %err, "task lookup failed");
      None
    }
  }
}

/// A failed listing renders as an empty
/// one.
#[instrument(skip(client, query))]
pub async fn list_tasks(
  client: &ApiClient,
  query: &TaskListQuery
) -> TasksPage {
  let env: Envelope<TasksPage> = client
    .call(
      &query.path(),
      CallOptions::get()
        .authenticated()
        .tagged(TASKS_TAG)
    )
    .await;
  match env {
    | Envelope::Ok(page) => page,
    | Envelope::Err(err) => {
      warn!(error = %err, "task listing failed; showing empty page");
      TasksPage::default()
    }
  }
}

#[instrument(skip(client, filter, tz))]
pub async fn load_dashboard(
  client: &ApiClient,
  filter: &FilterState,
  tz: &Tz
) -> anyhow::Result<Dashboard> {
  let query =
    TaskListQuery::build(filter, tz)?;
  let page = list_tasks(client, &query).await;
  let pagination =
    compute(page.total, filter.limit, filter.page);
  Ok(Dashboard {
    page,
    pagination,
    query: filter.to_query()
  })
}

#[instrument(skip(client, task), fields(title = %task.title))]
pub async fn create_task(
  client: &ApiClient,
  task: &TaskCreate
) -> Envelope<TaskDto> {
  let body = match to_json(task) {
    | Ok(body) => body,
    | Err(err) => return Envelope::Err(err)
  };
  client
    .call(
      "/tasks",
      CallOptions::post(body)
        .authenticated()
        .revalidates(TASKS_TAG)
    )
    .await
}

#[instrument(skip(client, patch))]
pub async fn update_task(
  client: &ApiClient,
  id: &str,
  patch: &TaskPatch
) -> Envelope<TaskDto> {
  let body = match to_json(patch) {
    | Ok(body) => body,
    | Err(err) => return Envelope::Err(err)
  };
  client
    .call(
      &task_path(id),
      CallOptions::put(body)
        .authenticated()
        .revalidates(TASKS_TAG)
    )
    .await
}

#[instrument(skip(client))]
pub async fn mark_task_done(
  client: &ApiClient,
  id: &str
) -> Envelope<TaskDto> {
  client
    .call(
      &task_path(id),
      CallOptions::put(
        json!({ "completed": true })
      )
      .authenticated()
      .revalidates(TASKS_TAG)
    )
    .await
}

#[instrument(skip(client))]
pub async fn delete_task(
  client: &ApiClient,
  id: &str
) -> Envelope<()> {
  let env: Envelope<IgnoredAny> = client
    .call(
      &task_path(id),
      CallOptions::delete()
        .authenticated()
        .revalidates(TASKS_TAG)
    )
    .await;
  env.map(|_| ())
}

#[cfg(test)]
mod tests {
  use chrono::{
    Duration,
    Utc
  };

  use super::*;

  fn task(
    completed: bool,
    deadline: DateTime<Utc>
  ) -> TaskDto {
    TaskDto {
      id: "t1".to_string(),
      title: "Ship".to_string(),
      description: String::new(),
      completed,
      deadline: deadline.to_rfc3339(),
      creator_id: None,
      created_at: None
    }
  }

  #[test]
  fn task_state_labels() {
    let now = Utc::now();
    assert_eq!(
      TaskState::of(
        &task(true, now - Duration::days(1)),
        now
      ),
      TaskState::Completed
    );
    assert_eq!(
      TaskState::of(
        &task(false, now - Duration::days(1)),
        now
      )
      .label(),
      "Late"
    );
    assert_eq!(
      TaskState::of(
        &task(false, now + Duration::days(1)),
        now
      ),
      TaskState::InProgress
    );
  }

  #[test]
  fn task_paths_are_encoded() {
    assert_eq!(task_path("V1StGXR8"), "/tasks/V1StGXR8");
    assert_eq!(task_path("a/b"), "/tasks/a%2Fb");
  }
}
