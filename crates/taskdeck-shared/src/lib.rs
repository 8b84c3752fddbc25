use serde::{
  Deserialize,
  Serialize
};

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct TaskDto {
  pub id:          String,
  #[serde(default)]
  pub title:       String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub completed:   bool,
  pub deadline:    String,
  #[serde(default)]
  pub creator_id:  Option<String>,
  #[serde(default)]
  pub created_at:  Option<String>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Default,
)]
pub struct TasksPage {
  #[serde(default)]
  pub total: u64,
  #[serde(default)]
  pub tasks: Vec<TaskDto>
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct TaskCreate {
  pub title:       String,
  pub description: String,
  pub deadline:    String
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
)]
pub struct TaskPatch {
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub title:       Option<String>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub description: Option<String>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub deadline:    Option<String>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub completed:   Option<bool>
}

impl TaskPatch {
  pub fn is_empty(&self) -> bool {
    self.title.is_none()
      && self.description.is_none()
      && self.deadline.is_none()
      && self.completed.is_none()
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct UserDto {
  pub id:         String,
  pub username:   String,
  #[serde(default)]
  pub created_at: Option<String>
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct Credentials {
  pub username: String,
  pub password: String
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct SigninResponse {
  pub access_token:           String,
  pub access_token_expire_at: String,
  pub user:                   UserDto
}
