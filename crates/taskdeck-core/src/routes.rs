pub const DASHBOARD: &str = "/";
pub const SIGNIN: &str = "/signin";
pub const SIGNUP: &str = "/signup";
pub const NEW_TASK: &str = "/task/new";

pub fn task(id: &str) -> String {
  format!("/task/{id}")
}

pub fn edit_task(id: &str) -> String {
  format!("/task/{id}/edit")
}

#[derive(
  Debug, Clone, PartialEq, Eq,
)]
pub enum Route {
  Dashboard,
  Signin,
  Signup,
  NewTask,
  Task(String),
  EditTask(String),
  NotFound
}

impl Route {
  pub fn resolve(path: &str) -> Self {
    let trimmed = path.trim_end_matches('/');
    let segments: Vec<&str> = trimmed
      .split('/')
      .filter(|s| !s.is_empty())
      .collect();

    match segments.as_slice() {
      | [] => Route::Dashboard,
      | ["signin"] => Route::Signin,
      | ["signup"] => Route::Signup,
      | ["task", "new"] => Route::NewTask,
      | ["task", id] => {
        Route::Task((*id).to_string())
      }
      | ["task", id, "edit"] => {
        Route::EditTask((*id).to_string())
      }
      | _ => Route::NotFound
    }
  }
}
