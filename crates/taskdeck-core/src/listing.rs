use chrono_tz::Tz;

use crate::config::DEFAULT_LIMIT;
use crate::datetime::{
  end_of_day,
  format_instant,
  start_of_day
};
use crate::query::{
  FilterState,
  serialize
};

/// Parameter set for `GET /tasks`, in
/// the order the API documents them.
#[derive(
  Debug, Clone, PartialEq, Eq,
)]
pub struct TaskListQuery {
  pairs: Vec<(String, String)>
}

impl TaskListQuery {
  /// The search text goes out twice,
  /// as `title` and `description`; the
  /// API ORs the two.
  #[tracing::instrument(level = "debug", skip(tz), fields(tz = %tz.name()))]
  pub fn build(
    filter: &FilterState,
    tz: &Tz
  ) -> anyhow::Result<Self> {
    let page = filter.page.max(1);
    let limit = if filter.limit == 0 {
      DEFAULT_LIMIT
    } else {
      filter.limit
    };

    let mut pairs = vec![
      ("page".to_string(), page.to_string()),
      (
        "limit".to_string(),
        limit.to_string()
      ),
    ];

    if !filter.search.is_empty() {
      pairs.push((
        "title".to_string(),
        filter.search.clone()
      ));
      pairs.push((
        "description".to_string(),
        filter.search.clone()
      ));
    }

    if let Some(completed) =
      filter.completed
    {
      pairs.push((
        "completed".to_string(),
        completed.to_string()
      ));
    }

    if let Some(from) = filter.from_date {
      pairs.push((
        "start_deadline".to_string(),
        format_instant(&start_of_day(
          from, tz
        )?)
      ));
    }

    // Inclusive end: a task due late on
    // the last day must still match.
    if let Some(to) = filter.to_date {
      pairs.push((
        "end_deadline".to_string(),
        format_instant(&end_of_day(
          to, tz
        )?)
      ));
    }

    Ok(Self {
      pairs
    })
  }

  pub fn pairs(
    &self
  ) -> &[(String, String)] {
    &self.pairs
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<&str> {
    self
      .pairs
      .iter()
      .find(|(k, _)| k == key)
      .map(|(_, v)| v.as_str())
  }

  pub fn to_query_string(&self) -> String {
    serialize(&self.pairs)
  }

  pub fn path(&self) -> String {
    format!(
      "/tasks?{}",
      self.to_query_string()
    )
  }
}
