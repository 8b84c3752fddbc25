//! What the dashboard controls do to the
//! query string. Each handler returns the
//! next href with paging reset.

use std::str::FromStr;
use std::time::Duration;

use anyhow::anyhow;
use chrono::NaiveDate;
use tokio::sync::mpsc;

use crate::datetime::format_date;
use crate::debounce::Debouncer;
use crate::query::{
  COMPLETED,
  FROM,
  SEARCH,
  TO,
  href,
  remove_params,
  set_param
};
use crate::routes;

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum StatusChoice {
  All,
  Todo,
  Completed
}

impl StatusChoice {
  pub fn from_completed(
    completed: Option<bool>
  ) -> Self {
    match completed {
      | Some(true) => StatusChoice::Completed,
      | Some(false) => StatusChoice::Todo,
      | None => StatusChoice::All
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      | StatusChoice::All => "All",
      | StatusChoice::Todo => "To do",
      | StatusChoice::Completed => {
        "Completed"
      }
    }
  }
}

impl FromStr for StatusChoice {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str()
    {
      | "all" => Ok(StatusChoice::All),
      | "todo" => Ok(StatusChoice::Todo),
      | "completed" | "done" => {
        Ok(StatusChoice::Completed)
      }
      | other => {
        Err(anyhow!(
          "unknown status {other}; \
           expected all, todo or \
           completed"
        ))
      }
    }
  }
}

pub fn search_changed(
  params: &str,
  text: &str
) -> String {
  let next = if text.is_empty() {
    remove_params(params, &[SEARCH])
  } else {
    set_param(params, SEARCH, text)
  };
  href(routes::DASHBOARD, &next)
}

pub fn status_changed(
  params: &str,
  choice: StatusChoice
) -> String {
  let next = match choice {
    | StatusChoice::All => {
      remove_params(params, &[COMPLETED])
    }
    | StatusChoice::Todo => {
      set_param(params, COMPLETED, "false")
    }
    | StatusChoice::Completed => {
      set_param(params, COMPLETED, "true")
    }
  };
  href(routes::DASHBOARD, &next)
}

/// Either end may be cleared on its own.
pub fn date_range_changed(
  params: &str,
  from: Option<NaiveDate>,
  to: Option<NaiveDate>
) -> String {
  let mut next = match from {
    | Some(date) => {
      set_param(
        params,
        FROM,
        &format_date(date)
      )
    }
    | None => remove_params(params, &[FROM])
  };
  next = match to {
    | Some(date) => {
      set_param(&next, TO, &format_date(date))
    }
    | None => remove_params(&next, &[TO])
  };
  href(routes::DASHBOARD, &next)
}

/// Free-text search input. Keystrokes
/// are coalesced; only the value left
/// standing after the quiet window turns
/// into a navigation.
#[derive(Debug)]
pub struct SearchBox {
  params:    String,
  debouncer: Debouncer<String>
}

impl SearchBox {
  pub fn new(
    params: &str,
    window: Duration
  ) -> (Self, mpsc::UnboundedReceiver<String>)
  {
    let (debouncer, rx) =
      Debouncer::new(window);
    (
      Self {
        params: params.to_string(),
        debouncer
      },
      rx
    )
  }

  pub fn input(&mut self, text: &str) {
    let next =
      search_changed(&self.params, text);
    self.debouncer.push(next);
  }

  pub fn is_pending(&self) -> bool {
    self.debouncer.is_pending()
  }
}

#[cfg(test)]
mod tests {
  use tokio::time::sleep;

  use super::*;

  #[test]
  fn search_sets_or_clears() {
    assert_eq!(
      search_changed(
        "completed=true&page=3",
        "fix bug"
      ),
      "/?completed=true&search=fix+bug"
    );
    assert_eq!(
      search_changed(
        "search=old&page=2",
        ""
      ),
      "/"
    );
  }

  #[test]
  fn status_choices() {
    assert_eq!(
      status_changed(
        "search=x&page=2",
        StatusChoice::Todo
      ),
      "/?search=x&completed=false"
    );
    assert_eq!(
      status_changed(
        "completed=false",
        StatusChoice::Completed
      ),
      "/?completed=true"
    );
    assert_eq!(
      status_changed(
        "completed=true&page=9",
        StatusChoice::All
      ),
      "/"
    );
    assert_eq!(
      "todo".parse::<StatusChoice>().unwrap(),
      StatusChoice::Todo
    );
    assert!(
      "maybe".parse::<StatusChoice>().is_err()
    );
    assert_eq!(
      StatusChoice::from_completed(None),
      StatusChoice::All
    );
  }

  #[test]
  fn date_range_edits_each_end() {
    let june = |d| {
      NaiveDate::from_ymd_opt(2024, 6, d)
    };
    assert_eq!(
      date_range_changed(
        "page=4",
        june(1),
        june(30)
      ),
      "/?from=2024-06-01&to=2024-06-30"
    );
    assert_eq!(
      date_range_changed(
        "from=2024-06-01&to=2024-06-30",
        june(3),
        None
      ),
      "/?from=2024-06-03"
    );
    assert_eq!(
      date_range_changed(
        "from=2024-06-01&to=2024-06-30",
        None,
        None
      ),
      "/"
    );
  }

  #[tokio::test(start_paused = true)]
  async fn search_box_debounces_keystrokes()
  {
    let (mut search, mut rx) = SearchBox::new(
      "completed=true&page=2",
      Duration::from_millis(500)
    );
    search.input("m");
    sleep(Duration::from_millis(100)).await;
    search.input("me");
    sleep(Duration::from_millis(100)).await;
    search.input("mee");
    assert!(search.is_pending());

    assert_eq!(
      rx.recv().await.as_deref(),
      Some("/?completed=true&search=mee")
    );
    let extra = tokio::time::timeout(
      Duration::from_secs(2),
      rx.recv()
    )
    .await;
    assert!(extra.is_err());
  }
}
