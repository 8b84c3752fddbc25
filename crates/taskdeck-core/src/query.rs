//! Address-bar state: the dashboard's
//! filters live entirely in the query
//! string, so every navigation rebuilds
//! them from scratch.

use chrono::NaiveDate;
use tracing::trace;
use url::form_urlencoded;

use crate::config::DEFAULT_LIMIT;
use crate::datetime::{
  format_date,
  parse_date
};

pub const PAGE: &str = "page";
pub const LIMIT: &str = "limit";
pub const SEARCH: &str = "search";
pub const COMPLETED: &str = "completed";
pub const FROM: &str = "from";
pub const TO: &str = "to";

#[derive(
  Debug, Clone, PartialEq, Eq,
)]
pub struct FilterState {
  pub search:    String,
  pub completed: Option<bool>,
  pub from_date: Option<NaiveDate>,
  pub to_date:   Option<NaiveDate>,
  pub page:      u32,
  pub limit:     u32
}

impl Default for FilterState {
  fn default() -> Self {
    Self {
      search:    String::new(),
      completed: None,
      from_date: None,
      to_date:   None,
      page:      1,
      limit:     DEFAULT_LIMIT
    }
  }
}

impl FilterState {
  #[tracing::instrument(level = "trace")]
  pub fn from_query(
    query: &str,
    default_limit: u32
  ) -> Self {
    let pairs = parse(query);
    let get = |key: &str| {
      pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
    };

    let page = get(PAGE)
      .and_then(|raw| {
        raw.trim().parse::<i64>().ok()
      })
      .map(clamp_page)
      .unwrap_or(1);

    let limit = get(LIMIT)
      .and_then(|raw| {
        raw.trim().parse::<u32>().ok()
      })
      .filter(|n| *n > 0)
      .unwrap_or(default_limit);

    let completed = match get(COMPLETED)
    {
      | Some("true") => Some(true),
      | Some("false") => Some(false),
      | _ => None
    };

    Self {
      search: get(SEARCH)
        .unwrap_or_default()
        .to_string(),
      completed,
      from_date: get(FROM)
        .and_then(parse_date),
      to_date: get(TO).and_then(parse_date),
      page,
      limit
    }
  }

  /// Canonical encoding; defaults are
  /// left out entirely.
  pub fn to_pairs(
    &self
  ) -> Vec<(String, String)> {
    let mut out = Vec::new();
    if !self.search.is_empty() {
      out.push((
        SEARCH.to_string(),
        self.search.clone()
      ));
    }
    if let Some(completed) =
      self.completed
    {
      out.push((
        COMPLETED.to_string(),
        completed.to_string()
      ));
    }
    if let Some(from) = self.from_date {
      out.push((
        FROM.to_string(),
        format_date(from)
      ));
    }
    if let Some(to) = self.to_date {
      out.push((
        TO.to_string(),
        format_date(to)
      ));
    }
    if self.page > 1 {
      out.push((
        PAGE.to_string(),
        self.page.to_string()
      ));
    }
    if self.limit != DEFAULT_LIMIT {
      out.push((
        LIMIT.to_string(),
        self.limit.to_string()
      ));
    }
    out
  }

  pub fn to_query(&self) -> String {
    serialize(&self.to_pairs())
  }
}

fn clamp_page(raw: i64) -> u32 {
  u32::try_from(raw.max(1))
    .unwrap_or(u32::MAX)
}

pub fn parse(
  query: &str
) -> Vec<(String, String)> {
  let query = query
    .strip_prefix('?')
    .unwrap_or(query);
  form_urlencoded::parse(
    query.as_bytes()
  )
  .into_owned()
  .collect()
}

pub fn serialize(
  pairs: &[(String, String)]
) -> String {
  form_urlencoded::Serializer::new(
    String::new()
  )
  .extend_pairs(pairs)
  .finish()
}

/// Sets `key` and drops `page`: any
/// filter change starts over at the
/// first page.
#[tracing::instrument(level = "trace")]
pub fn set_param(
  current: &str,
  key: &str,
  value: &str
) -> String {
  let mut pairs = parse(current);
  pairs.retain(|(k, _)| k != PAGE);
  upsert(&mut pairs, key, value);
  trace!(count = pairs.len(), "set query parameter");
  serialize(&pairs)
}

/// Deletes `keys` (absent ones are
/// ignored) and drops `page`.
#[tracing::instrument(level = "trace")]
pub fn remove_params(
  current: &str,
  keys: &[&str]
) -> String {
  let mut pairs = parse(current);
  pairs.retain(|(k, _)| {
    k != PAGE
      && !keys.contains(&k.as_str())
  });
  serialize(&pairs)
}

/// Page navigation; unlike the filter
/// edits this keeps every other key.
pub fn with_page(
  current: &str,
  page: u32
) -> String {
  let mut pairs = parse(current);
  upsert(
    &mut pairs,
    PAGE,
    &page.max(1).to_string()
  );
  serialize(&pairs)
}

pub fn href(
  path: &str,
  query: &str
) -> String {
  if query.is_empty() {
    path.to_string()
  } else {
    format!("{path}?{query}")
  }
}

/// Splits `/path?query` (fragment
/// dropped).
pub fn split_href(
  href: &str
) -> (&str, &str) {
  let href = href
    .split_once('#')
    .map(|(before, _)| before)
    .unwrap_or(href);
  match href.split_once('?') {
    | Some((path, query)) => {
      (path, query)
    }
    | None => (href, "")
  }
}

fn upsert(
  pairs: &mut Vec<(String, String)>,
  key: &str,
  value: &str
) {
  match pairs
    .iter()
    .position(|(k, _)| k == key)
  {
    | Some(idx) => {
      pairs[idx].1 = value.to_string();
      let mut seen = 0_usize;
      pairs.retain(|(k, _)| {
        if k != key {
          return true;
        }
        seen += 1;
        seen == 1
      });
    }
    | None => {
      pairs.push((
        key.to_string(),
        value.to_string()
      ))
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::*;

  fn get<'a>(
    pairs: &'a [(String, String)],
    key: &str
  ) -> Option<&'a str> {
    pairs
      .iter()
      .find(|(k, _)| k == key)
      .map(|(_, v)| v.as_str())
  }

  #[test]
  fn set_param_replaces_key_and_resets_page()
   {
    let before = "search=report&page=4&completed=false";
    let next =
      set_param(before, COMPLETED, "true");
    assert_eq!(
      next,
      "search=report&completed=true"
    );

    let parsed = parse(&next);
    assert_eq!(
      get(&parsed, COMPLETED),
      Some("true")
    );
    assert_eq!(
      get(&parsed, SEARCH),
      Some("report")
    );
    assert_eq!(get(&parsed, PAGE), None);
  }

  #[test]
  fn set_param_preserves_other_values_exactly()
   {
    let before = serialize(&[
      (
        "search".to_string(),
        "a&b = c/ü".to_string()
      ),
      (
        "from".to_string(),
        "2024-06-01".to_string()
      ),
      ("page".to_string(), "2".to_string()),
    ]);
    let next = set_param(
      &before,
      "to",
      "2024-06-30"
    );
    let parsed = parse(&next);
    assert_eq!(
      get(&parsed, "search"),
      Some("a&b = c/ü")
    );
    assert_eq!(
      get(&parsed, "from"),
      Some("2024-06-01")
    );
    assert_eq!(
      get(&parsed, "to"),
      Some("2024-06-30")
    );
    assert_eq!(get(&parsed, PAGE), None);
  }

  #[test]
  fn set_param_collapses_duplicates() {
    let next = set_param(
      "search=a&limit=5&search=b",
      SEARCH,
      "c"
    );
    assert_eq!(next, "search=c&limit=5");
  }

  #[test]
  fn remove_absent_key_is_noop_apart_from_page()
   {
    assert_eq!(
      remove_params(
        "search=x&completed=true",
        &["from", "to"]
      ),
      "search=x&completed=true"
    );
    assert_eq!(
      remove_params(
        "page=3&from=2024-01-01",
        &[FROM]
      ),
      ""
    );
  }

  #[test]
  fn page_navigation_keeps_everything() {
    assert_eq!(
      with_page("search=x&page=2&to=2024-01-31", 3),
      "search=x&page=3&to=2024-01-31"
    );
    assert_eq!(
      with_page("search=x", 2),
      "search=x&page=2"
    );
    assert_eq!(
      with_page("", 0),
      "page=1"
    );
  }

  #[test]
  fn filter_state_decodes_and_normalizes()
   {
    let state = FilterState::from_query(
      "?search=fix+bug&completed=false&from=2024-06-01&to=garbage&page=-4",
      12
    );
    assert_eq!(state.search, "fix bug");
    assert_eq!(
      state.completed,
      Some(false)
    );
    assert_eq!(
      state.from_date,
      NaiveDate::from_ymd_opt(2024, 6, 1)
    );
    assert_eq!(state.to_date, None);
    assert_eq!(state.page, 1);
    assert_eq!(state.limit, 12);

    let state = FilterState::from_query(
      "page=abc&completed=yes&limit=0",
      12
    );
    assert_eq!(state.page, 1);
    assert_eq!(state.completed, None);
    assert_eq!(state.limit, 12);
  }

  #[test]
  fn filter_state_canonical_encoding_omits_defaults()
   {
    assert_eq!(
      FilterState::default().to_query(),
      ""
    );

    let state = FilterState {
      search: "q".to_string(),
      completed: Some(true),
      page: 2,
      ..FilterState::default()
    };
    let encoded = state.to_query();
    assert_eq!(
      encoded,
      "search=q&completed=true&page=2"
    );
    assert_eq!(
      FilterState::from_query(&encoded, 12),
      state
    );
  }

  #[test]
  fn href_helpers() {
    assert_eq!(href("/", ""), "/");
    assert_eq!(
      href("/", "page=2"),
      "/?page=2"
    );
    assert_eq!(
      split_href("/task/7?x=1#top"),
      ("/task/7", "x=1")
    );
    assert_eq!(split_href("/"), ("/", ""));
  }
}
