use serde::Serialize;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
)]
#[serde(
  tag = "kind",
  rename_all = "snake_case"
)]
pub enum PageMarker {
  Previous { disabled: bool },
  Page { number: u32, active: bool },
  Ellipsis,
  Next { disabled: bool }
}

impl PageMarker {
  /// Page a marker navigates to, if it
  /// is clickable at all.
  pub fn target(
    &self,
    current: u32
  ) -> Option<u32> {
    match *self {
      | PageMarker::Previous {
        disabled: false
      } => Some(current.saturating_sub(1)),
      | PageMarker::Next {
        disabled: false
      } => Some(current.saturating_add(1)),
      | PageMarker::Page {
        number,
        active: false
      } => Some(number),
      | _ => None
    }
  }
}

#[derive(
  Debug, Clone, PartialEq, Eq, Serialize,
)]
pub struct PaginationView {
  pub total_pages:  u64,
  pub current_page: u32,
  pub markers:      Vec<PageMarker>
}

pub fn total_pages(
  total: u64,
  limit: u32
) -> u64 {
  if limit == 0 {
    return 0;
  }
  let limit = u64::from(limit);
  let remainder = total % limit;
  (total - remainder) / limit
    + u64::from(remainder > 0)
}

#[tracing::instrument(level = "trace")]
pub fn compute(
  total: u64,
  limit: u32,
  current_page: u32
) -> PaginationView {
  let total_pages =
    total_pages(total, limit);
  let current = u64::from(current_page);
  let mut markers = Vec::with_capacity(9);

  markers.push(PageMarker::Previous {
    disabled: current <= 1
  });

  if current > 2 {
    markers.push(PageMarker::Page {
      number: 1,
      active: false
    });
  }
  if current > 3 {
    markers.push(PageMarker::Ellipsis);
  }
  if current > 1 {
    markers.push(PageMarker::Page {
      number: current_page - 1,
      active: false
    });
  }

  markers.push(PageMarker::Page {
    number: current_page,
    active: true
  });

  if current < total_pages {
    markers.push(PageMarker::Page {
      number: current_page + 1,
      active: false
    });
  }
  if current + 2 < total_pages {
    markers.push(PageMarker::Ellipsis);
  }
  if current + 1 < total_pages {
    markers.push(PageMarker::Page {
      number: u32::try_from(total_pages)
        .unwrap_or(u32::MAX),
      active: false
    });
  }

  markers.push(PageMarker::Next {
    disabled: current >= total_pages
  });

  PaginationView {
    total_pages,
    current_page,
    markers
  }
}

#[cfg(test)]
mod tests {
  use super::PageMarker::*;
  use super::*;

  fn page(number: u32) -> PageMarker {
    Page {
      number,
      active: false
    }
  }

  fn active(number: u32) -> PageMarker {
    Page {
      number,
      active: true
    }
  }

  #[test]
  fn total_pages_is_ceiling() {
    for limit in 1..=15_u32 {
      for total in 0..=200_u64 {
        let expected = total
          .div_ceil(u64::from(limit));
        assert_eq!(
          total_pages(total, limit),
          expected,
          "total={total} limit={limit}"
        );
      }
    }
    assert_eq!(total_pages(10, 0), 0);
  }

  #[test]
  fn empty_listing() {
    let view = compute(0, 12, 1);
    assert_eq!(view.total_pages, 0);
    assert_eq!(
      view.markers,
      vec![
        Previous { disabled: true },
        active(1),
        Next { disabled: true }
      ]
    );
  }

  #[test]
  fn exactly_one_full_page() {
    let view = compute(12, 12, 1);
    assert_eq!(view.total_pages, 1);
    assert_eq!(
      view.markers.last(),
      Some(&Next { disabled: true })
    );
  }

  #[test]
  fn middle_page_shows_both_ellipses() {
    let view = compute(100, 12, 5);
    assert_eq!(view.total_pages, 9);
    assert_eq!(
      view.markers,
      vec![
        Previous { disabled: false },
        page(1),
        Ellipsis,
        page(4),
        active(5),
        page(6),
        Ellipsis,
        page(9),
        Next { disabled: false }
      ]
    );
  }

  #[test]
  fn near_edges_skip_redundant_markers() {
    assert_eq!(
      compute(100, 12, 3).markers,
      vec![
        Previous { disabled: false },
        page(1),
        page(2),
        active(3),
        page(4),
        Ellipsis,
        page(9),
        Next { disabled: false }
      ]
    );
    assert_eq!(
      compute(100, 12, 8).markers,
      vec![
        Previous { disabled: false },
        page(1),
        Ellipsis,
        page(7),
        active(8),
        page(9),
        Next { disabled: false }
      ]
    );
    assert_eq!(
      compute(100, 12, 9).markers,
      vec![
        Previous { disabled: false },
        page(1),
        Ellipsis,
        page(8),
        active(9),
        Next { disabled: true }
      ]
    );
  }

  #[test]
  fn marker_targets() {
    assert_eq!(
      Previous { disabled: false }
        .target(4),
      Some(3)
    );
    assert_eq!(
      Previous { disabled: true }.target(1),
      None
    );
    assert_eq!(
      Next { disabled: false }.target(4),
      Some(5)
    );
    assert_eq!(page(9).target(4), Some(9));
    assert_eq!(active(4).target(4), None);
    assert_eq!(Ellipsis.target(4), None);
  }
}
