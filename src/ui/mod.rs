pub mod components;
pub mod renderfns;
pub mod view;
pub mod views;

use crate::app::App;
use ratatui::prelude::*;

/// Main draw function
pub fn draw(frame: &mut Frame, app: &mut App) {
  let [header_area, content_area, footer_area] = Layout::vertical([
    Constraint::Length(1), // Header
    Constraint::Min(1),    // Current view
    Constraint::Length(1), // Breadcrumb and notices
  ])
  .areas(frame.area());

  let shortcuts = app.current_view().map(|v| v.shortcuts()).unwrap_or_default();
  renderfns::draw_header(
    frame,
    header_area,
    app.base_url(),
    app.currency(),
    &shortcuts,
  );

  if let Some(view) = app.current_view_mut() {
    view.render(frame, content_area);
  }
  app.command_input().render_overlay(frame, content_area);

  renderfns::draw_footer(frame, footer_area, &app.breadcrumb(), app.active_notice());
}

/// Keep a list selection inside `0..len`, or clear it for an empty list.
pub fn clamp_selection(selected: Option<usize>, len: usize) -> Option<usize> {
  if len == 0 {
    None
  } else {
    Some(selected.unwrap_or(0).min(len - 1))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_clamp_selection() {
    assert_eq!(clamp_selection(Some(3), 0), None);
    assert_eq!(clamp_selection(None, 5), Some(0));
    assert_eq!(clamp_selection(Some(9), 5), Some(4));
    assert_eq!(clamp_selection(Some(2), 5), Some(2));
  }
}
