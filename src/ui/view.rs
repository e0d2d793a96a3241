use crossterm::event::KeyEvent;
use ratatui::prelude::*;

use crate::invalidation::RefreshOptions;
use crate::query::{QueryClient, QueryKey};

/// A keyboard shortcut hint for display in the header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortcutInfo {
  pub key: &'static str,
  pub label: &'static str,
  pub priority: u8, // Lower = shown first
}

impl ShortcutInfo {
  pub const fn new(key: &'static str, label: &'static str) -> Self {
    Self {
      key,
      label,
      priority: 100,
    }
  }

  pub const fn with_priority(mut self, priority: u8) -> Self {
    self.priority = priority;
    self
  }
}

/// Actions that a view can request in response to user input
pub enum ViewAction {
  /// No action needed
  None,
  /// Push a new view onto the stack
  Push(Box<dyn View>),
  /// Pop current view from stack (go back)
  Pop,
}

/// Trait for view behavior
///
/// Views own their `Query`s and declare which keys they observe. The App
/// registers those keys with the invalidation coordinator while the view is
/// on top of the stack, and calls `sync` on every tick so invalidated
/// queries refetch.
pub trait View {
  /// Handle a key event, returning an action for App to execute
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction;

  /// Render the view to the frame
  fn render(&mut self, frame: &mut Frame, area: Rect);

  /// Get the breadcrumb label for this view
  fn breadcrumb_label(&self) -> String;

  /// Query keys this view observes, with their refresh triggers
  fn subscriptions(&self) -> Vec<(QueryKey, RefreshOptions)>;

  /// Poll queries and refetch the ones marked dirty. Returns true on change.
  fn sync(&mut self, queries: &mut QueryClient) -> bool;

  /// Get keyboard shortcuts to display in the header
  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("r", "reload").with_priority(20),
      ShortcutInfo::new("R", "refresh all").with_priority(25),
      ShortcutInfo::new("q", "back").with_priority(90),
    ]
  }
}
