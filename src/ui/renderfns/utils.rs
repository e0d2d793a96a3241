use ratatui::prelude::Color;

/// Truncate to `max_len` characters, ending in "..." when cut
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Green for gains, red for losses
pub fn change_color(change: Option<f64>) -> Color {
  match change {
    Some(v) if v > 0.0 => Color::Green,
    Some(v) if v < 0.0 => Color::Red,
    _ => Color::Gray,
  }
}
