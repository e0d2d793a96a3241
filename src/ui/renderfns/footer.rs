use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

use crate::notify::{Notice, Severity};

/// Draw the footer: view breadcrumb on the left, the active notice (if any)
/// on the right
pub fn draw_footer(frame: &mut Frame, area: Rect, breadcrumb: &[String], notice: Option<&Notice>) {
  let mut spans = vec![Span::raw(" ")];

  for (i, part) in breadcrumb.iter().enumerate() {
    if i > 0 {
      spans.push(Span::styled(" > ", Style::default().fg(Color::DarkGray)));
    }
    let style = if i + 1 == breadcrumb.len() {
      Style::default().fg(Color::Cyan).bold()
    } else {
      Style::default().fg(Color::White)
    };
    spans.push(Span::styled(part.clone(), style));
  }

  let left = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
  frame.render_widget(left, area);

  if let Some(notice) = notice {
    let color = match notice.severity() {
      Severity::Info => Color::Cyan,
      Severity::Warning => Color::Yellow,
      Severity::Error => Color::Red,
    };
    let toast = Line::from(vec![
      Span::styled(format!("{}: ", notice.title()), Style::default().fg(color).bold()),
      Span::styled(notice.description(), Style::default().fg(color)),
      Span::raw(" "),
    ])
    .alignment(Alignment::Right);
    frame.render_widget(Paragraph::new(toast), area);
  }
}
