use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};

use super::{CoinDetailView, ViewContext};
use crate::coingecko::api_types::{TrendingCoin, TrendingResponse};
use crate::coingecko::Resource;
use crate::invalidation::RefreshOptions;
use crate::query::{Query, QueryClient, QueryKey, QueryState};
use crate::ui::clamp_selection;
use crate::ui::view::{View, ViewAction};

/// Coins trending in searches over the last 24 hours
pub struct TrendingView {
  ctx: ViewContext,
  query: Query<TrendingResponse>,
  list_state: ListState,
}

impl TrendingView {
  pub fn new(ctx: ViewContext) -> Self {
    let query = ctx.query(&Resource::Trending, |client| async move {
      client.trending().await.map_err(|e| e.to_string())
    });

    Self {
      ctx,
      query,
      list_state: ListState::default().with_selected(Some(0)),
    }
  }

  fn coins(&self) -> Vec<&TrendingCoin> {
    self
      .query
      .data()
      .map(|t| t.coins.iter().map(|entry| &entry.item).collect())
      .unwrap_or_default()
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.coins().len();
    self
      .list_state
      .select(clamp_selection(self.list_state.selected(), len));

    let title = match self.query.state() {
      QueryState::Loading => " Trending (loading...) ".to_string(),
      QueryState::Error(e) => format!(" Trending (error: {}) ", e),
      _ => format!(" Trending ({}) ", len),
    };
    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if len == 0 && !self.query.state().is_loading() {
      let paragraph = Paragraph::new("No trending data available right now.")
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    // Collect items first to avoid borrow conflicts with list_state
    let items: Vec<ListItem> = self
      .coins()
      .into_iter()
      .enumerate()
      .map(|(i, coin)| {
        let rank = coin
          .market_cap_rank
          .map_or_else(|| "N/A".to_string(), |r| format!("#{}", r));
        ListItem::new(Line::from(vec![
          Span::styled(format!("{:>3}. ", i + 1), Style::default().fg(Color::DarkGray)),
          Span::styled(format!("{:<24}", coin.name), Style::default().bold()),
          Span::styled(
            format!("{:<8}", coin.symbol.to_uppercase()),
            Style::default().fg(Color::Cyan),
          ),
          Span::styled(format!("Rank: {}", rank), Style::default().fg(Color::Yellow)),
        ]))
      })
      .collect();

    let list = List::new(items)
      .block(block)
      .highlight_style(
        Style::default()
          .bg(Color::DarkGray)
          .add_modifier(Modifier::BOLD),
      )
      .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut self.list_state);
  }
}

impl View for TrendingView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('r') => self.query.refetch(),
      KeyCode::Enter => {
        let selected = self.list_state.selected().and_then(|i| self.coins().get(i).copied());
        if let Some(coin) = selected {
          return ViewAction::Push(Box::new(CoinDetailView::new(
            self.ctx.clone(),
            coin.id.clone(),
            coin.name.clone(),
          )));
        }
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    self.render_list(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    "Trending".to_string()
  }

  fn subscriptions(&self) -> Vec<(QueryKey, RefreshOptions)> {
    vec![(self.query.key().clone(), self.ctx.refresh.trending.options())]
  }

  fn sync(&mut self, queries: &mut QueryClient) -> bool {
    self.query.sync(queries)
  }
}
