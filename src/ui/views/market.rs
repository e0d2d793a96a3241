use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState};

use super::{CoinDetailView, ViewContext};
use crate::coingecko::api_types::{GlobalResponse, MarketCoin};
use crate::coingecko::Resource;
use crate::format::{format_currency, format_percentage};
use crate::invalidation::RefreshOptions;
use crate::query::{Query, QueryClient, QueryKey, QueryState};
use crate::ui::clamp_selection;
use crate::ui::renderfns::{change_color, truncate};
use crate::ui::view::{ShortcutInfo, View, ViewAction};

/// Market overview: global totals plus one page of coins by market cap
pub struct MarketView {
  ctx: ViewContext,
  page: u32,
  global: Query<GlobalResponse>,
  markets: Query<Vec<MarketCoin>>,
  table_state: TableState,
}

impl MarketView {
  pub fn new(ctx: ViewContext) -> Self {
    let global = ctx.query(&Resource::Global, |client| async move {
      client.global().await.map_err(|e| e.to_string())
    });
    let markets = Self::markets_query(&ctx, 1);

    Self {
      ctx,
      page: 1,
      global,
      markets,
      table_state: TableState::default().with_selected(Some(0)),
    }
  }

  fn markets_resource(ctx: &ViewContext, page: u32) -> Resource {
    Resource::Markets {
      currency: ctx.client.currency().to_string(),
      per_page: ctx.per_page,
      page,
    }
  }

  fn markets_query(ctx: &ViewContext, page: u32) -> Query<Vec<MarketCoin>> {
    let per_page = ctx.per_page;
    ctx.query(&Self::markets_resource(ctx, page), move |client| async move {
      client
        .markets(page, per_page)
        .await
        .map_err(|e| e.to_string())
    })
  }

  fn coins(&self) -> &[MarketCoin] {
    self.markets.data().map(Vec::as_slice).unwrap_or(&[])
  }

  /// Switch pages. The new page's query starts idle and fetches on the next sync.
  fn go_to_page(&mut self, page: u32) {
    if page == self.page || page == 0 {
      return;
    }
    self.page = page;
    self.markets = Self::markets_query(&self.ctx, page);
    self.table_state.select(Some(0));
  }

  fn has_next_page(&self) -> bool {
    self.coins().len() >= self.ctx.per_page as usize
  }

  fn render_global(&self, frame: &mut Frame, area: Rect) {
    let currency = self.ctx.client.currency();
    let block = Block::default()
      .title(" Global Market ")
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    let stats = match self.global.data() {
      Some(global) => &global.data,
      None => {
        let text = if self.global.state().error().is_some() {
          "Global data unavailable"
        } else {
          "Loading..."
        };
        frame.render_widget(
          Paragraph::new(text)
            .block(block)
            .style(Style::default().fg(Color::DarkGray)),
          area,
        );
        return;
      }
    };

    let change = stats.market_cap_change_percentage_24h_usd;
    let label = Style::default().fg(Color::DarkGray);
    let line = Line::from(vec![
      Span::styled(" Market Cap ", label),
      Span::styled(
        format_currency(stats.market_cap(currency), 2),
        Style::default().bold(),
      ),
      Span::raw(" "),
      Span::styled(format_percentage(change), Style::default().fg(change_color(change))),
      Span::styled("   24h Volume ", label),
      Span::styled(format_currency(stats.volume(currency), 2), Style::default().bold()),
      Span::styled("   BTC Dominance ", label),
      Span::styled(format_percentage(stats.dominance("btc")), Style::default().bold()),
      Span::styled("   Coins ", label),
      Span::raw(
        stats
          .active_cryptocurrencies
          .map_or_else(|| "N/A".to_string(), |n| n.to_string()),
      ),
    ]);

    frame.render_widget(Paragraph::new(line).block(block), area);
  }

  fn render_table(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.coins().len();
    self
      .table_state
      .select(clamp_selection(self.table_state.selected(), len));

    let status = match self.markets.state() {
      QueryState::Loading => " (loading...)".to_string(),
      QueryState::Error(e) => format!(" (error: {})", e),
      _ if self.markets.is_fetching() => " (refreshing)".to_string(),
      _ => String::new(),
    };
    let block = Block::default()
      .title(format!(" Markets - page {}{} ", self.page, status))
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if len == 0 && !self.markets.state().is_loading() {
      let content = if self.markets.state().error().is_some() {
        "Failed to load market data. Press 'r' to retry."
      } else {
        "No market data available."
      };
      frame.render_widget(
        Paragraph::new(content)
          .block(block)
          .style(Style::default().fg(Color::DarkGray)),
        area,
      );
      return;
    }

    let header = Row::new(["#", "Coin", "Price", "24h", "Market Cap", "Volume"])
      .style(Style::default().fg(Color::Yellow).bold());

    let rows: Vec<Row> = self
      .coins()
      .iter()
      .map(|coin| {
        let change = coin.price_change_percentage_24h;
        Row::new(vec![
          Cell::from(coin.market_cap_rank.map_or_else(|| "-".to_string(), |r| r.to_string())),
          Cell::from(Line::from(vec![
            Span::raw(truncate(&coin.name, 18)),
            Span::styled(
              format!(" {}", coin.symbol.to_uppercase()),
              Style::default().fg(Color::DarkGray),
            ),
          ])),
          Cell::from(format_currency(coin.current_price, 2)),
          Cell::from(format_percentage(change)).style(Style::default().fg(change_color(change))),
          Cell::from(format_currency(coin.market_cap, 2)),
          Cell::from(format_currency(coin.total_volume, 2)),
        ])
      })
      .collect();

    let widths = [
      Constraint::Length(5),
      Constraint::Min(20),
      Constraint::Length(12),
      Constraint::Length(9),
      Constraint::Length(12),
      Constraint::Length(12),
    ];
    let table = Table::new(rows, widths)
      .header(header)
      .block(block)
      .row_highlight_style(
        Style::default()
          .bg(Color::DarkGray)
          .add_modifier(Modifier::BOLD),
      )
      .highlight_symbol("> ");

    frame.render_stateful_widget(table, area, &mut self.table_state);
  }

  fn handle_navigation(&mut self, key: KeyEvent) -> Option<ViewAction> {
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.table_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.table_state.select_previous(),
      KeyCode::Char('n') | KeyCode::Right if self.has_next_page() => self.go_to_page(self.page + 1),
      KeyCode::Char('p') | KeyCode::Left => self.go_to_page(self.page.saturating_sub(1)),
      _ => return None,
    }
    Some(ViewAction::None)
  }

  fn handle_actions(&mut self, key: KeyEvent) -> Option<ViewAction> {
    match key.code {
      KeyCode::Char('r') => {
        self.global.refetch();
        self.markets.refetch();
        Some(ViewAction::None)
      }
      KeyCode::Enter => {
        let coin = self.coins().get(self.table_state.selected()?)?;
        Some(ViewAction::Push(Box::new(CoinDetailView::new(
          self.ctx.clone(),
          coin.id.clone(),
          coin.name.clone(),
        ))))
      }
      KeyCode::Char('q') | KeyCode::Esc => Some(ViewAction::Pop),
      _ => None,
    }
  }
}

impl View for MarketView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    self
      .handle_navigation(key)
      .or_else(|| self.handle_actions(key))
      .unwrap_or(ViewAction::None)
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let [global_area, table_area] =
      Layout::vertical([Constraint::Length(3), Constraint::Min(3)]).areas(area);
    self.render_global(frame, global_area);
    self.render_table(frame, table_area);
  }

  fn breadcrumb_label(&self) -> String {
    "Market".to_string()
  }

  fn subscriptions(&self) -> Vec<(QueryKey, RefreshOptions)> {
    vec![
      (self.global.key().clone(), self.ctx.refresh.global.options()),
      (self.markets.key().clone(), self.ctx.refresh.markets.options()),
    ]
  }

  fn sync(&mut self, queries: &mut QueryClient) -> bool {
    let global_changed = self.global.sync(queries);
    let markets_changed = self.markets.sync(queries);
    global_changed || markets_changed
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("n/p", "page").with_priority(15),
      ShortcutInfo::new("enter", "details").with_priority(18),
      ShortcutInfo::new("r", "reload").with_priority(20),
      ShortcutInfo::new("R", "refresh all").with_priority(25),
      ShortcutInfo::new("q", "quit").with_priority(90),
    ]
  }
}
