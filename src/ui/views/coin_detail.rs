use chrono::Local;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Sparkline, Wrap};

use super::ViewContext;
use crate::coingecko::api_types::{CoinDetail, MarketChart, MarketData};
use crate::coingecko::Resource;
use crate::format::{format_chart_date, format_currency, format_percentage, format_supply};
use crate::invalidation::RefreshOptions;
use crate::query::{Query, QueryClient, QueryKey, QueryState};
use crate::ui::renderfns::change_color;
use crate::ui::view::{ShortcutInfo, View, ViewAction};

/// Chart timeframes in days
const TIMEFRAMES: [u32; 5] = [1, 7, 30, 90, 365];
const DEFAULT_TIMEFRAME: usize = 1;

/// Stats, price chart and description for one coin
pub struct CoinDetailView {
  ctx: ViewContext,
  id: String,
  name: String,
  timeframe: usize,
  detail: Query<CoinDetail>,
  chart: Query<MarketChart>,
}

impl CoinDetailView {
  pub fn new(ctx: ViewContext, id: String, name: String) -> Self {
    let detail_id = id.clone();
    let detail = ctx.query(&Resource::CoinDetail { id: id.clone() }, move |client| {
      let id = detail_id.clone();
      async move { client.coin_detail(&id).await.map_err(|e| e.to_string()) }
    });
    let chart = Self::chart_query(&ctx, &id, TIMEFRAMES[DEFAULT_TIMEFRAME]);

    Self {
      ctx,
      id,
      name,
      timeframe: DEFAULT_TIMEFRAME,
      detail,
      chart,
    }
  }

  fn chart_query(ctx: &ViewContext, id: &str, days: u32) -> Query<MarketChart> {
    let resource = Resource::CoinChart {
      id: id.to_string(),
      currency: ctx.client.currency().to_string(),
      days,
    };
    let id = id.to_string();
    ctx.query(&resource, move |client| {
      let id = id.clone();
      async move { client.coin_chart(&id, days).await.map_err(|e| e.to_string()) }
    })
  }

  fn days(&self) -> u32 {
    TIMEFRAMES[self.timeframe]
  }

  fn set_timeframe(&mut self, index: usize) {
    if index >= TIMEFRAMES.len() || index == self.timeframe {
      return;
    }
    self.timeframe = index;
    self.chart = Self::chart_query(&self.ctx, &self.id, self.days());
  }

  fn render_stats(&self, frame: &mut Frame, area: Rect) {
    let title = match self.detail.state() {
      QueryState::Loading => format!(" {} (loading...) ", self.name),
      QueryState::Error(e) => format!(" {} (error: {}) ", self.name, e),
      _ => format!(" {} ", self.name),
    };
    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    let detail = match self.detail.data() {
      Some(detail) if !detail.is_empty() => detail,
      _ => {
        let text = if self.detail.state().is_loading() {
          "Loading coin details..."
        } else {
          "Coin details unavailable. Press 'r' to retry."
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

    let mut lines = vec![Line::from(vec![
      Span::styled(detail.symbol.to_uppercase(), Style::default().fg(Color::Cyan).bold()),
      Span::styled(
        detail
          .market_cap_rank
          .map_or_else(String::new, |r| format!("  Rank #{}", r)),
        Style::default().fg(Color::Yellow),
      ),
    ])];
    if let Some(market) = &detail.market_data {
      lines.extend(stat_lines(market, self.ctx.client.currency(), &detail.symbol));
    }

    frame.render_widget(Paragraph::new(lines).block(block), area);
  }

  fn render_chart(&self, frame: &mut Frame, area: Rect) {
    let tabs: Vec<Span> = TIMEFRAMES
      .iter()
      .enumerate()
      .flat_map(|(i, days)| {
        let style = if i == self.timeframe {
          Style::default().fg(Color::Black).bg(Color::Cyan)
        } else {
          Style::default().fg(Color::DarkGray)
        };
        [Span::styled(format!(" {}d ", days), style), Span::raw(" ")]
      })
      .collect();

    let chart = self.chart.data();
    let prices: Vec<f64> = chart
      .map(|c| c.prices.iter().map(|[_, price]| *price).collect())
      .unwrap_or_default();

    let mut block = Block::default()
      .title(Line::from(tabs))
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));
    if let (Some(first), Some(last)) = (
      chart.and_then(|c| c.prices.first()),
      chart.and_then(|c| c.prices.last()),
    ) {
      let range = chart.and_then(MarketChart::price_range);
      block = block.title_bottom(Line::from(format!(
        " {} to {}  low {}  high {} ",
        format_chart_date(first[0], &Local),
        format_chart_date(last[0], &Local),
        format_currency(range.map(|r| r.0), 2),
        format_currency(range.map(|r| r.1), 2),
      )));
    }

    if prices.is_empty() {
      let text = if self.chart.state().is_loading() {
        "Loading chart..."
      } else {
        "No price data available."
      };
      frame.render_widget(
        Paragraph::new(text)
          .block(block)
          .style(Style::default().fg(Color::DarkGray)),
        area,
      );
      return;
    }

    let inner_width = area.width.saturating_sub(2) as usize;
    let bars = scale_to_bars(&downsample(&prices, inner_width));
    let first = prices.first().copied();
    let last = prices.last().copied();
    let trend = match (first, last) {
      (Some(f), Some(l)) => Some(l - f),
      _ => None,
    };

    let sparkline = Sparkline::default()
      .block(block)
      .data(&bars)
      .style(Style::default().fg(change_color(trend)));
    frame.render_widget(sparkline, area);
  }

  fn render_description(&self, frame: &mut Frame, area: Rect) {
    let text = self
      .detail
      .data()
      .map(|d| strip_tags(&d.description.en))
      .filter(|d| !d.is_empty())
      .unwrap_or_else(|| "No description available.".to_string());

    let paragraph = Paragraph::new(text)
      .block(
        Block::default()
          .title(" About ")
          .borders(Borders::ALL)
          .border_style(Style::default().fg(Color::Blue)),
      )
      .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, area);
  }
}

fn stat_lines(market: &MarketData, currency: &str, symbol: &str) -> Vec<Line<'static>> {
  let get = |map: &std::collections::HashMap<String, f64>| map.get(currency).copied();
  let label = Style::default().fg(Color::DarkGray);
  let change = market.price_change_percentage_24h;
  let ath_change = get(&market.ath_change_percentage);
  let atl_change = get(&market.atl_change_percentage);

  vec![
    Line::from(vec![
      Span::styled("Price        ", label),
      Span::styled(format_currency(get(&market.current_price), 2), Style::default().bold()),
      Span::raw("  "),
      Span::styled(format_percentage(change), Style::default().fg(change_color(change))),
    ]),
    Line::from(vec![
      Span::styled("Market Cap   ", label),
      Span::raw(format_currency(get(&market.market_cap), 0)),
    ]),
    Line::from(vec![
      Span::styled("Volume (24h) ", label),
      Span::raw(format_currency(get(&market.total_volume), 0)),
    ]),
    Line::from(vec![
      Span::styled("Supply       ", label),
      Span::raw(format!(
        "{} {}",
        format_supply(market.circulating_supply),
        symbol.to_uppercase()
      )),
    ]),
    Line::from(vec![
      Span::styled("24h Range    ", label),
      Span::raw(format!(
        "{} - {}",
        format_currency(get(&market.low_24h), 2),
        format_currency(get(&market.high_24h), 2)
      )),
    ]),
    Line::from(vec![
      Span::styled("ATH          ", label),
      Span::raw(format_currency(get(&market.ath), 2)),
      Span::raw("  "),
      Span::styled(format_percentage(ath_change), Style::default().fg(change_color(ath_change))),
    ]),
    Line::from(vec![
      Span::styled("ATL          ", label),
      Span::raw(format_currency(get(&market.atl), 2)),
      Span::raw("  "),
      Span::styled(format_percentage(atl_change), Style::default().fg(change_color(atl_change))),
    ]),
  ]
}

/// Pick at most `width` evenly spaced points, always keeping the last one.
fn downsample(values: &[f64], width: usize) -> Vec<f64> {
  if width == 0 || values.len() <= width {
    return values.to_vec();
  }
  if width == 1 {
    return values.last().copied().into_iter().collect();
  }
  let step = (values.len() - 1) as f64 / (width - 1) as f64;
  (0..width)
    .map(|i| values[((i as f64 * step).round() as usize).min(values.len() - 1)])
    .collect()
}

/// Map prices onto 1..=100 so the lowest point still draws a bar.
fn scale_to_bars(values: &[f64]) -> Vec<u64> {
  let (lo, hi) = values
    .iter()
    .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
  let span = hi - lo;
  values
    .iter()
    .map(|v| {
      if span > 0.0 {
        1 + ((v - lo) / span * 99.0).round() as u64
      } else {
        1
      }
    })
    .collect()
}

/// Descriptions come with HTML anchors; keep only the text.
fn strip_tags(html: &str) -> String {
  let mut out = String::with_capacity(html.len());
  let mut in_tag = false;
  for ch in html.chars() {
    match ch {
      '<' => in_tag = true,
      '>' => in_tag = false,
      _ if !in_tag => out.push(ch),
      _ => {}
    }
  }
  out.trim().to_string()
}

impl View for CoinDetailView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('h') | KeyCode::Left => self.set_timeframe(self.timeframe.saturating_sub(1)),
      KeyCode::Char('l') | KeyCode::Right => self.set_timeframe(self.timeframe + 1),
      KeyCode::Char(c @ '1'..='5') => self.set_timeframe(c as usize - '1' as usize),
      KeyCode::Char('r') => {
        self.detail.refetch();
        self.chart.refetch();
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let [top, description] =
      Layout::vertical([Constraint::Min(10), Constraint::Length(6)]).areas(area);
    let [stats, chart] =
      Layout::horizontal([Constraint::Length(42), Constraint::Min(20)]).areas(top);

    self.render_stats(frame, stats);
    self.render_chart(frame, chart);
    self.render_description(frame, description);
  }

  fn breadcrumb_label(&self) -> String {
    self.name.clone()
  }

  fn subscriptions(&self) -> Vec<(QueryKey, RefreshOptions)> {
    vec![
      (self.detail.key().clone(), self.ctx.refresh.coin_detail.options()),
      (self.chart.key().clone(), self.ctx.refresh.coin_chart.options()),
    ]
  }

  fn sync(&mut self, queries: &mut QueryClient) -> bool {
    let detail_changed = self.detail.sync(queries);
    let chart_changed = self.chart.sync(queries);
    detail_changed || chart_changed
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("h/l", "timeframe").with_priority(15),
      ShortcutInfo::new("r", "reload").with_priority(20),
      ShortcutInfo::new("R", "refresh all").with_priority(25),
      ShortcutInfo::new("q", "back").with_priority(90),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_downsample_keeps_endpoints() {
    let values: Vec<f64> = (0..100).map(f64::from).collect();
    let sampled = downsample(&values, 10);
    assert_eq!(sampled.len(), 10);
    assert_eq!(sampled[0], 0.0);
    assert_eq!(sampled[9], 99.0);
  }

  #[test]
  fn test_downsample_short_series_untouched() {
    assert_eq!(downsample(&[1.0, 2.0], 10), vec![1.0, 2.0]);
  }

  #[test]
  fn test_scale_to_bars() {
    assert_eq!(scale_to_bars(&[10.0, 15.0, 20.0]), vec![1, 51, 100]);
    assert_eq!(scale_to_bars(&[5.0, 5.0]), vec![1, 1]);
  }

  #[test]
  fn test_strip_tags() {
    assert_eq!(
      strip_tags(r#"Bitcoin is the first <a href="https://x">cryptocurrency</a>."#),
      "Bitcoin is the first cryptocurrency."
    );
  }
}
