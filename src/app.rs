use crate::cache::ResponseCache;
use crate::coingecko::CoinGeckoClient;
use crate::config::Config;
use crate::event::{Event, EventHandler};
use crate::invalidation::{InvalidationCoordinator, SubscriptionId};
use crate::notify::{Notice, NoticeReceiver, Notifier};
use crate::query::{QueryClient, QueryKey};
use crate::ui;
use crate::ui::components::{CommandEvent, CommandInput, KeyResult};
use crate::ui::view::{View, ViewAction};
use crate::ui::views::{MarketView, TrendingView, ViewContext};
use color_eyre::Result;
use crossterm::event::{DisableFocusChange, EnableFocusChange, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::stdout;
use std::sync::Arc;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

const TICK_RATE: Duration = Duration::from_millis(250);
const TOAST_DURATION: Duration = Duration::from_secs(5);

/// Cache and query patterns cleared by a manual refresh
const REFRESH_ALL_PATTERNS: [&str; 3] = ["markets", "global", "trending"];

/// A user-visible notice and when it was raised
#[derive(Debug)]
struct Toast {
  notice: Notice,
  shown_at: Instant,
}

/// Main application state
pub struct App {
  /// Navigation stack - root is always at index 0
  view_stack: Vec<Box<dyn View>>,

  /// `:` prompt
  command: CommandInput,

  /// Descriptors and dirty markers for every observed query
  queries: QueryClient,

  coordinator: InvalidationCoordinator,

  /// Coordinator registrations for the top view's query keys
  subscriptions: Vec<(SubscriptionId, QueryKey)>,

  /// Shared with the fetch layer; only touched by a manual refresh
  cache: Arc<ResponseCache>,

  ctx: ViewContext,

  base_url: String,

  toast: Option<Toast>,

  should_quit: bool,
}

impl App {
  pub fn new(
    config: Config,
    client: CoinGeckoClient,
    cache: Arc<ResponseCache>,
    notifier: Notifier,
  ) -> Self {
    let ctx = ViewContext {
      client,
      refresh: config.refresh.clone(),
      per_page: config.api.per_page,
    };

    let mut app = Self {
      view_stack: Vec::new(),
      command: CommandInput::new(),
      queries: QueryClient::new(notifier),
      coordinator: InvalidationCoordinator::new(),
      subscriptions: Vec::new(),
      cache,
      base_url: config.api.base_url,
      toast: None,
      should_quit: false,
      ctx: ctx.clone(),
    };
    app.replace_root(Box::new(MarketView::new(ctx)));
    app
  }

  pub async fn run(&mut self, notices: NoticeReceiver) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    // Not every terminal reports focus; FocusGained just never arrives there
    stdout().execute(EnableFocusChange)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = self.event_loop(&mut terminal, notices).await;

    // Restore the terminal even if the loop failed
    let _ = stdout().execute(DisableFocusChange);
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
  }

  async fn event_loop<B: Backend>(
    &mut self,
    terminal: &mut Terminal<B>,
    notices: NoticeReceiver,
  ) -> Result<()> {
    let mut events = EventHandler::new(TICK_RATE);
    events.forward_notices(notices);
    info!("Dashboard started");

    while !self.should_quit {
      terminal.draw(|frame| ui::draw(frame, self))?;

      match events.next().await {
        Some(event) => self.handle_event(event),
        None => break,
      }
    }
    Ok(())
  }

  fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => self.handle_key(key),
      Event::Tick => self.tick(Instant::now()),
      Event::FocusGained => {
        let fired = self
          .coordinator
          .focus_gained(&mut self.queries, Instant::now());
        debug!(fired, "Terminal focus gained");
        self.sync_view();
      }
      Event::Notice(notice) => self.handle_notice(notice),
    }
  }

  fn tick(&mut self, now: Instant) {
    self.coordinator.tick(&mut self.queries, now);
    self.sync_view();
    if self
      .toast
      .as_ref()
      .is_some_and(|t| now.saturating_duration_since(t.shown_at) >= TOAST_DURATION)
    {
      self.toast = None;
    }
  }

  /// Poll the top view's queries and start refetches for dirty keys
  fn sync_view(&mut self) {
    if let Some(view) = self.view_stack.last_mut() {
      view.sync(&mut self.queries);
    }
  }

  fn handle_notice(&mut self, notice: Notice) {
    if notice == Notice::ConnectionRestored {
      let marked = self.coordinator.reconnected(&mut self.queries);
      info!(marked, "Connection restored, refetching observed queries");
      self.sync_view();
    }
    if notice.is_user_visible() {
      self.toast = Some(Toast {
        notice,
        shown_at: Instant::now(),
      });
    }
  }

  fn handle_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
      self.should_quit = true;
      return;
    }

    match self.command.handle_key(key) {
      KeyResult::Event(CommandEvent::Submitted(cmd)) => self.execute_command(&cmd),
      KeyResult::Event(CommandEvent::Cancelled) | KeyResult::Handled => {}
      KeyResult::NotHandled => self.handle_view_key(key),
    }
  }

  fn handle_view_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Char('R') {
      self.refresh_all();
      return;
    }

    let action = match self.view_stack.last_mut() {
      Some(view) => view.handle_key(key),
      None => return,
    };
    match action {
      ViewAction::None => {}
      ViewAction::Push(view) => {
        self.view_stack.push(view);
        self.route_changed();
      }
      ViewAction::Pop => {
        if self.view_stack.len() > 1 {
          self.view_stack.pop();
          self.route_changed();
        } else {
          self.should_quit = true;
        }
      }
    }
    // Paging or a timeframe switch can change the top view's keys
    self.reconcile_subscriptions();
  }

  fn execute_command(&mut self, cmd: &str) {
    match cmd {
      "market" => self.replace_root(Box::new(MarketView::new(self.ctx.clone()))),
      "trending" => self.replace_root(Box::new(TrendingView::new(self.ctx.clone()))),
      "refresh" => self.refresh_all(),
      "quit" => self.should_quit = true,
      other => warn!(command = other, "Unknown command"),
    }
  }

  fn replace_root(&mut self, view: Box<dyn View>) {
    self.view_stack.clear();
    self.view_stack.push(view);
    self.route_changed();
  }

  fn route_changed(&mut self) {
    self.reconcile_subscriptions();
    self.coordinator.route_changed(&mut self.queries);
    self.sync_view();
  }

  /// Manual refresh: drop cached responses for the overview resources and
  /// refetch whatever observes them
  fn refresh_all(&mut self) {
    let marked = self
      .coordinator
      .refresh_all(&mut self.queries, &self.cache, &REFRESH_ALL_PATTERNS);
    info!(marked, cached = self.cache.len(), "Manual refresh");
    self.sync_view();
  }

  /// Register the top view's keys with the coordinator and release the rest
  fn reconcile_subscriptions(&mut self) {
    let wanted = self
      .view_stack
      .last()
      .map(|view| view.subscriptions())
      .unwrap_or_default();

    let (kept, dropped): (Vec<_>, Vec<_>) = std::mem::take(&mut self.subscriptions)
      .into_iter()
      .partition(|(_, key)| wanted.iter().any(|(k, _)| k == key));
    for (id, key) in dropped {
      self.coordinator.unsubscribe(id);
      self.queries.release(&key);
    }
    self.subscriptions = kept;

    let now = Instant::now();
    for (key, options) in wanted {
      if self.subscriptions.iter().any(|(_, k)| *k == key) {
        continue;
      }
      self.queries.observe(&key, &options);
      let id = self
        .coordinator
        .subscribe(&mut self.queries, key.clone(), options, now);
      self.subscriptions.push((id, key));
    }
    debug!(
      subscriptions = self.coordinator.len(),
      observed = self.queries.len(),
      "Subscriptions reconciled"
    );
  }

  // Accessors for UI rendering
  pub fn current_view(&self) -> Option<&dyn View> {
    self.view_stack.last().map(|v| v.as_ref())
  }

  pub fn current_view_mut(&mut self) -> Option<&mut Box<dyn View>> {
    self.view_stack.last_mut()
  }

  pub fn command_input(&self) -> &CommandInput {
    &self.command
  }

  pub fn base_url(&self) -> &str {
    &self.base_url
  }

  pub fn currency(&self) -> &str {
    self.ctx.client.currency()
  }

  pub fn breadcrumb(&self) -> Vec<String> {
    self
      .view_stack
      .iter()
      .map(|v| v.breadcrumb_label())
      .collect()
  }

  pub fn active_notice(&self) -> Option<&Notice> {
    self.toast.as_ref().map(|t| &t.notice)
  }
}
