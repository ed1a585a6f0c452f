use crate::api::{CachedClient, CourseRef};
use crate::event::{Event, EventHandler};
use crate::session::SessionContext;
use crate::store::StateStore;
use crate::ui;
use crate::ui::components::{CommandEvent, CommandInput, KeyResult};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::{
  AssignmentListView, CourseListView, LectureListView, NotificationListView, PendingUsersView,
};
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::stdout;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const TICK_RATE: Duration = Duration::from_millis(250);
const PRUNE_EVERY: Duration = Duration::from_secs(30);

/// Main application state
pub struct App {
  /// Navigation stack - root is always at index 0
  views: Vec<Box<dyn View>>,

  /// `:` command line, shared by all views
  command: CommandInput,

  ctx: Arc<SessionContext>,
  client: CachedClient,
  store: StateStore,
  title: String,

  /// App-level message for the footer (unknown command, missing course)
  message: Option<String>,

  should_quit: bool,
  last_prune: Instant,
}

impl App {
  pub fn new(ctx: Arc<SessionContext>, client: CachedClient, store: StateStore) -> Self {
    let title = ctx.config.display_title();
    let root = root_view(&ctx, &client);

    Self {
      views: vec![root],
      command: CommandInput::new(),
      ctx,
      client,
      store,
      title,
      message: None,
      should_quit: false,
      last_prune: Instant::now(),
    }
  }

  pub async fn run(&mut self) -> Result<()> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let mut events = EventHandler::new(TICK_RATE);
    let result = self.event_loop(&mut terminal, &mut events).await;

    // Restore the terminal even when the loop failed
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
  }

  async fn event_loop<B: Backend>(
    &mut self,
    terminal: &mut Terminal<B>,
    events: &mut EventHandler,
  ) -> Result<()> {
    while !self.should_quit {
      terminal.draw(|frame| ui::draw(frame, self))?;

      match events.next().await {
        Some(Event::Key(key)) => self.handle_key(key),
        Some(Event::Tick) => self.tick(),
        None => break,
      }
    }
    Ok(())
  }

  fn tick(&mut self) {
    for view in &mut self.views {
      view.tick();
    }

    if self.last_prune.elapsed() >= PRUNE_EVERY {
      self.last_prune = Instant::now();
      let removed = self
        .client
        .cache()
        .prune(self.ctx.config.cache.gc_after());
      if removed > 0 {
        debug!(removed, "pruned idle cache entries");
      }
    }
  }

  fn handle_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
      self.should_quit = true;
      return;
    }

    let capturing = self
      .views
      .last()
      .is_some_and(|view| view.is_capturing_input());

    // The command line owns `:` unless a view is taking text
    if self.command.is_active() || !capturing {
      match self.command.handle_key(key) {
        KeyResult::Event(CommandEvent::Submitted(cmd)) => {
          self.execute_command(&cmd);
          return;
        }
        KeyResult::Event(CommandEvent::Cancelled) | KeyResult::Handled => {
          self.message = None;
          return;
        }
        KeyResult::NotHandled => {}
      }
    }

    let action = match self.views.last_mut() {
      Some(view) => view.handle_key(key),
      None => return,
    };
    self.apply(action);
  }

  fn apply(&mut self, action: ViewAction) {
    match action {
      ViewAction::None => {}
      ViewAction::Push(view) => {
        self.message = None;
        self.views.push(view);
      }
      ViewAction::Pop => {
        if self.views.len() > 1 {
          self.views.pop();
        } else {
          self.should_quit = true;
        }
      }
      ViewAction::SwitchCourse(course) => self.switch_course(course),
    }
  }

  fn switch_course(&mut self, course: CourseRef) {
    info!(course = course.id, "switching course");
    if let Err(e) = self.store.set_last_course(&course) {
      warn!(error = %e, "failed to remember course");
    }
    self.ctx = self.ctx.with_course(course);
    self.message = None;
    self.reset_root(root_view(&self.ctx, &self.client));
  }

  fn reset_root(&mut self, view: Box<dyn View>) {
    self.views.clear();
    self.views.push(view);
  }

  fn execute_command(&mut self, cmd: &str) {
    debug!(command = cmd, "executing command");
    self.message = None;

    let ctx = Arc::clone(&self.ctx);
    let client = self.client.clone();
    match cmd {
      "courses" => self.reset_root(Box::new(CourseListView::new(ctx, client))),
      "assignments" | "lectures" => {
        let Some(course_id) = ctx.course_id() else {
          self.message = Some("Pick a course first (:courses)".to_string());
          return;
        };
        let view: Box<dyn View> = if cmd == "assignments" {
          Box::new(AssignmentListView::new(ctx, client, course_id))
        } else {
          Box::new(LectureListView::new(ctx, client, course_id))
        };
        self.reset_root(view);
      }
      "notifications" => self.reset_root(Box::new(NotificationListView::new(ctx, client))),
      "users" if ctx.is_admin() => self.reset_root(Box::new(PendingUsersView::new(client))),
      "users" => self.message = Some("Only admins can review users".to_string()),
      "quit" => self.should_quit = true,
      other => self.message = Some(format!("Unknown command: {}", other)),
    }
  }

  // Accessors for UI rendering

  pub fn title(&self) -> &str {
    &self.title
  }

  pub fn session(&self) -> &Arc<SessionContext> {
    &self.ctx
  }

  pub fn message(&self) -> Option<&str> {
    self.message.as_deref()
  }

  pub fn command_input(&self) -> &CommandInput {
    &self.command
  }

  pub fn current_view_mut(&mut self) -> Option<&mut Box<dyn View>> {
    self.views.last_mut()
  }

  pub fn view_breadcrumb(&self) -> Vec<String> {
    self.views.iter().map(|v| v.breadcrumb_label()).collect()
  }

  pub fn current_shortcuts(&self) -> Vec<ShortcutInfo> {
    self
      .views
      .last()
      .map(|v| v.shortcuts())
      .unwrap_or_default()
  }
}

/// Assignments of the current course, or the course picker without one.
fn root_view(ctx: &Arc<SessionContext>, client: &CachedClient) -> Box<dyn View> {
  match ctx.course_id() {
    Some(course_id) => Box::new(AssignmentListView::new(
      Arc::clone(ctx),
      client.clone(),
      course_id,
    )),
    None => Box::new(CourseListView::new(Arc::clone(ctx), client.clone())),
  }
}
