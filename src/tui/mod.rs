mod ui;

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::sync::mpsc;

use crate::api::{ApiClient, FolderEntry, VideoEntry};
use crate::app::{App, Msg};
use crate::config::Config;
use crate::covers::CoverPrefetcher;
use crate::player::ProcessEngine;
use crate::render::{Renderer, Screen};

/// How long a notice stays on screen before it fades.
const NOTICE_TTL: Duration = Duration::from_secs(3);

/// Terminal renderer: keeps whatever the orchestrator handed over last, so
/// every frame can be drawn from retained state alone.
pub struct TuiRenderer {
    pub screen: Screen,
    pub folders: Vec<FolderEntry>,
    pub videos: Vec<VideoEntry>,
    /// Episode page -> resolved cover URL, for the loaded marker.
    pub covers: std::collections::HashMap<u32, String>,
    pub breadcrumb: Vec<String>,
    pub videos_title: String,
    pub player_title: String,
    /// Some while the preparing gauge is visible.
    pub progress: Option<u16>,
    pub notice: Option<(String, Instant)>,
    pub loading_started: Instant,
    pub selected_folder: usize,
    pub selected_video: usize,
}

impl TuiRenderer {
    pub fn new() -> Self {
        Self {
            screen: Screen::Loading,
            folders: Vec::new(),
            videos: Vec::new(),
            covers: std::collections::HashMap::new(),
            breadcrumb: Vec::new(),
            videos_title: String::new(),
            player_title: String::new(),
            progress: None,
            notice: None,
            loading_started: Instant::now(),
            selected_folder: 0,
            selected_video: 0,
        }
    }

    pub fn select_next(&mut self) {
        match self.screen {
            Screen::Folders => {
                if !self.folders.is_empty() && self.selected_folder < self.folders.len() - 1 {
                    self.selected_folder += 1;
                }
            }
            Screen::Videos => {
                if !self.videos.is_empty() && self.selected_video < self.videos.len() - 1 {
                    self.selected_video += 1;
                }
            }
            _ => {}
        }
    }

    pub fn select_previous(&mut self) {
        match self.screen {
            Screen::Folders => {
                if self.selected_folder > 0 {
                    self.selected_folder -= 1;
                }
            }
            Screen::Videos => {
                if self.selected_video > 0 {
                    self.selected_video -= 1;
                }
            }
            _ => {}
        }
    }

    pub fn selected_folder(&self) -> Option<&FolderEntry> {
        self.folders.get(self.selected_folder)
    }

    pub fn selected_video(&self) -> Option<&VideoEntry> {
        self.videos.get(self.selected_video)
    }

    fn notice_text(&self) -> Option<&str> {
        match &self.notice {
            Some((text, at)) if at.elapsed() < NOTICE_TTL => Some(text),
            _ => None,
        }
    }
}

impl Default for TuiRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for TuiRenderer {
    fn show_screen(&mut self, screen: Screen) {
        if screen == Screen::Loading {
            self.loading_started = Instant::now();
        }
        self.screen = screen;
    }

    fn render_folders(&mut self, folders: &[FolderEntry]) {
        self.folders = folders.to_vec();
        self.selected_folder = 0;
    }

    fn render_videos(&mut self, videos: &[VideoEntry]) {
        self.videos = videos.to_vec();
        self.selected_video = 0;
        self.covers.clear();
    }

    fn update_cover(&mut self, page: u32, cover_url: &str) {
        self.covers.insert(page, cover_url.to_string());
    }

    fn set_breadcrumb(&mut self, segments: &[String]) {
        self.breadcrumb = segments.to_vec();
    }

    fn set_videos_title(&mut self, title: &str) {
        self.videos_title = title.to_string();
    }

    fn set_player_title(&mut self, title: &str) {
        self.player_title = title.to_string();
    }

    fn show_progress(&mut self) {
        self.progress = Some(0);
    }

    fn set_progress(&mut self, percent: u16) {
        self.progress = Some(percent);
    }

    fn hide_progress(&mut self) {
        self.progress = None;
    }

    fn show_error(&mut self, message: &str) {
        self.notice = Some((message.to_string(), Instant::now()));
    }
}

fn restore_terminal() {
    let _ = disable_raw_mode();
    let _ = execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture);
}

pub async fn run(config: Config) -> io::Result<()> {
    // Set up panic hook to restore terminal
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        restore_terminal();
        original_hook(panic_info);
    }));

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Create app and channels
    let api = ApiClient::new(&config.server).map_err(io::Error::other)?;
    let covers = CoverPrefetcher::new(api.clone(), config.covers.interval());
    let engine = Arc::new(ProcessEngine::new(&config.player));
    let (tx, mut rx) = mpsc::channel::<Msg>(32);
    let mut app = App::new(api, TuiRenderer::new(), engine, covers, tx);

    // Main loop
    let result = run_app(&mut terminal, &mut app, &mut rx).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App<TuiRenderer>,
    rx: &mut mpsc::Receiver<Msg>,
) -> io::Result<()> {
    app.enter();

    let mut should_quit = false;

    loop {
        // Draw UI
        let playing = app.session().is_live();
        terminal.draw(|f| ui::draw(f, app.renderer(), playing))?;

        // Handle messages from background tasks
        while let Ok(msg) = rx.try_recv() {
            app.handle_msg(msg);
        }

        // Handle input with timeout
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                // Global quit
                if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL)
                {
                    should_quit = true;
                }

                match app.screen() {
                    // The intro ignores input; it hands over on its own.
                    Screen::Loading => {}

                    Screen::Folders => match key.code {
                        KeyCode::Up | KeyCode::Char('k') => app.renderer_mut().select_previous(),
                        KeyCode::Down | KeyCode::Char('j') => app.renderer_mut().select_next(),
                        KeyCode::Enter => {
                            if let Some(folder) = app.renderer().selected_folder().cloned() {
                                app.open_folder(&folder);
                            }
                        }
                        KeyCode::Backspace => app.navigate_to_parent(),
                        KeyCode::Char('h') => app.navigate_to_root(),
                        // Digits jump along the breadcrumb; 0 is the root.
                        KeyCode::Char(c) if c.is_ascii_digit() => {
                            app.navigate_to_ancestor(c as usize - '0' as usize);
                        }
                        KeyCode::Char('q') | KeyCode::Esc => {
                            if app.path().is_root() {
                                should_quit = true;
                            } else {
                                app.navigate_to_parent();
                            }
                        }
                        _ => {}
                    },

                    Screen::Videos => match key.code {
                        KeyCode::Up | KeyCode::Char('k') => app.renderer_mut().select_previous(),
                        KeyCode::Down | KeyCode::Char('j') => app.renderer_mut().select_next(),
                        KeyCode::Enter => {
                            if let Some(video) = app.renderer().selected_video().cloned() {
                                app.open_video(&video);
                            }
                        }
                        KeyCode::Char('q') | KeyCode::Esc | KeyCode::Backspace => {
                            app.back_to_folders();
                        }
                        _ => {}
                    },

                    Screen::Player => match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => app.leave_player(Screen::Videos),
                        KeyCode::Char('f') => app.leave_player(Screen::Folders),
                        KeyCode::Char('r') => app.retry_playback(),
                        _ => {}
                    },
                }
            }
        }

        if should_quit {
            app.shutdown();
            break;
        }
    }

    Ok(())
}
