use crate::api::{FolderEntry, VideoEntry};

/// The four screens of the client. Exactly one is visible at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Loading,
    Folders,
    Videos,
    Player,
}

/// Presentation seam between the state machine and the terminal.
///
/// The orchestrator only ever talks to the UI through this trait, so tests
/// can record every call and the terminal layer stays free of navigation
/// logic. Implementations retain what they are given and paint it on the
/// next draw; calls must be cheap and must not block.
pub trait Renderer {
    /// Replace the visible screen.
    fn show_screen(&mut self, screen: Screen);

    /// Replace the folder list (an empty slice paints the empty state).
    fn render_folders(&mut self, folders: &[FolderEntry]);

    /// Replace the episode list (an empty slice paints the empty state).
    fn render_videos(&mut self, videos: &[VideoEntry]);

    /// Attach a cover URL to the episode row with this page number.
    fn update_cover(&mut self, page: u32, cover_url: &str);

    /// Current location, one segment per folder level; empty means root.
    fn set_breadcrumb(&mut self, segments: &[String]);

    fn set_videos_title(&mut self, title: &str);

    fn set_player_title(&mut self, title: &str);

    /// Show the preparing gauge at zero.
    fn show_progress(&mut self);

    fn set_progress(&mut self, percent: u16);

    fn hide_progress(&mut self);

    /// Transient error notice; implementations auto-dismiss it.
    fn show_error(&mut self, message: &str);
}
