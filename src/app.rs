use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError, FolderEntry, PlayInfo, VideoEntry};
use crate::covers::CoverPrefetcher;
use crate::player::{MediaSession, PlaybackSource, PlayerEngine, PlayerExit};
use crate::render::{Renderer, Screen};

/// Minimum time on the loading screen, even when the server answers faster.
/// Paired with the typewriter intro in the TUI.
const INTRO_DURATION: Duration = Duration::from_millis(2400);

const PROGRESS_TICK: Duration = Duration::from_millis(200);

/// Where the user is in the folder hierarchy; empty means the library root.
/// Only replaced from a successful listing, so it always names a page the
/// user has actually seen.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathStack(Vec<String>);

impl PathStack {
    pub fn from_path(path: &str) -> Self {
        if path.is_empty() {
            Self::default()
        } else {
            Self(path.split('/').map(String::from).collect())
        }
    }

    /// Slash-joined form, as the server expects it.
    pub fn join(&self) -> String {
        self.0.join("/")
    }

    /// Path of the ancestor keeping `depth` leading segments; 0 is the root.
    pub fn ancestor(&self, depth: usize) -> String {
        self.0[..depth.min(self.0.len())].join("/")
    }

    pub fn parent(&self) -> String {
        self.ancestor(self.0.len().saturating_sub(1))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }
}

/// Everything the background tasks report back to the orchestrator. All
/// state changes go through these, one at a time, on the UI thread.
#[derive(Debug)]
pub enum Msg {
    IntroFinished,
    FoldersLoaded {
        path: String,
        result: Result<Vec<FolderEntry>, ApiError>,
    },
    VideosLoaded {
        folder: FolderEntry,
        result: Result<Vec<VideoEntry>, ApiError>,
    },
    CoverLoaded {
        epoch: u64,
        page: u32,
        cover_url: String,
    },
    PlaybackPrepared {
        epoch: u64,
        result: Result<PlayInfo, ApiError>,
    },
    ProgressPulse(u16),
    PlayerExited {
        generation: u64,
        exit: PlayerExit,
    },
}

/// Drives the four screens. Owns the navigation state, the player session
/// and the renderer; everything slow runs in spawned tasks that answer via
/// the message channel.
pub struct App<R: Renderer> {
    api: ApiClient,
    renderer: R,
    session: MediaSession,
    covers: CoverPrefetcher,
    tx: mpsc::Sender<Msg>,

    screen: Screen,
    path: PathStack,
    videos: Vec<VideoEntry>,
    current_folder: Option<FolderEntry>,
    current_video: Option<VideoEntry>,

    /// One listing request in flight at a time.
    busy: bool,

    // Startup rendezvous: the folder screen appears only once the intro has
    // run its course AND the root listing has answered, in either order.
    intro_done: bool,
    pending_root: Option<Result<Vec<FolderEntry>, ApiError>>,

    /// Bumped per playback attempt; answers for older attempts are dropped.
    play_epoch: u64,
    /// Bumped per episode list; shared with the cover prefetcher so it can
    /// stop on its own when the list changes.
    list_epoch: Arc<AtomicU64>,

    progress: Option<CancellationToken>,

    pub intro_duration: Duration,
}

impl<R: Renderer> App<R> {
    pub fn new(
        api: ApiClient,
        renderer: R,
        engine: Arc<dyn PlayerEngine>,
        covers: CoverPrefetcher,
        tx: mpsc::Sender<Msg>,
    ) -> Self {
        // Player exits travel the same queue as every other event.
        let (exit_tx, mut exit_rx) = mpsc::channel(8);
        let pump = tx.clone();
        tokio::spawn(async move {
            while let Some((generation, exit)) = exit_rx.recv().await {
                if pump.send(Msg::PlayerExited { generation, exit }).await.is_err() {
                    break;
                }
            }
        });

        Self {
            api,
            renderer,
            session: MediaSession::new(engine, exit_tx),
            covers,
            tx,
            screen: Screen::Loading,
            path: PathStack::default(),
            videos: Vec::new(),
            current_folder: None,
            current_video: None,
            busy: false,
            intro_done: false,
            pending_root: None,
            play_epoch: 0,
            list_epoch: Arc::new(AtomicU64::new(0)),
            progress: None,
            intro_duration: INTRO_DURATION,
        }
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    pub fn path(&self) -> &PathStack {
        &self.path
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn session(&self) -> &MediaSession {
        &self.session
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    /// Start up: show the loading screen, run the intro timer and the root
    /// listing concurrently.
    pub fn enter(&mut self) {
        info!("starting up");
        self.show(Screen::Loading);

        let tx = self.tx.clone();
        let intro = self.intro_duration;
        tokio::spawn(async move {
            tokio::time::sleep(intro).await;
            let _ = tx.send(Msg::IntroFinished).await;
        });

        self.fetch_folders(String::new());
    }

    /// Descend into a folder, or open its episode list if it is a leaf
    /// collection. Ignored while another listing is already loading.
    pub fn open_folder(&mut self, folder: &FolderEntry) {
        if self.busy {
            debug!("listing already in flight, ignoring");
            return;
        }

        if folder.has_listing {
            info!(path = %folder.path, "opening collection");
            self.busy = true;
            let api = self.api.clone();
            let tx = self.tx.clone();
            let folder = folder.clone();
            tokio::spawn(async move {
                let result = api.list_videos(&folder.path).await;
                let _ = tx.send(Msg::VideosLoaded { folder, result }).await;
            });
        } else {
            info!(path = %folder.path, "descending into folder");
            self.fetch_folders(folder.path.clone());
        }
    }

    pub fn navigate_to_parent(&mut self) {
        if self.path.is_root() {
            return;
        }
        self.navigate_to_ancestor(self.path.depth() - 1);
    }

    pub fn navigate_to_root(&mut self) {
        self.navigate_to_ancestor(0);
    }

    /// Jump to an ancestor by breadcrumb depth; 0 is the root.
    pub fn navigate_to_ancestor(&mut self, depth: usize) {
        if self.busy {
            debug!("listing already in flight, ignoring");
            return;
        }
        self.fetch_folders(self.path.ancestor(depth));
    }

    /// Return from the episode list to the folder listing kept from before.
    pub fn back_to_folders(&mut self) {
        self.show(Screen::Folders);
    }

    /// Start playback of an episode: tear down the previous player, switch
    /// to the player screen and ask the server to prepare the stream.
    pub fn open_video(&mut self, video: &VideoEntry) {
        let Some(folder) = self.current_folder.clone() else {
            return;
        };

        info!(title = %video.title, page = video.page, "opening video");

        // A fresh attempt invalidates any unanswered prepare call.
        self.play_epoch += 1;
        let epoch = self.play_epoch;

        self.session.destroy();
        self.current_video = Some(video.clone());
        self.renderer.set_player_title(&video.title);
        self.show(Screen::Player);
        self.start_progress();

        let api = self.api.clone();
        let tx = self.tx.clone();
        let page = video.page;
        tokio::spawn(async move {
            let result = api.prepare_playback(&folder.path, page).await;
            let _ = tx.send(Msg::PlaybackPrepared { epoch, result }).await;
        });
    }

    /// Ask the server again for the episode on the player screen. Used when
    /// the stream was still being prepared on the first attempt.
    pub fn retry_playback(&mut self) {
        if self.screen != Screen::Player {
            return;
        }
        if let Some(video) = self.current_video.clone() {
            self.open_video(&video);
        }
    }

    /// Leave the player for the folder or episode screen. Playback stops
    /// before the target screen is painted.
    pub fn leave_player(&mut self, target: Screen) {
        if self.screen != Screen::Player || !matches!(target, Screen::Folders | Screen::Videos) {
            return;
        }
        self.session.destroy();
        self.show(target);
    }

    /// Final teardown on quit.
    pub fn shutdown(&mut self) {
        self.stop_progress();
        self.session.destroy();
    }

    pub fn handle_msg(&mut self, msg: Msg) {
        match msg {
            Msg::IntroFinished => {
                self.intro_done = true;
                self.try_finish_intro();
            }
            Msg::FoldersLoaded { path, result } => {
                self.busy = false;
                if self.screen == Screen::Loading {
                    // Parked until the intro finishes, then both land at once.
                    self.pending_root = Some(result);
                    self.try_finish_intro();
                    return;
                }
                match result {
                    Ok(folders) => self.apply_folders(&path, &folders),
                    Err(e) => {
                        warn!(error = %e, path = %path, "folder listing failed");
                        self.renderer.show_error("Could not load folders");
                    }
                }
            }
            Msg::VideosLoaded { folder, result } => {
                self.busy = false;
                match result {
                    Ok(videos) => {
                        self.videos = videos;
                        self.current_folder = Some(folder.clone());
                        self.current_video = None;
                        self.renderer.set_videos_title(&folder.name);
                        self.renderer.render_videos(&self.videos);
                        self.show(Screen::Videos);

                        // The previous prefetch loop sees the bump and stops.
                        let epoch = self.list_epoch.fetch_add(1, Ordering::Relaxed) + 1;
                        self.covers.run(
                            self.videos.clone(),
                            epoch,
                            self.list_epoch.clone(),
                            self.tx.clone(),
                        );
                    }
                    Err(e) => {
                        warn!(error = %e, path = %folder.path, "episode listing failed");
                        self.renderer.show_error("Could not load videos");
                    }
                }
            }
            Msg::CoverLoaded {
                epoch,
                page,
                cover_url,
            } => {
                if epoch != self.list_epoch.load(Ordering::Relaxed) {
                    debug!(page, "cover for a replaced list, dropping");
                } else if self.videos.iter().any(|v| v.page == page) {
                    self.renderer.update_cover(page, &cover_url);
                } else {
                    debug!(page, "cover for an unknown episode, dropping");
                }
            }
            Msg::PlaybackPrepared { epoch, result } => {
                if epoch != self.play_epoch || self.screen != Screen::Player {
                    debug!(epoch, "stale playback answer, dropping");
                    return;
                }

                self.stop_progress();

                match result {
                    Ok(play) if play.is_ready() => self.start_playback(play),
                    Ok(_) => {
                        info!("stream not ready yet");
                        self.renderer
                            .show_error("Video is still being prepared, retry shortly");
                    }
                    Err(e) => {
                        warn!(error = %e, "prepare request failed");
                        self.renderer.show_error("Could not start playback");
                    }
                }
            }
            Msg::ProgressPulse(percent) => {
                if self.progress.is_some() {
                    self.renderer.set_progress(percent);
                }
            }
            Msg::PlayerExited { generation, exit } => {
                if !self.session.note_exit(generation) {
                    debug!(generation, "exit from a replaced player, dropping");
                    return;
                }
                match exit.error {
                    Some(error) => {
                        warn!(error = %error, "player exited with failure");
                        if self.screen == Screen::Player {
                            self.renderer.show_error("Playback failed");
                        }
                    }
                    None => info!("player closed"),
                }
            }
        }
    }

    fn fetch_folders(&mut self, path: String) {
        self.busy = true;
        let api = self.api.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = api.list_folders(&path).await;
            let _ = tx.send(Msg::FoldersLoaded { path, result }).await;
        });
    }

    fn try_finish_intro(&mut self) {
        if !self.intro_done {
            return;
        }
        let Some(result) = self.pending_root.take() else {
            return;
        };
        match result {
            Ok(folders) => {
                self.apply_folders("", &folders);
                self.show(Screen::Folders);
            }
            Err(e) => {
                // Still leave the loading screen; an empty listing plus a
                // notice beats being stuck on the intro.
                warn!(error = %e, "root listing failed");
                self.apply_folders("", &[]);
                self.show(Screen::Folders);
                self.renderer.show_error("Could not load folders");
            }
        }
    }

    fn apply_folders(&mut self, path: &str, folders: &[FolderEntry]) {
        self.path = PathStack::from_path(path);
        self.renderer.set_breadcrumb(self.path.segments());
        self.renderer.render_folders(folders);
    }

    fn start_playback(&mut self, play: PlayInfo) {
        let Some(video_url) = play.video_url.as_deref().filter(|u| !u.is_empty()) else {
            warn!("ready answer without a video url");
            self.renderer.show_error("Malformed playback answer");
            return;
        };

        let title = self
            .current_video
            .as_ref()
            .map(|v| v.title.clone())
            .unwrap_or_default();
        let source = PlaybackSource {
            title,
            video_url: self.api.absolute_url(video_url),
            subtitle_url: play.subtitle().map(|u| self.api.absolute_url(u)),
        };

        if let Err(e) = self.session.load(&source) {
            warn!(error = %e, "player failed to start");
            self.renderer.show_error(&e.to_string());
        }
    }

    /// Every screen change funnels through here: the progress simulation
    /// never survives a transition.
    fn show(&mut self, screen: Screen) {
        self.stop_progress();
        self.screen = screen;
        self.renderer.show_screen(screen);
    }

    fn start_progress(&mut self) {
        self.renderer.show_progress();

        let cancel = CancellationToken::new();
        self.progress = Some(cancel.clone());
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let mut percent: f64 = 0.0;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(PROGRESS_TICK) => {}
                }
                // Creeps towards 90 and waits there for the real answer.
                percent = (percent + rand::thread_rng().gen_range(3.0..12.0)).min(90.0);
                if tx.send(Msg::ProgressPulse(percent as u16)).await.is_err() {
                    return;
                }
            }
        });
    }

    fn stop_progress(&mut self) {
        if let Some(cancel) = self.progress.take() {
            cancel.cancel();
            self.renderer.hide_progress();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{PlayStatus, VideoEntry};
    use crate::player::{EngineHandle, PlayerError};
    use std::sync::Mutex;

    #[derive(Default)]
    struct StubEngine {
        starts: Mutex<Vec<(PlaybackSource, CancellationToken)>>,
    }

    impl StubEngine {
        fn started(&self) -> Vec<PlaybackSource> {
            self.starts.lock().unwrap().iter().map(|(s, _)| s.clone()).collect()
        }
    }

    impl PlayerEngine for StubEngine {
        fn start(
            &self,
            source: &PlaybackSource,
            _exits: mpsc::Sender<PlayerExit>,
        ) -> Result<EngineHandle, PlayerError> {
            let stop = CancellationToken::new();
            self.starts
                .lock()
                .unwrap()
                .push((source.clone(), stop.clone()));
            Ok(EngineHandle::new(stop))
        }
    }

    /// Records every renderer call so tests can assert on order and content.
    #[derive(Default)]
    struct RecordingRenderer {
        log: Vec<String>,
        screen: Option<Screen>,
        folders: Vec<FolderEntry>,
        videos: Vec<VideoEntry>,
        covers: Vec<(u32, String)>,
        breadcrumb: Vec<String>,
        errors: Vec<String>,
        videos_title: String,
        player_title: String,
        progress_visible: bool,
        progress: Option<u16>,
        /// Paints observed while the stub engine still had an uncancelled
        /// player, for teardown-ordering asserts.
        engine: Option<Arc<StubEngine>>,
        paints_with_live_player: Vec<Screen>,
    }

    impl Renderer for RecordingRenderer {
        fn show_screen(&mut self, screen: Screen) {
            if let Some(engine) = &self.engine
                && engine
                    .starts
                    .lock()
                    .unwrap()
                    .iter()
                    .any(|(_, stop)| !stop.is_cancelled())
            {
                self.paints_with_live_player.push(screen);
            }
            self.log.push(format!("show:{screen:?}"));
            self.screen = Some(screen);
        }

        fn render_folders(&mut self, folders: &[FolderEntry]) {
            self.log.push("folders".to_string());
            self.folders = folders.to_vec();
        }

        fn render_videos(&mut self, videos: &[VideoEntry]) {
            self.log.push("videos".to_string());
            self.videos = videos.to_vec();
        }

        fn update_cover(&mut self, page: u32, cover_url: &str) {
            self.covers.push((page, cover_url.to_string()));
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
            self.log.push("progress:show".to_string());
            self.progress_visible = true;
        }

        fn set_progress(&mut self, percent: u16) {
            self.progress = Some(percent);
        }

        fn hide_progress(&mut self) {
            self.log.push("progress:hide".to_string());
            self.progress_visible = false;
            self.progress = None;
        }

        fn show_error(&mut self, message: &str) {
            self.log.push("error".to_string());
            self.errors.push(message.to_string());
        }
    }

    fn folder(name: &str, path: &str, has_listing: bool) -> FolderEntry {
        FolderEntry {
            name: name.to_string(),
            path: path.to_string(),
            has_listing,
        }
    }

    fn video(title: &str, page: u32) -> VideoEntry {
        VideoEntry {
            title: title.to_string(),
            page,
            bvid: Some(format!("BV{page}")),
            duration: Some(1445),
        }
    }

    fn ready(video_url: &str, subtitle_url: Option<&str>) -> PlayInfo {
        PlayInfo {
            status: PlayStatus::Ready,
            video_url: Some(video_url.to_string()),
            subtitle_url: subtitle_url.map(String::from),
        }
    }

    fn pending() -> PlayInfo {
        PlayInfo {
            status: PlayStatus::Pending,
            video_url: None,
            subtitle_url: None,
        }
    }

    fn api_error() -> ApiError {
        ApiError::Status {
            url: "http://media.test/api/folders".to_string(),
            status: reqwest::StatusCode::BAD_GATEWAY,
        }
    }

    // The base URL points at a closed port; transition tests fabricate the
    // answers instead of letting the spawned fetches finish.
    fn test_app() -> (App<RecordingRenderer>, Arc<StubEngine>) {
        let api = ApiClient::with_base_url("http://127.0.0.1:9").unwrap();
        let engine = Arc::new(StubEngine::default());
        let covers = CoverPrefetcher::new(api.clone(), Duration::from_millis(1));
        let (tx, _rx) = mpsc::channel(32);
        let mut app = App::new(api, RecordingRenderer::default(), engine.clone(), covers, tx);
        app.renderer_mut().engine = Some(engine.clone());
        (app, engine)
    }

    /// Walks a fresh app to the folder screen with the given root listing.
    fn app_on_folders(folders: Vec<FolderEntry>) -> (App<RecordingRenderer>, Arc<StubEngine>) {
        let (mut app, engine) = test_app();
        app.enter();
        app.handle_msg(Msg::IntroFinished);
        app.handle_msg(Msg::FoldersLoaded {
            path: String::new(),
            result: Ok(folders),
        });
        (app, engine)
    }

    /// Walks further to the episode screen of a leaf collection.
    fn app_on_videos(videos: Vec<VideoEntry>) -> (App<RecordingRenderer>, Arc<StubEngine>) {
        let leaf = folder("Frieren", "Anime/Frieren", true);
        let (mut app, engine) = app_on_folders(vec![leaf.clone()]);
        app.open_folder(&leaf);
        app.handle_msg(Msg::VideosLoaded {
            folder: leaf,
            result: Ok(videos),
        });
        (app, engine)
    }

    #[tokio::test]
    async fn folders_appear_only_after_intro_and_listing() {
        let (mut app, _) = test_app();
        app.enter();
        assert_eq!(app.screen(), Screen::Loading);

        app.handle_msg(Msg::IntroFinished);
        assert_eq!(app.screen(), Screen::Loading, "listing still missing");

        app.handle_msg(Msg::FoldersLoaded {
            path: String::new(),
            result: Ok(vec![folder("Anime", "Anime", false)]),
        });
        assert_eq!(app.screen(), Screen::Folders);
        assert_eq!(app.renderer().folders.len(), 1);
    }

    #[tokio::test]
    async fn early_listing_waits_for_the_intro() {
        let (mut app, _) = test_app();
        app.enter();

        app.handle_msg(Msg::FoldersLoaded {
            path: String::new(),
            result: Ok(vec![folder("Anime", "Anime", false)]),
        });
        assert_eq!(app.screen(), Screen::Loading, "intro still running");

        app.handle_msg(Msg::IntroFinished);
        assert_eq!(app.screen(), Screen::Folders);
    }

    #[tokio::test]
    async fn failed_root_listing_still_leaves_the_loading_screen() {
        let (mut app, _) = test_app();
        app.enter();

        app.handle_msg(Msg::FoldersLoaded {
            path: String::new(),
            result: Err(api_error()),
        });
        app.handle_msg(Msg::IntroFinished);

        assert_eq!(app.screen(), Screen::Folders);
        assert!(app.renderer().folders.is_empty());
        assert_eq!(app.renderer().errors, vec!["Could not load folders"]);
    }

    #[tokio::test]
    async fn navigation_updates_path_only_on_success() {
        let (mut app, _) = app_on_folders(vec![folder("Anime", "Anime", false)]);

        let inner = folder("Frieren", "Anime/Frieren", true);
        app.open_folder(&folder("Anime", "Anime", false));
        assert!(app.is_busy());
        app.handle_msg(Msg::FoldersLoaded {
            path: "Anime".to_string(),
            result: Ok(vec![inner]),
        });

        assert!(!app.is_busy());
        assert_eq!(app.path().join(), "Anime");
        assert_eq!(app.renderer().breadcrumb, vec!["Anime"]);
        assert_eq!(app.screen(), Screen::Folders);

        // A failed descent keeps the current page.
        app.navigate_to_parent();
        app.handle_msg(Msg::FoldersLoaded {
            path: String::new(),
            result: Err(api_error()),
        });
        assert_eq!(app.path().join(), "Anime");
        assert_eq!(app.renderer().errors, vec!["Could not load folders"]);
    }

    #[tokio::test]
    async fn ancestor_jump_requests_the_prefix_path() {
        let (mut app, _) = app_on_folders(vec![]);
        app.handle_msg(Msg::FoldersLoaded {
            path: "a/b/c".to_string(),
            result: Ok(vec![]),
        });
        assert_eq!(app.path().depth(), 3);

        app.navigate_to_ancestor(1);
        assert!(app.is_busy());
        app.handle_msg(Msg::FoldersLoaded {
            path: "a".to_string(),
            result: Ok(vec![]),
        });
        assert_eq!(app.path().join(), "a");
        assert_eq!(app.renderer().breadcrumb, vec!["a"]);
    }

    #[tokio::test]
    async fn parent_navigation_is_a_noop_at_the_root() {
        let (mut app, _) = app_on_folders(vec![]);
        app.navigate_to_parent();
        assert!(!app.is_busy(), "no request may be issued at the root");
    }

    #[tokio::test]
    async fn opening_a_collection_shows_videos_and_title() {
        let (mut app, _) = app_on_videos(vec![video("Ep 1", 1), video("Ep 2", 2)]);

        assert_eq!(app.screen(), Screen::Videos);
        assert_eq!(app.renderer().videos_title, "Frieren");
        assert_eq!(app.renderer().videos.len(), 2);
        // Path still names the folder page the collection was opened from.
        assert_eq!(app.path().join(), "");
    }

    #[tokio::test]
    async fn failed_episode_listing_stays_on_folders() {
        let leaf = folder("Frieren", "Anime/Frieren", true);
        let (mut app, _) = app_on_folders(vec![leaf.clone()]);

        app.open_folder(&leaf);
        app.handle_msg(Msg::VideosLoaded {
            folder: leaf,
            result: Err(api_error()),
        });

        assert_eq!(app.screen(), Screen::Folders);
        assert_eq!(app.renderer().errors, vec!["Could not load videos"]);
    }

    #[tokio::test]
    async fn covers_apply_only_to_the_current_list() {
        let (mut app, _) = app_on_videos(vec![video("Ep 1", 1), video("Ep 2", 2)]);

        app.handle_msg(Msg::CoverLoaded {
            epoch: 1,
            page: 1,
            cover_url: "http://img/1.jpg".to_string(),
        });
        // Stale epoch and unknown page are both dropped.
        app.handle_msg(Msg::CoverLoaded {
            epoch: 0,
            page: 2,
            cover_url: "http://img/old.jpg".to_string(),
        });
        app.handle_msg(Msg::CoverLoaded {
            epoch: 1,
            page: 99,
            cover_url: "http://img/99.jpg".to_string(),
        });

        assert_eq!(
            app.renderer().covers,
            vec![(1, "http://img/1.jpg".to_string())]
        );
    }

    #[tokio::test]
    async fn ready_playback_starts_exactly_one_player() {
        let (mut app, engine) = app_on_videos(vec![video("Ep 1", 1)]);

        app.open_video(&video("Ep 1", 1));
        assert_eq!(app.screen(), Screen::Player);
        assert_eq!(app.renderer().player_title, "Ep 1");
        assert!(app.renderer().progress_visible);

        app.handle_msg(Msg::PlaybackPrepared {
            epoch: 1,
            result: Ok(ready("/static/v.mp4", Some("/subtitles/1.vtt"))),
        });

        let started = engine.started();
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].video_url, "http://127.0.0.1:9/static/v.mp4");
        assert_eq!(
            started[0].subtitle_url.as_deref(),
            Some("http://127.0.0.1:9/subtitles/1.vtt")
        );
        assert_eq!(started[0].title, "Ep 1");
        assert!(app.session().is_live());
        assert!(!app.renderer().progress_visible);
    }

    #[tokio::test]
    async fn pending_playback_keeps_the_session_empty_until_retry() {
        let (mut app, engine) = app_on_videos(vec![video("Ep 1", 1)]);

        app.open_video(&video("Ep 1", 1));
        app.handle_msg(Msg::PlaybackPrepared {
            epoch: 1,
            result: Ok(pending()),
        });

        assert!(engine.started().is_empty());
        assert!(!app.session().is_live());
        assert_eq!(app.screen(), Screen::Player);
        assert!(!app.renderer().progress_visible);
        assert_eq!(
            app.renderer().errors,
            vec!["Video is still being prepared, retry shortly"]
        );

        // Retry issues a fresh attempt; the second answer is current again.
        app.retry_playback();
        assert!(app.renderer().progress_visible);
        app.handle_msg(Msg::PlaybackPrepared {
            epoch: 2,
            result: Ok(ready("/static/v.mp4", None)),
        });
        assert_eq!(engine.started().len(), 1);
        assert!(app.session().is_live());
    }

    #[tokio::test]
    async fn stale_playback_answer_is_dropped() {
        let (mut app, engine) = app_on_videos(vec![video("Ep 1", 1)]);

        app.open_video(&video("Ep 1", 1));
        app.leave_player(Screen::Videos);

        app.handle_msg(Msg::PlaybackPrepared {
            epoch: 1,
            result: Ok(ready("/static/v.mp4", None)),
        });

        assert!(engine.started().is_empty());
        assert!(!app.session().is_live());
        assert!(app.renderer().errors.is_empty());
    }

    #[tokio::test]
    async fn replaced_attempt_ignores_the_first_answer() {
        let (mut app, engine) = app_on_videos(vec![video("Ep 1", 1), video("Ep 2", 2)]);

        app.open_video(&video("Ep 1", 1));
        app.open_video(&video("Ep 2", 2));

        app.handle_msg(Msg::PlaybackPrepared {
            epoch: 1,
            result: Ok(ready("/static/ep1.mp4", None)),
        });
        assert!(engine.started().is_empty(), "first answer is stale");

        app.handle_msg(Msg::PlaybackPrepared {
            epoch: 2,
            result: Ok(ready("/static/ep2.mp4", None)),
        });
        assert_eq!(engine.started().len(), 1);
        assert_eq!(
            engine.started()[0].video_url,
            "http://127.0.0.1:9/static/ep2.mp4"
        );
    }

    #[tokio::test]
    async fn leaving_the_player_stops_playback_before_painting() {
        let (mut app, engine) = app_on_videos(vec![video("Ep 1", 1)]);

        app.open_video(&video("Ep 1", 1));
        app.handle_msg(Msg::PlaybackPrepared {
            epoch: 1,
            result: Ok(ready("/static/v.mp4", None)),
        });
        assert!(app.session().is_live());

        app.leave_player(Screen::Videos);

        assert_eq!(app.screen(), Screen::Videos);
        assert!(!app.session().is_live());
        assert!(engine.starts.lock().unwrap()[0].1.is_cancelled());
        assert!(
            !app.renderer()
                .paints_with_live_player
                .contains(&Screen::Videos),
            "the target screen must never be painted over a live player"
        );
    }

    #[tokio::test]
    async fn leaving_the_player_without_a_session_is_harmless() {
        let (mut app, _) = app_on_videos(vec![video("Ep 1", 1)]);

        app.open_video(&video("Ep 1", 1));
        app.handle_msg(Msg::PlaybackPrepared {
            epoch: 1,
            result: Ok(pending()),
        });
        assert!(!app.session().is_live());

        app.leave_player(Screen::Folders);
        assert_eq!(app.screen(), Screen::Folders);

        // Not on the player screen: nothing to leave, nothing changes.
        app.leave_player(Screen::Videos);
        assert_eq!(app.screen(), Screen::Folders);
    }

    #[tokio::test]
    async fn progress_pulses_after_hiding_are_dropped() {
        let (mut app, _) = app_on_videos(vec![video("Ep 1", 1)]);

        app.open_video(&video("Ep 1", 1));
        app.handle_msg(Msg::ProgressPulse(42));
        assert_eq!(app.renderer().progress, Some(42));

        app.leave_player(Screen::Videos);
        app.handle_msg(Msg::ProgressPulse(77));
        assert_eq!(app.renderer().progress, None);
    }

    #[tokio::test]
    async fn natural_player_exit_clears_the_session() {
        let (mut app, _) = app_on_videos(vec![video("Ep 1", 1)]);

        app.open_video(&video("Ep 1", 1));
        app.handle_msg(Msg::PlaybackPrepared {
            epoch: 1,
            result: Ok(ready("/static/v.mp4", None)),
        });

        app.handle_msg(Msg::PlayerExited {
            generation: 1,
            exit: PlayerExit { error: None },
        });
        assert!(!app.session().is_live());
        assert!(app.renderer().errors.is_empty());
    }

    #[tokio::test]
    async fn failed_player_exit_shows_a_notice_on_the_player_screen() {
        let (mut app, _) = app_on_videos(vec![video("Ep 1", 1)]);

        app.open_video(&video("Ep 1", 1));
        app.handle_msg(Msg::PlaybackPrepared {
            epoch: 1,
            result: Ok(ready("/static/v.mp4", None)),
        });

        app.handle_msg(Msg::PlayerExited {
            generation: 1,
            exit: PlayerExit {
                error: Some("player exited with exit status: 2".to_string()),
            },
        });
        assert!(!app.session().is_live());
        assert_eq!(app.renderer().errors, vec!["Playback failed"]);
    }

    #[tokio::test]
    async fn exit_of_a_replaced_player_is_ignored() {
        let (mut app, engine) = app_on_videos(vec![video("Ep 1", 1), video("Ep 2", 2)]);

        app.open_video(&video("Ep 1", 1));
        app.handle_msg(Msg::PlaybackPrepared {
            epoch: 1,
            result: Ok(ready("/static/ep1.mp4", None)),
        });
        app.open_video(&video("Ep 2", 2));
        app.handle_msg(Msg::PlaybackPrepared {
            epoch: 2,
            result: Ok(ready("/static/ep2.mp4", None)),
        });

        // The first player's exit arrives after the second one took over.
        app.handle_msg(Msg::PlayerExited {
            generation: 1,
            exit: PlayerExit { error: None },
        });

        assert!(app.session().is_live(), "the new player keeps running");
        assert!(!engine.starts.lock().unwrap()[1].1.is_cancelled());
    }

    #[tokio::test]
    async fn back_to_folders_keeps_the_listing() {
        let (mut app, _) = app_on_videos(vec![video("Ep 1", 1)]);

        app.back_to_folders();
        assert_eq!(app.screen(), Screen::Folders);
        // No refetch: the retained listing is still there.
        assert!(!app.is_busy());
        assert_eq!(app.renderer().folders.len(), 1);
    }

    #[tokio::test]
    async fn ready_answer_without_a_url_is_an_error() {
        let (mut app, engine) = app_on_videos(vec![video("Ep 1", 1)]);

        app.open_video(&video("Ep 1", 1));
        app.handle_msg(Msg::PlaybackPrepared {
            epoch: 1,
            result: Ok(PlayInfo {
                status: PlayStatus::Ready,
                video_url: Some(String::new()),
                subtitle_url: None,
            }),
        });

        assert!(engine.started().is_empty());
        assert_eq!(app.renderer().errors, vec!["Malformed playback answer"]);
    }

    #[tokio::test]
    async fn shutdown_stops_the_live_player() {
        let (mut app, engine) = app_on_videos(vec![video("Ep 1", 1)]);

        app.open_video(&video("Ep 1", 1));
        app.handle_msg(Msg::PlaybackPrepared {
            epoch: 1,
            result: Ok(ready("/static/v.mp4", None)),
        });

        app.shutdown();
        assert!(!app.session().is_live());
        assert!(engine.starts.lock().unwrap()[0].1.is_cancelled());
    }

    #[test]
    fn path_stack_round_trips() {
        let path = PathStack::from_path("Anime/Frieren/Season 1");
        assert_eq!(path.depth(), 3);
        assert_eq!(path.join(), "Anime/Frieren/Season 1");
        assert_eq!(path.parent(), "Anime/Frieren");
        assert_eq!(path.ancestor(1), "Anime");
        assert_eq!(path.ancestor(0), "");
        assert_eq!(path.ancestor(9), "Anime/Frieren/Season 1");

        let root = PathStack::from_path("");
        assert!(root.is_root());
        assert_eq!(root.parent(), "");
        assert!(root.segments().is_empty());
    }
}
