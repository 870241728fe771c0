use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, List, ListItem, Paragraph},
    Frame,
};
use unicode_truncate::UnicodeTruncateStr;

use super::TuiRenderer;
use crate::render::Screen;

const TITLE: &str = "bilitui";
const TYPE_INTERVAL_MS: u128 = 150;

/// `playing` reflects whether a player process is currently live; the
/// renderer itself only knows what it was told to paint.
pub fn draw(frame: &mut Frame, r: &TuiRenderer, playing: bool) {
    match r.screen {
        Screen::Loading => draw_loading(frame, r),
        Screen::Folders => draw_folders(frame, r),
        Screen::Videos => draw_videos(frame, r),
        Screen::Player => draw_player(frame, r, playing),
    }
}

fn draw_loading(frame: &mut Frame, r: &TuiRenderer) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(2)
        .constraints([
            Constraint::Percentage(40), // Top padding
            Constraint::Length(1),      // Title
            Constraint::Length(1),      // Spacer
            Constraint::Length(1),      // Status
            Constraint::Min(0),
        ])
        .split(frame.area());

    // Typewriter reveal, then a blinking cursor until the hand-over
    let elapsed = r.loading_started.elapsed().as_millis();
    let shown = ((elapsed / TYPE_INTERVAL_MS) as usize).min(TITLE.chars().count());
    let typed: String = TITLE.chars().take(shown).collect();
    let cursor = if (elapsed / 500) % 2 == 0 { "▌" } else { " " };

    let title = Paragraph::new(format!("{}{}", typed, cursor))
        .alignment(Alignment::Center)
        .style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        );
    frame.render_widget(title, chunks[1]);

    let status = Paragraph::new("loading the library...")
        .alignment(Alignment::Center)
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(status, chunks[3]);
}

fn draw_folders(frame: &mut Frame, r: &TuiRenderer) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(1), // Breadcrumb
            Constraint::Min(0),    // Folder list
            Constraint::Length(1), // Notice
            Constraint::Length(2), // Help
        ])
        .split(frame.area());

    // Breadcrumb: the library root plus one crumb per level
    let mut crumbs = vec![Span::styled(
        "Library",
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    )];
    for segment in &r.breadcrumb {
        crumbs.push(Span::styled(" / ", Style::default().fg(Color::DarkGray)));
        crumbs.push(Span::raw(segment.as_str()));
    }
    frame.render_widget(Paragraph::new(Line::from(crumbs)), chunks[0]);

    if r.folders.is_empty() {
        let empty = Paragraph::new("This folder is empty")
            .style(Style::default().fg(Color::DarkGray))
            .block(Block::default().borders(Borders::ALL).title("Folders"));
        frame.render_widget(empty, chunks[1]);
    } else {
        let width = chunks[1].width.saturating_sub(6) as usize;
        let items: Vec<ListItem> = r
            .folders
            .iter()
            .enumerate()
            .map(|(i, f)| {
                let style = if i == r.selected_folder {
                    Style::default()
                        .fg(Color::Black)
                        .bg(Color::Cyan)
                        .add_modifier(Modifier::BOLD)
                } else {
                    Style::default()
                };

                let icon = if f.has_listing { "📺" } else { "📁" };
                let (name, _) = f.name.unicode_truncate(width);
                ListItem::new(format!("{} {}", icon, name)).style(style)
            })
            .collect();

        let list_title = format!("Folders [{}]", r.folders.len());
        let list =
            List::new(items).block(Block::default().borders(Borders::ALL).title(list_title));
        frame.render_widget(list, chunks[1]);
    }

    draw_notice(frame, r, chunks[2]);

    // No "up" affordance at the root, where it would do nothing.
    let help = if r.breadcrumb.is_empty() {
        "↑/↓: navigate | Enter: open | q: quit"
    } else {
        "↑/↓: navigate | Enter: open | Backspace: up | h: root | q: up"
    };
    let help = Paragraph::new(help).style(Style::default().fg(Color::DarkGray));
    frame.render_widget(help, chunks[3]);
}

fn draw_videos(frame: &mut Frame, r: &TuiRenderer) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(1), // Title
            Constraint::Min(0),    // Episode list
            Constraint::Length(1), // Notice
            Constraint::Length(2), // Help
        ])
        .split(frame.area());

    let header = format!("{} ({} episodes)", r.videos_title, r.videos.len());
    let title = Paragraph::new(header).style(
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    );
    frame.render_widget(title, chunks[0]);

    if r.videos.is_empty() {
        let empty = Paragraph::new("No videos in this collection")
            .style(Style::default().fg(Color::DarkGray))
            .block(Block::default().borders(Borders::ALL).title("Episodes"));
        frame.render_widget(empty, chunks[1]);
    } else {
        let width = chunks[1].width.saturating_sub(18) as usize;
        let items: Vec<ListItem> = r
            .videos
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let style = if i == r.selected_video {
                    Style::default()
                        .fg(Color::Black)
                        .bg(Color::Cyan)
                        .add_modifier(Modifier::BOLD)
                } else {
                    Style::default()
                };

                // Filled marker once the cover answer has arrived
                let marker = if r.covers.contains_key(&v.page) {
                    Span::styled("● ", Style::default().fg(Color::Cyan))
                } else {
                    Span::styled("○ ", Style::default().fg(Color::DarkGray))
                };

                let (text, _) = v.title.unicode_truncate(width);
                let duration = v
                    .duration
                    .map(|d| format!("  {}", format_duration(d)))
                    .unwrap_or_default();

                let line = Line::from(vec![
                    marker,
                    Span::styled(format!("P{:<3}", v.page), Style::default().fg(Color::DarkGray)),
                    Span::raw(" "),
                    Span::raw(text),
                    Span::styled(duration, Style::default().fg(Color::DarkGray)),
                ]);
                ListItem::new(line).style(style)
            })
            .collect();

        let list_title = format!("Episodes [{}]", r.videos.len());
        let list =
            List::new(items).block(Block::default().borders(Borders::ALL).title(list_title));
        frame.render_widget(list, chunks[1]);
    }

    draw_notice(frame, r, chunks[2]);

    let help = Paragraph::new("↑/↓: navigate | Enter: play | Esc: back to folders")
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(help, chunks[3]);
}

fn draw_player(frame: &mut Frame, r: &TuiRenderer, playing: bool) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(2)
        .constraints([
            Constraint::Length(3), // Title
            Constraint::Length(3), // Gauge or status
            Constraint::Length(1), // Notice
            Constraint::Min(0),    // Empty
            Constraint::Length(2), // Help
        ])
        .split(frame.area());

    let title = Paragraph::new(&*r.player_title)
        .style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .block(Block::default().borders(Borders::ALL).title("Now Playing"));
    frame.render_widget(title, chunks[0]);

    if let Some(percent) = r.progress {
        let gauge = Gauge::default()
            .block(Block::default().borders(Borders::ALL).title("Preparing"))
            .gauge_style(Style::default().fg(Color::Cyan).bg(Color::DarkGray))
            .percent(percent.min(100))
            .label(format!("{}%", percent));
        frame.render_widget(gauge, chunks[1]);
    } else if playing {
        let status = Paragraph::new("Playing in your external player")
            .style(Style::default().fg(Color::Green))
            .block(Block::default().borders(Borders::ALL).title("Status"));
        frame.render_widget(status, chunks[1]);
    } else {
        let status = Paragraph::new("Not playing. Press r to retry")
            .style(Style::default().fg(Color::Yellow))
            .block(Block::default().borders(Borders::ALL).title("Status"));
        frame.render_widget(status, chunks[1]);
    }

    draw_notice(frame, r, chunks[2]);

    let help = Paragraph::new("q/Esc: back to episodes | f: folders | r: retry")
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(help, chunks[4]);
}

fn draw_notice(frame: &mut Frame, r: &TuiRenderer, area: Rect) {
    if let Some(text) = r.notice_text() {
        let notice = Paragraph::new(text).style(Style::default().fg(Color::Red));
        frame.render_widget(notice, area);
    }
}

fn format_duration(secs: u64) -> String {
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}
