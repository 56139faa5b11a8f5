use crate::core::{CompetitorVideo, FileEntry, FileType};
use crossterm::event::{KeyCode, KeyEvent, MouseEvent, MouseEventKind};
use ratatui::{
    Frame,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState},
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// A row that knows how to draw itself in `width` terminal columns.
pub trait ListRow {
    fn line(&self, width: usize) -> Line<'_>;
}

pub struct SelectableList<T> {
    pub items: Vec<T>,
    pub state: ListState,
    pub marked: Vec<bool>,
    viewport_size: usize,
}

pub type FileList = SelectableList<FileEntry>;
pub type ResultList = SelectableList<CompetitorVideo>;

impl<T: ListRow> SelectableList<T> {
    pub fn new(items: Vec<T>) -> Self {
        let marked = vec![false; items.len()];
        let mut state = ListState::default();
        if !items.is_empty() {
            state.select(Some(0));
        }

        Self {
            items,
            state,
            marked,
            viewport_size: 0,
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Up => self.previous(),
            KeyCode::Down => self.next(),
            KeyCode::PageDown => self.move_by(self.viewport_size.max(1) as isize),
            KeyCode::PageUp => self.move_by(-(self.viewport_size.max(1) as isize)),
            KeyCode::Home => self.select(0),
            KeyCode::End => self.select(self.items.len().saturating_sub(1)),
            KeyCode::Char(' ') => self.toggle_marked(),
            _ => return false,
        }
        true
    }

    pub fn handle_mouse(&mut self, mouse: MouseEvent) -> bool {
        match mouse.kind {
            MouseEventKind::ScrollUp => self.move_by(-1),
            MouseEventKind::ScrollDown => self.move_by(1),
            _ => return false,
        }
        true
    }

    /// Wraps around at both ends.
    pub fn next(&mut self) {
        if self.items.is_empty() {
            return;
        }
        let i = match self.state.selected() {
            Some(i) => (i + 1) % self.items.len(),
            None => 0,
        };
        self.select(i);
    }

    pub fn previous(&mut self) {
        if self.items.is_empty() {
            return;
        }
        let i = match self.state.selected() {
            Some(0) | None => self.items.len() - 1,
            Some(i) => i - 1,
        };
        self.select(i);
    }

    /// Clamped at both ends.
    fn move_by(&mut self, delta: isize) {
        if self.items.is_empty() {
            return;
        }
        let current = self.state.selected().unwrap_or(0);
        let target = current.saturating_add_signed(delta).min(self.items.len() - 1);
        self.select(target);
    }

    fn select(&mut self, index: usize) {
        if self.items.is_empty() {
            return;
        }
        self.state.select(Some(index.min(self.items.len() - 1)));
        self.adjust_offset();
    }

    pub fn toggle_marked(&mut self) {
        if let Some(i) = self.state.selected()
            && let Some(mark) = self.marked.get_mut(i)
        {
            *mark = !*mark;
        }
    }

    pub fn selected(&self) -> Option<&T> {
        self.state.selected().and_then(|i| self.items.get(i))
    }

    pub fn marked_items(&self) -> Vec<&T> {
        self.items
            .iter()
            .zip(&self.marked)
            .filter_map(|(item, &marked)| marked.then_some(item))
            .collect()
    }

    pub fn render(&mut self, f: &mut Frame, area: Rect, title: &str) {
        self.viewport_size = (area.height.saturating_sub(2) as usize).max(1);
        self.adjust_offset();

        // Borders plus the mark column
        let width = (area.width as usize).saturating_sub(4);
        let items: Vec<ListItem> = self
            .items
            .iter()
            .zip(&self.marked)
            .map(|(item, &marked)| {
                let mut line = item.line(width);
                line.spans
                    .insert(0, Span::raw(if marked { "☑ " } else { "☐ " }));
                ListItem::new(line)
            })
            .collect();

        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title(title))
            .highlight_style(
                Style::default()
                    .bg(Color::DarkGray)
                    .add_modifier(Modifier::BOLD),
            );

        f.render_stateful_widget(list, area, &mut self.state);
    }

    /// Replaces the rows, keeping the selection in range and clearing marks.
    pub fn update_items(&mut self, new_items: Vec<T>) {
        let current_selected = self.state.selected();
        self.items = new_items;
        self.marked = vec![false; self.items.len()];

        match current_selected {
            _ if self.items.is_empty() => self.state.select(None),
            Some(selected) => self.state.select(Some(selected.min(self.items.len() - 1))),
            None => self.state.select(Some(0)),
        }

        self.adjust_offset();
    }

    fn adjust_offset(&mut self) {
        if self.items.is_empty() {
            *self.state.offset_mut() = 0;
            return;
        }

        let viewport = self.viewport_size.max(1);
        let selected = self.state.selected().unwrap_or(0).min(self.items.len() - 1);
        let max_offset = self.items.len().saturating_sub(viewport);
        let mut offset = self.state.offset().min(max_offset);

        if selected < offset {
            offset = selected;
        } else if selected >= offset + viewport {
            offset = selected + 1 - viewport;
        }
        *self.state.offset_mut() = offset;
    }
}

impl ListRow for FileEntry {
    fn line(&self, _width: usize) -> Line<'_> {
        let icon = match self.file_type {
            FileType::Search => "🔎",
            FileType::Ideas => "💡",
        };

        Line::from(vec![
            Span::raw(icon),
            Span::raw(" "),
            Span::styled(self.name.as_str(), Style::default().fg(Color::White)),
            Span::raw(format!(" ({})", format_size(self.size))),
        ])
    }
}

impl ListRow for CompetitorVideo {
    fn line(&self, width: usize) -> Line<'_> {
        let stats = format!(
            "{:>9}/d {:>9} {:>4.0}d  ",
            compact(self.views_per_day),
            compact(self.video.view_count as f64),
            self.age_days
        );
        let channel = format!("  · {}", self.video.channel_title);
        let title_width = width.saturating_sub(stats.width() + channel.width().min(24));

        Line::from(vec![
            Span::styled(stats, Style::default().fg(Color::Green)),
            Span::styled(
                truncate(&self.video.title, title_width),
                Style::default().fg(Color::White),
            ),
            Span::styled(
                truncate(&channel, 24),
                Style::default().fg(Color::DarkGray),
            ),
        ])
    }
}

fn format_size(bytes: u64) -> String {
    let size_kb = bytes / 1024;
    if size_kb < 1024 {
        format!("{size_kb}KB")
    } else {
        format!("{:.1}MB", size_kb as f64 / 1024.0)
    }
}

/// `1234567.0` → `1.2M`.
pub fn compact(value: f64) -> String {
    match value {
        v if v >= 1_000_000_000.0 => format!("{:.1}B", v / 1_000_000_000.0),
        v if v >= 1_000_000.0 => format!("{:.1}M", v / 1_000_000.0),
        v if v >= 1_000.0 => format!("{:.1}K", v / 1_000.0),
        v => format!("{v:.0}"),
    }
}

/// Cuts `text` to at most `width` columns, ending in `…` when shortened.
pub fn truncate(text: &str, width: usize) -> String {
    if text.width() <= width {
        return text.to_string();
    }
    if width == 0 {
        return String::new();
    }

    let mut out = String::new();
    let mut used = 0;
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if used + w > width - 1 {
            break;
        }
        out.push(c);
        used += w;
    }
    out.push('…');
    out
}
