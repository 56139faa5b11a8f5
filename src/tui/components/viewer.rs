use crossterm::event::{KeyCode, KeyEvent};
use ratatui::{
    Frame,
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
};
use std::path::Path;

pub struct Viewer {
    pub content: String,
    pub scroll: usize,
    pub file_path: String,
}

impl Viewer {
    pub fn new(content: String, file_path: String) -> Self {
        Self {
            content,
            scroll: 0,
            file_path,
        }
    }

    fn max_scroll(&self, page: usize) -> usize {
        self.content.lines().count().saturating_sub(page)
    }

    pub fn handle_key(&mut self, key: KeyEvent, area_height: u16) -> bool {
        let page = (area_height as usize).saturating_sub(2).max(1);
        match key.code {
            KeyCode::Up => self.scroll = self.scroll.saturating_sub(1),
            KeyCode::Down => self.scroll = (self.scroll + 1).min(self.max_scroll(page)),
            KeyCode::PageUp => self.scroll = self.scroll.saturating_sub(page),
            KeyCode::PageDown => self.scroll = (self.scroll + page).min(self.max_scroll(page)),
            KeyCode::Home => self.scroll = 0,
            KeyCode::End => self.scroll = self.max_scroll(page),
            _ => return false,
        }
        true
    }

    pub fn render(&self, f: &mut Frame, area: Rect) {
        let name = Path::new(&self.file_path)
            .file_name()
            .unwrap_or_default()
            .to_string_lossy();
        let visible_lines = area.height.saturating_sub(2) as usize;

        let lines: Vec<Line> = self
            .content
            .lines()
            .skip(self.scroll)
            .take(visible_lines)
            .map(|line| {
                let trimmed = line.trim_start();
                let color = if line.starts_with('#') {
                    Some(Color::Yellow)
                } else if line.starts_with('|') && line.ends_with('|') {
                    Some(Color::Cyan)
                } else if trimmed.starts_with(['-', '*'])
                    || trimmed.split_once(". ").is_some_and(|(n, _)| {
                        !n.is_empty() && n.chars().all(|c| c.is_ascii_digit())
                    })
                {
                    Some(Color::Green)
                } else if trimmed.starts_with('"') {
                    // JSON keys in saved searches
                    Some(Color::Cyan)
                } else {
                    None
                };
                match color {
                    Some(color) => Line::from(Span::styled(line, Style::default().fg(color))),
                    None => Line::from(Span::raw(line)),
                }
            })
            .collect();

        let total_lines = self.content.lines().count();
        let scroll_info = if total_lines > visible_lines {
            format!(
                " (lines {}-{} of {total_lines})",
                self.scroll + 1,
                (self.scroll + visible_lines).min(total_lines),
            )
        } else {
            String::new()
        };

        let block = Block::default()
            .borders(Borders::ALL)
            .title(format!("Viewer: {name}{scroll_info}"));

        let paragraph = Paragraph::new(lines)
            .block(block)
            .wrap(Wrap { trim: false });

        f.render_widget(paragraph, area);
    }
}
