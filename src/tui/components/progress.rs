use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph},
};

/// Live view of a running search: matches against the target, counters and a short log.
pub struct ProgressBar {
    pub matched: usize,
    pub target: usize,
    pub pages: usize,
    pub scanned: usize,
    pub message: String,
    pub logs: Vec<String>,
    pub max_logs: usize,
}

impl ProgressBar {
    pub fn new() -> Self {
        Self {
            matched: 0,
            target: 0,
            pages: 0,
            scanned: 0,
            message: String::new(),
            logs: Vec::new(),
            max_logs: 50,
        }
    }

    pub fn start(&mut self, target: usize, message: impl Into<String>) {
        self.reset();
        self.target = target;
        self.message = message.into();
    }

    pub fn ratio(&self) -> f64 {
        if self.target == 0 {
            return 0.0;
        }
        (self.matched as f64 / self.target as f64).clamp(0.0, 1.0)
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = message.into();
    }

    pub fn add_log(&mut self, log: impl AsRef<str>) {
        let timestamp = chrono::Local::now().format("%H:%M:%S");
        self.logs.push(format!("[{timestamp}] {}", log.as_ref()));

        if self.logs.len() > self.max_logs {
            self.logs.remove(0);
        }
    }

    pub fn render(&self, f: &mut Frame, area: Rect, label: &str) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1), // Niche
                Constraint::Length(3), // Gauge
                Constraint::Length(2), // Status
                Constraint::Min(1),    // Logs
            ])
            .split(area);

        f.render_widget(
            Paragraph::new(format!("Niche: {label}")).style(Style::default().fg(Color::White)),
            chunks[0],
        );

        let gauge = Gauge::default()
            .block(Block::default().borders(Borders::ALL).title("Matches"))
            .gauge_style(Style::default().fg(Color::Green))
            .ratio(self.ratio())
            .label(format!("{} / {}", self.matched, self.target));
        f.render_widget(gauge, chunks[1]);

        let status = vec![
            Line::from(Span::styled(
                self.message.as_str(),
                Style::default().fg(Color::Yellow),
            )),
            Line::from(Span::styled(
                format!("{} pages, {} videos scanned", self.pages, self.scanned),
                Style::default().fg(Color::Gray),
            )),
        ];
        f.render_widget(Paragraph::new(status), chunks[2]);

        // Newest entries stay visible
        let height = chunks[3].height.saturating_sub(2) as usize;
        let log_lines: Vec<Line> = self
            .logs
            .iter()
            .skip(self.logs.len().saturating_sub(height))
            .map(|log| Line::from(Span::raw(log.as_str())))
            .collect();

        let logs =
            Paragraph::new(log_lines).block(Block::default().borders(Borders::ALL).title("Log"));
        f.render_widget(logs, chunks[3]);
    }

    pub fn reset(&mut self) {
        self.matched = 0;
        self.target = 0;
        self.pages = 0;
        self.scanned = 0;
        self.message.clear();
        self.logs.clear();
    }
}

impl Default for ProgressBar {
    fn default() -> Self {
        Self::new()
    }
}
