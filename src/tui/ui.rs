use crate::core::DurationFilter;
use crate::tui::app::{App, AppState, DURATION_FIELD, FileFilter, HOME_OPTIONS};
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
};

pub fn draw(f: &mut Frame, app: &mut App) {
    match &app.state {
        AppState::Home => draw_home(f, app),
        AppState::SearchForm => draw_search_form(f, app),
        AppState::Searching { label } => {
            let label = label.clone();
            draw_searching(f, app, &label);
        }
        AppState::Results => draw_results(f, app),
        AppState::Browser => draw_browser(f, app),
        AppState::Viewer { .. } => draw_viewer(f, app),
    }
}

fn title_bar(f: &mut Frame, area: Rect, text: &str) {
    let title = Paragraph::new(text.to_string())
        .style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(title, area);
}

fn help_bar(f: &mut Frame, area: Rect, text: &str) {
    let help = Paragraph::new(text.to_string())
        .style(Style::default().fg(Color::Gray))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(help, area);
}

/// Radio-style rows; the active one is bold yellow.
fn radio_items<'a>(options: impl IntoIterator<Item = &'a str>, active: usize) -> Vec<ListItem<'a>> {
    options
        .into_iter()
        .enumerate()
        .map(|(i, option)| {
            let (marker, style) = if i == active {
                (
                    "● ",
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::BOLD),
                )
            } else {
                ("○ ", Style::default().fg(Color::White))
            };
            ListItem::new(Line::from(vec![
                Span::styled(marker, style),
                Span::styled(option, style),
            ]))
        })
        .collect()
}

fn draw_home(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Title
            Constraint::Min(1),    // Menu
            Constraint::Length(1), // Notice
            Constraint::Length(3), // Help
        ])
        .split(f.area());

    title_bar(f, chunks[0], "ChannelBoost");

    let menu = List::new(radio_items(HOME_OPTIONS, app.selected_option))
        .block(Block::default().borders(Borders::ALL).title("Menu"));
    f.render_widget(menu, chunks[1]);

    draw_notice(f, app, chunks[2]);
    help_bar(f, chunks[3], "[↑↓] Navigate  [Enter] Select  [q] Exit");
}

fn draw_search_form(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Title
            Constraint::Length(3), // Niche
            Constraint::Length(3), // Max age
            Constraint::Length(3), // Min views/day
            Constraint::Length(3), // Duration
            Constraint::Length(1), // Error
            Constraint::Min(0),
            Constraint::Length(3), // Help
        ])
        .split(f.area());

    title_bar(f, chunks[0], "New Competitor Search");

    app.niche_input.render(f, chunks[1]);
    app.max_age_input.render(f, chunks[2]);
    app.min_vpd_input.render(f, chunks[3]);

    let focused = app.input_focus == DURATION_FIELD;
    let spans: Vec<Span> = DurationFilter::ALL
        .iter()
        .flat_map(|d| {
            let style = if *d == app.duration {
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::DarkGray)
            };
            [Span::styled(d.to_string(), style), Span::raw("  ")]
        })
        .collect();
    let duration = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Duration")
            .border_style(if focused {
                Style::default().fg(Color::Yellow)
            } else {
                Style::default().fg(Color::Gray)
            }),
    );
    f.render_widget(duration, chunks[4]);

    if let Some(error) = &app.form_error {
        f.render_widget(
            Paragraph::new(error.as_str()).style(Style::default().fg(Color::Red)),
            chunks[5],
        );
    }

    help_bar(
        f,
        chunks[7],
        "[Tab] Next  [Space/←→] Duration  [Enter] Search (on Duration)  [Esc] Back",
    );
}

fn draw_searching(f: &mut Frame, app: &App, label: &str) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Title
            Constraint::Min(1),    // Progress area
            Constraint::Length(3), // Help
        ])
        .split(f.area());

    title_bar(
        f,
        chunks[0],
        if app.is_searching() { "Searching..." } else { "Search stopped" },
    );
    app.progress_bar.render(f, chunks[1], label);
    help_bar(
        f,
        chunks[2],
        if app.is_searching() { "[Esc] Cancel" } else { "[Esc] Back" },
    );
}

fn draw_results(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Summary
            Constraint::Min(1),    // List
            Constraint::Length(1), // Notice
            Constraint::Length(3), // Help
        ])
        .split(f.area());

    let summary = match &app.results {
        Some(results) => format!(
            "{}  ·  {} videos  ·  {}",
            results.niche.label,
            results.videos.len(),
            if results.next_cursor.is_some() { "more available" } else { "all loaded" }
        ),
        None => "No results".to_string(),
    };
    title_bar(f, chunks[0], &summary);

    app.result_list
        .render(f, chunks[1], "Views/day    Views   Age  Title");

    draw_notice(f, app, chunks[2]);
    help_bar(
        f,
        chunks[3],
        "[Enter] Details  [m] Load more  [s] Save  [↑↓/PgUp/PgDn] Scroll  [Esc] Home",
    );
}

fn draw_browser(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(20), Constraint::Min(1)])
        .split(f.area());

    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(5), // Filters
            Constraint::Length(3), // Search
        ])
        .split(chunks[0]);

    let active = match app.filter {
        FileFilter::All => 0,
        FileFilter::Searches => 1,
        FileFilter::Ideas => 2,
    };
    let filters = List::new(radio_items(["All", "Searches", "Ideas"], active))
        .block(Block::default().borders(Borders::ALL).title("Filters"));
    f.render_widget(filters, left_chunks[0]);

    app.search_input.render(f, left_chunks[1]);

    let right_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(1),
            Constraint::Length(1),
            Constraint::Length(3),
        ])
        .split(chunks[1]);

    app.file_list.render(f, right_chunks[0], "Files");
    draw_notice(f, app, right_chunks[1]);
    help_bar(
        f,
        right_chunks[2],
        "[Enter] Open  [Del] Delete  [Space] Mark  [/] Search  [1-3] Filters  [Esc] Home",
    );
}

fn draw_viewer(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(3)])
        .split(f.area());

    if let Some(viewer) = &app.content_viewer {
        app.viewer_height = chunks[0].height;
        viewer.render(f, chunks[0]);
    }

    help_bar(
        f,
        chunks[1],
        "[↑↓] Scroll  [PgUp/PgDn] Page  [Home/End] Top/Bottom  [Esc] Back",
    );
}

fn draw_notice(f: &mut Frame, app: &App, area: Rect) {
    if let Some(notice) = &app.notice {
        f.render_widget(
            Paragraph::new(format!(" {notice}")).style(Style::default().fg(Color::Cyan)),
            area,
        );
    }
}
