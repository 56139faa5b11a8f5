use crate::core::{
    CompetitorVideo, Cursor, DurationFilter, FileEntry, FileType, Niche, SavedSearch, SearchEvent,
    SearchOutcome, SearchRequest, Services,
};
use crate::error::Result;
use crate::tui::components::{FileList, InputField, ProgressBar, ResultList, Viewer, compact};
use crate::tui::events::AppEvent;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent};
use std::fmt::Write as _;
use std::str::FromStr;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub const HOME_OPTIONS: [&str; 3] = ["New Search", "Last Results", "Saved Files"];
pub const FORM_FIELDS: usize = 4;
pub const DURATION_FIELD: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub enum AppState {
    Home,
    SearchForm,
    Searching { label: String },
    Results,
    Browser,
    Viewer { from_results: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFilter {
    All,
    Searches,
    Ideas,
}

impl FileFilter {
    fn accepts(self, file: &FileEntry) -> bool {
        match self {
            FileFilter::All => true,
            FileFilter::Searches => file.file_type == FileType::Search,
            FileFilter::Ideas => file.file_type == FileType::Ideas,
        }
    }
}

/// Outcome of one search call run in the background.
#[derive(Debug)]
pub struct Completed {
    pub niche: Niche,
    pub request: SearchRequest,
    pub outcome: SearchOutcome,
    pub cancelled: bool,
    /// Continues the results on screen rather than replacing them.
    pub resumed: bool,
}

/// Messages from background tasks to the UI loop.
#[derive(Debug)]
pub enum TaskMessage {
    Log(String),
    Search(SearchEvent),
    Completed(Box<Completed>),
    Failed(String),
    Saved(std::result::Result<String, String>),
    Opened(std::result::Result<Box<SavedSearch>, String>),
}

type TaskSender = mpsc::UnboundedSender<TaskMessage>;

pub struct App {
    pub state: AppState,
    pub should_quit: bool,

    // Home screen
    pub selected_option: usize,

    // Search form
    pub niche_input: InputField,
    pub max_age_input: InputField,
    pub min_vpd_input: InputField,
    pub duration: DurationFilter,
    pub input_focus: usize,
    pub form_error: Option<String>,

    // Results screen
    pub results: Option<SavedSearch>,
    pub result_list: ResultList,

    // Browser screen
    pub file_list: FileList,
    pub search_input: InputField,
    pub filter: FileFilter,
    all_files: Vec<FileEntry>,

    // Viewer screen
    pub content_viewer: Option<Viewer>,
    pub viewer_height: u16,

    // Searching screen
    pub progress_bar: ProgressBar,
    search_cancel: Option<CancellationToken>,
    search_resumed: bool,

    /// One-line feedback shown under the results and browser screens.
    pub notice: Option<String>,

    services: Services,
    tx: TaskSender,
    rx: mpsc::UnboundedReceiver<TaskMessage>,
}

impl App {
    pub fn new(services: Services) -> Self {
        let defaults = services.config().search.clone();
        let (tx, rx) = mpsc::unbounded_channel();

        Self {
            state: AppState::Home,
            should_quit: false,

            selected_option: 0,

            niche_input: InputField::new("Niche or video URL", "home espresso / https://youtu.be/..."),
            max_age_input: InputField::new("Max age (days, empty = any)", "90")
                .with_value(defaults.max_age_days.map(|d| d.to_string()).unwrap_or_default()),
            min_vpd_input: InputField::new("Min views per day", "0")
                .with_value(defaults.min_views_per_day.to_string()),
            duration: DurationFilter::Any,
            input_focus: 0,
            form_error: None,

            results: None,
            result_list: ResultList::new(Vec::new()),

            file_list: FileList::new(Vec::new()),
            search_input: InputField::new("Search", "Filter files..."),
            filter: FileFilter::All,
            all_files: Vec::new(),

            content_viewer: None,
            viewer_height: 0,

            progress_bar: ProgressBar::new(),
            search_cancel: None,
            search_resumed: false,

            notice: None,

            services,
            tx,
            rx,
        }
    }

    pub fn handle_event(&mut self, event: AppEvent) -> Result<()> {
        match event {
            AppEvent::Key(key) => self.handle_key(key)?,
            AppEvent::Mouse(mouse) => self.handle_mouse(mouse),
            AppEvent::Tick => self.handle_tick()?,
        }
        Ok(())
    }

    pub fn is_searching(&self) -> bool {
        self.search_cancel.is_some()
    }

    /// Signals the running search, if any; it reports back with a resume cursor.
    pub fn cancel_search(&mut self) {
        if let Some(cancel) = &self.search_cancel {
            cancel.cancel();
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> Result<()> {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            if self.is_searching() {
                self.cancel_search();
            } else {
                self.should_quit = true;
            }
            return Ok(());
        }

        match &self.state {
            AppState::Home => self.handle_home_key(key),
            AppState::SearchForm => self.handle_form_key(key),
            AppState::Searching { .. } => self.handle_searching_key(key),
            AppState::Results => self.handle_results_key(key),
            AppState::Browser => self.handle_browser_key(key),
            AppState::Viewer { .. } => self.handle_viewer_key(key),
        }
    }

    fn handle_mouse(&mut self, mouse: MouseEvent) {
        match self.state {
            AppState::Results => {
                self.result_list.handle_mouse(mouse);
            }
            AppState::Browser => {
                self.file_list.handle_mouse(mouse);
            }
            _ => {}
        }
    }

    fn handle_home_key(&mut self, key: KeyEvent) -> Result<()> {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Up => self.selected_option = self.selected_option.saturating_sub(1),
            KeyCode::Down => {
                self.selected_option = (self.selected_option + 1).min(HOME_OPTIONS.len() - 1);
            }
            KeyCode::Char(c @ '1'..='3') => self.selected_option = c as usize - '1' as usize,
            KeyCode::Enter => match self.selected_option {
                0 => self.open_form(),
                1 if self.results.is_some() => self.state = AppState::Results,
                1 => self.notice = Some("No results yet; run a search first".to_string()),
                2 => self.open_browser(),
                _ => {}
            },
            _ => {}
        }
        Ok(())
    }

    fn open_form(&mut self) {
        self.state = AppState::SearchForm;
        self.form_error = None;
        self.input_focus = 0;
        self.focus_form_field();
    }

    fn handle_form_key(&mut self, key: KeyEvent) -> Result<()> {
        match key.code {
            KeyCode::Esc => self.state = AppState::Home,
            KeyCode::Tab | KeyCode::Down => self.cycle_input_focus(1),
            KeyCode::BackTab | KeyCode::Up => self.cycle_input_focus(FORM_FIELDS - 1),
            KeyCode::Enter => {
                if self.input_focus < DURATION_FIELD {
                    self.cycle_input_focus(1);
                } else {
                    self.start_search();
                }
            }
            KeyCode::Char(' ') | KeyCode::Left | KeyCode::Right
                if self.input_focus == DURATION_FIELD =>
            {
                self.duration = self.duration.next();
            }
            _ => {
                if let Some(field) = self.focused_input() {
                    field.handle_key(key);
                }
            }
        }
        Ok(())
    }

    fn focused_input(&mut self) -> Option<&mut InputField> {
        match self.input_focus {
            0 => Some(&mut self.niche_input),
            1 => Some(&mut self.max_age_input),
            2 => Some(&mut self.min_vpd_input),
            _ => None,
        }
    }

    fn cycle_input_focus(&mut self, step: usize) {
        self.input_focus = (self.input_focus + step) % FORM_FIELDS;
        self.focus_form_field();
    }

    fn focus_form_field(&mut self) {
        self.niche_input.focused = self.input_focus == 0;
        self.max_age_input.focused = self.input_focus == 1;
        self.min_vpd_input.focused = self.input_focus == 2;
    }

    fn start_search(&mut self) {
        if !self.niche_input.is_valid() {
            self.form_error = Some("Enter a niche description or a video URL".to_string());
            return;
        }
        let max_age_days = match parse_field::<u32>(&self.max_age_input) {
            Ok(days) => days.filter(|d| *d > 0),
            Err(e) => {
                self.form_error = Some(e);
                return;
            }
        };
        let min_views_per_day = match parse_field::<f64>(&self.min_vpd_input) {
            Ok(vpd) if vpd.is_none_or(|v| v.is_finite() && v >= 0.0) => vpd.unwrap_or(0.0),
            Ok(_) => {
                self.form_error = Some("Min views per day must be zero or more".to_string());
                return;
            }
            Err(e) => {
                self.form_error = Some(e);
                return;
            }
        };

        let input = self.niche_input.value.trim().to_string();
        let duration = self.duration;
        let cancel = self.begin_search(&input, self.services.config().search.target, false);
        let services = self.services.clone();
        let tx = self.tx.clone();
        info!(input = %input, "Starting search from the TUI");

        tokio::spawn(async move {
            let niche = match services.niche_for(&input).await {
                Ok(niche) => niche,
                Err(e) => {
                    let _ = tx.send(TaskMessage::Failed(e.to_string()));
                    return;
                }
            };
            let _ = tx.send(TaskMessage::Log(format!(
                "Niche \"{}\": {}",
                niche.label,
                niche.terms.join(" | ")
            )));

            let mut request = services.request_for(&niche);
            request.filters.max_age_days = max_age_days;
            request.filters.min_views_per_day = min_views_per_day;
            request.filters.duration = duration;

            run_search(services, tx, niche, request, None, cancel, false).await;
        });
    }

    fn begin_search(&mut self, label: &str, target: usize, resumed: bool) -> CancellationToken {
        let cancel = CancellationToken::new();
        self.search_cancel = Some(cancel.clone());
        self.search_resumed = resumed;
        self.form_error = None;
        self.notice = None;
        self.progress_bar.start(target, "Searching...");
        self.state = AppState::Searching {
            label: label.to_string(),
        };
        cancel
    }

    fn handle_searching_key(&mut self, key: KeyEvent) -> Result<()> {
        if key.code != KeyCode::Esc {
            return Ok(());
        }

        if self.is_searching() {
            self.progress_bar.set_message("Cancelling...");
            self.cancel_search();
        } else if self.search_resumed && self.results.is_some() {
            self.state = AppState::Results;
        } else {
            self.state = AppState::SearchForm;
        }
        Ok(())
    }

    fn handle_results_key(&mut self, key: KeyEvent) -> Result<()> {
        match key.code {
            KeyCode::Esc => self.state = AppState::Home,
            KeyCode::Char('m') => self.load_more(),
            KeyCode::Char('s') => self.save_results(),
            KeyCode::Enter => {
                if let Some(candidate) = self.result_list.selected() {
                    let content = describe_video(candidate);
                    self.content_viewer = Some(Viewer::new(content, candidate.video.url()));
                    self.state = AppState::Viewer { from_results: true };
                }
            }
            _ => {
                self.result_list.handle_key(key);
            }
        }
        Ok(())
    }

    fn load_more(&mut self) {
        if self.is_searching() {
            return;
        }
        let Some(results) = &self.results else {
            return;
        };
        let Some(cursor) = results.next_cursor.clone() else {
            self.notice = Some("No more results for this search".to_string());
            return;
        };

        let niche = results.niche.clone();
        let request = results.request.clone();
        let cancel = self.begin_search(&niche.label, request.target, true);
        self.progress_bar.add_log(format!("Resuming \"{}\"", niche.label));

        let services = self.services.clone();
        let tx = self.tx.clone();
        tokio::spawn(run_search(services, tx, niche, request, Some(cursor), cancel, true));
    }

    fn save_results(&mut self) {
        let Some(results) = self.results.clone() else {
            return;
        };
        let storage = self.services.storage.clone();
        let tx = self.tx.clone();

        tokio::spawn(async move {
            let saved = storage
                .save_search(&results)
                .await
                .map(|_| results.id.clone())
                .map_err(|e| e.to_string());
            let _ = tx.send(TaskMessage::Saved(saved));
        });
    }

    fn handle_browser_key(&mut self, key: KeyEvent) -> Result<()> {
        if self.search_input.focused {
            match key.code {
                KeyCode::Esc => {
                    self.search_input.focused = false;
                    self.search_input.clear();
                    self.apply_filter();
                }
                KeyCode::Enter | KeyCode::Down => self.search_input.focused = false,
                _ => {
                    self.search_input.handle_key(key);
                    self.apply_filter();
                }
            }
            return Ok(());
        }

        match key.code {
            KeyCode::Esc => self.state = AppState::Home,
            KeyCode::Enter => {
                if let Some(file) = self.file_list.selected().cloned() {
                    self.open_file(file);
                }
            }
            KeyCode::Delete => self.delete_selected_files(),
            KeyCode::Char('/') => self.search_input.focused = true,
            KeyCode::Char('1') => self.set_filter(FileFilter::All),
            KeyCode::Char('2') => self.set_filter(FileFilter::Searches),
            KeyCode::Char('3') => self.set_filter(FileFilter::Ideas),
            _ => {
                self.file_list.handle_key(key);
            }
        }
        Ok(())
    }

    fn handle_viewer_key(&mut self, key: KeyEvent) -> Result<()> {
        match key.code {
            KeyCode::Esc => {
                self.state = match self.state {
                    AppState::Viewer { from_results: true } => AppState::Results,
                    _ => AppState::Browser,
                };
            }
            _ => {
                if let Some(viewer) = &mut self.content_viewer {
                    viewer.handle_key(key, self.viewer_height);
                }
            }
        }
        Ok(())
    }

    fn handle_tick(&mut self) -> Result<()> {
        let mut messages = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            messages.push(message);
        }

        for message in messages {
            match message {
                TaskMessage::Log(log) => self.progress_bar.add_log(log),
                TaskMessage::Search(event) => self.apply_search_event(event),
                TaskMessage::Completed(done) => self.finish_search(*done),
                TaskMessage::Failed(error) => {
                    warn!(error = %error, "Background search failed");
                    self.search_cancel = None;
                    self.progress_bar.set_message(format!("Error: {error}"));
                    self.progress_bar.add_log(format!("Error: {error}"));
                }
                TaskMessage::Saved(Ok(id)) => {
                    self.notice = Some(format!("Saved as {id}"));
                }
                TaskMessage::Saved(Err(error)) => {
                    self.notice = Some(format!("Save failed: {error}"));
                }
                TaskMessage::Opened(Ok(search)) => {
                    self.show_results(*search);
                    self.notice = None;
                }
                TaskMessage::Opened(Err(error)) => {
                    self.notice = Some(format!("Could not open search: {error}"));
                }
            }
        }
        Ok(())
    }

    fn apply_search_event(&mut self, event: SearchEvent) {
        let progress = &mut self.progress_bar;
        match event {
            SearchEvent::Started { terms } => {
                progress.add_log(format!("Querying {} terms", terms.len()));
            }
            SearchEvent::Page {
                term,
                page,
                candidates,
                fresh,
            } => {
                progress.pages = page;
                progress.scanned += fresh;
                progress.set_message(format!("Page {page} for \"{term}\""));
                progress.add_log(format!("\"{term}\" page {page}: {fresh} new of {candidates}"));
            }
            SearchEvent::Match(candidate) => {
                progress.matched += 1;
                progress.add_log(format!(
                    "{}/day  {}",
                    compact(candidate.views_per_day),
                    candidate.video.title
                ));
            }
            SearchEvent::Finished(summary) => {
                progress.set_message(format!("Finished: {} matches", summary.matched));
            }
            SearchEvent::Cancelled { .. } => progress.set_message("Cancelled"),
        }
    }

    fn finish_search(&mut self, done: Completed) {
        self.search_cancel = None;
        let Completed {
            niche,
            request,
            outcome,
            cancelled,
            resumed,
        } = done;

        let fetched = outcome.videos.len();
        let more = outcome.next_cursor.is_some();
        let notice = if resumed && let Some(results) = self.results.as_mut() {
            let added = results.extend(outcome);
            format!("Loaded {added} more")
        } else {
            self.results = Some(SavedSearch::new(niche, request, outcome));
            format!("Found {fetched} videos")
        };

        let hint = match (cancelled, more) {
            (true, _) => "; search cancelled, press m to resume",
            (false, true) => "; press m for more",
            (false, false) => "",
        };
        self.notice = Some(format!("{notice}{hint}"));

        if let Some(results) = &self.results {
            self.result_list.update_items(results.videos.clone());
        }
        self.state = AppState::Results;
    }

    fn show_results(&mut self, search: SavedSearch) {
        self.result_list = ResultList::new(search.videos.clone());
        self.results = Some(search);
        self.state = AppState::Results;
    }

    fn open_browser(&mut self) {
        self.notice = None;
        self.refresh_file_list();
        self.state = AppState::Browser;
    }

    /// Listing failures show up as a notice; the browser keeps its last listing.
    fn refresh_file_list(&mut self) {
        match self.services.storage.list_files() {
            Ok(files) => self.all_files = files,
            Err(e) => self.notice = Some(format!("Could not list files: {e}")),
        }
        self.apply_filter();
    }

    fn set_filter(&mut self, filter: FileFilter) {
        self.filter = filter;
        self.apply_filter();
    }

    fn apply_filter(&mut self) {
        let search_term = self.search_input.value.to_lowercase();
        let filtered: Vec<FileEntry> = self
            .all_files
            .iter()
            .filter(|file| self.filter.accepts(file))
            .filter(|file| search_term.is_empty() || file.name.to_lowercase().contains(&search_term))
            .cloned()
            .collect();

        self.file_list.update_items(filtered);
    }

    fn open_file(&mut self, file: FileEntry) {
        match file.file_type {
            FileType::Search => {
                let Some(id) = file.id().map(str::to_string) else {
                    return;
                };
                let storage = self.services.storage.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let opened = storage
                        .load_search(&id)
                        .await
                        .map(Box::new)
                        .map_err(|e| e.to_string());
                    let _ = tx.send(TaskMessage::Opened(opened));
                });
            }
            FileType::Ideas => match self.services.storage.read_file(&file.path) {
                Ok(content) => {
                    self.content_viewer =
                        Some(Viewer::new(content, file.path.to_string_lossy().to_string()));
                    self.state = AppState::Viewer {
                        from_results: false,
                    };
                }
                Err(e) => self.notice = Some(format!("Could not open file: {e}")),
            },
        }
    }

    /// Deletes the marked files, or the highlighted one when nothing is marked.
    fn delete_selected_files(&mut self) {
        let mut targets: Vec<FileEntry> =
            self.file_list.marked_items().into_iter().cloned().collect();
        if targets.is_empty() {
            targets.extend(self.file_list.selected().cloned());
        }
        if targets.is_empty() {
            return;
        }

        let mut failed = Vec::new();
        for file in &targets {
            if let Err(e) = self.services.storage.delete_file(&file.path) {
                warn!(path = %file.path.display(), error = %e, "Could not delete file");
                failed.push(format!("{}: {e}", file.name));
            }
        }

        let deleted = targets.len() - failed.len();
        self.notice = Some(if failed.is_empty() {
            format!("Deleted {deleted} file(s)")
        } else {
            format!(
                "Deleted {deleted} file(s), {} failed: {}",
                failed.len(),
                failed.join("; ")
            )
        });
        self.refresh_file_list();
    }
}

async fn run_search(
    services: Services,
    tx: TaskSender,
    niche: Niche,
    request: SearchRequest,
    cursor: Option<Cursor>,
    cancel: CancellationToken,
    resumed: bool,
) {
    let finder = match services.finder() {
        Ok(finder) => finder,
        Err(e) => {
            let _ = tx.send(TaskMessage::Failed(e.to_string()));
            return;
        }
    };

    let result = finder
        .find_streaming(request.clone(), cursor, cancel.clone(), |event| {
            let _ = tx.send(TaskMessage::Search(event.clone()));
        })
        .await;

    let message = match result {
        Ok(outcome) => TaskMessage::Completed(Box::new(Completed {
            niche,
            request,
            outcome,
            cancelled: cancel.is_cancelled(),
            resumed,
        })),
        Err(e) => TaskMessage::Failed(e.to_string()),
    };
    let _ = tx.send(message);
}

/// Empty input means "not set".
fn parse_field<T: FromStr>(field: &InputField) -> std::result::Result<Option<T>, String> {
    let value = field.value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse()
        .map(Some)
        .map_err(|_| format!("{} must be a number", field.label))
}

fn describe_video(candidate: &CompetitorVideo) -> String {
    let video = &candidate.video;
    let mut out = format!("# {}\n\n{}\n\n", video.title, video.url());
    let _ = writeln!(out, "| Channel | {} |", video.channel_title);
    let _ = writeln!(out, "| Published | {} |", video.published_at.format("%Y-%m-%d"));
    let _ = writeln!(out, "| Views | {} |", video.view_count);
    let _ = writeln!(out, "| Views per day | {:.1} |", candidate.views_per_day);
    let _ = writeln!(out, "| Likes | {} |", video.like_count);
    let _ = writeln!(out, "| Comments | {} |", video.comment_count);
    let _ = writeln!(
        out,
        "| Duration | {}:{:02} |",
        video.duration_secs / 60,
        video.duration_secs % 60
    );
    let _ = writeln!(out, "| Matched term | {} |", candidate.matched_term);

    if !video.tags.is_empty() {
        let _ = write!(out, "\n## Tags\n\n{}\n", video.tags.join(", "));
    }
    if !video.description.is_empty() {
        let _ = write!(out, "\n## Description\n\n{}\n", video.description);
    }
    out
}
