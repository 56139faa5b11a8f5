use crate::core::competitors::{CompetitorVideo, SearchOutcome, SearchRequest, sort_by_velocity};
use crate::core::cursor::Cursor;
use crate::core::niche::Niche;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs as std_fs;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

const SEARCHES_DIR: &str = "searches";
const IDEAS_DIR: &str = "ideas";
const SEARCH_PREFIX: &str = "search_";
const SEARCH_SUFFIX: &str = ".json";
const IDEAS_PREFIX: &str = "ideas_";
const IDEAS_SUFFIX: &str = ".md";
const MAX_SLUG_LEN: usize = 48;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: PathBuf,
    pub name: String,
    pub file_type: FileType,
    pub size: u64,
    pub modified: std::time::SystemTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FileType {
    Search,
    Ideas,
}

/// A competitor search persisted so it can be reopened and extended later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedSearch {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub niche: Niche,
    pub request: SearchRequest,
    pub videos: Vec<CompetitorVideo>,
    pub next_cursor: Option<Cursor>,
}

impl SavedSearch {
    pub fn new(niche: Niche, request: SearchRequest, outcome: SearchOutcome) -> Self {
        let created_at = Utc::now();
        Self {
            // Nanoseconds keep two saves of the same niche apart
            id: format!("{}-{}", created_at.format("%Y%m%d-%H%M%S-%9f"), slugify(&niche.label)),
            created_at,
            niche,
            request,
            videos: outcome.videos,
            next_cursor: outcome.next_cursor,
        }
    }

    /// Folds a follow-up page of results in, skipping videos already held.
    pub fn extend(&mut self, outcome: SearchOutcome) -> usize {
        let known: HashSet<String> = self.videos.iter().map(|v| v.video.id.clone()).collect();
        let before = self.videos.len();
        self.videos.extend(
            outcome
                .videos
                .into_iter()
                .filter(|v| !known.contains(&v.video.id)),
        );
        sort_by_velocity(&mut self.videos);
        self.next_cursor = outcome.next_cursor;
        self.videos.len() - before
    }
}

#[derive(Debug, Clone)]
pub struct StorageService {
    root: PathBuf,
}

impl StorageService {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn searches_dir(&self) -> PathBuf {
        self.root.join(SEARCHES_DIR)
    }

    fn ideas_dir(&self) -> PathBuf {
        self.root.join(IDEAS_DIR)
    }

    fn ensure_directories(&self) -> Result<()> {
        ensure_directory(&self.searches_dir())?;
        ensure_directory(&self.ideas_dir())?;
        Ok(())
    }

    fn search_path(&self, id: &str) -> Result<PathBuf> {
        let id = sanitize_id(id)?;
        Ok(self
            .searches_dir()
            .join(format!("{SEARCH_PREFIX}{id}{SEARCH_SUFFIX}")))
    }

    fn ideas_path(&self, slug: &str) -> Result<PathBuf> {
        let slug = slugify(slug);
        if slug.is_empty() {
            return Err(Error::custom("Idea report name cannot be empty"));
        }
        Ok(self
            .ideas_dir()
            .join(format!("{IDEAS_PREFIX}{slug}{IDEAS_SUFFIX}")))
    }

    pub async fn save_search(&self, search: &SavedSearch) -> Result<PathBuf> {
        self.ensure_directories()?;
        let path = self.search_path(&search.id)?;
        let content = serde_json::to_string_pretty(search)?;
        fs::write(&path, content).await?;
        info!(path = %path.display(), videos = search.videos.len(), "Saved search");
        Ok(path)
    }

    pub async fn load_search(&self, id: &str) -> Result<SavedSearch> {
        let path = self.search_path(id)?;
        let content = fs::read_to_string(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::custom(format!("No saved search with id '{id}'"))
            } else {
                Error::from(e)
            }
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    pub async fn save_ideas(&self, slug: &str, content: &str) -> Result<PathBuf> {
        self.ensure_directories()?;
        let path = self.ideas_path(slug)?;
        fs::write(&path, content).await?;
        info!(path = %path.display(), "Saved idea report");
        Ok(path)
    }

    pub fn read_file(&self, path: &Path) -> Result<String> {
        self.ensure_managed_path(path)?;
        Ok(std_fs::read_to_string(path)?)
    }

    pub fn list_files(&self) -> Result<Vec<FileEntry>> {
        self.ensure_directories()?;
        let mut files = Vec::new();
        collect_files(
            &self.searches_dir(),
            (SEARCH_PREFIX, SEARCH_SUFFIX),
            FileType::Search,
            &mut files,
        )?;
        collect_files(
            &self.ideas_dir(),
            (IDEAS_PREFIX, IDEAS_SUFFIX),
            FileType::Ideas,
            &mut files,
        )?;

        // Newest first
        files.sort_by(|a, b| b.modified.cmp(&a.modified));
        debug!(count = files.len(), "Listed saved files");
        Ok(files)
    }

    pub fn delete_file(&self, path: &Path) -> Result<()> {
        self.ensure_directories()?;
        self.ensure_managed_path(path)?;
        std_fs::remove_file(path)?;
        info!(path = %path.display(), "Deleted file");
        Ok(())
    }

    fn ensure_managed_path(&self, path: &Path) -> Result<()> {
        let canonical = path
            .canonicalize()
            .map_err(|_| Error::custom("Target file does not exist or cannot be resolved"))?;

        let allowed = [self.searches_dir(), self.ideas_dir()]
            .iter()
            .filter_map(|dir| dir.canonicalize().ok())
            .any(|base| canonical.starts_with(base));

        if !allowed {
            return Err(Error::custom(
                "Refusing to operate on files outside managed search/idea directories",
            ));
        }

        Ok(())
    }
}

impl FileEntry {
    /// Identifier embedded in the file name: the search id or the idea slug.
    pub fn id(&self) -> Option<&str> {
        let (prefix, suffix) = match self.file_type {
            FileType::Search => (SEARCH_PREFIX, SEARCH_SUFFIX),
            FileType::Ideas => (IDEAS_PREFIX, IDEAS_SUFFIX),
        };
        self.name.strip_prefix(prefix)?.strip_suffix(suffix)
    }
}

fn collect_files(
    dir: &Path,
    (prefix, suffix): (&str, &str),
    file_type: FileType,
    files: &mut Vec<FileEntry>,
) -> Result<()> {
    let Ok(entries) = std_fs::read_dir(dir) else {
        return Ok(());
    };

    for entry in entries {
        let entry = entry?;
        let path = entry.path();

        if let Some(name) = path.file_name().and_then(|n| n.to_str())
            && name.starts_with(prefix)
            && name.ends_with(suffix)
        {
            let metadata = entry.metadata()?;
            files.push(FileEntry {
                name: name.to_string(),
                path: path.clone(),
                file_type,
                size: metadata.len(),
                modified: metadata.modified()?,
            });
        }
    }
    Ok(())
}

/// Lowercase ASCII words joined by single dashes.
pub fn slugify(text: &str) -> String {
    let mut slug = String::new();
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }

    let mut slug = slug.trim_end_matches('-').to_string();
    if slug.len() > MAX_SLUG_LEN {
        slug.truncate(MAX_SLUG_LEN);
        slug = slug.trim_end_matches('-').to_string();
    }
    slug
}

fn sanitize_id(raw: &str) -> Result<String> {
    let id = raw.trim();
    if id.is_empty()
        || !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(Error::custom(format!("Invalid saved search id '{raw}'")));
    }
    Ok(id.to_string())
}

fn ensure_directory(path: &Path) -> Result<()> {
    std_fs::create_dir_all(path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let metadata = std_fs::metadata(path)?;
        let mut permissions = metadata.permissions();
        if permissions.mode() & 0o777 != 0o700 {
            permissions.set_mode(0o700);
            std_fs::set_permissions(path, permissions)?;
        }
    }

    Ok(())
}
