use crate::core::DurationFilter;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "channelboost")]
#[command(about = "Find fast-growing competitor videos and keyword opportunities for a YouTube niche")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config file (defaults to ./channelboost.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Niche description or reference video; exactly one is required.
#[derive(Args, Clone)]
#[group(required = true, multiple = false)]
pub struct NicheInput {
    /// Free-text description of the niche
    pub text: Option<String>,

    /// Reference video URL or ID
    #[arg(long)]
    pub video: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the search terms inferred for a niche
    Niche {
        #[command(flatten)]
        input: NicheInput,
    },

    /// Search YouTube for competitor videos in a niche
    Search {
        #[command(flatten)]
        input: NicheInput,

        /// Only videos published within this many days
        #[arg(long)]
        max_age_days: Option<u32>,

        /// Minimum views per day since publish
        #[arg(long = "min-vpd")]
        min_views_per_day: Option<f64>,

        /// Minimum total views
        #[arg(long)]
        min_views: Option<u64>,

        /// Video length: any, shorts, short, medium, long
        #[arg(long, default_value_t = DurationFilter::Any)]
        duration: DurationFilter,

        /// Matches to collect before stopping
        #[arg(long)]
        target: Option<usize>,

        /// Resume from a cursor printed by an earlier search
        #[arg(long)]
        cursor: Option<String>,

        /// Bypass the result cache
        #[arg(long)]
        no_cache: bool,

        /// Save the results so `more` can extend them
        #[arg(short, long)]
        save: bool,
    },

    /// Load the next page of results for a saved search
    More {
        /// Saved search id
        search_id: String,
    },

    /// Keyword suggestions ranked by opportunity
    Keywords {
        seed: String,

        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Generate video ideas for a niche (requires CHANNELBOOST_ALLOW_OPENAI=1)
    Ideas {
        seed: String,

        #[arg(short, long, default_value_t = 10)]
        count: usize,
    },

    /// List saved searches and idea reports
    List,

    /// Manage the search cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Open TUI interface
    Tui,
}

#[derive(Subcommand)]
pub enum CacheAction {
    /// Remove every cached search
    Clear,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn search_takes_text_or_video() {
        let cli = Cli::try_parse_from([
            "channelboost",
            "search",
            "home espresso",
            "--duration",
            "medium",
            "--min-vpd",
            "50",
        ])
        .expect("parses");
        match cli.command {
            Some(Commands::Search {
                input,
                duration,
                min_views_per_day,
                ..
            }) => {
                assert_eq!(input.text.as_deref(), Some("home espresso"));
                assert!(input.video.is_none());
                assert_eq!(duration, DurationFilter::Medium);
                assert_eq!(min_views_per_day, Some(50.0));
            }
            _ => panic!("expected search"),
        }

        assert!(
            Cli::try_parse_from(["channelboost", "search", "x", "--video", "dQw4w9WgXcQ"]).is_err()
        );
        assert!(Cli::try_parse_from(["channelboost", "search"]).is_err());
    }

    #[test]
    fn no_command_means_tui() {
        let cli = Cli::try_parse_from(["channelboost", "--verbose"]).expect("parses");
        assert!(cli.command.is_none());
        assert!(cli.verbose);
    }
}
