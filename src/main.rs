mod cli;
mod config;
mod core;
mod error;
mod logging;
mod tui;

use crate::cli::{CacheAction, Cli, Commands, NicheInput};
use crate::config::Config;
use crate::core::{
    CompetitorVideo, Cursor, FileType, Niche, SavedSearch, SearchEvent, SearchOutcome,
    SearchRequest, Services,
};
use crate::error::{Error, Result};
use crate::tui::{App, EventHandler, init as tui_init, restore as tui_restore, ui};
use clap::Parser;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        None | Some(Commands::Tui) => {
            logging::init_file(&config.storage.dir, cli.verbose)?;
            run_tui(Services::new(config, true)).await
        }
        Some(command) => {
            logging::init_stderr(cli.verbose)?;
            run_command(command, config).await
        }
    }
}

async fn run_command(command: Commands, config: Config) -> Result<()> {
    match command {
        Commands::Niche { input } => {
            let services = Services::new(config, false);
            let niche = resolve_niche(&services, &input).await?;
            print_niche(&niche);
        }
        Commands::Search {
            input,
            max_age_days,
            min_views_per_day,
            min_views,
            duration,
            target,
            cursor,
            no_cache,
            save,
        } => {
            let services = Services::new(config, !no_cache);
            let niche = resolve_niche(&services, &input).await?;
            print_niche(&niche);

            let mut request = services.request_for(&niche);
            if let Some(days) = max_age_days {
                // 0 lifts the age limit
                request.filters.max_age_days = (days > 0).then_some(days);
            }
            if let Some(vpd) = min_views_per_day {
                request.filters.min_views_per_day = vpd;
            }
            if let Some(views) = min_views {
                request.filters.min_views = views;
            }
            if let Some(target) = target {
                request.target = target;
            }
            request.filters.duration = duration;

            let cursor = cursor.as_deref().map(Cursor::decode).transpose()?;
            let outcome = stream_search(&services, request.clone(), cursor).await?;

            if save {
                let saved = SavedSearch::new(niche, request, outcome);
                let path = services.storage.save_search(&saved).await?;
                println!("Saved as {} ({})", saved.id, path.display());
            }
        }
        Commands::More { search_id } => {
            let services = Services::new(config, true);
            let mut saved = services.storage.load_search(&search_id).await?;
            let Some(cursor) = saved.next_cursor.clone() else {
                println!("Search {} has no more results.", saved.id);
                return Ok(());
            };

            println!("Loading more for: {}", saved.niche.label);
            let outcome = stream_search(&services, saved.request.clone(), Some(cursor)).await?;
            let added = saved.extend(outcome);
            services.storage.save_search(&saved).await?;
            println!("Added {added} videos ({} total).", saved.videos.len());
        }
        Commands::Keywords { seed, limit } => {
            let services = Services::new(config, false);
            let keywords = services.keywords(&seed, limit).await?;
            if keywords.is_empty() {
                println!("No keyword suggestions for \"{seed}\".");
                return Ok(());
            }

            println!("{:<45} {:>10} {:>11} {:>12}", "Keyword", "Volume", "Competition", "Opportunity");
            for k in keywords {
                println!(
                    "{:<45} {:>10} {:>11.2} {:>12.0}",
                    k.keyword,
                    k.search_volume,
                    k.competition,
                    k.opportunity()
                );
            }
        }
        Commands::Ideas { seed, count } => {
            let services = Services::new(config, true);
            println!("Generating {count} ideas for \"{seed}\"...");
            let report = services.idea_report(&seed, count).await?;
            println!(
                "Niche: {} ({} keyword metrics)",
                report.niche.label,
                report.keywords.len()
            );
            for (i, idea) in report.ideas.iter().enumerate() {
                match &idea.keyword {
                    Some(keyword) => println!("{:>2}. {}  [{keyword}]", i + 1, idea.title),
                    None => println!("{:>2}. {}", i + 1, idea.title),
                }
            }
            println!("Report saved to: {}", report.path.display());
        }
        Commands::List => {
            run_cli_list(&Services::new(config, false))?;
        }
        Commands::Cache {
            action: CacheAction::Clear,
        } => {
            let removed = Services::new(config, true).clear_cache().await?;
            println!("Removed {removed} cached searches.");
        }
        Commands::Tui => {
            run_tui(Services::new(config, true)).await?;
        }
    }

    Ok(())
}

async fn resolve_niche(services: &Services, input: &NicheInput) -> Result<Niche> {
    match (&input.video, &input.text) {
        (Some(video), _) => services.niche_for_video(video).await,
        (None, Some(text)) => services.niche_for(text).await,
        (None, None) => Err(Error::custom("Provide a niche description or --video")),
    }
}

fn print_niche(niche: &Niche) {
    println!("Niche: {}", niche.label);
    println!("Terms: {}", niche.terms.join(" | "));
    if !niche.keywords.is_empty() {
        println!("Keywords: {}", niche.keywords.join(", "));
    }
}

/// Runs one search call, printing matches as they arrive; Ctrl-C stops it early.
async fn stream_search(
    services: &Services,
    request: SearchRequest,
    cursor: Option<Cursor>,
) -> Result<SearchOutcome> {
    let finder = services.finder()?;
    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let mut printed = 0;
    let result = finder
        .find_streaming(request, cursor, cancel.clone(), |event| match event {
            SearchEvent::Started { terms } => {
                println!("Searching {} terms...", terms.len());
            }
            SearchEvent::Page {
                term,
                page,
                candidates,
                fresh,
            } => {
                println!("  page {page} \"{term}\": {fresh} new of {candidates}");
            }
            SearchEvent::Match(video) => {
                printed += 1;
                println!("{}", format_match(video));
            }
            SearchEvent::Finished(_) | SearchEvent::Cancelled { .. } => {}
        })
        .await;
    watcher.abort();
    let outcome = result?;

    if printed == 0 && !outcome.videos.is_empty() {
        println!("(cached)");
        for video in &outcome.videos {
            println!("{}", format_match(video));
        }
    }

    if cancel.is_cancelled() {
        println!("Cancelled.");
    }
    println!(
        "{} matches, {} videos scanned over {} pages.",
        outcome.videos.len(),
        outcome.scanned,
        outcome.pages
    );
    match &outcome.next_cursor {
        Some(next) => println!("Next cursor: {}", next.encode()?),
        None => println!("No more results."),
    }

    Ok(outcome)
}

fn format_match(candidate: &CompetitorVideo) -> String {
    let video = &candidate.video;
    format!(
        "{:>10.0}/day {:>12} views {:>5.0}d  {}  [{}]  {}",
        candidate.views_per_day,
        video.view_count,
        candidate.age_days,
        video.title,
        video.channel_title,
        video.url()
    )
}

fn run_cli_list(services: &Services) -> Result<()> {
    let files = services.storage.list_files()?;

    if files.is_empty() {
        println!("No files found.");
        return Ok(());
    }

    println!("Found {} files:", files.len());
    println!();

    for file in files {
        let file_type = match file.file_type {
            FileType::Search => "Search",
            FileType::Ideas => "Ideas",
        };

        let size_kb = file.size / 1024;
        let size_str = if size_kb < 1024 {
            format!("{size_kb}KB")
        } else {
            format!("{:.1}MB", size_kb as f64 / 1024.0)
        };

        println!("{:<8} {:<50} {}", file_type, file.name, size_str);
    }

    Ok(())
}

async fn run_tui(services: Services) -> Result<()> {
    let mut terminal = tui_init()?;

    let mut app = App::new(services);
    let event_handler = EventHandler::new();

    let result = loop {
        let event = match event_handler.next_event() {
            Ok(event) => event,
            Err(e) => break Err(e),
        };
        if let Err(e) = app.handle_event(event) {
            break Err(e);
        }

        if let Err(e) = terminal.draw(|f| ui::draw(f, &mut app)) {
            break Err(Error::from(e));
        }

        if app.should_quit {
            break Ok(());
        }
    };

    app.cancel_search();
    tui_restore()?;
    result
}
