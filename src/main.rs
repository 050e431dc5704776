use std::io::{self, BufRead, Write};

use dotenv::dotenv;
use log::{LevelFilter, info};
use pasco_scraper::{
    ChromeDriver, DownloadOrchestrator, FileTag, PastQuestionRecord, PortalConfig, PortalMarkup,
    Selection, SessionManager, WaitPolicy, format_for_display, normalize_query, resolve_selection,
    SearchEngine,
};

extern crate env_logger;
extern crate log;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .init();

    let config = PortalConfig::new()?;
    let raw_query = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("usage: pasco-scraper \"<course name> <code>\""))?;
    let Some(query) = normalize_query(&raw_query) else {
        anyhow::bail!(
            "a course is a 4-letter name plus a 3-digit code, e.g. \"dcit 103\", got {raw_query:?}"
        );
    };

    // One directory per flow. Isolation is what keeps the newest-file
    // completion heuristic honest.
    let tag = FileTag::new("cli");
    let download_dir = config
        .download_root
        .join(format!("{}-{}", tag.user_id, tag.suffix));
    std::fs::create_dir_all(&download_dir)?;

    let markup = PortalMarkup::default();
    let waits = WaitPolicy::default();

    let driver = ChromeDriver::launch(&download_dir).await?;
    let manager = SessionManager::new(config.login_url.clone(), markup.clone(), waits.clone());
    let mut session = manager
        .open(Box::new(driver), &config.credentials(), &download_dir)
        .await?;

    let engine = SearchEngine::new(config.origin.clone(), markup.clone())?;
    engine.search(&mut session, &query).await?;
    let records = engine.scrape_results(&session).await?;
    if records.is_empty() {
        println!("No past questions found for {query}.");
        session.close().await?;
        return Ok(());
    }

    println!("{}", format_for_display(&records));
    println!();
    let selected = prompt_selection(&records)?;

    let orchestrator = DownloadOrchestrator::new(markup, waits);
    let outcomes = orchestrator.download_all(&mut session, &selected, &tag).await;

    let mut downloaded = 0;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(path) => {
                downloaded += 1;
                println!("{} -> {}", outcome.record.title, path.display());
            }
            Err(e) => println!("{} failed: {e}", outcome.record.title),
        }
    }
    info!("{downloaded}/{} downloads completed", outcomes.len());
    println!("{downloaded}/{} downloads completed", outcomes.len());

    session.close().await?;
    Ok(())
}

/// Keep asking until the reply maps onto the listing; selection mistakes
/// are recoverable, unlike anything session-level.
fn prompt_selection(records: &[PastQuestionRecord]) -> anyhow::Result<Vec<&PastQuestionRecord>> {
    let stdin = io::stdin();
    loop {
        print!("Number to download (or \"all\"): ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            anyhow::bail!("no selection provided");
        }
        let selection = match line.parse::<Selection>() {
            Ok(selection) => selection,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };
        match resolve_selection(records, selection) {
            Ok(selected) => return Ok(selected),
            Err(e) => println!("{e}"),
        }
    }
}
