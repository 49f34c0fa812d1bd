use async_trait::async_trait;
use shorts_core::{ContentGenerator, MemoryStore, Result, Settings, ShortsWorkspace};

/// Stands in for the model; always tells the same two facts.
struct CannedGenerator;

#[async_trait]
impl ContentGenerator for CannedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        println!("   prompt: {}", prompt.lines().next().unwrap_or_default());
        Ok("TITLE: In Up (2009), the house needed 10,297 balloons\n\
            Narration: Pixar animators counted every one.\n\
            TITLE: In Jaws (1975), the mechanical shark was nicknamed Bruce\n"
            .to_string())
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let settings = Settings::load(None)?;
    println!(
        "Workspace with a {}s TTL and {} titles per page",
        settings.ttl_seconds, settings.page_size
    );
    let workspace = ShortsWorkspace::new(settings, MemoryStore::new())?;

    workspace
        .channels()
        .create("MovieFacts", "Write a 30 second short about a surprising movie fact.")
        .await?;

    println!("\n1. Bulk add with an internal repeat");
    let outcome = workspace
        .titles()
        .bulk_add("MovieFacts", ["Inception", "Inception", "Up"])
        .await?;
    println!("   added {:?}, skipped {}", outcome.added, outcome.duplicate_count());

    println!("\n2. Reads inside the TTL come from the cache");
    for _ in 0..3 {
        workspace.titles().contains("MovieFacts", "up").await?;
    }
    let stats = workspace.cache_stats();
    println!("   hits {}, misses {}", stats.hits, stats.misses);

    println!("\n3. Generate twice; the second run repeats both facts");
    let generator = CannedGenerator;
    for run in 1..=2 {
        let session = workspace
            .generate_script("MovieFacts", None, Some("demo"), &generator)
            .await?;
        println!(
            "   run {}: session {}, {} new, {} repeated",
            run,
            session.session_id,
            session.outcome.added_count(),
            session.outcome.duplicate_count()
        );
    }

    println!("\n4. First page");
    let page = workspace.page("MovieFacts", 0).await?;
    for title in &page.items {
        println!("   - {}", title);
    }
    println!("   {} titles on {} page(s)", page.total_count, page.total_pages);

    let stats = workspace.cache_stats();
    println!(
        "\nCache: {} entries ({} valid, {} expired)",
        stats.total_entries, stats.valid_entries, stats.expired_entries
    );
    Ok(())
}
