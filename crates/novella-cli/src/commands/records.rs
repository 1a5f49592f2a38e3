use novella_records::JsonlRecordStore;
use std::path::Path;

pub async fn run(user: &str, limit: usize, records_dir: Option<&Path>) -> anyhow::Result<()> {
    let store = match records_dir {
        Some(dir) => JsonlRecordStore::with_dir(dir),
        None => JsonlRecordStore::new(),
    };
    let records = store
        .list_recent(user, limit)
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    if records.is_empty() {
        println!("No records found.");
    } else {
        for r in &records {
            println!(
                "{} | {} | {}/{} | {} tokens | {} credits",
                r.id,
                r.novel_id,
                r.provider,
                r.model,
                r.usage.total_tokens,
                r.credits
            );
        }
    }

    Ok(())
}
