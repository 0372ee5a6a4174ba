//! `serialagent sessions` — inspect and manage durable conversation state
//! (spec §3 `SessionStore`).

use sa_sessions::SessionStore;

/// List every known session with its message count and last-updated time.
pub fn list(store: &SessionStore) -> anyhow::Result<()> {
    let summaries = store.list()?;
    if summaries.is_empty() {
        println!("No sessions.");
        return Ok(());
    }

    println!("{:<40} {:>8}  {:<25} {:<25}", "LOCATION", "MSGS", "CREATED", "UPDATED");
    for s in summaries {
        println!(
            "{:<40} {:>8}  {:<25} {:<25}",
            s.location,
            s.message_count,
            s.created_at.to_rfc3339(),
            s.updated_at.to_rfc3339(),
        );
    }
    Ok(())
}

/// Print every non-compacted message for a location, in order.
pub fn view(store: &SessionStore, location: &str, include_compacted: bool) -> anyhow::Result<()> {
    if !store.exists(location)? {
        anyhow::bail!("no session for location '{location}'");
    }
    let messages = store.messages(location, include_compacted)?;
    for m in &messages {
        let role = m.message.role.as_str();
        let text = m.message.text();
        let marker = if m.compacted { " [compacted]" } else { "" };
        println!("[{}] {role}{marker}: {text}", m.id);
    }
    println!("\n{} message(s)", messages.len());
    Ok(())
}

/// Compact (clear) a session's active history without deleting the record.
pub fn clear(store: &SessionStore, location: &str) -> anyhow::Result<()> {
    if !store.exists(location)? {
        anyhow::bail!("no session for location '{location}'");
    }
    let n = store.clear(location)?;
    println!("Cleared {n} message(s) from session '{location}'.");
    Ok(())
}

/// Delete a session and all its messages outright.
pub fn delete(store: &SessionStore, location: &str) -> anyhow::Result<()> {
    if store.delete(location)? {
        println!("Deleted session '{location}'.");
    } else {
        println!("No session found for '{location}'.");
    }
    Ok(())
}
