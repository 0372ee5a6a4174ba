//! `serialagent health` — a fast, local liveness check.
//!
//! Unlike `doctor` (which probes the LLM proxy over the network and reports
//! every configuration issue), `health` answers one question quickly: is an
//! instance running, and can it see its own durable stores? This mirrors
//! `cli/pid.rs`'s stale-PID-detection idiom rather than calling out over HTTP,
//! since the core has no HTTP surface (see DESIGN.md open question 1).

use sa_domain::config::Config;

use super::pid;

/// Print a one-line-per-check health summary. Returns `Ok(true)` if the
/// process is alive and both stores are reachable.
pub fn run(config: &Config, config_path: &str) -> anyhow::Result<bool> {
    println!("serialagent health");
    println!("===================\n");

    let pid_path = super::resolve_daemon_path(config_path, &config.daemon.pid_file);
    let running = pid::probe(&pid_path);
    match running {
        Some(pid) => println!("  [PASS] process: running (PID {pid})"),
        None => println!("  [WARN] process: not running"),
    }

    let sessions_ok = sa_sessions::SessionStore::open(std::path::Path::new(&config.sessions.db_path)).is_ok();
    print_check("session store", sessions_ok, &config.sessions.db_path);

    let cron_ok = crate::scheduler::CronStore::open(&config.sessions.cron_db_path).is_ok();
    print_check("cron store", cron_ok, &config.sessions.cron_db_path);

    Ok(sessions_ok && cron_ok)
}

fn print_check(name: &str, ok: bool, detail: &str) {
    let status = if ok { "PASS" } else { "FAIL" };
    println!("  [{status}] {name}: {detail}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::config::Config;

    #[test]
    fn reports_healthy_when_stores_open() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.sessions.db_path = dir.path().join("sessions.db").to_string_lossy().into_owned();
        config.sessions.cron_db_path = dir.path().join("cron.db").to_string_lossy().into_owned();

        let config_path = dir.path().join("config.toml");
        let ok = run(&config, &config_path.to_string_lossy()).unwrap();
        assert!(ok);
    }
}
