//! `scholaris-probe`: checks the configured directory and session file.
//!
//! Lists the schools the directory reports and shows the persisted school
//! selection, if any. Useful when wiring a new deployment.

use anyhow::{Context, Result};
use tracing::info;

use scholaris_infra::directory::HttpDirectory;
use scholaris_infra::session_store::JsonFileSessionStore;
use scholaris_infra::{IdentityDirectory, ScholarisConfig, SessionStore};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ScholarisConfig::from_env().context("failed to load configuration")?;
    scholaris_observability::init(&config.log);

    info!(
        api_url = %config.api_url,
        timeout = ?config.directory_timeout,
        session_file = %config.session_file.display(),
        "probing directory"
    );

    let directory = HttpDirectory::from_config(&config);
    let schools = directory
        .schools()
        .await
        .with_context(|| format!("directory at {} is unreachable", config.api_url))?;
    info!(count = schools.len(), "schools listed");
    for school in &schools {
        println!("{}\t{}\t{}", school.id, school.code, school.name);
    }

    let store = JsonFileSessionStore::new(config.session_file.clone());
    match store.load().context("failed to read session file")? {
        Some(record) => {
            let school = record
                .selected_school
                .map(|s| format!("{} ({})", s.name, s.code))
                .unwrap_or_else(|| "global scope".to_string());
            println!("persisted selection for {}: {}", record.identity_id, school);
        }
        None => println!("no persisted selection"),
    }

    Ok(())
}
