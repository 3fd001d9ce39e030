use refugee_aid_core::config::AppConfig;
use refugee_aid_core::offline::{open_store, render_offline_page, EmergencyInfoStore, CACHE_NAME, OFFLINE_URL};

/// Prints the offline fallback page as it would be served right now
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = env_logger::try_init();
    let config = AppConfig::from_env();

    eprintln!("Offline page ({} in {})", OFFLINE_URL, CACHE_NAME);
    eprintln!("Local store: {}", config.offline_db_url);

    let pool = open_store(&config.offline_db_url).await?;
    let info = EmergencyInfoStore::new(pool).load_or_default().await;
    println!("{}", render_offline_page(&info));

    Ok(())
}
