use anyhow::Result;
use std::path::Path;
use terabox_relay::resolver::ResolverClient;
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::test]
#[ignore = "Requires network access and a live share link in TEST_SHARE_URL"]
async fn test_live_resolve() -> Result<()> {
    load_dotenv();
    init_tracing();

    let share_url = std::env::var("TEST_SHARE_URL")
        .map_err(|_| anyhow::anyhow!("TEST_SHARE_URL is not set"))?;
    let api_base = std::env::var("RESOLVER_API_BASE")
        .unwrap_or_else(|_| "https://teraboxapi.alphaapi.workers.dev/".to_string());

    info!("Resolving live share link through {}", api_base);
    let client = ResolverClient::new(&api_base);
    let files = client.resolve(&share_url).await?;

    assert!(!files.is_empty());
    for file in &files {
        info!(
            "resolved: {} ({} bytes, dir: {})",
            file.file_name, file.size, file.is_dir
        );
        assert!(!file.download_link.is_empty());
    }
    Ok(())
}

fn load_dotenv() {
    let env_path = Path::new("../.env");
    if env_path.exists() {
        let _ = dotenvy::from_path(env_path);
    } else {
        let _ = dotenvy::dotenv();
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
