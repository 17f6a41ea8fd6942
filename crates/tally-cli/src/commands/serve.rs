//! Server command implementation

use std::path::Path;

use anyhow::Result;

use super::{load_config, open_db};

pub async fn cmd_serve(
    db_path: &Path,
    config_path: Option<&Path>,
    host: &str,
    port: u16,
    no_auth: bool,
    no_encrypt: bool,
) -> Result<()> {
    println!("🚀 Starting Tally web server...");
    println!("   Database: {}", db_path.display());
    println!("   Listening: http://{}:{}", host, port);

    // Parse API keys from environment (comma-separated)
    let api_keys: Vec<String> = std::env::var("TALLY_API_KEYS")
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    // Allowed CORS origins (comma-separated)
    let allowed_origins: Vec<String> = std::env::var("TALLY_ALLOWED_ORIGINS")
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if no_auth {
        println!();
        println!("   ⚠️  Authentication DISABLED - do not expose to network!");
    } else {
        println!("   🔒 Authentication: Cloudflare Access (header only)");
        if !api_keys.is_empty() {
            println!(
                "   🔑 API keys: {} configured (TALLY_API_KEYS)",
                api_keys.len()
            );
        }
    }
    if no_encrypt {
        println!("   ⚠️  Encryption DISABLED (--no-encrypt)");
    }

    let import_config = load_config(config_path)?;
    if !import_config.duplicate_check_enabled {
        println!("   ⚠️  Duplicate submission check DISABLED");
    }
    println!();
    println!("   Press Ctrl+C to stop");

    let db = open_db(db_path, no_encrypt)?;

    let config = tally_server::ServerConfig {
        require_auth: !no_auth,
        allowed_origins,
        api_keys,
    };

    tally_server::serve_with_config(db, host, port, config, import_config).await?;

    Ok(())
}
