//! `crm status` — Show system status.

use crm_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    println!("🦀 Crm Status");
    println!("==================");
    println!("  Config dir:   {}", AppConfig::config_dir().display());
    println!("  Workspace:    {}", AppConfig::workspace_dir().display());
    println!("  Provider:     {}", config.default_provider);
    println!("  Model:        {}", config.default_model);
    println!("  Temperature:  {}", config.default_temperature);
    println!("  Memory:       {}", config.memory.backend);
    println!("  Autonomy:     {}", config.autonomy.level);
    println!("  Runtime:      {}", config.runtime.kind);
    println!("  RAG chunking: {} tokens, {} overlap", config.rag.chunk_size, config.rag.chunk_overlap);
    println!("  Tool timeout: {}s", config.tool_timeout_secs);
    println!("  Secrets:      {}", if config.secrets.encrypt { "encrypted" } else { "plaintext" });

    // Check config file existence
    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("\n  ✅ Config file found");
    } else {
        println!("\n  ⚠️  No config file — run `crm onboard` first");
    }

    Ok(())
}
