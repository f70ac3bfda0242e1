use thesis_examer::{config::api_key_var, BackendId, Config};

fn main() -> anyhow::Result<()> {
    println!("Thesis Examer Configuration Example");
    println!("===================================");

    match Config::default_config_path() {
        Ok(path) => println!("📍 Default config location: {}", path.display()),
        Err(e) => println!("❌ Error getting config path: {}", e),
    }

    println!("\n🔧 Loading configuration...");
    let config = Config::load()?;
    let params = config.segmentation_params();
    let policy = config.retry_policy();

    println!("✅ Configuration loaded successfully!");
    println!(
        "🧩 Mode: {} ({})",
        config.segmentation.mode,
        config.segmentation.mode.description()
    );
    println!("📑 Levels: {:?}, minimum {} words", params.allowed_levels, params.min_words);
    println!(
        "🔁 Retries: {} attempts, {:?} backoff, {:?} timeout, fallback {}",
        policy.max_attempts,
        policy.backoff,
        policy.timeout,
        if policy.fallback_enabled { "on" } else { "off" }
    );

    for id in BackendId::ALL {
        let provider = config.llm.provider(id);
        let key = if provider.api_key.is_some() {
            "[CONFIGURED]".to_string()
        } else {
            format!("[NOT SET - export {}]", api_key_var(id))
        };
        println!("🤖 {}: {} {}", id, provider.model, key);
    }

    match &config.tasks {
        Some(tasks) => {
            println!("📋 Task routing:");
            for (task, backend) in tasks.iter() {
                println!("   - {}: {}", task, backend);
            }
        }
        None => println!("📋 Task routing: derived from available backends"),
    }

    Ok(())
}
