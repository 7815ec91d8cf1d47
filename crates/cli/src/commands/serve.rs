//! `docsmith serve` — Start the HTTP API server.

use docsmith_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("📚 docsmith gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Provider:  {}", config.provider.kind);
    println!("   Stages:    {}", config.pipeline.models().join(" → "));
    println!("   Chat:      {}", config.pipeline.chat_model);

    docsmith_gateway::start(config).await?;

    Ok(())
}
