use anyhow::Result;
use chat_core::load_config;
use chat_core::tracing::init_tracing_from_config;
use chat_storage_writer::ApplicationBootstrap;

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let app_config = load_config(Some("config"));
    init_tracing_from_config(Some(&app_config.logging));

    // 创建应用上下文并启动消费者
    ApplicationBootstrap::run(app_config).await
}
