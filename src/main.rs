use jewel_quote::{bootstrap, router, AppConfig};
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志 - 使用本地时间格式, 级别由 RUST_LOG 控制 (默认 info)
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_target(true)
        .with_level(true)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // 加载配置
    let config = AppConfig::load()?;
    info!("Starting server with config: {:?}", config);

    // 按配置创建存储和服务
    let state = bootstrap::build_state(&config).await?;
    let app = router(state);

    // 启动服务器
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Server listening on {}", addr);
    info!("API Endpoints:");
    info!("  GET|POST        /api/diamonds");
    info!("  PUT|DELETE      /api/diamonds/:id   - PUT propagates price to quotations");
    info!("  GET|POST        /api/prices         - POST propagates metal rates");
    info!("  GET             /api/metadata");
    info!("  GET|DELETE      /api/metadata/:id");
    info!("  POST            /api/save-quotation");
    info!("  POST            /api/upload-image");
    info!("  GET             /api/images/*key");
    info!("  DELETE          /api/delete-image");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
