use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let ax = projects_axum::build()?;
    projects_axum::seed_demo(&ax.app).await?;

    let host = ax
        .app
        .get("http.host")
        .unwrap_or_else(|| "127.0.0.1".to_string());

    let port = ax
        .app
        .get("http.port")
        .unwrap_or_else(|| "3036".to_string());

    let addr = format!("{host}:{port}");

    println!("[projects] listening on http://{addr} (try http://acme.localhost:{port}/projects)");

    ax.listen(addr).await?;

    Ok(())
}
