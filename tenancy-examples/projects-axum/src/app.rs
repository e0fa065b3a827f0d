use anyhow::Result;
use tenancy_axum::{tenancy, TenancyAxum};
use tenancy_core::{config, TenancyApp, TenancyConfig, UserId};

pub const USER_HEADER: &str = "x-user";

pub fn projects_app() -> Result<TenancyAxum> {
    let mut cfg = TenancyConfig::new();
    cfg.set(config::ROUTING_BASE_DOMAIN, "localhost");
    cfg.set("http.host", "127.0.0.1");
    cfg.set("http.port", "3036");
    // TENANCY__ROUTING__MODE=path and friends.
    cfg.load_env("TENANCY");

    let app = TenancyApp::new(cfg)?;

    // Behind a proxy that has already authenticated the caller.
    let ax = tenancy(app).use_identity(|headers| {
        headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(UserId::new)
    });
    Ok(ax)
}
