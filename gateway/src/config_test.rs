use super::*;

/// # Safety
/// Tests must run with `--test-threads=1` to avoid env races.
unsafe fn clear_portal_env() {
    unsafe {
        std::env::remove_var("PORTAL_API_URL");
        std::env::remove_var("PORTAL_SITE");
        std::env::remove_var("PORTAL_REQUEST_TIMEOUT_SECS");
        std::env::remove_var("PORTAL_CONNECT_TIMEOUT_SECS");
        std::env::remove_var("PORTAL_CREDENTIALS_PATH");
    }
}

// =============================================================================
// from_env
// =============================================================================

#[test]
fn from_env_applies_defaults_and_overrides() {
    unsafe { clear_portal_env() };
    let cfg = GatewayConfig::from_env().unwrap();
    assert_eq!(cfg.api_url, DEFAULT_API_URL);
    assert_eq!(cfg.site, Site::Customer);
    assert_eq!(cfg.timeouts, Timeouts::default());
    assert_eq!(cfg.credentials_path, PathBuf::from(DEFAULT_CREDENTIALS_PATH));

    unsafe {
        std::env::set_var("PORTAL_API_URL", "https://api.example.test/v1/");
        std::env::set_var("PORTAL_SITE", "Admin");
        std::env::set_var("PORTAL_REQUEST_TIMEOUT_SECS", "42");
        std::env::set_var("PORTAL_CONNECT_TIMEOUT_SECS", "not-a-number");
        std::env::set_var("PORTAL_CREDENTIALS_PATH", "/tmp/portal-creds.json");
    }
    let cfg = GatewayConfig::from_env().unwrap();
    assert_eq!(cfg.api_url, "https://api.example.test/v1");
    assert_eq!(cfg.site, Site::Admin);
    assert_eq!(cfg.timeouts, Timeouts { request_secs: 42, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS });
    assert_eq!(cfg.credentials_path, PathBuf::from("/tmp/portal-creds.json"));

    unsafe {
        clear_portal_env();
        std::env::set_var("PORTAL_SITE", "partner");
    }
    assert!(matches!(GatewayConfig::from_env(), Err(ConfigError::UnknownSite(s)) if s == "partner"));

    unsafe { clear_portal_env() };
}

// =============================================================================
// site + urls
// =============================================================================

#[test]
fn site_parse_is_case_insensitive() {
    assert_eq!("customer".parse::<Site>().unwrap(), Site::Customer);
    assert_eq!(" ADMIN ".parse::<Site>().unwrap(), Site::Admin);
    assert!("".parse::<Site>().is_err());
}

#[test]
fn site_routes_and_login_paths() {
    assert_eq!(Site::Admin.login_path(), "/admin-user/login/");
    assert_eq!(Site::Customer.login_path(), "/user/login/");
    assert_eq!(Site::Admin.entry_route(), "/");
    assert_eq!(Site::Admin.dashboard_route(), "/dashboard");
    assert_eq!(Site::Customer.entry_route(), "/login");
}

#[test]
fn new_rejects_relative_url() {
    assert!(matches!(GatewayConfig::new("/api", Site::Admin), Err(ConfigError::InvalidUrl { .. })));
}

#[test]
fn endpoint_joins_paths() {
    let cfg = GatewayConfig::new("http://localhost:8000/api/", Site::Customer).unwrap();
    assert_eq!(cfg.endpoint(REFRESH_PATH), "http://localhost:8000/api/user/token-refresh/");
    assert_eq!(cfg.endpoint("orders/"), "http://localhost:8000/api/orders/");
}

#[test]
fn http_client_builds() {
    let cfg = GatewayConfig::new(DEFAULT_API_URL, Site::Customer).unwrap();
    assert!(cfg.http_client().is_ok());
}
