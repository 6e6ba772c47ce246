use cms::config::{ConfigError, ConfigLoader};
use std::{
    env, fs,
    path::PathBuf,
    sync::{Mutex, MutexGuard, OnceLock},
};
use tempfile::TempDir;

const VARS: [&str; 9] = [
    "CMS_PROFILE",
    "CMS_API_BIND_ADDR",
    "CMS_LOG_LEVEL",
    "CMS_SESSION_SECRET",
    "CMS_ADMIN_EMAIL",
    "CMS_ADMIN_PASSWORD",
    "CMS_CORS_ALLOWED_ORIGINS",
    "CMS_PUBLIC_CACHE_TTL_SECONDS",
    "CMS_GITHUB_TOKEN",
];

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn env_guard() -> MutexGuard<'static, ()> {
    env_lock()
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
}

fn clear_env() {
    for var in VARS {
        unsafe {
            env::remove_var(var);
        }
    }
}

fn write_env_file(dir: &TempDir, name: &str, contents: &str) {
    fs::write(dir.path().join(name), contents).unwrap();
}

fn loader(dir: &TempDir) -> ConfigLoader {
    ConfigLoader::with_base_dir(PathBuf::from(dir.path()))
}

#[test]
fn loads_defaults_when_no_env_present() {
    let _guard = env_guard();
    clear_env();
    let dir = TempDir::new().unwrap();

    let cfg = loader(&dir).load().expect("config loads with defaults");

    assert_eq!(cfg.profile, "local");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:8080");
    assert_eq!(cfg.public_api.cache_ttl_seconds, 60);
    assert!(cfg.session_secret.is_none());
    assert!(cfg.cors_allowed_origins.is_empty());
    cfg.bind_addr().expect("default bind addr parses");
}

#[test]
fn layered_env_files_apply_in_order() {
    let _guard = env_guard();
    clear_env();

    let dir = TempDir::new().unwrap();
    write_env_file(&dir, ".env", "CMS_API_BIND_ADDR=127.0.0.1:3000\nCMS_LOG_LEVEL=warn\n");
    write_env_file(&dir, ".env.local", "CMS_PROFILE=staging\nCMS_API_BIND_ADDR=127.0.0.1:4000\n");
    write_env_file(&dir, ".env.staging", "CMS_API_BIND_ADDR=192.168.0.10:5000\n");
    write_env_file(&dir, ".env.staging.local", "CMS_API_BIND_ADDR=10.0.0.5:6000\n");

    let cfg = loader(&dir).load().expect("config loads with layered env files");

    assert_eq!(cfg.profile, "staging");
    assert_eq!(cfg.api_bind_addr, "10.0.0.5:6000");
    assert_eq!(cfg.log_level, "warn");
}

#[test]
fn process_environment_wins_over_files() {
    let _guard = env_guard();
    clear_env();

    let dir = TempDir::new().unwrap();
    write_env_file(&dir, ".env", "CMS_API_BIND_ADDR=127.0.0.1:3000\n");
    unsafe {
        env::set_var("CMS_API_BIND_ADDR", "127.0.0.1:9090");
        env::set_var("CMS_CORS_ALLOWED_ORIGINS", "https://admin.example.com, ,https://preview.example.com");
    }

    let cfg = loader(&dir).load().expect("config loads");
    clear_env();

    assert_eq!(cfg.api_bind_addr, "127.0.0.1:9090");
    assert_eq!(
        cfg.cors_allowed_origins,
        ["https://admin.example.com", "https://preview.example.com"]
    );
}

#[test]
fn production_requires_session_secret() {
    let _guard = env_guard();
    clear_env();

    let dir = TempDir::new().unwrap();
    write_env_file(&dir, ".env", "CMS_PROFILE=production\n");

    let missing = loader(&dir).load();
    assert!(matches!(missing, Err(ConfigError::MissingSessionSecret)));

    unsafe {
        env::set_var("CMS_SESSION_SECRET", "a-production-secret-that-is-long-enough");
    }
    let cfg = loader(&dir).load().expect("config loads with a strong secret");
    clear_env();

    assert!(cfg.is_production());
    let redacted = cfg.redacted_json().unwrap();
    assert!(!redacted.contains("a-production-secret-that-is-long-enough"));
}

#[test]
fn admin_bootstrap_requires_email_and_password() {
    let _guard = env_guard();
    clear_env();
    let dir = TempDir::new().unwrap();

    unsafe {
        env::set_var("CMS_ADMIN_EMAIL", "root@example.com");
    }
    let incomplete = loader(&dir).load();
    assert!(matches!(incomplete, Err(ConfigError::IncompleteAdminBootstrap)));

    unsafe {
        env::set_var("CMS_ADMIN_PASSWORD", "bootstrap-pass");
    }
    let cfg = loader(&dir).load().expect("config loads with admin bootstrap");
    clear_env();

    assert_eq!(cfg.admin_email.as_deref(), Some("root@example.com"));
}

#[test]
fn rejects_out_of_range_cache_ttl() {
    let _guard = env_guard();
    clear_env();
    let dir = TempDir::new().unwrap();

    unsafe {
        env::set_var("CMS_PUBLIC_CACHE_TTL_SECONDS", "7200");
    }
    let result = loader(&dir).load();
    clear_env();

    assert!(matches!(
        result,
        Err(ConfigError::InvalidPublicCacheTtl { value: 7200 })
    ));
}
