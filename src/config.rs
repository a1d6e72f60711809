use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use config;

#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

/// Credentials of the single site administrator, read from the environment.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AdminCredentials {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub password_hash: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub web: WebConfig,
    pub data_path: String,
    pub uploads_path: String,
    pub static_path: Option<String>,
    pub allowed_origins: String,
    pub log_level: String,
    pub use_secure_cookies: bool,
    pub use_external: bool,
    pub external_blog_url: Option<String>,
    pub update_blog_php_url: Option<String>,
    pub server_base_url: Option<String>,
    pub max_upload_size_mb: u64,
    pub remote_timeout_secs: u64,
    pub gallery_sync_interval_minutes: u64,
    #[serde(default)]
    pub admin: AdminCredentials,
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn flag_var(name: &str) -> bool {
    matches!(
        optional_var(name).as_deref().map(str::to_ascii_lowercase).as_deref(),
        Some("true") | Some("1") | Some("yes")
    )
}

fn number_var(name: &str, default: u64) -> Result<u64, config::ConfigError> {
    match optional_var(name) {
        None => Ok(default),
        Some(raw) => raw.parse::<u64>().map_err(|_| config::ConfigError::Message(format!(
            "FATAL: '{}' must be a whole number, got '{}'.", name, raw
        ))),
    }
}

fn absolute_path_var(name: &str) -> Result<String, config::ConfigError> {
    let value = optional_var(name).ok_or_else(|| config::ConfigError::Message(format!(
        "FATAL: Environment variable '{}' is not set in your .env file.", name
    )))?;
    if Path::new(&value).is_relative() {
        return Err(config::ConfigError::Message(format!(
            "FATAL: The '{}' in your .env file is a relative path ('{}'). It MUST be an absolute path.",
            name, value
        )));
    }
    Ok(value)
}

fn url_var(name: &str) -> Result<Option<String>, config::ConfigError> {
    match optional_var(name) {
        None => Ok(None),
        Some(raw) => {
            url::Url::parse(&raw).map_err(|e| config::ConfigError::Message(format!(
                "FATAL: '{}' is not a valid URL ('{}'): {}", name, raw, e
            )))?;
            Ok(Some(raw.trim_end_matches('/').to_string()))
        }
    }
}

impl Config {
    pub fn from_env(env_path: &Path) -> Result<Self, config::ConfigError> {
        dotenvy::from_path(env_path)
            .map_err(|e| config::ConfigError::Message(format!(
                "FATAL: Failed to load .env file from '{}'. Error: {}", env_path.display(), e
            )))?;

        let data_path = absolute_path_var("DATA_PATH")?;
        let uploads_path = absolute_path_var("UPLOADS_PATH")?;

        let static_path = optional_var("STATIC_PATH");
        let allowed_origins = optional_var("ALLOWED_ORIGINS").unwrap_or_default();
        let log_level = optional_var("LOG_LEVEL").unwrap_or_else(|| "info".to_string());
        let use_secure_cookies = flag_var("USE_SECURE_COOKIES");

        let use_external = flag_var("USE_EXTERNAL");
        let external_blog_url = url_var("EXTERNAL_BLOG_URL")?;
        let update_blog_php_url = url_var("UPDATE_BLOG_PHP_URL")?;
        let server_base_url = url_var("SERVER_BASE_URL")?;

        let max_upload_size_mb = number_var("MAX_UPLOAD_SIZE_MB", 200)?;
        let remote_timeout_secs = number_var("REMOTE_TIMEOUT_SECS", 30)?;
        let gallery_sync_interval_minutes = number_var("GALLERY_SYNC_INTERVAL_MINUTES", 0)?;

        let admin_username = optional_var("ADMIN_USERNAME");
        let admin_email = optional_var("ADMIN_EMAIL");
        let admin_password = optional_var("ADMIN_PASSWORD");
        let admin_password_hash = optional_var("ADMIN_PASSWORD_HASH");

        let builder = config::Config::builder()
            // Base settings (web host/port) come from the TOML file.
            .add_source(config::File::new("config/default.toml", config::FileFormat::Toml))
            .set_override("data_path", data_path)?
            .set_override("uploads_path", uploads_path)?
            .set_override_option("static_path", static_path)?
            .set_override("allowed_origins", allowed_origins)?
            .set_override("log_level", log_level)?
            .set_override("use_secure_cookies", use_secure_cookies)?
            .set_override("use_external", use_external)?
            .set_override_option("external_blog_url", external_blog_url)?
            .set_override_option("update_blog_php_url", update_blog_php_url)?
            .set_override_option("server_base_url", server_base_url)?
            .set_override("max_upload_size_mb", max_upload_size_mb)?
            .set_override("remote_timeout_secs", remote_timeout_secs)?
            .set_override("gallery_sync_interval_minutes", gallery_sync_interval_minutes)?
            .set_override_option("admin.username", admin_username)?
            .set_override_option("admin.email", admin_email)?
            .set_override_option("admin.password", admin_password)?
            .set_override_option("admin.password_hash", admin_password_hash)?
            .build()?;

        builder.try_deserialize()
    }

    /// Directory holding one JSON file per blog post plus `index.json`.
    pub fn blog_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_path).join("blog")
    }

    /// Local cache written by the gallery sync.
    pub fn gallery_cache_path(&self) -> PathBuf {
        PathBuf::from(&self.data_path)
            .join("cache")
            .join("tubox-galleries.json")
    }

    pub fn uploads_root(&self) -> PathBuf {
        PathBuf::from(&self.uploads_path)
    }

    pub fn max_upload_size_bytes(&self) -> u64 {
        self.max_upload_size_mb * 1024 * 1024
    }

    /// The remote blog backend needs both the read and the update endpoint;
    /// anything less falls back to local disk.
    pub fn blog_uses_remote(&self) -> bool {
        self.use_external && self.external_blog_url.is_some() && self.update_blog_php_url.is_some()
    }

    pub fn galleries_use_remote(&self) -> bool {
        self.use_external && self.server_base_url.is_some()
    }

    /// Human-readable notes about settings that silently disable a feature.
    pub fn startup_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.use_external && self.server_base_url.is_none() {
            warnings.push("USE_EXTERNAL is enabled but SERVER_BASE_URL is not set. Galleries stay on local disk.".to_string());
        }
        if self.use_external && !self.blog_uses_remote() {
            warnings.push("USE_EXTERNAL is enabled but EXTERNAL_BLOG_URL/UPDATE_BLOG_PHP_URL are incomplete. Blog posts stay on local disk.".to_string());
        }
        if self.admin.password.is_none() && self.admin.password_hash.is_none() {
            warnings.push("Neither ADMIN_PASSWORD nor ADMIN_PASSWORD_HASH is set. Admin login is disabled.".to_string());
        }
        warnings
    }
}

#[cfg(test)]
impl Config {
    /// Local-mode configuration rooted in scratch directories.
    pub fn for_tests(data_path: &Path, uploads_path: &Path) -> Self {
        Config {
            web: WebConfig { host: "127.0.0.1".to_string(), port: 0 },
            data_path: data_path.display().to_string(),
            uploads_path: uploads_path.display().to_string(),
            static_path: None,
            allowed_origins: String::new(),
            log_level: "debug".to_string(),
            use_secure_cookies: false,
            use_external: false,
            external_blog_url: None,
            update_blog_php_url: None,
            server_base_url: None,
            max_upload_size_mb: 1,
            remote_timeout_secs: 5,
            gallery_sync_interval_minutes: 0,
            admin: AdminCredentials {
                username: Some("admin".to_string()),
                email: Some("admin@tubox.de".to_string()),
                password: Some("secret".to_string()),
                password_hash: None,
            },
        }
    }
}
