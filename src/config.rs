use std::env;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Development,
    Production,
}

/// Source for the backend route descriptor
#[derive(Debug, Clone, PartialEq)]
pub enum RoutesSource {
    /// Descriptor provided as JSON string via BACKEND_ROUTES_JSON env var
    Json(String),
    /// Descriptor loaded from file path via BACKEND_ROUTES_PATH env var
    File(String),
}

/// Placeholder stored for Azure AD values when authentication is disabled or stubbed.
pub const UNSET: &str = "NA";

pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

#[derive(Clone)]
pub struct Config {
    pub environment: Environment,

    // Server configuration
    pub server_host: String,
    pub server_port: u16,

    // Module switches
    pub auth_enabled: bool,
    pub use_dummy: bool,

    // Azure AD app registration
    pub azure_ad_tenant_id: String,
    pub azure_ad_client_id: String,
    pub azure_ad_client_secret: String,
    pub azure_ad_api_client_id: String,
    pub authority_host: String,

    // Session signing secret
    pub auth_secret: String,

    // Public origin of this service (for OAuth redirect URIs)
    pub auth_origin: String,

    // Backend API base URL that proxied routes are resolved against
    pub api_url: String,

    // HTTP client timeout configuration (in seconds)
    pub http_connect_timeout_secs: u64,
    pub http_request_timeout_secs: u64,

    pub session_max_age_secs: u64,

    pub default_locale: String,

    pub routes: Option<RoutesSource>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("environment", &self.environment)
            .field("server_host", &self.server_host)
            .field("server_port", &self.server_port)
            .field("auth_enabled", &self.auth_enabled)
            .field("use_dummy", &self.use_dummy)
            .field("azure_ad_tenant_id", &self.azure_ad_tenant_id)
            .field("azure_ad_client_id", &self.azure_ad_client_id)
            .field("azure_ad_client_secret", &"<redacted>")
            .field("azure_ad_api_client_id", &self.azure_ad_api_client_id)
            .field("authority_host", &self.authority_host)
            .field("auth_secret", &"<redacted>")
            .field("auth_origin", &self.auth_origin)
            .field("api_url", &self.api_url)
            .field("session_max_age_secs", &self.session_max_age_secs)
            .field("default_locale", &self.default_locale)
            .field("routes", &self.routes.as_ref().map(|s| match s {
                RoutesSource::Json(_) => "json",
                RoutesSource::File(_) => "file",
            }))
            .finish()
    }
}

fn parse_bool(value: Option<String>, default: bool) -> bool {
    match value.as_deref().map(str::trim).map(str::to_lowercase).as_deref() {
        Some("1" | "true" | "yes" | "on") => true,
        Some("0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

fn parse_u64(value: Option<String>, default: u64) -> u64 {
    value.and_then(|s| s.parse::<u64>().ok()).unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables using std::env::var
    pub fn load() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Azure AD values and `AUTH_SECRET` are required unless authentication is
    /// disabled or running against the dummy accessor, in which case they fall
    /// back to [`UNSET`].
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|s| !s.trim().is_empty());

        let environment = match get("ENVIRONMENT")
            .unwrap_or_else(|| "development".to_string())
            .to_lowercase()
            .as_str()
        {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        };

        let auth_enabled = parse_bool(get("AUTH_ENABLED"), true);
        let use_dummy = parse_bool(get("AUTH_USE_DUMMY"), false);
        let requires_azure = auth_enabled && !use_dummy;

        let azure_value = |key: &str| -> anyhow::Result<String> {
            match get(key) {
                Some(value) => Ok(value),
                None if requires_azure => Err(anyhow::anyhow!(
                    "{} environment variable is required",
                    key
                )),
                None => Ok(UNSET.to_string()),
            }
        };

        let azure_ad_tenant_id = azure_value("AZURE_AD_TENANT_ID")?;
        let azure_ad_client_id = azure_value("AZURE_AD_CLIENT_ID")?;
        let azure_ad_client_secret = azure_value("AZURE_AD_CLIENT_SECRET")?;
        let azure_ad_api_client_id = azure_value("AZURE_AD_API_CLIENT_ID")?;
        let auth_secret = azure_value("AUTH_SECRET")?;

        let api_url = get("API_URL")
            .map(|s| s.trim_end_matches('/').to_string())
            .ok_or_else(|| anyhow::anyhow!("API_URL environment variable is required"))?;
        url::Url::parse(&api_url)
            .map_err(|e| anyhow::anyhow!("API_URL is not a valid URL: {}", e))?;

        let authority_host = get("AZURE_AD_AUTHORITY_HOST")
            .unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string())
            .trim_end_matches('/')
            .to_string();

        let server_host = get("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string());

        let server_port = get("SERVER_PORT")
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(3000);

        let auth_origin = get("AUTH_ORIGIN")
            .unwrap_or_else(|| format!("http://localhost:{}", server_port))
            .trim_end_matches('/')
            .to_string();

        let http_connect_timeout_secs = parse_u64(get("HTTP_CONNECT_TIMEOUT_SECS"), 10);
        let http_request_timeout_secs = parse_u64(get("HTTP_REQUEST_TIMEOUT_SECS"), 30);

        // 30 days, the usual session lifetime for cookie sessions
        let session_max_age_secs = parse_u64(get("SESSION_MAX_AGE_SECS"), 30 * 24 * 60 * 60);

        let default_locale = get("DEFAULT_LOCALE").unwrap_or_else(|| "de".to_string());

        // Route descriptor (primary: JSON env var, fallback: file path)
        let routes = if let Some(json) = get("BACKEND_ROUTES_JSON") {
            Some(RoutesSource::Json(json))
        } else {
            get("BACKEND_ROUTES_PATH").map(RoutesSource::File)
        };

        Ok(Config {
            environment,
            server_host,
            server_port,
            auth_enabled,
            use_dummy,
            azure_ad_tenant_id,
            azure_ad_client_id,
            azure_ad_client_secret,
            azure_ad_api_client_id,
            authority_host,
            auth_secret,
            auth_origin,
            api_url,
            http_connect_timeout_secs,
            http_request_timeout_secs,
            session_max_age_secs,
            default_locale,
            routes,
        })
    }

    /// Check if running in production mode
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Whether real Azure AD sign-in is wired up
    pub fn uses_azure_ad(&self) -> bool {
        self.auth_enabled && !self.use_dummy
    }

    /// Get cookie security flags based on environment
    pub fn cookie_secure_flag(&self) -> &str {
        if self.is_production() {
            "; Secure"
        } else {
            ""
        }
    }

    /// Get bind address for server
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn authorize_endpoint(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/authorize",
            self.authority_host, self.azure_ad_tenant_id
        )
    }

    pub fn token_endpoint(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host, self.azure_ad_tenant_id
        )
    }

    /// Delegated scope of the downstream API app registration
    pub fn api_scope(&self) -> String {
        format!("api://{}/user_impersonation", self.azure_ad_api_client_id)
    }

    /// Scopes requested at sign-in
    pub fn sign_in_scopes(&self) -> Vec<String> {
        vec![
            "openid".to_string(),
            "profile".to_string(),
            "email".to_string(),
            "offline_access".to_string(),
            self.api_scope(),
        ]
    }

    pub fn callback_url(&self) -> String {
        format!("{}/api/auth/callback/azure-ad", self.auth_origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn full_env() -> Vec<(&'static str, &'static str)> {
        vec![
            ("AZURE_AD_TENANT_ID", "tenant"),
            ("AZURE_AD_CLIENT_ID", "client"),
            ("AZURE_AD_CLIENT_SECRET", "secret"),
            ("AZURE_AD_API_CLIENT_ID", "api-client"),
            ("AUTH_SECRET", "signing-secret"),
            ("API_URL", "https://api.example.com/"),
        ]
    }

    #[test]
    fn test_load_full_config() {
        let config = Config::from_lookup(lookup(&full_env())).unwrap();
        assert!(config.uses_azure_ad());
        assert_eq!(config.api_url, "https://api.example.com");
        assert_eq!(config.bind_address(), "0.0.0.0:3000");
        assert_eq!(config.auth_origin, "http://localhost:3000");
        assert_eq!(config.default_locale, "de");
        assert!(config.routes.is_none());
    }

    #[test]
    fn test_missing_secret_fails_when_azure_enabled() {
        let env: Vec<_> = full_env()
            .into_iter()
            .filter(|(k, _)| *k != "AZURE_AD_CLIENT_SECRET")
            .collect();
        let err = Config::from_lookup(lookup(&env)).unwrap_err();
        assert!(err.to_string().contains("AZURE_AD_CLIENT_SECRET"));
    }

    #[test]
    fn test_dummy_mode_tolerates_missing_azure_values() {
        let config = Config::from_lookup(lookup(&[
            ("AUTH_USE_DUMMY", "true"),
            ("API_URL", "http://localhost:8080"),
        ]))
        .unwrap();
        assert!(!config.uses_azure_ad());
        assert_eq!(config.azure_ad_client_id, UNSET);
        assert_eq!(config.auth_secret, UNSET);
    }

    #[test]
    fn test_api_url_is_required() {
        let env: Vec<_> = full_env()
            .into_iter()
            .filter(|(k, _)| *k != "API_URL")
            .collect();
        assert!(Config::from_lookup(lookup(&env)).is_err());
    }

    #[test]
    fn test_azure_endpoints() {
        let config = Config::from_lookup(lookup(&full_env())).unwrap();
        assert_eq!(
            config.token_endpoint(),
            "https://login.microsoftonline.com/tenant/oauth2/v2.0/token"
        );
        assert_eq!(
            config.authorize_endpoint(),
            "https://login.microsoftonline.com/tenant/oauth2/v2.0/authorize"
        );
        assert_eq!(config.api_scope(), "api://api-client/user_impersonation");
        assert_eq!(
            config.sign_in_scopes().join(" "),
            "openid profile email offline_access api://api-client/user_impersonation"
        );
    }

    #[test]
    fn test_routes_json_preferred_over_path() {
        let mut env = full_env();
        env.push(("BACKEND_ROUTES_JSON", "{\"routes\":[]}"));
        env.push(("BACKEND_ROUTES_PATH", "/etc/routes.json"));
        let config = Config::from_lookup(lookup(&env)).unwrap();
        assert_eq!(
            config.routes,
            Some(RoutesSource::Json("{\"routes\":[]}".to_string()))
        );
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = Config::from_lookup(lookup(&full_env())).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("signing-secret"));
        assert!(!debug.contains("\"secret\""));
        assert!(debug.contains("<redacted>"));
    }
}
