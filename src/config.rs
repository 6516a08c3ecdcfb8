use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub subdomain: String,
    pub login: String,
    pub hash: String,
    pub domain: String,
    pub base_url: Option<String>, // Optional override, e.g. staging or tests
}

impl Config {
    pub fn new(
        subdomain: impl Into<String>,
        login: impl Into<String>,
        hash: impl Into<String>,
    ) -> Self {
        Self {
            subdomain: subdomain.into(),
            login: login.into(),
            hash: hash.into(),
            domain: "amocrm.ru".to_string(),
            base_url: None,
        }
    }

    /// Root URL every endpoint is joined onto.
    pub fn root_url(&self) -> String {
        match self.base_url {
            Some(ref base) => base.trim_end_matches('/').to_string(),
            None => format!("https://{}.{}", self.subdomain, self.domain),
        }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            subdomain: std::env::var("AMOCRM_SUBDOMAIN")
                .map_err(|_| anyhow::anyhow!("AMOCRM_SUBDOMAIN environment variable required"))
                .and_then(|subdomain| {
                    if subdomain.trim().is_empty() {
                        anyhow::bail!("AMOCRM_SUBDOMAIN cannot be empty");
                    }
                    if subdomain.contains('.') || subdomain.contains('/') {
                        anyhow::bail!("AMOCRM_SUBDOMAIN must be the bare account name");
                    }
                    Ok(subdomain)
                })?,
            login: std::env::var("AMOCRM_LOGIN")
                .map_err(|_| anyhow::anyhow!("AMOCRM_LOGIN environment variable required"))
                .and_then(|login| {
                    if login.trim().is_empty() {
                        anyhow::bail!("AMOCRM_LOGIN cannot be empty");
                    }
                    Ok(login)
                })?,
            hash: std::env::var("AMOCRM_HASH")
                .map_err(|_| anyhow::anyhow!("AMOCRM_HASH environment variable required"))
                .and_then(|hash| {
                    if hash.trim().is_empty() {
                        anyhow::bail!("AMOCRM_HASH cannot be empty");
                    }
                    Ok(hash)
                })?,
            domain: std::env::var("AMOCRM_DOMAIN").unwrap_or_else(|_| "amocrm.ru".to_string()),
            base_url: std::env::var("AMOCRM_BASE_URL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(|url| {
                    if !url.starts_with("http://") && !url.starts_with("https://") {
                        anyhow::bail!("AMOCRM_BASE_URL must start with http:// or https://");
                    }
                    Ok(url)
                })
                .transpose()?,
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Subdomain: {}", config.subdomain);
        tracing::debug!("Login: {}", config.login);
        if let Some(ref base) = config.base_url {
            tracing::info!("Base URL override configured: {}", base);
        }

        Ok(config)
    }
}
