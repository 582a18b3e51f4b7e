use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    /// Where read-only accesses go. Defaults to the primary URL when no
    /// replica is deployed; that choice is made here, once, at startup.
    pub replica_database_url: String,
    pub host: String,
    pub port: u16,
    pub gateway_base_url: String,
    pub gateway_api_key: String,
    pub gateway_api_secret: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let replica_database_url =
            env::var("DATABASE_REPLICA_URL").unwrap_or_else(|_| database_url.clone());
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let gateway_base_url = env::var("GATEWAY_BASE_URL")
            .unwrap_or_else(|_| "https://api.iamport.kr".to_string());
        let gateway_api_key = env::var("GATEWAY_API_KEY").unwrap_or_default();
        let gateway_api_secret = env::var("GATEWAY_API_SECRET").unwrap_or_default();
        Ok(Self {
            database_url,
            replica_database_url,
            host,
            port,
            gateway_base_url,
            gateway_api_key,
            gateway_api_secret,
        })
    }
}
