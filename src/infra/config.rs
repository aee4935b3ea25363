use std::env;

use super::mongo::Page;

/// Environment-derived settings, loaded once at startup. `.env` files are
/// honored via dotenv.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mongo_uri: String,
    pub database: String,
    pub default_page_size: u64,
    pub max_page_size: u64,
    pub connect_attempts: u32,
}

impl AppConfig {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        AppConfig {
            mongo_uri: env::var("MONGODB_URI")
                .unwrap_or_else(|_| String::from("mongodb://localhost:27017/")),
            database: env::var("MONGODB_DATABASE")
                .unwrap_or_else(|_| String::from("recipe_platform")),
            default_page_size: env_u64("DEFAULT_PAGE_SIZE", 10),
            max_page_size: env_u64("MAX_PAGE_SIZE", 100),
            connect_attempts: env_u64("MONGODB_CONNECT_ATTEMPTS", 5) as u32,
        }
    }

    /// Builds a page request from raw query parameters, capping the size.
    pub fn page(&self, number: Option<u64>, size: Option<u64>) -> Page {
        let size = size
            .unwrap_or(self.default_page_size)
            .min(self.max_page_size);
        Page::new(number.unwrap_or(1), size)
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AppConfig {
        AppConfig {
            mongo_uri: String::from("mongodb://localhost:27017/"),
            database: String::from("recipe_platform_test"),
            default_page_size: 10,
            max_page_size: 100,
            connect_attempts: 5,
        }
    }

    #[test]
    fn test_page_defaults_and_cap() {
        let config = config();
        assert_eq!(config.page(None, None), Page::new(1, 10));
        assert_eq!(config.page(Some(3), Some(25)), Page::new(3, 25));
        // requested size beyond the cap is clamped
        assert_eq!(config.page(Some(1), Some(5000)), Page::new(1, 100));
        // page 0 clamps to 1
        assert_eq!(config.page(Some(0), None), Page::new(1, 10));
    }
}
