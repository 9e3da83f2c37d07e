use std::env;

const DEFAULT_API_URL: &str = "http://localhost:3000";
const DEFAULT_GATEWAY_URL: &str = "ws://localhost:3000/gateway";

/// Where the client finds the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_url: String,
    pub gateway_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.into(),
            gateway_url: DEFAULT_GATEWAY_URL.into(),
        }
    }
}

impl ClientConfig {
    /// Reads `REFUGE_API_URL` and `REFUGE_GATEWAY_URL`. When only the API
    /// URL is set, the gateway URL is derived from it.
    pub fn from_env() -> Self {
        let api_url = env::var("REFUGE_API_URL").ok();
        let gateway_url = env::var("REFUGE_GATEWAY_URL").ok();
        Self::from_parts(api_url, gateway_url)
    }

    fn from_parts(api_url: Option<String>, gateway_url: Option<String>) -> Self {
        let api_url = api_url
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.into());
        let gateway_url = gateway_url
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| gateway_from_api(&api_url));
        Self {
            api_url,
            gateway_url,
        }
    }
}

fn gateway_from_api(api_url: &str) -> String {
    let ws = if let Some(rest) = api_url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = api_url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        api_url.to_string()
    };
    format!("{}/gateway", ws)
}
