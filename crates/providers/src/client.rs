use reqwest::{Client, Proxy};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, PartialEq)]
enum ProxyResolution {
    UseProxy(String),
    /// `proxy: ""` in the provider config disables every proxy, env included.
    ForceDirectConnect,
    /// Nothing configured; reqwest reads HTTPS_PROXY / HTTP_PROXY itself.
    None,
}

fn resolve_proxy(provider_proxy: Option<&str>) -> ProxyResolution {
    match provider_proxy.map(str::trim) {
        Some("") => ProxyResolution::ForceDirectConnect,
        Some(p) => ProxyResolution::UseProxy(p.to_string()),
        None => ProxyResolution::None,
    }
}

/// Build the HTTP client a provider talks through.
pub fn build_http_client(provider_proxy: Option<&str>, api_base: &str, timeout: Duration) -> Client {
    let mut builder = Client::builder().timeout(timeout);

    match resolve_proxy(provider_proxy) {
        ProxyResolution::UseProxy(proxy_url) => match Proxy::all(&proxy_url) {
            Ok(p) => {
                info!(proxy = %proxy_url, api_base = %api_base, "Planner provider using proxy");
                builder = builder.proxy(p);
            }
            Err(e) => {
                warn!(error = %e, proxy = %proxy_url, "Invalid proxy URL, falling back to direct connect");
            }
        },
        ProxyResolution::ForceDirectConnect => {
            info!(api_base = %api_base, "Planner provider forced to direct connect");
            builder = builder.no_proxy();
        }
        ProxyResolution::None => {}
    }

    builder.build().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to build HTTP client with proxy, using default");
        Client::new()
    })
}
