use crate::base::error::CoreError;
use url::Url;

/// Identifies a class of interchangeable connections: target host and
/// port, whether the hop is secure, and the proxy it runs through.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route {
    host: String,
    port: u16,
    secure: bool,
    proxy: Option<String>,
}

impl Route {
    pub fn new(host: impl Into<String>, port: u16, secure: bool) -> Self {
        Self { host: host.into().to_ascii_lowercase(), port, secure, proxy: None }
    }

    pub fn via_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn from_url(url: &Url) -> Result<Self, CoreError> {
        let host = url.host_str().ok_or_else(|| CoreError::parse("route host", url.as_str()))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| CoreError::parse("route port", url.as_str()))?;
        Ok(Self::new(host, port, url.scheme() == "https"))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scheme = if self.secure { "https" } else { "http" };
        write!(f, "{}://{}:{}", scheme, self.host, self.port)?;
        if let Some(proxy) = &self.proxy {
            write!(f, " via {proxy}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_url() {
        let r = Route::from_url(&Url::parse("https://Example.com/path").unwrap()).unwrap();
        assert_eq!(r.host(), "example.com");
        assert_eq!(r.port(), 443);
        assert!(r.is_secure());
    }

    #[test]
    fn test_identity_includes_proxy() {
        let direct = Route::new("h", 80, false);
        let proxied = Route::new("h", 80, false).via_proxy("proxy:3128");
        assert_ne!(direct, proxied);
    }

    #[test]
    fn test_display() {
        assert_eq!(Route::new("h", 8080, false).to_string(), "http://h:8080");
        assert_eq!(
            Route::new("h", 443, true).via_proxy("p:1").to_string(),
            "https://h:443 via p:1"
        );
    }
}
