//! Test configuration pointing every endpoint at one mock server

use bim_acquire::config::{ClientCredentials, PollConfig};
use bim_acquire::{Config, ManualNavigation};
use std::time::Duration;
use url::Url;
use wiremock::MockServer;

/// File the fixtures' folder listing is searched for
pub const TARGET_FILE: &str = "burj al arab.rvt";

/// Config whose auth, platform and broker endpoints all live on `server`
pub fn test_config(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.credentials = ClientCredentials::new("test-client", "test-secret");
    config.auth.token_url = format!("{}/authentication/v2/token", server.uri());
    config.platform.base_url = server.uri();
    config.broker.base_url = format!("{}/.netlify", server.uri());
    config.resolver.target_file_suffix = TARGET_FILE.to_string();
    config.conversion.poll = PollConfig {
        interval: Duration::from_millis(10),
        max_attempts: 5,
    };
    config.http.request_timeout = Duration::from_secs(5);
    config
}

/// Navigation context that has already come back from the provider with `code`
pub fn redirected_with_code(code: &str) -> ManualNavigation {
    let url = Url::parse(&format!("http://localhost:8080/?code={code}"))
        .expect("static redirect URL must parse");
    ManualNavigation::with_redirect(url)
}
