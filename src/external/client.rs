use std::sync::LazyLock;
use std::time::Duration;

/// User-Agent sent to messaging providers.
pub const USER_AGENT: &str = concat!("courier-rs/", env!("CARGO_PKG_VERSION"));

/// Global HTTP client shared by all transport providers.
///
/// Initialized lazily on first access. Connections to the provider hosts
/// are pooled; per-request timeouts from the messaging configuration are
/// applied on each request on top of the 30s ceiling set here.
///
/// # Example
/// ```ignore
/// use crate::external::client::HTTP_CLIENT;
///
/// let response = HTTP_CLIENT
///     .post("https://api.example.com/messages/v4/send")
///     .json(&body)
///     .send()
///     .await?;
/// ```
pub static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        // Timeouts
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        // Connection pooling
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .gzip(true)
        .user_agent(USER_AGENT)
        .build()
        .expect("Failed to build HTTP client")
});
