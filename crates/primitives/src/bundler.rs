use serde::{Deserialize, Serialize};

/// Bundling modes, as switched via debug_bundler_setBundlingMode
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BundleMode {
    /// Bundles are sent on a timer
    #[serde(rename = "auto")]
    Auto,
    /// Bundles are sent only via debug_bundler_sendBundleNow or when the mempool
    /// reaches the configured size threshold
    #[serde(rename = "manual")]
    Manual,
}
