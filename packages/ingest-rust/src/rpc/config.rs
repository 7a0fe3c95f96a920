use std::time::Duration;

use graphbulk_core::WireFormat;

/// Configuration for the correlation router.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// Deadline for each call. `None` waits indefinitely, so a stalled
    /// endpoint stalls the caller.
    pub call_timeout: Option<Duration>,
    /// Encoding of outbound request frames.
    pub wire_format: WireFormat,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            call_timeout: Some(Duration::from_secs(30)),
            wire_format: WireFormat::Json,
        }
    }
}
