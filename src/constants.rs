// -
// Remote store defaults

/// etcd gRPC endpoint used when no endpoint is configured
pub(crate) const DEFAULT_ENDPOINT: &str = "127.0.0.1:2379";

/// Path prefix used when the configuration does not name one
pub(crate) const DEFAULT_PATH_PREFIX: &str = "/configs/";

// -
// Synchronizer defaults (milliseconds unless noted)

/// Fixed wait between reconnect attempts
pub(crate) const DEFAULT_RECONNECT_BACKOFF_MS: u64 = 10_000;

/// Capacity of the channel carrying watch batches into the synchronizer
pub(crate) const DEFAULT_EVENT_BUFFER_SIZE: usize = 128;

pub(crate) const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 1_000;
pub(crate) const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 3_000;

/// Environment variable prefix for configuration overrides
pub(crate) const ENV_PREFIX: &str = "DYNCONF";
