pub static STABILIZE_SLEEP_MILLIS: u64 = 1_000;
pub static LIVENESS_TIMEOUT_MILLIS: u64 = 500;
pub static SLIST_SIZE: usize = 4;

pub static CONNECTION_RETRY_UPON_FAILURE_MILLIS: u64 = 100;
pub static MAX_CONNECTION_RETRIES: u64 = 3;

pub static DEBUG_RPCS_UNAVAILABLE_ERROR_MESSAGE: &str =
    "debugging RPCs are disabled on this node (dev_mode = false)";
