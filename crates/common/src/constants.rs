/// Default relay server endpoint
pub const DEFAULT_TUNNEL_ADDRESS: &str = "wss://tunnel.hookrelay.dev/v1";

/// Timeout for a single call to the local service (10 seconds)
pub const FORWARD_TIMEOUT_SECS: u64 = 10;

/// Timeout for the TCP reachability check of the local address (3 seconds)
pub const LOCAL_DIAL_TIMEOUT_SECS: u64 = 3;

/// HTTP method used when a delivery does not name one
pub const DEFAULT_FORWARD_METHOD: &str = "POST";

/// Status reported when the local service did not answer in time
pub const GATEWAY_TIMEOUT_STATUS: u16 = 504;

/// Status reported when forwarding failed for any other reason
pub const INTERNAL_ERROR_STATUS: u16 = 500;

/// WebSocket close code sent on an orderly stop
pub const NORMAL_CLOSURE_CODE: u16 = 1000;

/// Close codes that end a session cleanly (normal through abnormal closure)
pub const CLEAN_CLOSE_CODES: std::ops::RangeInclusive<u16> = 1000..=1006;

/// Environment variable carrying the project ID
pub const PROJECT_ID_ENV: &str = "HOOKRELAY_PROJECT_ID";

/// Environment variable carrying the CLI secret
pub const CLI_SECRET_ENV: &str = "HOOKRELAY_CLI_SECRET";

/// Environment variable overriding the relay server endpoint
pub const TUNNEL_ADDRESS_ENV: &str = "HOOKRELAY_TUNNEL_ADDRESS";

/// Credential file name, placed in the user's home directory
pub const CREDENTIAL_FILE_NAME: &str = ".hookrelay";
