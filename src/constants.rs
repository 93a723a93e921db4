/// Prefix of all HTTP API routes
pub const API_PREFIX: &str = "/api";

/// Syncplay protocol version announced in the handshake
pub const PROTOCOL_VERSION: &str = "1.6.7";

/// Appended to the configured name to form the handshake username
pub const CLIENT_NAME_SUFFIX: &str = "_pCTLweb";

/// Round-trip time reported in reactive ping replies, in seconds
pub const NOMINAL_CLIENT_RTT: f64 = 0.02;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/playerctl-web.json";

/// Syncplay client configuration, relative to the home directory
pub const SYNCPLAY_INI_PATH: &str = ".config/syncplay.ini";
