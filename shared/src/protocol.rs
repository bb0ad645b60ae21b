/// Instance attribute holding the registered IPv4 address
pub const ATTR_INSTANCE_IPV4: &str = "AWS_INSTANCE_IPV4";

/// Instance attribute holding the registered port
pub const ATTR_INSTANCE_PORT: &str = "AWS_INSTANCE_PORT";

/// Page size requested from every registry listing call
pub const REGISTRY_PAGE_SIZE: i32 = 100;

/// Catch-all backend receiving traffic no host rule matched
pub const DEFAULT_BACKEND: &str = "default_location";

/// Liveness API paths
pub const LIVENESS_PATH: &str = "/";
pub const APPLIED_CONFIG_PATH: &str = "/config";
