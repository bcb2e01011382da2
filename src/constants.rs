// Constants module - centralized default values for configuration
//
// Every default used by the config layer and the engine builder lives here,
// so the YAML defaults and the programmatic defaults cannot drift apart.

// =============================================================================
// Server defaults
// =============================================================================

/// Default listen address
pub const DEFAULT_ADDRESS: &str = "0.0.0.0";

/// Default listen port
pub const DEFAULT_PORT: u16 = 9000;

/// Health check endpoint served by the front end
pub const HEALTHCHECK_PATH: &str = "/healthcheck";

// =============================================================================
// Engine defaults
// =============================================================================

/// Default timeout for the fetch + transform phase in milliseconds
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Default timeout for the write-back phase in milliseconds
pub const DEFAULT_SAVE_TIMEOUT_MS: u64 = 60_000;

/// How long a settled coalescing entry keeps serving late followers
pub const DEFAULT_COALESCING_GRACE_MS: u64 = 50;

// =============================================================================
// Signing defaults
// =============================================================================

/// Path segment that marks an unsigned request
pub const UNSAFE_SEGMENT: &str = "unsafe";

/// Length of a base64url (no padding) HMAC-SHA256 token
pub const SIGNATURE_LENGTH: usize = 43;

// =============================================================================
// Loader defaults
// =============================================================================

/// Default HTTP loader timeout in milliseconds
pub const DEFAULT_HTTP_LOADER_TIMEOUT_MS: u64 = 20_000;

/// Default S3 region when none is configured
pub const DEFAULT_S3_REGION: &str = "us-east-1";

// =============================================================================
// Processor defaults
// =============================================================================

/// Default output quality (1-100)
pub const DEFAULT_QUALITY: u8 = 80;

/// Default maximum output width in pixels
pub const DEFAULT_MAX_WIDTH: u32 = 8192;

/// Default maximum output height in pixels
pub const DEFAULT_MAX_HEIGHT: u32 = 8192;

/// Default maximum decoded source pixels (image bomb protection)
pub const DEFAULT_MAX_SOURCE_PIXELS: u64 = 100_000_000;

// =============================================================================
// Logging defaults
// =============================================================================

/// Default log level directive
pub const DEFAULT_LOG_LEVEL: &str = "info";
