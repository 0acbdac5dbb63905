//! Protocol and buffer constants shared across the crate.

/// Number of bytes each ICY metadata block chunk represents (`N` in the block header counts
/// multiples of this value).
pub const META_BLOCK_STRIDE: usize = 16;

/// Largest encodable `StreamTitle` payload: 255 chunks of 16 bytes.
pub const META_BLOCK_MAX_PAYLOAD: usize = 255 * META_BLOCK_STRIDE;

/// Minimum number of queued pages kept even under memory pressure, so a freshly attached
/// listener always has at least one page to pin immediately.
pub const MIN_QUEUE_PAGES_FLOOR: usize = 2;

/// HTTP header name used for ICY metadata interval negotiation.
pub const ICY_METADATA_HEADER: &str = "icy-metadata";

/// Default server name advertised in the `Server` response header.
pub const DEFAULT_SERVER_NAME: &str = "icy-relay";
