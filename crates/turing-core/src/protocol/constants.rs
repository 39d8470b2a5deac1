//! Protocol constants for the Turing smart screen USB command set.

// ============================================================================
// Device Identification
// ============================================================================

/// Vendor ID shared by this display family.
pub const TURING_VENDOR_ID: u16 = 0x1CBE;

/// Product ID shared by this display family.
pub const TURING_PRODUCT_ID: u16 = 0x0088;

/// Interface carrying the bulk endpoints.
pub const TURING_INTERFACE: u8 = 0;

// ============================================================================
// Frame Layout
// ============================================================================

/// Every command or response frame is exactly this long.
pub const FRAME_LEN: usize = 0x200; // 512 bytes

pub const COMMAND_OFFSET: usize = 0;
pub const RESERVED_OFFSET: usize = 1;
pub const MAGIC_OFFSET: usize = 2;
pub const TIMESTAMP_OFFSET: usize = 4;
pub const PAYLOAD_OFFSET: usize = 8;

/// Largest payload a single frame can carry.
pub const MAX_PAYLOAD: usize = 498;

/// Big-endian u16 holding the payload length.
pub const PAYLOAD_LEN_OFFSET: usize = PAYLOAD_OFFSET + MAX_PAYLOAD;

pub const TRAILER_OFFSET: usize = FRAME_LEN - 2;

pub const FRAME_MAGIC: [u8; 2] = [0x1A, 0x6D];
pub const FRAME_TRAILER: [u8; 2] = [0xA1, 0x1A];

/// Fixed DES key (also used as the chaining IV).
pub const CIPHER_KEY: [u8; 8] = *b"slv3tuzx";

// ============================================================================
// Chunking
// ============================================================================

/// Fragment header prepended to every chunk-carrying payload.
pub const FRAGMENT_HEADER_LEN: usize = 12;

/// Chunk bytes carried per fragment frame.
pub const FRAGMENT_DATA_LEN: usize = MAX_PAYLOAD - FRAGMENT_HEADER_LEN; // 486

/// Encoded size ceiling for one image layer.
pub const IMAGE_LAYER_LIMIT: usize = 512 * 1024;

/// Fixed slice size for video uploads.
pub const VIDEO_CHUNK_SIZE: usize = 202_000;

/// Fragment flag: chunk is the last of its transfer (end-of-stream for video).
pub const FLAG_FINAL: u8 = 0x01;

/// Fragment flag: data carries the chunk leader instead of chunk bytes.
pub const FLAG_LEADER: u8 = 0x02;

/// Longest storage path a leader can name.
pub const MAX_STORAGE_PATH: usize = 255;

// ============================================================================
// Device Storage
// ============================================================================

pub const IMAGE_STORAGE_DIR: &str = "/tmp/sdcard/mmcblk0p1/img/";
pub const VIDEO_STORAGE_DIR: &str = "/tmp/sdcard/mmcblk0p1/video/";

// ============================================================================
// Settings Ranges
// ============================================================================

pub const MAX_BRIGHTNESS: u8 = 102;

// ============================================================================
// Timing
// ============================================================================

/// Default wait for an acknowledgement frame.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 2000;

/// Short reads used to drain stale input after a response.
pub const FLUSH_READ_TIMEOUT_MS: u64 = 100;
pub const FLUSH_READ_ATTEMPTS: u32 = 5;

/// Busy-interface retry defaults.
pub const OPEN_RETRY_ATTEMPTS: u32 = 5;
pub const OPEN_RETRY_DELAY_MS: u64 = 500;

/// Pause after the pre-operation sync.
pub const SETTLE_DELAY_MS: u64 = 100;

/// Spacing between consecutive opens in fleet setup.
pub const FLEET_OPEN_DELAY_MS: u64 = 1000;
