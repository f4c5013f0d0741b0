/// Prefix of every stored recording file name
pub const RECORDING_PREFIX: &str = "recording_";

/// Extension the catalog lists and the pipeline writes
pub const RECORDING_EXTENSION: &str = "wav";

/// Prefix of the temporary file holding a raw upload until it is converted
pub const TEMP_PREFIX: &str = "temp_";

/// chrono format used in recording file names (second precision)
pub const FILENAME_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// chrono format used for created/modified fields in listings
pub const DISPLAY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Bytes per second assumed when a duration can only be guessed from the
/// file size: 16-bit stereo at 44.1kHz.
pub const ESTIMATE_BYTES_PER_SECOND: f64 = 44100.0 * 4.0;

/// Number of leading bytes inspected by the format sniffer
pub const SNIFF_HEADER_LEN: usize = 12;

/// Number of leading bytes included in a debug dump
pub const DEBUG_HEADER_LEN: usize = 64;

pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
pub const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;
