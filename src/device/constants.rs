/**
 * USB vendor id of the DYMO M-series shipping scales.
 */
pub const VENDOR_ID: u16 = 0x0922;

/**
 * USB product id of the supported scale.
 */
pub const PRODUCT_ID: u16 = 0x8003;

/**
 * The interface that carries the HID input reports.
 */
pub const DEVICE_INTERFACE: u8 = 0;

/**
 * Default delay (seconds) between two reads.
 */
pub const DEFAULT_READ_INTERVAL: f64 = 1.0;

/**
 * Default delay (seconds) between two connection attempts.
 */
pub const DEFAULT_RECONNECT_INTERVAL: f64 = 5.0;

/**
 * Size of one input report. Packets may be longer (the endpoint's max packet size), only the
 * first REPORT_SIZE bytes are meaningful.
 */
pub const REPORT_SIZE: usize = 6;

pub const SIGN_NEGATIVE: u8 = 5; // byte 1
pub const UNITS_GRAMS: u8 = 2; // byte 2
pub const SCALE_TENTHS: u8 = 255; // byte 3

/**
 * How long (milliseconds) to wait for the driver to release the scale when exiting.
 */
pub const SHUTDOWN_DEADLINE: u64 = 2000;
