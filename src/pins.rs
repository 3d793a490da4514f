//! GPIO / bus assignments for the feeder board (Raspberry Pi header).
//!
//! Single source of truth for the defaults in [`SystemConfig`](crate::config::SystemConfig).
//! Change a value here and every default that references it follows.

// ---------------------------------------------------------------------------
// GPIO character device
// ---------------------------------------------------------------------------

/// GPIO controller exposed by the kernel on Raspberry Pi 4/5.
pub const GPIO_CHIP_PATH: &str = "/dev/gpiochip0";

/// Digital output: feed motor driver input (active HIGH).
pub const MOTOR_LINE: u32 = 4;

/// Digital input: PIR motion sensor output (HIGH while motion is present).
pub const MOTION_LINE: u32 = 17;

/// Consumer label attached to requested lines (visible in `gpioinfo`).
pub const LINE_CONSUMER: &str = "fishfeeder";

// ---------------------------------------------------------------------------
// Analog front end (ADS1115 on I2C bus 1)
// ---------------------------------------------------------------------------

pub const I2C_BUS_PATH: &str = "/dev/i2c-1";

/// ADS1115 with ADDR tied to GND.
pub const ADC_I2C_ADDRESS: u8 = 0x48;
