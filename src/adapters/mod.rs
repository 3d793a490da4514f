//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter        | Implements          | Connects to                 |
//! |----------------|---------------------|-----------------------------|
//! | `archive`      | FrameStore          | JPEG files on disk          |
//! | `config_file`  | ConfigStore         | JSON config file            |
//! | `linux`        | EdgeSource          | GPIO character device       |
//! |                | AnalogBusOpener     | `/dev/i2c-N`                |
//! | `log_sink`     | EventSink           | `log` output                |
//! | `sim`          | all device ports    | in-memory simulation        |
//! | `still_camera` | StillImageSource    | `libcamera-still` process   |
//! | `time`         | DelayNs             | host clock                  |

pub mod archive;
pub mod config_file;
#[cfg(feature = "linux")]
pub mod linux;
pub mod log_sink;
pub mod sim;
pub mod still_camera;
pub mod time;
