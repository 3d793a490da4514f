//! Sensor workers.
//!
//! | Module   | Worker thread | Delivers to      |
//! |----------|---------------|------------------|
//! | `motion` | `motion`      | `MotionHandler`  |
//! | `camera` | `capture`     | `FrameHandler`   |
//! | `analog` | `analog` (periodic mode only) | `SampleHandler` |

pub mod analog;
pub mod camera;
pub mod motion;
