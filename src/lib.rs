//! Belt alignment monitoring core.
//!
//! Synchronous building blocks of the sampling-and-feedback pipeline:
//! frame sources, encoded frame samples, analyzer reply normalization,
//! the bounded measurement history and the overlay renderer. The async
//! daemon (`beltwatchd`) wires them to a timer and a remote analyzer.

pub mod frame;
pub mod history;
pub mod measurement;
pub mod mode;
pub mod overlay;
pub mod source;

pub use frame::{FrameEncoding, FrameError, FrameSample};
pub use history::HistoryBuffer;
pub use measurement::{MeasurementRecord, Severity};
pub use mode::AcquisitionMode;
