//! # EDF/BDF codec for Rust
//!
//! Reads EDF, EDF+, BDF and BDF+ files and writes EDF+ and BDF+ files: the
//! fixed ASCII header, the packed little-endian sample records and the
//! annotation channels holding Time-stamped Annotation Lists (TAL).
//!
//! All numbers in headers and TALs are parsed and printed without consulting
//! the process locale. Times are in units of 100 ns
//! ([`EDFLIB_TIME_DIMENSION`] per second).
//!
//! ## Quick Start
//!
//! ### Writing a file
//!
//! ```rust
//! use edfcodec::{EdfWriter, FileType, SignalParam, Result};
//!
//! fn main() -> Result<()> {
//!     let mut writer = EdfWriter::create("quickstart.edf", FileType::EdfPlus, 1)?;
//!     writer.set_patient_name("Patient Name")?;
//!     writer.set_start_datetime(2024, 5, 17, 10, 30, 0)?;
//!     writer.set_signal_param(0, &SignalParam {
//!         label: "EEG Fp1".to_string(),
//!         physical_max: 200.0,
//!         physical_min: -200.0,
//!         digital_max: 32767,
//!         digital_min: -32768,
//!         samples_per_record: 256,
//!         physical_dimension: "uV".to_string(),
//!         ..SignalParam::default()
//!     })?;
//!
//!     for _ in 0..4 {
//!         let samples: Vec<f64> = (0..256)
//!             .map(|i| 50.0 * (2.0 * std::f64::consts::PI * 10.0 * i as f64 / 256.0).sin())
//!             .collect();
//!         writer.write_physical_samples(&samples)?;
//!     }
//!
//!     // onset 1.5 s, duration 0.5 s
//!     writer.write_annotation_utf8(15_000_000, Some(5_000_000), "Blink")?;
//!     writer.close()?;
//!     # std::fs::remove_file("quickstart.edf").ok();
//!     Ok(())
//! }
//! ```
//!
//! ### Reading it back
//!
//! ```rust
//! use edfcodec::{EdfReader, Whence, Result};
//!
//! fn main() -> Result<()> {
//!     # edfcodec::doctest_utils::create_annotated_test_file("quickstart_read.edf")?;
//!     let mut reader = EdfReader::open("quickstart_read.edf")?;
//!     let header = reader.header();
//!     println!("{} signals, {} data records", header.signals.len(), header.datarecords_in_file);
//!
//!     for annotation in reader.annotations() {
//!         println!("{} at {}", annotation.description, annotation.onset);
//!     }
//!
//!     reader.seek(0, 256, Whence::Set)?;
//!     let second = reader.read_physical_samples(0, 256)?;
//!     assert_eq!(second.len(), 256);
//!     # std::fs::remove_file("quickstart_read.edf").ok();
//!     Ok(())
//! }
//! ```
//!
//! ## Annotations
//!
//! The writer keeps annotations in memory and writes them into the annotation
//! channel of the data records when the file is closed, one annotation per
//! data record. Annotations beyond the number of written data records are
//! dropped with a warning. Descriptions are limited to 40 bytes.
//!
//! ## Physical vs Digital Values
//!
//! ```rust
//! use edfcodec::SignalParam;
//!
//! let signal = SignalParam {
//!     physical_max: 100.0,
//!     physical_min: -100.0,
//!     digital_max: 32767,
//!     digital_min: -32768,
//!     ..SignalParam::default()
//! };
//!
//! assert!((signal.to_physical(16384) - 50.0).abs() < 0.1);
//! assert!((signal.to_digital(25.0) - 8192).abs() <= 1);
//! ```

pub mod error;
pub mod types;
pub mod utils;
pub mod text;
pub mod reader;
pub mod writer;
pub mod registry;

mod header;
mod annotations;

#[doc(hidden)]
pub mod doctest_utils;

pub use error::{EdfError, Result};
pub use types::{Annotation, AnnotationMode, EdfHeader, FileType, SignalParam, Whence};
pub use reader::EdfReader;
pub use writer::EdfWriter;
pub use registry::{Handle, HandleRegistry};

pub const EDFLIB_TIME_DIMENSION: i64 = 10_000_000; // 100 nanoseconds unit
pub const EDFLIB_MAXSIGNALS: usize = 256;
pub const EDFLIB_MAXFILES: usize = 64;
pub const EDFLIB_MAX_ANNOTATION_LEN: usize = 512;
pub const EDFLIB_WRITE_MAX_ANNOTATION_LEN: usize = 40;
/// Size of the annotation channel in every record the writer produces
pub const EDFLIB_ANNOTATION_BYTES: usize = 114;

/// Library version
///
/// ```rust
/// let version = edfcodec::version();
/// assert!(version.contains('.'));
/// ```
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
