use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::annotations::extract_annotations;
use crate::error::{EdfError, Result};
use crate::header::{check_edf_file, HeaderInfo};
use crate::types::{Annotation, AnnotationMode, EdfHeader, Whence};

/// Reader for EDF, EDF+, BDF and BDF+ files.
///
/// Annotation channels are hidden: signal numbers passed to the read and
/// seek methods count only ordinary signals, in file order. Every signal has
/// its own sample cursor.
///
/// # Examples
///
/// ```rust
/// use edfcodec::EdfReader;
///
/// # edfcodec::doctest_utils::create_simple_test_file("reader_doc.edf")?;
/// let mut reader = EdfReader::open("reader_doc.edf")?;
///
/// let header = reader.header();
/// println!("Duration: {:.1} seconds", header.file_duration as f64 / 10_000_000.0);
/// println!("Signals: {}", header.signals.len());
///
/// let samples = reader.read_physical_samples(0, 256)?;
/// assert_eq!(samples.len(), 256);
/// # std::fs::remove_file("reader_doc.edf").ok();
/// # Ok::<(), edfcodec::EdfError>(())
/// ```
pub struct EdfReader {
    file: BufReader<File>,
    path: PathBuf,
    info: HeaderInfo,
    /// 当前每个信号的样本位置指针
    sample_positions: Vec<i64>,
    annotations: Vec<Annotation>,
    scratch: Vec<u8>,
}

impl EdfReader {
    /// Opens a file and reads its annotations, stopping at "Recording ends".
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_mode(path, AnnotationMode::ReadAnnotations)
    }

    /// Opens a file for reading.
    ///
    /// The header is validated completely before anything is returned. For
    /// EDF+/BDF+ files the annotation channels are decoded according to
    /// `mode`, which also checks that the data records are contiguous in time.
    ///
    /// # Errors
    ///
    /// * `EdfError::FileNotFound` - the file can't be opened
    /// * `EdfError::InvalidFormat` - header or annotation channel is malformed
    /// * `EdfError::DiscontinuousFile` - the file is EDF+D/BDF+D
    pub fn open_with_mode<P: AsRef<Path>>(path: P, mode: AnnotationMode) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| EdfError::FileNotFound(format!("{}: {}", path.display(), e)))?;
        let mut file = BufReader::new(file);

        let mut info = check_edf_file(&mut file)?;
        if info.discontinuous {
            warn!("{}: discontinuous files are not supported", path.display());
            return Err(EdfError::DiscontinuousFile);
        }

        let mut annotations = Vec::new();
        if info.file_type().is_plus() {
            let extracted = extract_annotations(&mut file, &info, mode)?;
            info.header.starttime_subsecond = extracted.starttime_subsecond;
            annotations = extracted.annotations;
        }
        info.header.annotations_in_file = annotations.len() as i64;

        debug!(
            "opened {} ({} signals, {} annotations)",
            path.display(),
            info.mapped_signals.len(),
            annotations.len()
        );

        Ok(EdfReader {
            file,
            path: path.to_path_buf(),
            sample_positions: vec![0; info.mapped_signals.len()],
            info,
            annotations,
            scratch: Vec::new(),
        })
    }

    /// Parsed header; `signals` lists ordinary signals only.
    pub fn header(&self) -> &EdfHeader {
        &self.info.header
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Annotations in file order, onsets relative to the recording start.
    ///
    /// ```rust
    /// use edfcodec::EdfReader;
    ///
    /// # edfcodec::doctest_utils::create_annotated_test_file("annotations_doc.edf")?;
    /// let reader = EdfReader::open("annotations_doc.edf")?;
    /// for annotation in reader.annotations() {
    ///     println!(
    ///         "{:.3}s: {}",
    ///         annotation.onset as f64 / 10_000_000.0,
    ///         annotation.description
    ///     );
    /// }
    /// # std::fs::remove_file("annotations_doc.edf").ok();
    /// # Ok::<(), edfcodec::EdfError>(())
    /// ```
    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn annotation(&self, n: usize) -> Result<&Annotation> {
        self.annotations
            .get(n)
            .ok_or_else(|| EdfError::InvalidArgument(format!("annotation {} does not exist", n)))
    }

    /// Reads up to `count` physical samples from `signal`.
    ///
    /// Returns fewer samples (possibly none) near the end of the signal.
    pub fn read_physical_samples(&mut self, signal: usize, count: usize) -> Result<Vec<f64>> {
        let count = count.min(self.remaining(signal)?);
        let mut samples = vec![0.0; count];
        let read = self.read_physical_into(signal, &mut samples)?;
        samples.truncate(read);
        Ok(samples)
    }

    /// Reads up to `count` digital samples from `signal`, clamped to the
    /// signal's digital range.
    pub fn read_digital_samples(&mut self, signal: usize, count: usize) -> Result<Vec<i32>> {
        let count = count.min(self.remaining(signal)?);
        let mut samples = vec![0; count];
        let read = self.read_digital_into(signal, &mut samples)?;
        samples.truncate(read);
        Ok(samples)
    }

    /// Fills `buf` with physical samples and returns how many were read.
    pub fn read_physical_into(&mut self, signal: usize, buf: &mut [f64]) -> Result<usize> {
        let count = buf.len().min(self.remaining(signal)?);
        let mut digital = vec![0; count];
        let read = self.read_digital_into(signal, &mut digital)?;

        let param = &self.info.channels[self.info.mapped_signals[signal]].param;
        let bit_value = param.bit_value();
        let offset = param.offset();
        for (out, &d) in buf.iter_mut().zip(&digital[..read]) {
            *out = bit_value * (offset + f64::from(d));
        }
        Ok(read)
    }

    /// Fills `buf` with digital samples and returns how many were read.
    ///
    /// ```rust
    /// use edfcodec::EdfReader;
    ///
    /// # edfcodec::doctest_utils::create_multi_channel_test_file("read_into_doc.bdf")?;
    /// let mut reader = EdfReader::open("read_into_doc.bdf")?;
    /// let mut buf = [0i32; 100];
    /// for signal in 0..reader.header().signals.len() {
    ///     let mut total = 0;
    ///     loop {
    ///         let n = reader.read_digital_into(signal, &mut buf)?;
    ///         if n == 0 {
    ///             break;
    ///         }
    ///         total += n;
    ///     }
    ///     assert_eq!(total, 512);
    /// }
    /// # std::fs::remove_file("read_into_doc.bdf").ok();
    /// # Ok::<(), edfcodec::EdfError>(())
    /// ```
    pub fn read_digital_into(&mut self, signal: usize, buf: &mut [i32]) -> Result<usize> {
        let count = buf.len().min(self.remaining(signal)?);
        if count == 0 {
            return Ok(0);
        }

        let layout = &self.info.channels[self.info.mapped_signals[signal]];
        let width = self.info.file_type().sample_width();
        let spr = i64::from(layout.param.samples_per_record);
        let (dmin, dmax) = (layout.param.digital_min, layout.param.digital_max);
        let buf_offset = layout.buf_offset as u64;

        let mut done = 0;
        while done < count {
            let position = self.sample_positions[signal];
            let record = position / spr;
            let in_record = position % spr;

            // 计算文件偏移量
            let file_offset = self.info.header_size
                + record as u64 * self.info.record_size as u64
                + buf_offset
                + in_record as u64 * width as u64;
            self.file.seek(SeekFrom::Start(file_offset))?;

            let chunk = (count - done).min((spr - in_record) as usize);
            self.scratch.resize(chunk * width, 0);
            self.file.read_exact(&mut self.scratch)?;

            for (out, bytes) in buf[done..done + chunk].iter_mut().zip(self.scratch.chunks_exact(width)) {
                *out = decode_sample(bytes).clamp(dmin, dmax);
            }

            done += chunk;
            self.sample_positions[signal] = position + chunk as i64;
        }

        Ok(count)
    }

    /// Moves the cursor of `signal`, clamped to `[0, samples_in_file]`.
    pub fn seek(&mut self, signal: usize, offset: i64, whence: Whence) -> Result<i64> {
        let total = self.samples_in_file(signal)?;
        let base = match whence {
            Whence::Set => 0,
            Whence::Cur => self.sample_positions[signal],
            Whence::End => total,
        };
        let position = base.saturating_add(offset).clamp(0, total);
        self.sample_positions[signal] = position;
        Ok(position)
    }

    /// 获取指定信号的当前样本位置
    pub fn tell(&self, signal: usize) -> Result<i64> {
        self.samples_in_file(signal)?;
        Ok(self.sample_positions[signal])
    }

    /// 将指定信号的位置重置到开头
    pub fn rewind(&mut self, signal: usize) -> Result<()> {
        self.seek(signal, 0, Whence::Set)?;
        Ok(())
    }

    fn samples_in_file(&self, signal: usize) -> Result<i64> {
        self.info
            .mapped_signals
            .get(signal)
            .map(|&ch| self.info.channels[ch].param.samples_in_file)
            .ok_or(EdfError::InvalidSignalIndex(signal))
    }

    fn remaining(&self, signal: usize) -> Result<usize> {
        let total = self.samples_in_file(signal)?;
        Ok((total - self.sample_positions[signal]).max(0) as usize)
    }
}

/// Little-endian 16 bit (EDF) or 24 bit (BDF) sample, sign extended.
pub(crate) fn decode_sample(bytes: &[u8]) -> i32 {
    match *bytes {
        [lo, hi] => i32::from(i16::from_le_bytes([lo, hi])),
        [b0, b1, b2] => {
            let ext = if b2 & 0x80 != 0 { 0xFF } else { 0x00 };
            i32::from_le_bytes([b0, b1, b2, ext])
        }
        _ => 0,
    }
}
