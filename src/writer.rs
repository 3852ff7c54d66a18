use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{Datelike, Local, NaiveDate, Timelike};
use log::{debug, info, warn};

use crate::annotations::{annotated_record, placeholder_record, PendingAnnotation};
use crate::error::{EdfError, Result};
use crate::header::MONTHS;
use crate::text::{latin1_to_utf8, str_to_ascii};
use crate::types::{FileType, SignalParam};
use crate::utils::{format_ll_number_nonlocalized, sprint_number_nonlocalized};
use crate::{EDFLIB_ANNOTATION_BYTES, EDFLIB_MAXSIGNALS, EDFLIB_TIME_DIMENSION, EDFLIB_WRITE_MAX_ANNOTATION_LEN};

/// 开始日期时间 (year, month, day, hour, minute, second)
#[derive(Debug, Clone, Copy)]
struct StartDateTime {
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
}

/// Streaming writer for EDF+ and BDF+ files.
///
/// The header is accumulated through setters and written together with the
/// first samples; from then on it is locked. Samples are written one data
/// record at a time, either signal by signal (`write_*_samples`, cycling
/// through all signals in order) or a whole record at once
/// (`blockwrite_*_samples`).
///
/// Every data record ends with an annotation channel of 114 bytes. Queued
/// annotations are placed into those channels when the writer is closed, one
/// per data record, so a file can hold at most as many annotations as it has
/// data records.
///
/// # Examples
///
/// ```rust
/// use edfcodec::{EdfWriter, FileType};
///
/// let mut writer = EdfWriter::create("writer_doc.edf", FileType::EdfPlus, 1)?;
/// writer.set_samples_per_record(0, 256)?;
/// writer.set_physical_maximum(0, 200.0)?;
/// writer.set_physical_minimum(0, -200.0)?;
/// writer.set_digital_maximum(0, 32767)?;
/// writer.set_digital_minimum(0, -32768)?;
/// writer.set_label(0, "EEG Fp1")?;
/// writer.set_physical_dimension(0, "uV")?;
///
/// for second in 0..10 {
///     let samples: Vec<f64> = (0..256)
///         .map(|i| 50.0 * (2.0 * std::f64::consts::PI * 10.0 * i as f64 / 256.0).sin())
///         .collect();
///     writer.write_physical_samples(&samples)?;
///     if second == 3 {
///         writer.write_annotation_utf8(3 * 10_000_000, None, "Eyes closed")?;
///     }
/// }
///
/// writer.close()?;
/// # std::fs::remove_file("writer_doc.edf").ok();
/// # Ok::<(), edfcodec::EdfError>(())
/// ```
pub struct EdfWriter {
    file: BufWriter<File>,
    path: PathBuf,
    file_type: FileType,
    signals: Vec<SignalParam>,
    start: Option<StartDateTime>,
    datarecord_duration: i64,
    datarecords: i64,
    /// 下一次 write_*_samples 写入的信号
    sequence_pos: usize,
    header_written: bool,
    closed: bool,

    // EDF+ 字段
    patient_code: String,
    gender: Option<u8>,
    birthdate: Option<(i32, u32, u32)>,
    patient_name: String,
    patient_additional: String,
    admin_code: String,
    technician: String,
    equipment: String,
    recording_additional: String,

    annotations: Vec<PendingAnnotation>,
    record_buf: Vec<u8>,
}

impl EdfWriter {
    /// Creates (or truncates) `path` for writing `signal_count` signals.
    ///
    /// Only [`FileType::EdfPlus`] and [`FileType::BdfPlus`] can be written.
    /// Every signal starts with zero samples per record and zero ranges, so
    /// the samples per record and the physical and digital limits must be
    /// set before the first write.
    ///
    /// # Errors
    ///
    /// * `EdfError::UnsupportedFileType` - plain EDF or BDF requested
    /// * `EdfError::InvalidSignalCount` - more than 256 signals
    /// * `EdfError::FileNotFound` - the file can't be created
    pub fn create<P: AsRef<Path>>(path: P, file_type: FileType, signal_count: usize) -> Result<Self> {
        if !file_type.is_plus() {
            return Err(EdfError::UnsupportedFileType(format!(
                "{:?} can't be written, use EdfPlus or BdfPlus",
                file_type
            )));
        }
        if signal_count > EDFLIB_MAXSIGNALS {
            return Err(EdfError::InvalidSignalCount(signal_count as i64));
        }

        let path = path.as_ref();
        let file = File::create(path)
            .map_err(|e| EdfError::FileNotFound(format!("{}: {}", path.display(), e)))?;

        Ok(EdfWriter {
            file: BufWriter::new(file),
            path: path.to_path_buf(),
            file_type,
            signals: vec![SignalParam::default(); signal_count],
            start: None,
            datarecord_duration: EDFLIB_TIME_DIMENSION,
            datarecords: 0,
            sequence_pos: 0,
            header_written: false,
            closed: false,
            patient_code: String::new(),
            gender: None,
            birthdate: None,
            patient_name: String::new(),
            patient_additional: String::new(),
            admin_code: String::new(),
            technician: String::new(),
            equipment: String::new(),
            recording_additional: String::new(),
            annotations: Vec::new(),
            record_buf: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    /// Data records completed so far.
    pub fn datarecords_written(&self) -> i64 {
        self.datarecords
    }

    /// Annotations queued for the close-time patch pass.
    pub fn annotation_count(&self) -> usize {
        self.annotations.len()
    }

    fn check_editable(&self) -> Result<()> {
        if self.header_written {
            return Err(EdfError::WritingStarted);
        }
        Ok(())
    }

    fn signal_mut(&mut self, signal: usize) -> Result<&mut SignalParam> {
        self.check_editable()?;
        self.signals.get_mut(signal).ok_or(EdfError::InvalidSignalIndex(signal))
    }

    pub fn set_samples_per_record(&mut self, signal: usize, samples: i32) -> Result<()> {
        if samples < 1 {
            return Err(EdfError::InvalidArgument(format!("samples per record {}", samples)));
        }
        self.signal_mut(signal)?.samples_per_record = samples;
        Ok(())
    }

    pub fn set_physical_maximum(&mut self, signal: usize, max: f64) -> Result<()> {
        self.signal_mut(signal)?.physical_max = max;
        Ok(())
    }

    pub fn set_physical_minimum(&mut self, signal: usize, min: f64) -> Result<()> {
        self.signal_mut(signal)?.physical_min = min;
        Ok(())
    }

    /// Upper digital limit, at most 32767 (EDF+) or 8388607 (BDF+).
    pub fn set_digital_maximum(&mut self, signal: usize, max: i32) -> Result<()> {
        if max > self.file_type.digital_ceiling() {
            return Err(EdfError::InvalidArgument(format!("digital maximum {}", max)));
        }
        self.signal_mut(signal)?.digital_max = max;
        Ok(())
    }

    /// Lower digital limit, at least -32768 (EDF+) or -8388608 (BDF+).
    pub fn set_digital_minimum(&mut self, signal: usize, min: i32) -> Result<()> {
        if min < self.file_type.digital_floor() {
            return Err(EdfError::InvalidArgument(format!("digital minimum {}", min)));
        }
        self.signal_mut(signal)?.digital_min = min;
        Ok(())
    }

    pub fn set_label(&mut self, signal: usize, label: &str) -> Result<()> {
        self.signal_mut(signal)?.label = header_text(label, 16);
        Ok(())
    }

    pub fn set_physical_dimension(&mut self, signal: usize, dimension: &str) -> Result<()> {
        self.signal_mut(signal)?.physical_dimension = header_text(dimension, 8);
        Ok(())
    }

    pub fn set_prefilter(&mut self, signal: usize, prefilter: &str) -> Result<()> {
        self.signal_mut(signal)?.prefilter = header_text(prefilter, 80);
        Ok(())
    }

    pub fn set_transducer(&mut self, signal: usize, transducer: &str) -> Result<()> {
        self.signal_mut(signal)?.transducer = header_text(transducer, 80);
        Ok(())
    }

    /// Applies every field of `param` to `signal` through the setters above.
    pub fn set_signal_param(&mut self, signal: usize, param: &SignalParam) -> Result<()> {
        self.set_samples_per_record(signal, param.samples_per_record)?;
        self.set_physical_maximum(signal, param.physical_max)?;
        self.set_physical_minimum(signal, param.physical_min)?;
        self.set_digital_maximum(signal, param.digital_max)?;
        self.set_digital_minimum(signal, param.digital_min)?;
        self.set_label(signal, &param.label)?;
        self.set_physical_dimension(signal, &param.physical_dimension)?;
        self.set_prefilter(signal, &param.prefilter)?;
        self.set_transducer(signal, &param.transducer)
    }

    /// Data record duration in units of 10 us, from 2500 (25 ms) to
    /// 2_000_000 (20 s). Defaults to one second.
    pub fn set_datarecord_duration(&mut self, duration: i32) -> Result<()> {
        self.check_editable()?;
        if !(2500..=2_000_000).contains(&duration) {
            return Err(EdfError::InvalidArgument(format!("data record duration {}", duration)));
        }
        let mut long_duration = i64::from(duration) * 100;
        // 10秒以下精确到 1 us, 以上精确到 10 us
        if long_duration < EDFLIB_TIME_DIMENSION * 10 {
            long_duration = long_duration / 10 * 10;
        } else {
            long_duration = long_duration / 100 * 100;
        }
        self.datarecord_duration = long_duration;
        Ok(())
    }

    pub fn set_patient_name(&mut self, name: &str) -> Result<()> {
        self.check_editable()?;
        self.patient_name = header_text(name, 80);
        Ok(())
    }

    pub fn set_patient_code(&mut self, code: &str) -> Result<()> {
        self.check_editable()?;
        self.patient_code = header_text(code, 80);
        Ok(())
    }

    /// 1 for male, 0 for female.
    pub fn set_gender(&mut self, gender: i32) -> Result<()> {
        self.check_editable()?;
        self.gender = match gender {
            1 => Some(b'M'),
            0 => Some(b'F'),
            other => return Err(EdfError::InvalidArgument(format!("gender {}", other))),
        };
        Ok(())
    }

    pub fn set_birthdate(&mut self, year: i32, month: u32, day: u32) -> Result<()> {
        self.check_editable()?;
        if !(1800..=3000).contains(&year) || NaiveDate::from_ymd_opt(year, month, day).is_none() {
            return Err(EdfError::InvalidArgument(format!("birthdate {}-{}-{}", year, month, day)));
        }
        self.birthdate = Some((year, month, day));
        Ok(())
    }

    pub fn set_patient_additional(&mut self, additional: &str) -> Result<()> {
        self.check_editable()?;
        self.patient_additional = header_text(additional, 80);
        Ok(())
    }

    pub fn set_admin_code(&mut self, code: &str) -> Result<()> {
        self.check_editable()?;
        self.admin_code = header_text(code, 80);
        Ok(())
    }

    pub fn set_technician(&mut self, technician: &str) -> Result<()> {
        self.check_editable()?;
        self.technician = header_text(technician, 80);
        Ok(())
    }

    pub fn set_equipment(&mut self, equipment: &str) -> Result<()> {
        self.check_editable()?;
        self.equipment = header_text(equipment, 80);
        Ok(())
    }

    pub fn set_recording_additional(&mut self, additional: &str) -> Result<()> {
        self.check_editable()?;
        self.recording_additional = header_text(additional, 80);
        Ok(())
    }

    /// Start of the recording. Without this call the local time at which
    /// the header is written is used.
    pub fn set_start_datetime(
        &mut self,
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
        second: u32,
    ) -> Result<()> {
        self.check_editable()?;
        if !(1970..=3000).contains(&year)
            || NaiveDate::from_ymd_opt(year, month, day).is_none()
            || hour > 23
            || minute > 59
            || second > 59
        {
            return Err(EdfError::InvalidArgument(format!(
                "start {}-{}-{} {}:{}:{}",
                year, month, day, hour, minute, second
            )));
        }
        self.start = Some(StartDateTime { year, month, day, hour, minute, second });
        Ok(())
    }

    /// Writes one data record worth of samples for the next signal in turn.
    ///
    /// `samples` must hold at least `samples_per_record` values of that
    /// signal; values outside the digital range are clamped.
    pub fn write_digital_samples(&mut self, samples: &[i32]) -> Result<()> {
        let signal = self.begin_signal_write()?;
        let param = &self.signals[signal];
        let spr = param.samples_per_record as usize;
        if samples.len() < spr {
            return Err(short_buffer(samples.len(), spr));
        }

        let width = self.file_type.sample_width();
        self.record_buf.clear();
        for &value in &samples[..spr] {
            encode_sample(&mut self.record_buf, value.clamp(param.digital_min, param.digital_max), width);
        }
        self.finish_signal_write()
    }

    /// Physical counterpart of [`EdfWriter::write_digital_samples`].
    pub fn write_physical_samples(&mut self, samples: &[f64]) -> Result<()> {
        let signal = self.begin_signal_write()?;
        let param = &self.signals[signal];
        let spr = param.samples_per_record as usize;
        if samples.len() < spr {
            return Err(short_buffer(samples.len(), spr));
        }

        let width = self.file_type.sample_width();
        self.record_buf.clear();
        for &value in &samples[..spr] {
            encode_sample(&mut self.record_buf, param.to_digital(value), width);
        }
        self.finish_signal_write()
    }

    /// Writes a complete data record: all signals back to back, each with
    /// its samples per record. Only allowed between records.
    pub fn blockwrite_digital_samples(&mut self, samples: &[i32]) -> Result<()> {
        let total = self.begin_block_write()?;
        if samples.len() < total {
            return Err(short_buffer(samples.len(), total));
        }

        let width = self.file_type.sample_width();
        self.record_buf.clear();
        let mut offset = 0;
        for param in &self.signals {
            let spr = param.samples_per_record as usize;
            for &value in &samples[offset..offset + spr] {
                encode_sample(&mut self.record_buf, value.clamp(param.digital_min, param.digital_max), width);
            }
            offset += spr;
        }
        self.finish_block_write()
    }

    /// Physical counterpart of [`EdfWriter::blockwrite_digital_samples`].
    pub fn blockwrite_physical_samples(&mut self, samples: &[f64]) -> Result<()> {
        let total = self.begin_block_write()?;
        if samples.len() < total {
            return Err(short_buffer(samples.len(), total));
        }

        let width = self.file_type.sample_width();
        self.record_buf.clear();
        let mut offset = 0;
        for param in &self.signals {
            let spr = param.samples_per_record as usize;
            for &value in &samples[offset..offset + spr] {
                encode_sample(&mut self.record_buf, param.to_digital(value), width);
            }
            offset += spr;
        }
        self.finish_block_write()
    }

    fn begin_signal_write(&mut self) -> Result<usize> {
        if self.signals.is_empty() {
            return Err(EdfError::NoSignals);
        }
        if !self.header_written {
            self.write_header()?;
        }
        Ok(self.sequence_pos)
    }

    fn finish_signal_write(&mut self) -> Result<()> {
        self.file.write_all(&self.record_buf).map_err(EdfError::WriteError)?;
        self.sequence_pos += 1;
        if self.sequence_pos == self.signals.len() {
            self.sequence_pos = 0;
            self.end_record()?;
        }
        Ok(())
    }

    fn begin_block_write(&mut self) -> Result<usize> {
        if self.signals.is_empty() {
            return Err(EdfError::NoSignals);
        }
        if self.sequence_pos != 0 {
            return Err(EdfError::InvalidArgument(
                "block write in the middle of a data record".to_string(),
            ));
        }
        if !self.header_written {
            self.write_header()?;
        }
        Ok(self.signals.iter().map(|s| s.samples_per_record as usize).sum())
    }

    fn finish_block_write(&mut self) -> Result<()> {
        self.file.write_all(&self.record_buf).map_err(EdfError::WriteError)?;
        self.end_record()
    }

    /// 写入注释通道占位符并结束当前数据记录
    fn end_record(&mut self) -> Result<()> {
        let elapsed = self.datarecords * self.datarecord_duration;
        self.file
            .write_all(&placeholder_record(elapsed))
            .map_err(EdfError::WriteError)?;
        self.datarecords += 1;
        Ok(())
    }

    /// Queues an annotation with UTF-8 text.
    ///
    /// `onset` and `duration` are in units of 100 ns relative to the start
    /// of the recording. The description is cut to 40 bytes and control
    /// characters are replaced with `.`.
    pub fn write_annotation_utf8(&mut self, onset: i64, duration: Option<i64>, description: &str) -> Result<()> {
        let text = truncate_utf8(description, EDFLIB_WRITE_MAX_ANNOTATION_LEN);
        let bytes = text.bytes().map(|b| if b < 32 { b'.' } else { b }).collect();
        self.queue_annotation(onset, duration, bytes)
    }

    /// Queues an annotation with Latin-1 text, converted to UTF-8.
    pub fn write_annotation_latin1(&mut self, onset: i64, duration: Option<i64>, description: &[u8]) -> Result<()> {
        let len = description.len().min(EDFLIB_WRITE_MAX_ANNOTATION_LEN);
        let bytes = latin1_to_utf8(&description[..len]);
        self.queue_annotation(onset, duration, bytes)
    }

    fn queue_annotation(&mut self, onset: i64, duration: Option<i64>, description: Vec<u8>) -> Result<()> {
        if onset < 0 {
            return Err(EdfError::InvalidArgument(format!("negative annotation onset {}", onset)));
        }
        if duration.map_or(false, |d| d < 0) {
            return Err(EdfError::InvalidArgument("negative annotation duration".to_string()));
        }
        self.annotations.push(PendingAnnotation { onset, duration, description });
        Ok(())
    }

    /// 构建并写入完整头部
    fn write_header(&mut self) -> Result<()> {
        let ns = self.signals.len();
        if ns == 0 {
            return Err(EdfError::NoSignals);
        }
        if ns > EDFLIB_MAXSIGNALS {
            return Err(EdfError::TooManySignals(ns));
        }
        for (i, s) in self.signals.iter().enumerate() {
            if s.samples_per_record < 1 {
                return Err(EdfError::NoSamplesInRecord(i));
            }
            if s.digital_max == s.digital_min {
                return Err(EdfError::DigitalMinEqualsMax(i));
            }
            if s.digital_max < s.digital_min {
                return Err(EdfError::DigitalMaxBelowMin(i));
            }
            if s.physical_max == s.physical_min {
                return Err(EdfError::PhysicalMinEqualsMax(i));
            }
        }

        let start = match self.start {
            Some(start) => start,
            None => {
                let now = Local::now();
                StartDateTime {
                    year: now.year(),
                    month: now.month(),
                    day: now.day(),
                    hour: now.hour(),
                    minute: now.minute(),
                    second: now.second() % 60,
                }
            }
        };
        self.start = Some(start);

        let header = self.build_header(start);
        self.file.seek(SeekFrom::Start(0)).map_err(EdfError::WriteError)?;
        self.file.write_all(&header).map_err(EdfError::WriteError)?;
        self.header_written = true;

        debug!(
            "wrote {:?} header for {} signals ({} bytes) to {}",
            self.file_type,
            ns,
            header.len(),
            self.path.display()
        );
        Ok(())
    }

    fn build_header(&self, start: StartDateTime) -> Vec<u8> {
        let ns = self.signals.len();
        let bdf = self.file_type.is_bdf();
        let mut hdr = Vec::with_capacity((ns + 2) * 256);

        if bdf {
            hdr.push(0xFF);
            hdr.extend_from_slice(b"BIOSEMI");
        } else {
            hdr.extend_from_slice(b"0       ");
        }

        // 患者字段
        let mut field = Vec::with_capacity(80);
        let mut rest = if self.birthdate.is_some() { 62 } else { 72 };
        push_subfield(&mut field, &self.patient_code, &mut rest);
        field.push(self.gender.unwrap_or(b'X'));
        field.push(b' ');
        match self.birthdate {
            Some((year, month, day)) => {
                field.extend_from_slice(plus_date(year, month, day).as_bytes());
                field.push(b' ');
            }
            None => field.extend_from_slice(b"X "),
        }
        push_subfield(&mut field, &self.patient_name, &mut rest);
        push_rest(&mut field, &self.patient_additional, rest);
        put_padded(&mut hdr, &field, 80);

        // 记录字段
        let mut field = Vec::with_capacity(80);
        field.extend_from_slice(b"Startdate ");
        field.extend_from_slice(plus_date(start.year, start.month, start.day).as_bytes());
        field.push(b' ');
        let mut rest = 42;
        push_subfield(&mut field, &self.admin_code, &mut rest);
        push_subfield(&mut field, &self.technician, &mut rest);
        push_subfield(&mut field, &self.equipment, &mut rest);
        push_rest(&mut field, &self.recording_additional, rest);
        put_padded(&mut hdr, &field, 80);

        let date = format!("{:02}.{:02}.{:02}", start.day, start.month, start.year % 100);
        let time = format!("{:02}.{:02}.{:02}", start.hour, start.minute, start.second);
        hdr.extend_from_slice(date.as_bytes());
        hdr.extend_from_slice(time.as_bytes());
        put_number(&mut hdr, (ns as i64 + 2) * 256, 8);
        let reserved: &[u8] = if bdf { b"BDF+C" } else { b"EDF+C" };
        put_padded(&mut hdr, reserved, 44);
        put_padded(&mut hdr, b"-1", 8);
        if self.datarecord_duration == EDFLIB_TIME_DIMENSION {
            put_padded(&mut hdr, b"1", 8);
        } else {
            let seconds = self.datarecord_duration as f64 / EDFLIB_TIME_DIMENSION as f64;
            put_padded(&mut hdr, sprint_number_nonlocalized(seconds).as_bytes(), 8);
        }
        put_number(&mut hdr, ns as i64 + 1, 4);

        // 信号字段, 注释通道始终在末尾
        let annotation_samples = (EDFLIB_ANNOTATION_BYTES / self.file_type.sample_width()) as i64;
        for s in &self.signals {
            put_padded(&mut hdr, &str_to_ascii(&s.label), 16);
        }
        put_padded(&mut hdr, self.file_type.annotation_label().as_bytes(), 16);
        for s in &self.signals {
            put_padded(&mut hdr, &str_to_ascii(&s.transducer), 80);
        }
        put_padded(&mut hdr, b"", 80);
        for s in &self.signals {
            put_padded(&mut hdr, &str_to_ascii(&s.physical_dimension), 8);
        }
        put_padded(&mut hdr, b"", 8);
        for s in &self.signals {
            put_padded(&mut hdr, sprint_number_nonlocalized(s.physical_min).as_bytes(), 8);
        }
        put_padded(&mut hdr, b"-1", 8);
        for s in &self.signals {
            put_padded(&mut hdr, sprint_number_nonlocalized(s.physical_max).as_bytes(), 8);
        }
        put_padded(&mut hdr, b"1", 8);
        for s in &self.signals {
            put_number(&mut hdr, i64::from(s.digital_min), 8);
        }
        put_number(&mut hdr, i64::from(self.file_type.digital_floor()), 8);
        for s in &self.signals {
            put_number(&mut hdr, i64::from(s.digital_max), 8);
        }
        put_number(&mut hdr, i64::from(self.file_type.digital_ceiling()), 8);
        for s in &self.signals {
            put_padded(&mut hdr, &str_to_ascii(&s.prefilter), 80);
        }
        put_padded(&mut hdr, b"", 80);
        for s in &self.signals {
            put_number(&mut hdr, i64::from(s.samples_per_record), 8);
        }
        put_number(&mut hdr, annotation_samples, 8);
        put_padded(&mut hdr, b"", (ns + 1) * 32);

        hdr
    }

    /// Finishes the file: fixes the record count and writes the queued
    /// annotations into the annotation channels.
    pub fn close(mut self) -> Result<()> {
        self.finish()
    }

    fn finish(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if !self.header_written {
            self.write_header()?;
        }

        let width = self.file_type.sample_width();
        let signal_bytes: usize = self
            .signals
            .iter()
            .map(|s| s.samples_per_record as usize * width)
            .sum();
        let header_size = (self.signals.len() as u64 + 2) * 256;
        let record_size = (signal_bytes + EDFLIB_ANNOTATION_BYTES) as u64;

        // 补零完成最后一条未写完的数据记录
        if self.sequence_pos != 0 {
            warn!(
                "{}: zero padding incomplete data record ({} of {} signals written)",
                self.path.display(),
                self.sequence_pos,
                self.signals.len()
            );
            self.record_buf.clear();
            for param in &self.signals[self.sequence_pos..] {
                let zero = 0.clamp(param.digital_min, param.digital_max);
                for _ in 0..param.samples_per_record {
                    encode_sample(&mut self.record_buf, zero, width);
                }
            }
            self.file.write_all(&self.record_buf).map_err(EdfError::WriteError)?;
            self.sequence_pos = 0;
            self.end_record()?;
        }

        // 没有数据记录时, 为每个注释写入一个空数据记录
        if self.datarecords == 0 && !self.annotations.is_empty() {
            self.file.seek(SeekFrom::Start(header_size)).map_err(EdfError::WriteError)?;
            for _ in 0..self.annotations.len() {
                self.record_buf.clear();
                self.record_buf.resize(signal_bytes, 0);
                self.file.write_all(&self.record_buf).map_err(EdfError::WriteError)?;
                self.end_record()?;
            }
        }

        if self.datarecords < 100_000_000 {
            self.file.seek(SeekFrom::Start(236)).map_err(EdfError::WriteError)?;
            let mut field = Vec::with_capacity(8);
            put_number(&mut field, self.datarecords, 8);
            self.file.write_all(&field).map_err(EdfError::WriteError)?;
        }

        let patched = self.annotations.len().min(self.datarecords.max(0) as usize);
        if patched < self.annotations.len() {
            warn!(
                "{}: {} annotations dropped, only {} data records written",
                self.path.display(),
                self.annotations.len() - patched,
                self.datarecords
            );
        }

        // 回写注释通道
        let mut offset = header_size + signal_bytes as u64;
        for (record, annotation) in self.annotations.iter().take(patched).enumerate() {
            let elapsed = record as i64 * self.datarecord_duration;
            self.file.seek(SeekFrom::Start(offset)).map_err(EdfError::WriteError)?;
            self.file
                .write_all(&annotated_record(elapsed, annotation))
                .map_err(EdfError::WriteError)?;
            offset += record_size;
        }
        self.file.flush().map_err(EdfError::WriteError)?;

        info!(
            "closed {}: {} data records, {} annotations",
            self.path.display(),
            self.datarecords,
            patched
        );
        Ok(())
    }
}

impl Drop for EdfWriter {
    fn drop(&mut self) {
        if !self.closed {
            warn!("{} dropped without close(), finishing it now", self.path.display());
            if let Err(e) = self.finish() {
                warn!("{}: finishing on drop failed: {}", self.path.display(), e);
            }
        }
    }
}

fn short_buffer(got: usize, needed: usize) -> EdfError {
    EdfError::InvalidArgument(format!("{} samples given, {} needed", got, needed))
}

/// Little-endian, 2 bytes for EDF and 3 bytes for BDF.
pub(crate) fn encode_sample(out: &mut Vec<u8>, value: i32, width: usize) {
    out.extend_from_slice(&value.to_le_bytes()[..width]);
}

/// Trims spaces and cuts to `width` bytes on a character boundary.
fn header_text(value: &str, width: usize) -> String {
    truncate_utf8(value, width).trim_matches(' ').to_string()
}

fn truncate_utf8(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }
    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

/// `dd-MMM-yyyy`
fn plus_date(year: i32, month: u32, day: u32) -> String {
    let name = MONTHS.get(month.wrapping_sub(1) as usize).copied().unwrap_or("UND");
    format!("{:02}-{}-{}", day, name, format_ll_number_nonlocalized(i64::from(year), 4, false))
}

/// Appends a space free sub-field (`X` when empty), sharing the `rest`
/// character budget of the header field.
fn push_subfield(out: &mut Vec<u8>, value: &str, rest: &mut usize) {
    if value.is_empty() || *rest == 0 {
        out.extend_from_slice(b"X ");
        return;
    }
    let mut text = str_to_ascii(value);
    if text.len() > *rest {
        text.truncate(*rest);
        *rest = 0;
    } else {
        *rest -= text.len();
    }
    out.extend(text.into_iter().map(|b| if b == b' ' { b'_' } else { b }));
    out.push(b' ');
}

fn push_rest(out: &mut Vec<u8>, value: &str, rest: usize) {
    if value.is_empty() || rest == 0 {
        return;
    }
    let mut text = str_to_ascii(value);
    text.truncate(rest);
    out.extend_from_slice(&text);
}

/// 左对齐并以空格填充到固定宽度
fn put_padded(out: &mut Vec<u8>, text: &[u8], width: usize) {
    let len = text.len().min(width);
    out.extend_from_slice(&text[..len]);
    out.resize(out.len() + width - len, b' ');
}

fn put_number(out: &mut Vec<u8>, value: i64, width: usize) {
    put_padded(out, format_ll_number_nonlocalized(value, 0, false).as_bytes(), width);
}
