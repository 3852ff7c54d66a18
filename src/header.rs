//! Parsing and validation of the fixed EDF/BDF header.
//!
//! The global header is 256 bytes, followed by one 256 byte block per signal
//! whose fields are grouped by kind (all labels, then all transducers, ...).
//! Any violation rejects the whole file; there is no best-effort parse.

use std::io::{Read, Seek, SeekFrom};

use chrono::{NaiveDate, NaiveTime};
use log::debug;

use crate::error::{EdfError, Result};
use crate::types::{EdfHeader, FileType, SignalParam};
use crate::utils::{atof_nonlocalized, get_long_duration, is_integer_number, is_number};
use crate::EDFLIB_MAXSIGNALS;

pub(crate) const MONTHS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

const EDF_MAX_RECORD_SIZE: usize = 10 * 1024 * 1024;
const BDF_MAX_RECORD_SIZE: usize = 15 * 1024 * 1024;

/// One signal as stored in the file, annotation channels included.
#[derive(Debug, Clone)]
pub(crate) struct ChannelLayout {
    pub param: SignalParam,
    pub annotation: bool,
    /// 信号在数据记录中的字节偏移
    pub buf_offset: usize,
}

/// Everything the reader needs to address samples, plus the public header.
#[derive(Debug)]
pub(crate) struct HeaderInfo {
    pub header: EdfHeader,
    pub discontinuous: bool,
    pub header_size: u64,
    pub record_size: usize,
    pub channels: Vec<ChannelLayout>,
    /// Indices into `channels` of the annotation channels, file order
    pub annotation_channels: Vec<usize>,
    /// Public signal number to index into `channels`
    pub mapped_signals: Vec<usize>,
}

impl HeaderInfo {
    pub fn file_type(&self) -> FileType {
        self.header.file_type
    }

    pub fn datarecords(&self) -> i64 {
        self.header.datarecords_in_file
    }
}

/// Returns the `width` byte field at `offset` as text, rejecting anything
/// outside printable ASCII.
fn printable_field<'a>(hdr: &'a [u8], offset: usize, width: usize, what: &str) -> Result<&'a str> {
    let bytes = &hdr[offset..offset + width];
    if bytes.iter().any(|&b| !(32..=126).contains(&b)) {
        return Err(EdfError::format(format!("{} contains non printable characters", what)));
    }
    std::str::from_utf8(bytes).map_err(|_| EdfError::format(what.to_string()))
}

fn is_digit_at(bytes: &[u8], positions: &[usize]) -> bool {
    positions.iter().all(|&i| bytes.get(i).map_or(false, u8::is_ascii_digit))
}

fn read_exact_alloc<R: Read>(input: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|_| EdfError::MemoryError)?;
    buf.resize(len, 0);
    input.read_exact(&mut buf)?;
    Ok(buf)
}

/// 解析并验证文件头部
pub(crate) fn check_edf_file<R: Read + Seek>(input: &mut R) -> Result<HeaderInfo> {
    input.seek(SeekFrom::Start(0))?;
    let main = read_exact_alloc(input, 256)?;

    let is_bdf = parse_version(&main)?;

    let patient = printable_field(&main, 8, 80, "patient field")?.to_string();
    let recording = printable_field(&main, 88, 80, "recording field")?.to_string();
    let (day, month, yy) = parse_start_date(&main)?;
    let start_time = parse_start_time(&main)?;

    let signals_field = printable_field(&main, 252, 4, "number of signals")?;
    if !is_integer_number(signals_field) {
        return Err(EdfError::format("number of signals"));
    }
    let edfsignals = atof_nonlocalized(signals_field) as i64;
    if edfsignals < 1 || edfsignals > EDFLIB_MAXSIGNALS as i64 {
        return Err(EdfError::format(format!("number of signals {} out of range", edfsignals)));
    }
    let edfsignals = edfsignals as usize;

    let size_field = printable_field(&main, 184, 8, "header size")?;
    if !is_integer_number(size_field) {
        return Err(EdfError::format("header size"));
    }
    let header_size = atof_nonlocalized(size_field) as i64;
    if header_size != (edfsignals as i64 + 1) * 256 {
        return Err(EdfError::format(format!(
            "header size {} does not match {} signals",
            header_size, edfsignals
        )));
    }

    let reserved = printable_field(&main, 192, 44, "reserved field")?;
    let (file_type, discontinuous) = match (is_bdf, &reserved[..5]) {
        (false, "EDF+C") => (FileType::EdfPlus, false),
        (false, "EDF+D") => (FileType::EdfPlus, true),
        (true, "BDF+C") => (FileType::BdfPlus, false),
        (true, "BDF+D") => (FileType::BdfPlus, true),
        (false, _) => (FileType::Edf, false),
        (true, _) => (FileType::Bdf, false),
    };

    let records_field = printable_field(&main, 236, 8, "number of data records")?;
    if !is_integer_number(records_field) {
        return Err(EdfError::format("number of data records"));
    }
    let datarecords = atof_nonlocalized(records_field) as i64;
    if datarecords < 1 {
        return Err(EdfError::format("number of data records must be at least 1"));
    }

    let duration_field = printable_field(&main, 244, 8, "data record duration")?;
    if !is_number(duration_field) {
        return Err(EdfError::format("data record duration"));
    }
    let data_record_duration = atof_nonlocalized(duration_field);
    if data_record_duration < -0.000001 {
        return Err(EdfError::format("negative data record duration"));
    }
    let long_data_record_duration = get_long_duration(duration_field);

    // 读取信号头部信息
    let block = read_exact_alloc(input, edfsignals * 256)?;
    let mut channels = parse_signal_block(&block, edfsignals, file_type)?;

    let annotation_channels: Vec<usize> = channels
        .iter()
        .enumerate()
        .filter(|(_, ch)| ch.annotation)
        .map(|(i, _)| i)
        .collect();

    if file_type.is_plus() && annotation_channels.is_empty() {
        return Err(EdfError::format("EDF+/BDF+ file without annotation channel"));
    }
    if (annotation_channels.len() != edfsignals || !file_type.is_plus())
        && data_record_duration < 0.0000001
    {
        return Err(EdfError::format("data record duration is zero"));
    }

    let sample_width = file_type.sample_width();
    let mut record_size = 0usize;
    for ch in channels.iter_mut() {
        ch.buf_offset = record_size;
        record_size += ch.param.samples_per_record as usize * sample_width;
        ch.param.samples_in_file = i64::from(ch.param.samples_per_record) * datarecords;
    }
    let max_record = if file_type.is_bdf() { BDF_MAX_RECORD_SIZE } else { EDF_MAX_RECORD_SIZE };
    if record_size > max_record {
        return Err(EdfError::format(format!("data record size {} too large", record_size)));
    }

    let mut header = EdfHeader {
        file_type,
        signals: Vec::new(),
        file_duration: long_data_record_duration * datarecords,
        start_date: NaiveDate::MIN,
        start_time,
        starttime_subsecond: 0,
        datarecords_in_file: datarecords,
        datarecord_duration: long_data_record_duration,
        annotations_in_file: 0,
        patient: String::new(),
        recording: String::new(),
        patient_code: String::new(),
        gender: String::new(),
        birthdate: String::new(),
        patient_name: String::new(),
        patient_additional: String::new(),
        admin_code: String::new(),
        technician: String::new(),
        equipment: String::new(),
        recording_additional: String::new(),
    };

    let mut year = if yy > 84 { 1900 + yy } else { 2000 + yy };
    if file_type.is_plus() {
        parse_plus_patient(patient.as_bytes(), &mut header)?;
        if let Some(full_year) = parse_plus_recording(recording.as_bytes(), (day, month, yy), &mut header)? {
            year = full_year;
        }
    } else {
        header.patient = patient;
        header.recording = recording;
    }

    header.start_date = NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| EdfError::format(format!("invalid start date {:02}.{:02}.{}", day, month, year)))?;

    // 验证文件大小
    let hdrsize = (edfsignals as u64 + 1) * 256;
    let file_len = input.seek(SeekFrom::End(0))?;
    if file_len != hdrsize + record_size as u64 * datarecords as u64 {
        return Err(EdfError::format(format!(
            "file size {} does not match header ({} records of {} bytes)",
            file_len, datarecords, record_size
        )));
    }

    let mapped_signals: Vec<usize> = channels
        .iter()
        .enumerate()
        .filter(|(_, ch)| !ch.annotation)
        .map(|(i, _)| i)
        .collect();
    header.signals = mapped_signals.iter().map(|&i| channels[i].param.clone()).collect();

    debug!(
        "parsed {:?} header: {} signals ({} annotation), {} records of {} bytes",
        file_type,
        edfsignals,
        annotation_channels.len(),
        datarecords,
        record_size
    );

    Ok(HeaderInfo {
        header,
        discontinuous,
        header_size: hdrsize,
        record_size,
        channels,
        annotation_channels,
        mapped_signals,
    })
}

/// Returns `true` for BDF, `false` for EDF.
fn parse_version(main: &[u8]) -> Result<bool> {
    if main[0] == 0xFF {
        let rest = printable_field(main, 1, 7, "version")?;
        if rest != "BIOSEMI" {
            return Err(EdfError::format("BDF version field is not BIOSEMI"));
        }
        Ok(true)
    } else {
        let version = printable_field(main, 0, 8, "version")?;
        if version != "0       " {
            return Err(EdfError::format("EDF version field is not 0"));
        }
        Ok(false)
    }
}

/// `dd.mm.yy` at offset 168; returns day, month and the two digit year.
fn parse_start_date(main: &[u8]) -> Result<(u32, u32, i32)> {
    let date = printable_field(main, 168, 8, "start date")?;
    let bytes = date.as_bytes();
    if bytes[2] != b'.' || bytes[5] != b'.' || !is_digit_at(bytes, &[0, 1, 3, 4, 6, 7]) {
        return Err(EdfError::format("start date is not dd.mm.yy"));
    }
    let day = atof_nonlocalized(&date[0..2]) as u32;
    let month = atof_nonlocalized(&date[3..5]) as u32;
    let yy = atof_nonlocalized(&date[6..8]) as i32;
    if !(1..=31).contains(&day) || !(1..=12).contains(&month) {
        return Err(EdfError::format("start date out of range"));
    }
    Ok((day, month, yy))
}

/// `hh.mm.ss` at offset 176.
fn parse_start_time(main: &[u8]) -> Result<NaiveTime> {
    let time = printable_field(main, 176, 8, "start time")?;
    let bytes = time.as_bytes();
    if bytes[2] != b'.' || bytes[5] != b'.' || !is_digit_at(bytes, &[0, 1, 3, 4, 6, 7]) {
        return Err(EdfError::format("start time is not hh.mm.ss"));
    }
    let hour = atof_nonlocalized(&time[0..2]) as u32;
    let minute = atof_nonlocalized(&time[3..5]) as u32;
    let second = atof_nonlocalized(&time[6..8]) as u32;
    NaiveTime::from_hms_opt(hour, minute, second)
        .filter(|_| hour <= 23 && minute <= 59 && second <= 59)
        .ok_or_else(|| EdfError::format("start time out of range"))
}

/// 解析信号参数 block (N x 256 bytes, grouped by field).
fn parse_signal_block(block: &[u8], ns: usize, file_type: FileType) -> Result<Vec<ChannelLayout>> {
    let plus = file_type.is_plus();
    let floor = file_type.digital_floor();
    let ceiling = file_type.digital_ceiling();
    let mut channels = Vec::with_capacity(ns);

    for i in 0..ns {
        let label = printable_field(block, i * 16, 16, "signal label")?;
        let annotation = plus && label == file_type.annotation_label();

        let transducer = printable_field(block, ns * 16 + i * 80, 80, "transducer")?;
        if annotation && transducer.bytes().any(|b| b != b' ') {
            return Err(EdfError::format("annotation channel transducer must be blank"));
        }

        let physical_dimension = printable_field(block, ns * 96 + i * 8, 8, "physical dimension")?;

        let phys_min_field = printable_field(block, ns * 104 + i * 8, 8, "physical minimum")?;
        if !is_number(phys_min_field) {
            return Err(EdfError::format(format!("physical minimum of signal {}", i)));
        }
        let physical_min = atof_nonlocalized(phys_min_field);

        let phys_max_field = printable_field(block, ns * 112 + i * 8, 8, "physical maximum")?;
        if !is_number(phys_max_field) {
            return Err(EdfError::format(format!("physical maximum of signal {}", i)));
        }
        let physical_max = atof_nonlocalized(phys_max_field);
        if physical_max == physical_min {
            return Err(EdfError::format(format!("signal {}: physical min equals max", i)));
        }

        let digital_min = parse_digital(block, ns * 120 + i * 8, "digital minimum", floor, ceiling)?;
        if annotation && digital_min != floor {
            return Err(EdfError::format("annotation channel digital minimum"));
        }

        let digital_max = parse_digital(block, ns * 128 + i * 8, "digital maximum", floor, ceiling)?;
        if annotation && digital_max != ceiling {
            return Err(EdfError::format("annotation channel digital maximum"));
        }
        if i64::from(digital_max) < i64::from(digital_min) + 1 {
            return Err(EdfError::format(format!("signal {}: digital max not above digital min", i)));
        }

        let prefilter = printable_field(block, ns * 136 + i * 80, 80, "prefilter")?;
        if annotation && prefilter.bytes().any(|b| b != b' ') {
            return Err(EdfError::format("annotation channel prefilter must be blank"));
        }

        let samples_field = printable_field(block, ns * 216 + i * 8, 8, "samples per record")?;
        if !is_integer_number(samples_field) {
            return Err(EdfError::format(format!("samples per record of signal {}", i)));
        }
        let samples_per_record = atof_nonlocalized(samples_field) as i64;
        if samples_per_record < 1 || samples_per_record > i64::from(i32::MAX) {
            return Err(EdfError::format(format!("signal {} has no samples per record", i)));
        }

        printable_field(block, ns * 224 + i * 32, 32, "signal reserved field")?;

        channels.push(ChannelLayout {
            param: SignalParam {
                label: label.trim_end_matches(' ').to_string(),
                samples_in_file: 0,
                physical_max,
                physical_min,
                digital_max,
                digital_min,
                samples_per_record: samples_per_record as i32,
                physical_dimension: physical_dimension.trim_end_matches(' ').to_string(),
                prefilter: prefilter.trim_end_matches(' ').to_string(),
                transducer: transducer.trim_end_matches(' ').to_string(),
            },
            annotation,
            buf_offset: 0,
        });
    }

    Ok(channels)
}

fn parse_digital(block: &[u8], offset: usize, what: &str, floor: i32, ceiling: i32) -> Result<i32> {
    let field = printable_field(block, offset, 8, what)?;
    if !is_integer_number(field) {
        return Err(EdfError::format(what.to_string()));
    }
    let value = atof_nonlocalized(field) as i64;
    if value < i64::from(floor) || value > i64::from(ceiling) {
        return Err(EdfError::format(format!("{} {} out of range", what, value)));
    }
    Ok(value as i32)
}

/// Validates `dd-MMM-yyyy`; returns day, month number and year.
fn parse_plus_date(token: &[u8]) -> Option<(u32, u32, i32)> {
    if token.len() < 11 || token[2] != b'-' || token[6] != b'-' {
        return None;
    }
    if !is_digit_at(token, &[0, 1, 7, 8, 9, 10]) {
        return None;
    }
    let text = std::str::from_utf8(&token[..11]).ok()?;
    let day = atof_nonlocalized(&text[0..2]) as u32;
    if !(1..=31).contains(&day) {
        return None;
    }
    let month = MONTHS.iter().position(|m| *m == &text[3..6])? as u32 + 1;
    let year = atof_nonlocalized(&text[7..11]) as i32;
    Some((day, month, year))
}

/// `dd-MMM-yyyy` to `dd mmm yyyy`.
fn display_plus_date(token: &[u8]) -> String {
    let mut out: Vec<u8> = token.iter().take(11).copied().collect();
    if out.len() == 11 {
        out[2] = b' ';
        out[6] = b' ';
        out[3..6].make_ascii_lowercase();
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Reads a space delimited token starting at `*p` and advances past the
/// delimiter.
fn next_token<'a>(field: &'a [u8], p: &mut usize) -> &'a [u8] {
    let start = (*p).min(field.len());
    let len = field[start..].iter().position(|&b| b == b' ').unwrap_or(field.len() - start);
    *p = start + len + 1;
    &field[start..start + len]
}

fn decode_subfield(token: &[u8]) -> String {
    if token == b"X" {
        return String::new();
    }
    token.iter().map(|&b| if b == b'_' { ' ' } else { b as char }).collect()
}

fn rest_of(field: &[u8], p: usize) -> String {
    let rest = &field[p.min(field.len())..];
    String::from_utf8_lossy(rest).trim_end_matches(' ').to_string()
}

/// EDF+ 患者字段: `code sex birthdate name [additional]`
fn parse_plus_patient(field: &[u8], header: &mut EdfHeader) -> Result<()> {
    let at = |i: usize| field.get(i).copied().unwrap_or(b' ');
    let bad = || EdfError::format("EDF+ patient field");

    let dp = field.iter().position(|&b| b == b' ').unwrap_or(0) + 1;
    if !(2..=73).contains(&dp) {
        return Err(bad());
    }
    if at(dp + 2) != b'X' && dp > 65 {
        return Err(bad());
    }
    if !matches!(at(dp), b'M' | b'F' | b'X') || at(dp + 1) != b' ' {
        return Err(bad());
    }
    let birth = dp + 2;
    if at(birth) == b'X' {
        if at(birth + 1) != b' ' || at(birth + 2) == b' ' {
            return Err(bad());
        }
    } else {
        if at(birth + 11) != b' ' || at(birth + 12) == b' ' {
            return Err(bad());
        }
        parse_plus_date(&field[birth..]).ok_or_else(bad)?;
    }

    let mut p = 0;
    header.patient_code = decode_subfield(next_token(field, &mut p));
    header.gender = match next_token(field, &mut p).first() {
        Some(b'M') => "Male".to_string(),
        Some(b'F') => "Female".to_string(),
        _ => String::new(),
    };
    let birthdate = next_token(field, &mut p);
    header.birthdate = if birthdate == b"X" { String::new() } else { display_plus_date(birthdate) };
    header.patient_name = decode_subfield(next_token(field, &mut p));
    header.patient_additional = rest_of(field, p);
    Ok(())
}

/// EDF+ 记录字段: `Startdate dd-MMM-yyyy admincode technician equipment [additional]`
///
/// Returns the four digit start year when the field carries a date.
fn parse_plus_recording(
    field: &[u8],
    plain_date: (u32, u32, i32),
    header: &mut EdfHeader,
) -> Result<Option<i32>> {
    let at = |i: usize| field.get(i).copied().unwrap_or(b' ');
    let bad = |what: &str| EdfError::format(format!("EDF+ recording field: {}", what));

    if !field.starts_with(b"Startdate ") {
        return Err(bad("missing Startdate"));
    }

    let mut embedded = None;
    let p = if at(10) == b'X' {
        if at(11) != b' ' || at(12) == b' ' {
            return Err(bad("startdate"));
        }
        12
    } else {
        if at(21) != b' ' || at(22) == b' ' {
            return Err(bad("startdate"));
        }
        embedded = Some(parse_plus_date(&field[10..]).ok_or_else(|| bad("startdate"))?);
        22
    };

    // 管理码与技术员之间必须只有单个空格
    let mut spaces = 0;
    let mut i = p;
    loop {
        if i > 78 {
            return Err(bad("too few subfields"));
        }
        if at(i) == b' ' {
            spaces += 1;
            if at(i + 1) == b' ' {
                return Err(bad("double space"));
            }
        }
        if spaces > 1 {
            break;
        }
        i += 1;
    }

    let mut year = None;
    if let Some((day, month, full_year)) = embedded {
        let (plain_day, plain_month, plain_yy) = plain_date;
        if day != plain_day || month != plain_month || full_year % 100 != plain_yy {
            return Err(bad("startdate does not match the header start date"));
        }
        if full_year < 1970 {
            return Err(bad("start year before 1970"));
        }
        year = Some(full_year);
    }

    let mut p = 10;
    next_token(field, &mut p);
    header.admin_code = decode_subfield(next_token(field, &mut p));
    header.technician = decode_subfield(next_token(field, &mut p));
    header.equipment = decode_subfield(next_token(field, &mut p));
    header.recording_additional = rest_of(field, p);
    Ok(year)
}
