//! Time-stamped Annotation Lists (TAL).
//!
//! A TAL is `+onset[\x15duration]\x14description\x14[description\x14...]\x00`.
//! The first TAL of the first annotation channel in every record carries no
//! description and records the start time of that record.

use std::io::{Read, Seek, SeekFrom};

use log::debug;

use crate::error::{EdfError, Result};
use crate::header::HeaderInfo;
use crate::types::{Annotation, AnnotationMode};
use crate::utils::{format_tal_time, get_long_time, is_duration_number, is_onset_number};
use crate::{EDFLIB_ANNOTATION_BYTES, EDFLIB_MAX_ANNOTATION_LEN, EDFLIB_TIME_DIMENSION};

const TAL_END: u8 = 20;
const TAL_DURATION: u8 = 21;
const MAX_DURATION_LEN: usize = 15;

/// Result of walking every annotation channel of a file.
#[derive(Debug, Default)]
pub(crate) struct Extracted {
    pub annotations: Vec<Annotation>,
    /// Onset of the timekeeping TAL of record 0, always below one second
    pub starttime_subsecond: i64,
}

/// Walks all data records and decodes the annotation channels.
pub(crate) fn extract_annotations<R: Read + Seek>(
    input: &mut R,
    info: &HeaderInfo,
    mode: AnnotationMode,
) -> Result<Extracted> {
    let mut extracted = Extracted::default();
    if mode == AnnotationMode::DoNotRead || info.annotation_channels.is_empty() {
        return Ok(extracted);
    }

    let width = info.file_type().sample_width();
    let record_duration = info.header.datarecord_duration;
    let mut record = Vec::new();
    record.try_reserve_exact(info.record_size).map_err(|_| EdfError::MemoryError)?;
    record.resize(info.record_size, 0);

    input.seek(SeekFrom::Start(info.header_size))?;
    let mut elapsed = 0i64;

    for index in 0..info.datarecords() {
        input.read_exact(&mut record)?;

        for (r, &ch) in info.annotation_channels.iter().enumerate() {
            let layout = &info.channels[ch];
            let len = layout.param.samples_per_record as usize * width;
            let span = &record[layout.buf_offset..layout.buf_offset + len];

            if span[len - 1] != 0 {
                return Err(tal_error(index, "annotation channel is not zero terminated"));
            }

            if r == 0 {
                let time = timekeeping_onset(span).ok_or_else(|| tal_error(index, "bad timekeeping TAL"))?;
                if index > 0 {
                    let step = time - elapsed;
                    // EdfReader 目前拒绝 +D 文件, 这里仍按 +D 规则只检查重叠
                    if info.discontinuous && step < record_duration {
                        return Err(tal_error(index, "data records overlap in time"));
                    }
                    if !info.discontinuous && step != record_duration {
                        return Err(tal_error(index, "data record is not contiguous"));
                    }
                } else {
                    if time >= EDFLIB_TIME_DIMENSION {
                        return Err(tal_error(index, "start time offset is one second or more"));
                    }
                    extracted.starttime_subsecond = time;
                }
                elapsed = time;
            }

            let stop = parse_tal_channel(span, r == 0, mode, &mut extracted.annotations)
                .map_err(|reason| tal_error(index, reason))?;
            if stop {
                debug!("\"Recording ends\" found in data record {}, stopping annotation scan", index);
                return Ok(extracted);
            }
        }
    }

    debug!(
        "extracted {} annotations from {} data records",
        extracted.annotations.len(),
        info.datarecords()
    );
    Ok(extracted)
}

fn tal_error(record: i64, reason: &str) -> EdfError {
    EdfError::format(format!("data record {}: {}", record, reason))
}

/// Longest prefix of at most `max` bytes that doesn't split a UTF-8 sequence.
fn utf8_prefix_len(text: &[u8], max: usize) -> usize {
    let mut len = text.len().min(max);
    while len > 0 && len < text.len() && text[len] & 0xC0 == 0x80 {
        len -= 1;
    }
    len
}

/// Onset of the first TAL, which must be `+onset\x14\x14`.
fn timekeeping_onset(span: &[u8]) -> Option<i64> {
    let limit = span.len().saturating_sub(2);
    let end = span[..limit].iter().position(|&b| b == TAL_END)?;
    if span[end + 1] != TAL_END {
        return None;
    }
    let onset = std::str::from_utf8(&span[..end]).ok()?;
    if !is_onset_number(onset) {
        return None;
    }
    Some(get_long_time(onset))
}

/// TAL 状态机
///
/// Returns `Ok(true)` when a "Recording ends" annotation asks the caller to
/// stop scanning.
fn parse_tal_channel(
    span: &[u8],
    timekeeping: bool,
    mode: AnnotationMode,
    out: &mut Vec<Annotation>,
) -> std::result::Result<bool, &'static str> {
    let mut field: Vec<u8> = Vec::with_capacity(span.len());
    let mut onset_text = String::new();
    let mut duration_text = String::new();
    let mut zeros = 0usize;
    let mut has_onset = false;
    let mut has_duration = false;
    let mut duration_start = false;
    let mut annots_in_tal = 0usize;
    let mut annots_in_record = 0usize;

    for (k, &b) in span.iter().enumerate() {
        if b == 0 {
            if zeros == 0 {
                if k > 0 && span[k - 1] != TAL_END {
                    return Err("TAL not closed before padding");
                }
                field.clear();
                has_onset = false;
                has_duration = false;
                duration_start = false;
                annots_in_tal = 0;
            }
            zeros += 1;
            continue;
        }
        if zeros > 1 {
            return Err("text after padding");
        }
        zeros = 0;

        if b == TAL_DURATION {
            if has_duration || duration_start || has_onset || annots_in_tal > 0 {
                return Err("misplaced duration field");
            }
            duration_start = true;
        }

        if b == TAL_END || b == TAL_DURATION {
            if b == TAL_END && has_onset && !duration_start {
                // 第一个注释通道的第一个TAL是计时TAL
                if !timekeeping || annots_in_record > 0 {
                    let len = utf8_prefix_len(&field, EDFLIB_MAX_ANNOTATION_LEN);
                    let annotation = Annotation {
                        onset: get_long_time(&onset_text),
                        duration: if has_duration { duration_text.clone() } else { String::new() },
                        description: String::from_utf8_lossy(&field[..len]).into_owned(),
                    };
                    let ends = annotation.description.starts_with("Recording ends");
                    out.push(annotation);
                    if mode == AnnotationMode::ReadAnnotations && ends {
                        return Ok(true);
                    }
                }
                annots_in_tal += 1;
                annots_in_record += 1;
                field.clear();
                continue;
            }

            if !has_onset {
                let text = std::str::from_utf8(&field).map_err(|_| "malformed onset")?;
                if !is_onset_number(text) {
                    return Err("malformed onset");
                }
                onset_text = text.to_string();
                has_onset = true;
                field.clear();
                continue;
            }

            if duration_start {
                let text = std::str::from_utf8(&field).map_err(|_| "malformed duration")?;
                if !is_duration_number(text) {
                    return Err("malformed duration");
                }
                duration_text = text.chars().take(MAX_DURATION_LEN).collect();
                has_duration = true;
                duration_start = false;
                field.clear();
                continue;
            }
        }

        field.push(b);
    }

    Ok(false)
}

/// An annotation queued by the writer, times in 100 ns units.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PendingAnnotation {
    pub onset: i64,
    pub duration: Option<i64>,
    /// UTF-8, already truncated and cleaned
    pub description: Vec<u8>,
}

/// `+elapsed\x14\x14`, the TAL every record starts with.
fn timekeeping_tal(out: &mut Vec<u8>, elapsed: i64) {
    out.extend_from_slice(format_tal_time(elapsed, 1, 7).as_bytes());
    out.push(TAL_END);
    out.push(TAL_END);
}

fn pad_annotation_bytes(mut out: Vec<u8>) -> Vec<u8> {
    out.resize(EDFLIB_ANNOTATION_BYTES, 0);
    out
}

/// Annotation channel content written while streaming: timekeeping only.
pub(crate) fn placeholder_record(elapsed: i64) -> Vec<u8> {
    let mut out = Vec::with_capacity(EDFLIB_ANNOTATION_BYTES);
    timekeeping_tal(&mut out, elapsed);
    pad_annotation_bytes(out)
}

/// Annotation channel content rewritten at close: timekeeping plus one event.
pub(crate) fn annotated_record(elapsed: i64, annotation: &PendingAnnotation) -> Vec<u8> {
    let mut out = Vec::with_capacity(EDFLIB_ANNOTATION_BYTES);
    timekeeping_tal(&mut out, elapsed);
    out.push(0);
    out.extend_from_slice(format_tal_time(annotation.onset, 1, 7).as_bytes());
    if let Some(duration) = annotation.duration {
        out.push(TAL_DURATION);
        out.extend_from_slice(format_tal_time(duration, 1, 7).trim_start_matches('+').as_bytes());
    }
    out.push(TAL_END);
    out.extend_from_slice(&annotation.description);
    out.push(TAL_END);
    pad_annotation_bytes(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::check_edf_file;
    use crate::header::tests::sample_edfplus_channels;
    use std::io::Cursor;

    fn span(parts: &[&[u8]], len: usize) -> Vec<u8> {
        let mut out: Vec<u8> = parts.concat();
        out.resize(len, 0);
        out
    }

    #[test]
    fn test_timekeeping_onset() {
        assert_eq!(timekeeping_onset(&span(&[b"+1.5\x14\x14"], 32)), Some(15_000_000));
        assert_eq!(timekeeping_onset(&span(&[b"+1.5\x14x"], 32)), None);
        assert_eq!(timekeeping_onset(&span(&[b"1.5\x14\x14"], 32)), None);
        assert_eq!(timekeeping_onset(&[0u8; 32]), None);
    }

    #[test]
    fn test_parse_tal_channel() {
        let data = span(
            &[b"+0\x14\x14\x00", b"+0.25\x151.5\x14Eyes closed\x14\x00", b"+3\x14A\x14B\x14\x00"],
            114,
        );
        let mut out = Vec::new();
        let stop = parse_tal_channel(&data, true, AnnotationMode::ReadAllAnnotations, &mut out).unwrap();
        assert!(!stop);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].onset, 2_500_000);
        assert_eq!(out[0].duration, "1.5");
        assert_eq!(out[0].description, "Eyes closed");
        assert_eq!(out[1].description, "A");
        assert_eq!(out[2].description, "B");
        assert_eq!(out[2].onset, 30_000_000);
        assert!(out[2].duration.is_empty());
    }

    #[test]
    fn test_recording_ends_stops_only_in_read_mode() {
        let data = span(&[b"+0\x14\x14\x00", b"+9\x14Recording ends\x14\x00"], 64);
        let mut out = Vec::new();
        assert!(parse_tal_channel(&data, true, AnnotationMode::ReadAnnotations, &mut out).unwrap());
        let mut out = Vec::new();
        assert!(!parse_tal_channel(&data, true, AnnotationMode::ReadAllAnnotations, &mut out).unwrap());
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_parse_tal_rejects_malformed() {
        let cases: Vec<Vec<u8>> = vec![
            span(&[b"+0\x14\x14\x00", b"+1\x151\x152\x14x\x14\x00"], 64), // two durations
            span(&[b"+0\x14\x14\x00\x00", b"+1\x14x\x14\x00"], 64),        // text after padding
            span(&[b"+0\x14\x14\x00", b"1\x14x\x14\x00"], 64),             // unsigned onset
            span(&[b"+0\x14\x14\x00", b"+1\x15.5\x14x\x14\x00"], 64),      // bad duration
            span(&[b"+0\x14\x14x\x00"], 64),                               // unterminated TAL
        ];
        for data in cases {
            let mut out = Vec::new();
            assert!(parse_tal_channel(&data, true, AnnotationMode::ReadAllAnnotations, &mut out).is_err());
        }
    }

    #[test]
    fn test_second_channel_has_no_timekeeping() {
        let data = span(&[b"+0.5\x14first\x14\x00"], 64);
        let mut out = Vec::new();
        parse_tal_channel(&data, false, AnnotationMode::ReadAllAnnotations, &mut out).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].description, "first");
    }

    /// 写入合成文件中某条记录的某个注释通道
    fn put_tal(file: &mut [u8], channels: usize, record: usize, channel: usize, tal: &[u8]) {
        let header = (channels + 2) * 256;
        let record_size = 8 + 16 * channels;
        let at = header + record * record_size + 8 + channel * 16;
        file[at..at + tal.len()].copy_from_slice(tal);
    }

    fn extract(file: Vec<u8>, mode: AnnotationMode) -> Result<Extracted> {
        let mut input = Cursor::new(file);
        let info = check_edf_file(&mut input)?;
        extract_annotations(&mut input, &info, mode)
    }

    #[test]
    fn test_extract_from_two_annotation_channels() {
        let mut file = sample_edfplus_channels(2, 2);
        put_tal(&mut file, 2, 0, 0, b"+0\x14\x14\x00");
        put_tal(&mut file, 2, 0, 1, b"+0.5\x14Stim\x14\x00");
        put_tal(&mut file, 2, 1, 0, b"+1\x14\x14\x00+1.2\x14Evt\x14\x00");
        put_tal(&mut file, 2, 1, 1, b"+1.7\x14Late\x14\x00");

        let extracted = extract(file, AnnotationMode::ReadAnnotations).unwrap();
        assert_eq!(extracted.starttime_subsecond, 0);
        let found: Vec<(i64, &str)> = extracted
            .annotations
            .iter()
            .map(|a| (a.onset, a.description.as_str()))
            .collect();
        assert_eq!(found, vec![(5_000_000, "Stim"), (12_000_000, "Evt"), (17_000_000, "Late")]);
    }

    #[test]
    fn test_second_channel_onsets_not_checked() {
        // 第二个通道的时间与记录时间无关
        let mut file = sample_edfplus_channels(2, 2);
        put_tal(&mut file, 2, 0, 0, b"+0\x14\x14\x00");
        put_tal(&mut file, 2, 0, 1, b"+7\x14x\x14\x00");
        put_tal(&mut file, 2, 1, 0, b"+1\x14\x14\x00");
        put_tal(&mut file, 2, 1, 1, b"+0.1\x14y\x14\x00");
        let extracted = extract(file, AnnotationMode::ReadAllAnnotations).unwrap();
        assert_eq!(extracted.annotations.len(), 2);
    }

    #[test]
    fn test_subsecond_start_time() {
        let mut file = sample_edfplus_channels(2, 1);
        put_tal(&mut file, 1, 0, 0, b"+0.25\x14\x14\x00");
        put_tal(&mut file, 1, 1, 0, b"+1.25\x14\x14\x00");
        let extracted = extract(file, AnnotationMode::ReadAnnotations).unwrap();
        assert_eq!(extracted.starttime_subsecond, 2_500_000);
        assert!(extracted.annotations.is_empty());
    }

    #[test]
    fn test_first_record_offset_of_one_second_rejected() {
        let mut file = sample_edfplus_channels(1, 1);
        put_tal(&mut file, 1, 0, 0, b"+1.0\x14\x14\x00");
        let err = extract(file, AnnotationMode::ReadAnnotations).unwrap_err();
        assert_eq!(err.code(), -3);

        let mut file = sample_edfplus_channels(1, 1);
        put_tal(&mut file, 1, 0, 0, b"+0.9999999\x14\x14\x00");
        let extracted = extract(file, AnnotationMode::ReadAnnotations).unwrap();
        assert_eq!(extracted.starttime_subsecond, 9_999_999);
    }

    #[test]
    fn test_discontinuous_records_may_leave_gaps() {
        let build = |last: &[u8]| {
            let mut file = sample_edfplus_channels(3, 1);
            file[192..197].copy_from_slice(b"EDF+D");
            put_tal(&mut file, 1, 0, 0, b"+0\x14\x14\x00");
            put_tal(&mut file, 1, 1, 0, b"+3\x14\x14\x00");
            put_tal(&mut file, 1, 2, 0, last);
            file
        };
        assert!(extract(build(b"+4.5\x14\x14\x00"), AnnotationMode::ReadAnnotations).is_ok());
        // 与上一条记录重叠
        let err = extract(build(b"+3.5\x14\x14\x00"), AnnotationMode::ReadAnnotations).unwrap_err();
        assert_eq!(err.code(), -3);
    }

    #[test]
    fn test_long_description_cut_on_char_boundary() {
        let mut tal = b"+1\x14".to_vec();
        tal.extend(std::iter::repeat(b'a').take(511));
        tal.extend_from_slice("é".as_bytes());
        tal.extend_from_slice(b"\x14\x00");
        let data = span(&[b"+0\x14\x14\x00", &tal], 600);

        let mut out = Vec::new();
        parse_tal_channel(&data, true, AnnotationMode::ReadAllAnnotations, &mut out).unwrap();
        assert_eq!(out[0].description.len(), 511);
        assert!(!out[0].description.contains('\u{FFFD}'));
        assert_eq!(utf8_prefix_len("aé".as_bytes(), 2), 1);
        assert_eq!(utf8_prefix_len("aé".as_bytes(), 3), 3);
    }

    #[test]
    fn test_writer_records() {
        let placeholder = placeholder_record(25_000_000);
        assert_eq!(placeholder.len(), EDFLIB_ANNOTATION_BYTES);
        assert!(placeholder.starts_with(b"+2.5000000\x14\x14\x00"));

        let annotation = PendingAnnotation {
            onset: 5_000_000,
            duration: Some(10_000_000),
            description: b"Stim".to_vec(),
        };
        let record = annotated_record(0, &annotation);
        assert_eq!(record.len(), EDFLIB_ANNOTATION_BYTES);
        assert!(record.starts_with(b"+0\x14\x14\x00+0.5000000\x151\x14Stim\x14\x00"));

        let mut out = Vec::new();
        parse_tal_channel(&record, true, AnnotationMode::ReadAllAnnotations, &mut out).unwrap();
        assert_eq!(out[0].onset, 5_000_000);
        assert_eq!(out[0].duration_100ns(), Some(10_000_000));
    }
}
