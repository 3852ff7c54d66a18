use chrono::{NaiveDate, NaiveTime};

use crate::error::{EdfError, Result};

/// The four supported file flavors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Edf,
    EdfPlus,
    Bdf,
    BdfPlus,
}

impl FileType {
    /// Legacy numeric file type (0 EDF, 1 EDF+, 2 BDF, 3 BDF+).
    pub fn code(self) -> i32 {
        match self {
            FileType::Edf => 0,
            FileType::EdfPlus => 1,
            FileType::Bdf => 2,
            FileType::BdfPlus => 3,
        }
    }

    pub fn is_bdf(self) -> bool {
        matches!(self, FileType::Bdf | FileType::BdfPlus)
    }

    pub fn is_plus(self) -> bool {
        matches!(self, FileType::EdfPlus | FileType::BdfPlus)
    }

    /// 每个样本的字节数
    pub fn sample_width(self) -> usize {
        if self.is_bdf() {
            3
        } else {
            2
        }
    }

    /// Smallest digital value the sample width can hold.
    pub fn digital_floor(self) -> i32 {
        if self.is_bdf() {
            -8_388_608
        } else {
            -32_768
        }
    }

    /// Largest digital value the sample width can hold.
    pub fn digital_ceiling(self) -> i32 {
        if self.is_bdf() {
            8_388_607
        } else {
            32_767
        }
    }

    /// Label reserved for annotation channels in this flavor.
    pub fn annotation_label(self) -> &'static str {
        if self.is_bdf() {
            "BDF Annotations "
        } else {
            "EDF Annotations "
        }
    }
}

impl TryFrom<i32> for FileType {
    type Error = EdfError;

    fn try_from(code: i32) -> Result<Self> {
        match code {
            0 => Ok(FileType::Edf),
            1 => Ok(FileType::EdfPlus),
            2 => Ok(FileType::Bdf),
            3 => Ok(FileType::BdfPlus),
            other => Err(EdfError::UnsupportedFileType(format!("file type code {}", other))),
        }
    }
}

/// How much of the annotation channel to decode at open time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnnotationMode {
    /// Skip annotation extraction entirely.
    DoNotRead,
    /// Extract annotations, stopping at the first "Recording ends"
    /// annotation (which is kept).
    #[default]
    ReadAnnotations,
    /// Extract every annotation in the file.
    ReadAllAnnotations,
}

impl TryFrom<i32> for AnnotationMode {
    type Error = EdfError;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(AnnotationMode::DoNotRead),
            1 => Ok(AnnotationMode::ReadAnnotations),
            2 => Ok(AnnotationMode::ReadAllAnnotations),
            other => Err(EdfError::InvalidReadAnnotsValue(other)),
        }
    }
}

/// Reference point for [`crate::EdfReader::seek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

#[derive(Debug, Clone)]
pub struct SignalParam {
    pub label: String,
    pub samples_in_file: i64,
    pub physical_max: f64,
    pub physical_min: f64,
    pub digital_max: i32,
    pub digital_min: i32,
    pub samples_per_record: i32,
    pub physical_dimension: String,
    pub prefilter: String,
    pub transducer: String,
}

impl SignalParam {
    /// 计算物理值转换参数
    pub fn bit_value(&self) -> f64 {
        (self.physical_max - self.physical_min) /
        (self.digital_max - self.digital_min) as f64
    }

    /// 计算偏移量
    pub fn offset(&self) -> f64 {
        self.physical_max / self.bit_value() - self.digital_max as f64
    }

    /// 将数字值转换为物理值
    pub fn to_physical(&self, digital_value: i32) -> f64 {
        self.bit_value() * (self.offset() + digital_value as f64)
    }

    /// 将物理值转换为数字值, clamped to the digital range
    pub fn to_digital(&self, physical_value: f64) -> i32 {
        let digital = (physical_value / self.bit_value()) - self.offset();
        if digital.is_nan() {
            return self.digital_min;
        }
        let clamped = digital
            .round()
            .max(self.digital_min as f64)
            .min(self.digital_max as f64);
        clamped as i32
    }
}

impl Default for SignalParam {
    fn default() -> Self {
        SignalParam {
            label: String::new(),
            samples_in_file: 0,
            physical_max: 0.0,
            physical_min: 0.0,
            digital_max: 0,
            digital_min: 0,
            samples_per_record: 0,
            physical_dimension: String::new(),
            prefilter: String::new(),
            transducer: String::new(),
        }
    }
}

/// One event decoded from an annotation channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    /// 开始时间（100纳秒为单位）, relative to the recording start
    pub onset: i64,
    /// Duration exactly as written in the file, empty when absent
    pub duration: String,
    /// UTF-8描述
    pub description: String,
}

impl Annotation {
    /// Duration in 100 ns units, `None` when the TAL had no duration.
    pub fn duration_100ns(&self) -> Option<i64> {
        if self.duration.is_empty() {
            None
        } else {
            Some(crate::utils::get_long_duration(&self.duration))
        }
    }
}

#[derive(Debug, Clone)]
pub struct EdfHeader {
    pub file_type: FileType,
    /// Ordinary signals only; annotation channels are hidden
    pub signals: Vec<SignalParam>,
    pub file_duration: i64,           // 文件持续时间（100纳秒为单位）
    pub start_date: NaiveDate,
    pub start_time: NaiveTime,
    pub starttime_subsecond: i64,     // 亚秒开始时间
    pub datarecords_in_file: i64,
    pub datarecord_duration: i64,     // 数据记录持续时间（100纳秒为单位）
    pub annotations_in_file: i64,

    // 普通 EDF/BDF 的自由文本字段
    pub patient: String,
    pub recording: String,

    // EDF+ 特有字段
    pub patient_code: String,
    pub gender: String,
    pub birthdate: String,
    pub patient_name: String,
    pub patient_additional: String,
    pub admin_code: String,
    pub technician: String,
    pub equipment: String,
    pub recording_additional: String,
}
