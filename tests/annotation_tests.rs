use edfcodec::{AnnotationMode, EdfError, EdfReader, EdfWriter, FileType, SignalParam};
use std::fs;
use std::path::Path;

// 清理测试文件的辅助函数
fn cleanup_test_file(filename: &str) {
    if Path::new(filename).exists() {
        fs::remove_file(filename).ok();
    }
}

// 创建测试信号的辅助函数
fn create_test_signal() -> SignalParam {
    SignalParam {
        label: "EEG Test".to_string(),
        samples_in_file: 0,
        physical_max: 100.0,
        physical_min: -100.0,
        digital_max: 32767,
        digital_min: -32768,
        samples_per_record: 256,
        physical_dimension: "uV".to_string(),
        prefilter: "HP:0.1Hz LP:70Hz".to_string(),
        transducer: "Test electrodes".to_string(),
    }
}

fn create_writer(filename: &str, file_type: FileType) -> EdfWriter {
    let mut writer = EdfWriter::create(filename, file_type, 1).unwrap();
    writer.set_patient_code("ANN001").unwrap();
    writer.set_gender(0).unwrap();
    writer.set_birthdate(1985, 7, 15).unwrap();
    writer.set_patient_name("Annotation Test").unwrap();
    writer.set_start_datetime(2024, 2, 10, 16, 45, 0).unwrap();

    let mut signal = create_test_signal();
    if file_type.is_bdf() {
        signal.digital_max = 8_388_607;
        signal.digital_min = -8_388_608;
    }
    writer.set_signal_param(0, &signal).unwrap();
    writer
}

fn write_seconds(writer: &mut EdfWriter, seconds: usize) {
    let samples = vec![0.0; 256];
    for _ in 0..seconds {
        writer.write_physical_samples(&samples).unwrap();
    }
}

#[test]
fn test_basic_annotation_write_read() {
    let filename = "test_basic_annotations.edf";

    // 写入阶段 - 创建包含注释的文件
    {
        let mut writer = create_writer(filename, FileType::EdfPlus);

        // 添加各种类型的注释
        writer.write_annotation_utf8(0, None, "Recording start").unwrap();
        writer.write_annotation_utf8(15_000_000, Some(20_000_000), "Eyes closed").unwrap();
        writer.write_annotation_utf8(42_500_000, Some(1_234_567), "Spike").unwrap();
        writer.write_annotation_utf8(80_000_001, None, "Sub-microsecond").unwrap();
        assert_eq!(writer.annotation_count(), 4);

        write_seconds(&mut writer, 10);
        writer.close().unwrap();
    }

    // 读取阶段 - 验证注释
    {
        let reader = EdfReader::open(filename).unwrap();
        assert_eq!(reader.header().annotations_in_file, 4);
        assert_eq!(reader.header().starttime_subsecond, 0);

        let annotations = reader.annotations();
        assert_eq!(annotations.len(), 4);

        assert_eq!(annotations[0].onset, 0);
        assert_eq!(annotations[0].description, "Recording start");
        assert!(annotations[0].duration.is_empty());

        assert_eq!(annotations[1].onset, 15_000_000);
        assert_eq!(annotations[1].duration, "2");
        assert_eq!(annotations[1].duration_100ns(), Some(20_000_000));
        assert_eq!(annotations[1].description, "Eyes closed");

        assert_eq!(annotations[2].onset, 42_500_000);
        assert_eq!(annotations[2].duration_100ns(), Some(1_234_567));

        // 100 纳秒精度
        assert_eq!(annotations[3].onset, 80_000_001);
        assert_eq!(annotations[3].description, "Sub-microsecond");

        assert!(matches!(reader.annotation(4), Err(EdfError::InvalidArgument(_))));
    }

    cleanup_test_file(filename);
}

#[test]
fn test_bdf_annotations() {
    let filename = "test_bdf_annotations.bdf";

    {
        let mut writer = create_writer(filename, FileType::BdfPlus);
        writer.write_annotation_utf8(5_000_000, Some(5_000_000), "Arousal").unwrap();
        writer.write_annotation_utf8(25_000_000, None, "Movement").unwrap();
        write_seconds(&mut writer, 3);
        writer.close().unwrap();
    }

    {
        let reader = EdfReader::open(filename).unwrap();
        let header = reader.header();
        assert_eq!(header.file_type, FileType::BdfPlus);
        assert_eq!(header.gender, "Female");
        assert_eq!(header.birthdate, "15 jul 1985");
        assert_eq!(header.annotations_in_file, 2);

        let annotations = reader.annotations();
        assert_eq!(annotations[0].description, "Arousal");
        assert_eq!(annotations[0].duration_100ns(), Some(5_000_000));
        assert_eq!(annotations[1].onset, 25_000_000);
    }

    cleanup_test_file(filename);
}

#[test]
fn test_annotation_text_handling() {
    let filename = "test_annotation_text.edf";

    {
        let mut writer = create_writer(filename, FileType::EdfPlus);
        writer.write_annotation_utf8(0, None, "Événement à 3µV").unwrap();
        writer.write_annotation_utf8(10_000_000, None, "tab\there").unwrap();
        writer
            .write_annotation_utf8(20_000_000, None, "This description is clearly longer than forty bytes")
            .unwrap();
        writer.write_annotation_latin1(30_000_000, None, b"Na\xefve text").unwrap();
        write_seconds(&mut writer, 4);
        writer.close().unwrap();
    }

    {
        let reader = EdfReader::open(filename).unwrap();
        let annotations = reader.annotations();
        assert_eq!(annotations.len(), 4);

        assert_eq!(annotations[0].description, "Événement à 3µV");
        // 控制字符替换为 '.'
        assert_eq!(annotations[1].description, "tab.here");
        // 截断到 40 字节
        assert_eq!(annotations[2].description, "This description is clearly longer than ");
        assert_eq!(annotations[2].description.len(), 40);
        // Latin-1 转 UTF-8, 长度不超过原始字节数
        assert_eq!(annotations[3].description, "Naïve tex");
    }

    cleanup_test_file(filename);
}

#[test]
fn test_invalid_annotations_rejected() {
    let filename = "test_invalid_annotations.edf";

    let mut writer = create_writer(filename, FileType::EdfPlus);
    assert!(matches!(
        writer.write_annotation_utf8(-1, None, "negative"),
        Err(EdfError::InvalidArgument(_))
    ));
    assert!(writer.write_annotation_utf8(0, Some(-5), "negative duration").is_err());
    assert_eq!(writer.annotation_count(), 0);
    write_seconds(&mut writer, 1);
    writer.close().unwrap();

    cleanup_test_file(filename);
}

#[test]
fn test_annotations_beyond_record_count_dropped() {
    let filename = "test_dropped_annotations.edf";

    {
        let mut writer = create_writer(filename, FileType::EdfPlus);
        for i in 0..5 {
            writer.write_annotation_utf8(i * 1_000_000, None, &format!("Event {}", i)).unwrap();
        }
        write_seconds(&mut writer, 3);
        writer.close().unwrap();
    }

    // 每条数据记录只能容纳一个注释
    let reader = EdfReader::open(filename).unwrap();
    let descriptions: Vec<&str> = reader.annotations().iter().map(|a| a.description.as_str()).collect();
    assert_eq!(descriptions, vec!["Event 0", "Event 1", "Event 2"]);

    cleanup_test_file(filename);
}

#[test]
fn test_annotations_without_samples() {
    let filename = "test_annotations_only.edf";

    {
        let mut writer = create_writer(filename, FileType::EdfPlus);
        writer.write_annotation_utf8(0, None, "First").unwrap();
        writer.write_annotation_utf8(20_000_000, None, "Second").unwrap();
        writer.close().unwrap();
    }

    // 关闭时为每个注释补写一条空数据记录
    let mut reader = EdfReader::open(filename).unwrap();
    assert_eq!(reader.header().datarecords_in_file, 2);
    assert_eq!(reader.header().annotations_in_file, 2);
    let samples = reader.read_physical_samples(0, 512).unwrap();
    assert_eq!(samples.len(), 512);
    assert!(samples.iter().all(|v| v.abs() < 0.01));

    cleanup_test_file(filename);
}

#[test]
fn test_recording_ends_stops_scan() {
    let filename = "test_recording_ends.edf";

    {
        let mut writer = create_writer(filename, FileType::EdfPlus);
        writer.write_annotation_utf8(0, None, "Start").unwrap();
        writer.write_annotation_utf8(20_000_000, None, "Recording ends").unwrap();
        writer.write_annotation_utf8(30_000_000, None, "After the end").unwrap();
        write_seconds(&mut writer, 4);
        writer.close().unwrap();
    }

    let reader = EdfReader::open(filename).unwrap();
    let descriptions: Vec<&str> = reader.annotations().iter().map(|a| a.description.as_str()).collect();
    assert_eq!(descriptions, vec!["Start", "Recording ends"]);

    let reader = EdfReader::open_with_mode(filename, AnnotationMode::ReadAllAnnotations).unwrap();
    assert_eq!(reader.header().annotations_in_file, 3);
    assert_eq!(reader.annotations()[2].description, "After the end");

    let reader = EdfReader::open_with_mode(filename, AnnotationMode::DoNotRead).unwrap();
    assert!(reader.annotations().is_empty());
    assert_eq!(reader.header().annotations_in_file, 0);

    cleanup_test_file(filename);
}
