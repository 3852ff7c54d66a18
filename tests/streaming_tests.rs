use edfcodec::{AnnotationMode, EdfError, EdfReader, EdfWriter, FileType, HandleRegistry, SignalParam, Whence};
use std::fs;
use std::path::Path;

// 清理测试文件的辅助函数
fn cleanup_test_file(filename: &str) {
    if Path::new(filename).exists() {
        fs::remove_file(filename).ok();
    }
}

// 创建测试信号的辅助函数
fn create_streaming_signal() -> SignalParam {
    SignalParam {
        label: "Stream Signal".to_string(),
        samples_in_file: 0,
        physical_max: 100.0,
        physical_min: -100.0,
        digital_max: 32767,
        digital_min: -32768,
        samples_per_record: 256,
        physical_dimension: "uV".to_string(),
        prefilter: "HP:0.1Hz LP:40Hz".to_string(),
        transducer: "Streaming electrodes".to_string(),
    }
}

fn chunk_samples(chunk: usize) -> Vec<f64> {
    (0..256)
        .map(|i| {
            let t = (chunk * 256 + i) as f64 / 256.0;
            // 频率随时间增加
            let freq = 10.0 + chunk as f64 * 0.5;
            50.0 * (2.0 * std::f64::consts::PI * freq * t).sin()
        })
        .collect()
}

#[test]
fn test_streaming_write_incremental_read() {
    let filename = "test_streaming.edf";

    // 模拟流式写入
    {
        let mut writer = EdfWriter::create(filename, FileType::EdfPlus, 1).unwrap();
        writer.set_patient_code("STREAM001").unwrap();
        writer.set_start_datetime(2024, 1, 1, 0, 0, 0).unwrap();
        writer.set_signal_param(0, &create_streaming_signal()).unwrap();

        for chunk in 0..30 {
            writer.write_physical_samples(&chunk_samples(chunk)).unwrap();
            assert_eq!(writer.datarecords_written(), chunk as i64 + 1);
        }
        writer.close().unwrap();
    }

    // 逐段读取
    {
        let mut reader = EdfReader::open(filename).unwrap();
        assert_eq!(reader.header().file_duration, 30 * 10_000_000);
        let step = reader.header().signals[0].bit_value();

        let chunk_size = 512; // 2秒的数据
        let mut total_samples_read = 0;
        let mut buf = vec![0.0; chunk_size];
        loop {
            let n = reader.read_physical_into(0, &mut buf).unwrap();
            if n == 0 {
                break;
            }
            for (i, value) in buf[..n].iter().enumerate() {
                let index = total_samples_read + i;
                let expected = chunk_samples(index / 256)[index % 256];
                assert!((value - expected).abs() <= step);
            }
            total_samples_read += n;
        }
        assert_eq!(total_samples_read, 30 * 256);
        assert_eq!(reader.tell(0).unwrap(), 30 * 256);
    }

    cleanup_test_file(filename);
}

#[test]
fn test_random_access_streaming() {
    let filename = "test_random_streaming.edf";

    {
        let mut writer = EdfWriter::create(filename, FileType::EdfPlus, 2).unwrap();
        writer.set_start_datetime(2024, 1, 1, 0, 0, 0).unwrap();
        for signal in 0..2 {
            writer.set_samples_per_record(signal, 10).unwrap();
            writer.set_physical_maximum(signal, 1000.0).unwrap();
            writer.set_physical_minimum(signal, -1000.0).unwrap();
            writer.set_digital_maximum(signal, 10000).unwrap();
            writer.set_digital_minimum(signal, -10000).unwrap();
        }
        // 样本值等于其在文件中的序号, 第二个信号取负
        for record in 0..60 {
            let first: Vec<i32> = (0..10).map(|i| record * 10 + i).collect();
            let second: Vec<i32> = first.iter().map(|v| -v).collect();
            writer.write_digital_samples(&first).unwrap();
            writer.write_digital_samples(&second).unwrap();
        }
        writer.close().unwrap();
    }

    {
        let mut reader = EdfReader::open(filename).unwrap();
        for &position in &[0i64, 9, 10, 255, 333, 590, 599] {
            reader.seek(0, position, Whence::Set).unwrap();
            reader.seek(1, position, Whence::Set).unwrap();
            let first = reader.read_digital_samples(0, 1).unwrap();
            let second = reader.read_digital_samples(1, 1).unwrap();
            assert_eq!(first, vec![position as i32]);
            assert_eq!(second, vec![-(position as i32)]);
        }

        // 跨越多条记录的读取
        reader.seek(0, 95, Whence::Set).unwrap();
        let span = reader.read_digital_samples(0, 30).unwrap();
        assert_eq!(span, (95..125).collect::<Vec<i32>>());
    }

    cleanup_test_file(filename);
}

#[test]
fn test_incomplete_record_zero_padded_on_close() {
    let filename = "test_incomplete_record.edf";

    {
        let mut writer = EdfWriter::create(filename, FileType::EdfPlus, 2).unwrap();
        writer.set_start_datetime(2024, 1, 1, 0, 0, 0).unwrap();
        writer.set_signal_param(0, &create_streaming_signal()).unwrap();
        writer.set_signal_param(1, &create_streaming_signal()).unwrap();
        for chunk in 0..3 {
            writer.write_physical_samples(&chunk_samples(chunk)).unwrap();
            writer.write_physical_samples(&chunk_samples(chunk)).unwrap();
        }
        // 只写了第一个信号
        writer.write_physical_samples(&chunk_samples(3)).unwrap();
        // 不允许在记录中间进行块写入
        assert!(writer.blockwrite_physical_samples(&[0.0; 512]).is_err());
        assert_eq!(writer.datarecords_written(), 3);
        writer.close().unwrap();
    }

    let mut reader = EdfReader::open(filename).unwrap();
    assert_eq!(reader.header().datarecords_in_file, 4);
    let expected_size = 4 * 256 + 4 * (2 * 256 * 2 + 114);
    assert_eq!(fs::metadata(filename).unwrap().len(), expected_size as u64);

    // 已写入的样本保留, 缺失的信号补零
    let step = reader.header().signals[0].bit_value();
    reader.seek(0, 3 * 256, Whence::Set).unwrap();
    let kept = reader.read_physical_samples(0, 256).unwrap();
    for (got, expected) in kept.iter().zip(chunk_samples(3)) {
        assert!((got - expected).abs() <= step);
    }
    reader.seek(1, 3 * 256, Whence::Set).unwrap();
    let padded = reader.read_digital_samples(1, 256).unwrap();
    assert_eq!(padded, vec![0; 256]);

    cleanup_test_file(filename);
}

#[test]
fn test_dropped_writer_is_finished() {
    let filename = "test_dropped_writer.edf";

    {
        let mut writer = EdfWriter::create(filename, FileType::BdfPlus, 1).unwrap();
        writer.set_start_datetime(2024, 1, 1, 0, 0, 0).unwrap();
        writer.set_samples_per_record(0, 8).unwrap();
        writer.set_physical_maximum(0, 1.0).unwrap();
        writer.set_physical_minimum(0, -1.0).unwrap();
        writer.set_digital_maximum(0, 8_388_607).unwrap();
        writer.set_digital_minimum(0, -8_388_608).unwrap();
        writer.write_digital_samples(&[-8_388_608, -1, 0, 1, 2, 3, 4, 8_388_607]).unwrap();
        writer.write_annotation_utf8(1_000, None, "dropped").unwrap();
    }

    let mut reader = EdfReader::open(filename).unwrap();
    assert_eq!(reader.header().datarecords_in_file, 1);
    assert_eq!(reader.annotations()[0].description, "dropped");
    assert_eq!(
        reader.read_digital_samples(0, 8).unwrap(),
        vec![-8_388_608, -1, 0, 1, 2, 3, 4, 8_388_607]
    );

    cleanup_test_file(filename);
}

#[test]
fn test_registry_write_then_read() {
    let filename = "test_registry_cycle.edf";
    let mut registry = HandleRegistry::new();

    let handle = registry.open_write(filename, FileType::EdfPlus, 1).unwrap();
    {
        let writer = registry.writer_mut(handle).unwrap();
        writer.set_signal_param(0, &create_streaming_signal()).unwrap();
        writer.set_start_datetime(2024, 4, 1, 6, 0, 0).unwrap();
        writer.write_annotation_utf8(2_500_000, Some(10_000_000), "Marker").unwrap();
        for chunk in 0..4 {
            writer.write_physical_samples(&chunk_samples(chunk)).unwrap();
        }
    }
    // 写模式下不能读
    assert!(matches!(
        registry.read_physical_samples(handle, 0, 10),
        Err(EdfError::WrongMode(_))
    ));
    // 同一路径不能同时打开两次
    assert_eq!(
        registry.open_read(filename, AnnotationMode::ReadAnnotations).err().unwrap().code(),
        -6
    );
    registry.close(handle).unwrap();
    assert!(registry.writer_mut(handle).is_err());

    let handle = registry.open_read(filename, AnnotationMode::ReadAnnotations).unwrap();
    assert_eq!(registry.reader(handle).unwrap().header().datarecords_in_file, 4);

    let annotation = registry.get_annotation(handle, 0).unwrap();
    assert_eq!(annotation.description, "Marker");
    assert_eq!(annotation.onset, 2_500_000);

    assert_eq!(registry.seek(handle, 0, 512, Whence::Set).unwrap(), 512);
    let samples = registry.read_physical_samples(handle, 0, 256).unwrap();
    let step = registry.reader(handle).unwrap().header().signals[0].bit_value();
    for (got, expected) in samples.iter().zip(chunk_samples(2)) {
        assert!((got - expected).abs() <= step);
    }
    assert_eq!(registry.tell(handle, 0).unwrap(), 768);

    registry.close(handle).unwrap();
    assert_eq!(registry.open_count(), 0);

    cleanup_test_file(filename);
}

#[test]
fn test_registry_capacity() {
    let names: Vec<String> = (0..3).map(|i| format!("test_registry_cap_{}.edf", i)).collect();
    let mut registry = HandleRegistry::with_capacity(2);
    assert_eq!(registry.capacity(), 2);

    let first = registry.open_write(&names[0], FileType::EdfPlus, 1).unwrap();
    let second = registry.open_write(&names[1], FileType::BdfPlus, 1).unwrap();
    let err = registry.open_write(&names[2], FileType::EdfPlus, 1).err().unwrap();
    assert!(matches!(err, EdfError::MaxFilesReached(2)));
    assert_eq!(err.code(), -4);

    // 头部校验失败时关闭仍然释放句柄
    assert!(registry.close(first).is_err());
    assert_eq!(registry.open_count(), 1);
    let third = registry.open_write(&names[2], FileType::EdfPlus, 1).unwrap();
    assert_eq!(third.index(), first.index());
    assert_ne!(third, first);

    assert!(registry.writer_mut(second).is_ok());

    // 未完成头部设置的写入器在析构时只记录警告
    drop(registry);

    for name in &names {
        cleanup_test_file(name);
    }
}
