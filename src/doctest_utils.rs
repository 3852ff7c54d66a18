// Internal helpers that generate small files for the documentation examples

use crate::{EdfWriter, FileType, Result, SignalParam};
use std::path::Path;

fn eeg_signal(label: &str) -> SignalParam {
    SignalParam {
        label: label.to_string(),
        physical_max: 200.0,
        physical_min: -200.0,
        digital_max: 32767,
        digital_min: -32768,
        samples_per_record: 256,
        physical_dimension: "uV".to_string(),
        prefilter: "HP:0.1Hz LP:70Hz".to_string(),
        transducer: "AgAgCl cup electrodes".to_string(),
        ..SignalParam::default()
    }
}

fn sine(frequency: f64, amplitude: f64) -> Vec<f64> {
    (0..256)
        .map(|i| amplitude * (2.0 * std::f64::consts::PI * frequency * i as f64 / 256.0).sin())
        .collect()
}

/// Two seconds of a 10 Hz sine on one EEG channel.
pub fn create_simple_test_file<P: AsRef<Path>>(path: P) -> Result<()> {
    let mut writer = EdfWriter::create(path, FileType::EdfPlus, 1)?;
    writer.set_patient_code("DOC001")?;
    writer.set_patient_name("Test Patient")?;
    writer.set_gender(1)?;
    writer.set_birthdate(1990, 1, 1)?;
    writer.set_start_datetime(2024, 1, 1, 9, 0, 0)?;
    writer.set_signal_param(0, &eeg_signal("EEG Fp1"))?;

    let samples = sine(10.0, 50.0);
    for _ in 0..2 {
        writer.write_physical_samples(&samples)?;
    }
    writer.close()
}

/// EEG and ECG channels, two seconds, BDF+.
pub fn create_multi_channel_test_file<P: AsRef<Path>>(path: P) -> Result<()> {
    let mut writer = EdfWriter::create(path, FileType::BdfPlus, 2)?;
    writer.set_patient_code("DOC002")?;
    writer.set_start_datetime(2024, 3, 15, 14, 30, 0)?;

    let mut eeg = eeg_signal("EEG C3");
    eeg.digital_max = 8_388_607;
    eeg.digital_min = -8_388_608;
    writer.set_signal_param(0, &eeg)?;

    let mut ecg = eeg.clone();
    ecg.label = "ECG Lead II".to_string();
    ecg.physical_max = 5.0;
    ecg.physical_min = -5.0;
    ecg.physical_dimension = "mV".to_string();
    writer.set_signal_param(1, &ecg)?;

    let eeg_samples = sine(10.0, 50.0);
    let ecg_samples = sine(1.0, 2.0);
    for _ in 0..2 {
        writer.write_physical_samples(&eeg_samples)?;
        writer.write_physical_samples(&ecg_samples)?;
    }
    writer.close()
}

/// Five seconds of data with three annotations.
pub fn create_annotated_test_file<P: AsRef<Path>>(path: P) -> Result<()> {
    let mut writer = EdfWriter::create(path, FileType::EdfPlus, 1)?;
    writer.set_start_datetime(2024, 6, 1, 8, 0, 0)?;
    writer.set_signal_param(0, &eeg_signal("EEG Cz"))?;

    writer.write_annotation_utf8(0, None, "Recording start")?;
    writer.write_annotation_utf8(15_000_000, Some(20_000_000), "Eyes closed")?;
    writer.write_annotation_utf8(40_000_000, None, "Stimulus")?;

    let samples = sine(10.0, 50.0);
    for _ in 0..5 {
        writer.write_physical_samples(&samples)?;
    }
    writer.close()
}
