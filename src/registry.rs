//! Table of open files addressed by small copyable handles.

use std::path::Path;

use log::debug;

use crate::error::{EdfError, Result};
use crate::reader::EdfReader;
use crate::types::{Annotation, AnnotationMode, FileType, Whence};
use crate::writer::EdfWriter;
use crate::EDFLIB_MAXFILES;

/// Refers to one open file in a [`HandleRegistry`].
///
/// A handle stays invalid after its file is closed, even when the slot is
/// later reused for another file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    index: usize,
    generation: u64,
}

impl Handle {
    /// Slot number, stable while the file is open.
    pub fn index(&self) -> usize {
        self.index
    }
}

enum OpenFile {
    Reader(EdfReader),
    Writer(EdfWriter),
}

impl OpenFile {
    fn path(&self) -> &Path {
        match self {
            OpenFile::Reader(r) => r.path(),
            OpenFile::Writer(w) => w.path(),
        }
    }
}

struct Slot {
    generation: u64,
    file: Option<OpenFile>,
}

/// Bounded set of open readers and writers.
///
/// ```rust
/// use edfcodec::{AnnotationMode, HandleRegistry};
///
/// # edfcodec::doctest_utils::create_simple_test_file("registry_doc.edf")?;
/// let mut registry = HandleRegistry::new();
/// let handle = registry.open_read("registry_doc.edf", AnnotationMode::ReadAnnotations)?;
///
/// // the same path can't be opened twice
/// assert!(registry.open_read("registry_doc.edf", AnnotationMode::DoNotRead).is_err());
///
/// let samples = registry.read_digital_samples(handle, 0, 100)?;
/// assert_eq!(samples.len(), 100);
/// registry.close(handle)?;
/// assert_eq!(registry.open_count(), 0);
/// # std::fs::remove_file("registry_doc.edf").ok();
/// # Ok::<(), edfcodec::EdfError>(())
/// ```
pub struct HandleRegistry {
    slots: Vec<Slot>,
    capacity: usize,
    next_generation: u64,
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleRegistry {
    /// Registry holding up to 64 open files.
    pub fn new() -> Self {
        Self::with_capacity(EDFLIB_MAXFILES)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        HandleRegistry {
            slots: Vec::new(),
            capacity,
            next_generation: 0,
        }
    }

    pub fn open_count(&self) -> usize {
        self.slots.iter().filter(|s| s.file.is_some()).count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Opens `path` for reading, see [`EdfReader::open_with_mode`].
    pub fn open_read<P: AsRef<Path>>(&mut self, path: P, mode: AnnotationMode) -> Result<Handle> {
        let path = path.as_ref();
        self.check_can_open(path)?;
        let reader = EdfReader::open_with_mode(path, mode)?;
        Ok(self.insert(OpenFile::Reader(reader)))
    }

    /// Creates `path` for writing, see [`EdfWriter::create`].
    pub fn open_write<P: AsRef<Path>>(&mut self, path: P, file_type: FileType, signals: usize) -> Result<Handle> {
        if !file_type.is_plus() {
            return Err(EdfError::UnsupportedFileType(format!("{:?} can't be written", file_type)));
        }
        let path = path.as_ref();
        self.check_can_open(path)?;
        let writer = EdfWriter::create(path, file_type, signals)?;
        Ok(self.insert(OpenFile::Writer(writer)))
    }

    /// Closes the file; writers are finished as by [`EdfWriter::close`].
    pub fn close(&mut self, handle: Handle) -> Result<()> {
        self.slot(handle)?;
        let file = self.slots[handle.index].file.take();
        debug!("closing handle {}", handle.index);
        match file {
            Some(OpenFile::Writer(writer)) => writer.close(),
            _ => Ok(()),
        }
    }

    pub fn reader(&self, handle: Handle) -> Result<&EdfReader> {
        match self.slot(handle)? {
            OpenFile::Reader(reader) => Ok(reader),
            OpenFile::Writer(_) => Err(EdfError::WrongMode("handle is open for writing")),
        }
    }

    pub fn reader_mut(&mut self, handle: Handle) -> Result<&mut EdfReader> {
        match self.slot_mut(handle)? {
            OpenFile::Reader(reader) => Ok(reader),
            OpenFile::Writer(_) => Err(EdfError::WrongMode("handle is open for writing")),
        }
    }

    pub fn writer_mut(&mut self, handle: Handle) -> Result<&mut EdfWriter> {
        match self.slot_mut(handle)? {
            OpenFile::Writer(writer) => Ok(writer),
            OpenFile::Reader(_) => Err(EdfError::WrongMode("handle is open for reading")),
        }
    }

    pub fn read_digital_samples(&mut self, handle: Handle, signal: usize, count: usize) -> Result<Vec<i32>> {
        self.reader_mut(handle)?.read_digital_samples(signal, count)
    }

    pub fn read_physical_samples(&mut self, handle: Handle, signal: usize, count: usize) -> Result<Vec<f64>> {
        self.reader_mut(handle)?.read_physical_samples(signal, count)
    }

    pub fn seek(&mut self, handle: Handle, signal: usize, offset: i64, whence: Whence) -> Result<i64> {
        self.reader_mut(handle)?.seek(signal, offset, whence)
    }

    pub fn tell(&self, handle: Handle, signal: usize) -> Result<i64> {
        self.reader(handle)?.tell(signal)
    }

    pub fn rewind(&mut self, handle: Handle, signal: usize) -> Result<()> {
        self.reader_mut(handle)?.rewind(signal)
    }

    pub fn get_annotation(&self, handle: Handle, n: usize) -> Result<Annotation> {
        self.reader(handle)?.annotation(n).cloned()
    }

    fn check_can_open(&self, path: &Path) -> Result<()> {
        if self.open_count() >= self.capacity {
            return Err(EdfError::MaxFilesReached(self.capacity));
        }
        let taken = self
            .slots
            .iter()
            .filter_map(|s| s.file.as_ref())
            .any(|f| f.path() == path);
        if taken {
            return Err(EdfError::FileAlreadyOpened(path.display().to_string()));
        }
        Ok(())
    }

    fn insert(&mut self, file: OpenFile) -> Handle {
        self.next_generation += 1;
        let generation = self.next_generation;
        let slot = Slot { generation, file: Some(file) };

        let index = match self.slots.iter().position(|s| s.file.is_none()) {
            Some(index) => {
                self.slots[index] = slot;
                index
            }
            None => {
                self.slots.push(slot);
                self.slots.len() - 1
            }
        };
        debug!("opened handle {} (generation {})", index, generation);
        Handle { index, generation }
    }

    fn slot(&self, handle: Handle) -> Result<&OpenFile> {
        self.slots
            .get(handle.index)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.file.as_ref())
            .ok_or(EdfError::InvalidHandle(handle.index as i64))
    }

    fn slot_mut(&mut self, handle: Handle) -> Result<&mut OpenFile> {
        self.slots
            .get_mut(handle.index)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.file.as_mut())
            .ok_or(EdfError::InvalidHandle(handle.index as i64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn writable(registry: &mut HandleRegistry, path: &str) -> Handle {
        let handle = registry.open_write(path, FileType::EdfPlus, 1).unwrap();
        let writer = registry.writer_mut(handle).unwrap();
        writer.set_samples_per_record(0, 4).unwrap();
        writer.set_physical_maximum(0, 1.0).unwrap();
        writer.set_physical_minimum(0, -1.0).unwrap();
        writer.set_digital_maximum(0, 100).unwrap();
        writer.set_digital_minimum(0, -100).unwrap();
        writer.set_start_datetime(2001, 1, 1, 0, 0, 0).unwrap();
        handle
    }

    #[test]
    fn test_capacity_and_duplicates() {
        let mut registry = HandleRegistry::with_capacity(2);
        let a = writable(&mut registry, "registry_unit_a.edf");
        assert_eq!(
            registry.open_write("registry_unit_a.edf", FileType::EdfPlus, 1).err().unwrap().code(),
            -6
        );
        let b = writable(&mut registry, "registry_unit_b.edf");
        assert_eq!(
            registry.open_write("registry_unit_c.edf", FileType::EdfPlus, 1).err().unwrap().code(),
            -4
        );
        assert_eq!(
            registry.open_write("registry_unit_c.edf", FileType::Edf, 1).err().unwrap().code(),
            -7
        );
        assert_eq!(registry.open_count(), 2);

        registry.writer_mut(a).unwrap().write_digital_samples(&[1, 2, 3, 4]).unwrap();
        registry.close(a).unwrap();
        registry.close(b).unwrap();
        assert_eq!(registry.open_count(), 0);

        for name in ["registry_unit_a.edf", "registry_unit_b.edf", "registry_unit_c.edf"] {
            fs::remove_file(name).ok();
        }
    }

    #[test]
    fn test_stale_handle_rejected_after_reuse() {
        let mut registry = HandleRegistry::new();
        let first = writable(&mut registry, "registry_unit_stale1.edf");
        registry.writer_mut(first).unwrap().write_digital_samples(&[0; 4]).unwrap();
        registry.close(first).unwrap();
        assert!(matches!(registry.close(first), Err(EdfError::InvalidHandle(_))));

        let second = registry
            .open_read("registry_unit_stale1.edf", AnnotationMode::ReadAllAnnotations)
            .unwrap();
        assert_eq!(second.index(), first.index());
        assert!(registry.reader(first).is_err());
        assert!(matches!(registry.writer_mut(second), Err(EdfError::WrongMode(_))));
        assert_eq!(registry.read_digital_samples(second, 0, 10).unwrap().len(), 4);
        assert_eq!(registry.tell(second, 0).unwrap(), 4);
        registry.rewind(second, 0).unwrap();
        assert_eq!(registry.seek(second, 0, -1, Whence::End).unwrap(), 3);
        assert!(registry.get_annotation(second, 0).is_err());
        registry.close(second).unwrap();

        fs::remove_file("registry_unit_stale1.edf").ok();
    }
}
