use std::{
    any::Any,
    collections::BTreeMap,
    fmt, fs,
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use io_error::{HandleError, Result};
use io_range::{Length, Offset};

use crate::{
    config,
    handle::{Handle, OpenMode},
};

/// Handle over a plain file on the local filesystem.
///
/// The path alone is the handle's identity; the descriptor only exists
/// between open and close. Writes truncate, appends continue at the end,
/// and both leave the file seekable so transfer restarts can rewind.
pub struct FileHandle {
    path: PathBuf,
    file: Option<File>,
    mode: Option<OpenMode>,
}

impl FileHandle {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        FileHandle {
            path: path.as_ref().to_path_buf(),
            file: None,
            mode: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn name(&self) -> String {
        self.path.display().to_string()
    }

    fn stat_length(&self) -> Length {
        fs::metadata(&self.path)
            .map(|meta| Length(meta.len() as i64))
            .unwrap_or(Length(0))
    }

    fn file_mut(&mut self) -> Result<&mut File> {
        self.file.as_mut().ok_or_else(|| {
            HandleError::Contract(format!("{} used while closed", self.path.display()))
        })
    }
}

impl fmt::Display for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "file_handle({})", self.path.display())
    }
}

impl Handle for FileHandle {
    fn open_for_read(&mut self) -> Result<Length> {
        let file = File::open(&self.path).map_err(|e| HandleError::Open(self.name(), e))?;
        let size = Length(file.metadata()?.len() as i64);
        log::debug!("open_for_read {}: {} bytes", self.path.display(), size);
        self.file = Some(file);
        self.mode = Some(OpenMode::Read);
        Ok(size)
    }

    fn open_for_write(&mut self, estimate: Length) -> Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)
            .map_err(|e| HandleError::Open(self.name(), e))?;
        log::debug!(
            "open_for_write {}: expecting {} bytes",
            self.path.display(),
            estimate
        );
        self.file = Some(file);
        self.mode = Some(OpenMode::Write);
        Ok(())
    }

    fn open_for_append(&mut self, _estimate: Length) -> Result<()> {
        // No O_APPEND: restarts must be able to seek backwards, which
        // append-mode descriptors silently ignore on write.
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| HandleError::Open(self.name(), e))?;
        file.seek(SeekFrom::End(0))?;
        self.file = Some(file);
        self.mode = Some(OpenMode::Append);
        Ok(())
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        if !matches!(self.mode, Some(OpenMode::Read)) {
            return Err(HandleError::Contract(format!("read on {}", self)));
        }
        let result = self.file_mut()?.read(buffer);
        result.map_err(|e| HandleError::Read(self.name(), e))
    }

    fn write(&mut self, buffer: &[u8]) -> Result<usize> {
        if matches!(self.mode, Some(OpenMode::Read) | None) {
            return Err(HandleError::Contract(format!("write on {}", self)));
        }
        let result = self.file_mut()?.write(buffer);
        result.map_err(|e| HandleError::Write(self.name(), e))
    }

    fn close(&mut self) -> Result<()> {
        if self.file.take().is_some() {
            log::debug!("close {}", self.path.display());
        }
        self.mode = None;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        match self.mode {
            Some(OpenMode::Write) | Some(OpenMode::Append) => {
                let file = self.file_mut()?;
                file.flush()?;
                file.sync_all()?;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn rewind(&mut self) -> Result<()> {
        self.file_mut()?.rewind()?;
        Ok(())
    }

    fn position(&mut self) -> Result<Offset> {
        let at = self.file_mut()?.stream_position()?;
        Ok(Offset(at as i64))
    }

    fn seek(&mut self, offset: Offset) -> Result<Offset> {
        if offset.0 < 0 {
            return Err(HandleError::Contract(format!(
                "seek to negative offset {} on {}",
                offset, self
            )));
        }
        let at = self.file_mut()?.seek(SeekFrom::Start(offset.0 as u64))?;
        Ok(Offset(at as i64))
    }

    fn can_seek(&self) -> bool {
        true
    }

    fn skip(&mut self, length: Length) -> Result<()> {
        self.file_mut()?.seek(SeekFrom::Current(length.0))?;
        Ok(())
    }

    fn estimate(&mut self) -> Length {
        self.stat_length()
    }

    fn restart_read_from(&mut self, offset: Offset) -> Result<()> {
        if !matches!(self.mode, Some(OpenMode::Read)) {
            return Err(HandleError::Contract(format!(
                "restart_read_from on {}",
                self
            )));
        }
        log::warn!(
            "restarting read of {} from offset {}",
            self.path.display(),
            offset
        );
        self.seek(offset)?;
        Ok(())
    }

    fn restart_write_from(&mut self, offset: Offset) -> Result<()> {
        if matches!(self.mode, Some(OpenMode::Read) | None) {
            return Err(HandleError::Contract(format!(
                "restart_write_from on {}",
                self
            )));
        }
        log::warn!(
            "restarting write of {} from offset {}",
            self.path.display(),
            offset
        );
        self.seek(offset)?;
        Ok(())
    }

    fn clone_handle(&self) -> Result<Box<dyn Handle>> {
        Ok(Box::new(FileHandle::new(&self.path)))
    }

    fn is_empty(&self) -> bool {
        fs::metadata(&self.path)
            .map(|meta| meta.len() == 0)
            .unwrap_or(false)
    }

    fn moveable(&self) -> bool {
        true
    }

    fn cost(&self, costs: &mut BTreeMap<String, Length>, read: bool) {
        let node = config::node_name();
        if read {
            *costs.entry(node).or_insert(Length(0)) += self.stat_length();
        } else {
            costs.entry(node).or_insert(Length(0));
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Drop for FileHandle {
    fn drop(&mut self) {
        if self.file.is_some() {
            log::warn!("file_handle({}) dropped while open", self.path.display());
        }
    }
}
