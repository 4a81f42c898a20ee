use memmap::{Mmap, MmapMut};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

/// A read-only memory mapped file.
pub struct MmapFile {
    mmap: Mmap,
}

impl MmapFile {
    fn len(&self) -> usize {
        self.mmap.len()
    }
}

/// A memory mapped file.
pub struct MmapMutFile {
    file: File,
    mmap: MmapMut,
    len: u64,
}

impl MmapMutFile {
    fn from_file(file: File) -> io::Result<Self> {
        let len = file.metadata()?.len();
        let mmap = if len == 0 {
            MmapMut::map_anon(1)?
        } else {
            unsafe { MmapMut::map_mut(&file)? }
        };
        Ok(Self { file, mmap, len })
    }

    fn len(&self) -> usize {
        self.len as usize
    }

    fn resize(&mut self, new_len: usize) -> io::Result<()> {
        self.mmap.flush()?;
        self.len = new_len as u64;
        self.mmap = MmapMut::map_anon(1)?;
        self.file.set_len(self.len)?;
        if new_len != 0 {
            self.mmap = unsafe { MmapMut::map_mut(&self.file)? }
        }
        Ok(())
    }
}

/// A memory manager to hide the underlying type of a fragment buffer.
pub enum MemoryManager {
    /// A memory buffer.
    Mem(Vec<u8>),
    /// A read-only memory mapped buffer.
    Mmap(MmapFile),
    /// A memory mapped buffer.
    MmapMut(MmapMutFile),
}

impl MemoryManager {
    pub fn new_mem(size: usize) -> Self {
        MemoryManager::Mem(vec![0; size])
    }

    pub fn new_mmap<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Ok(MemoryManager::Mmap(MmapFile {
            mmap: unsafe { Mmap::map(&File::open(path)?)? },
        }))
    }

    pub fn new_mmap_mut<P: AsRef<Path>>(path: P, size: usize) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(size as u64)?;
        Ok(MemoryManager::MmapMut(MmapMutFile::from_file(file)?))
    }

    /// Creates a buffer backed by an anonymous temporary file.
    pub fn new_temp(size: usize) -> io::Result<Self> {
        let file = tempfile::tempfile()?;
        file.set_len(size as u64)?;
        Ok(MemoryManager::MmapMut(MmapMutFile::from_file(file)?))
    }

    pub fn len(&self) -> usize {
        match self {
            MemoryManager::Mem(vec) => vec.len(),
            MemoryManager::Mmap(mmapfile) => mmapfile.len(),
            MemoryManager::MmapMut(mmapfile) => mmapfile.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn resize(&mut self, new_len: usize) -> io::Result<()> {
        match self {
            MemoryManager::Mem(vec) => {
                vec.resize(new_len, 0);
                Ok(())
            }
            MemoryManager::Mmap(_) => Err(read_only()),
            MemoryManager::MmapMut(mmapfile) => mmapfile.resize(new_len),
        }
    }

    /// Returns the base address of the buffer.
    pub fn as_ptr(&self) -> *const u8 {
        match self {
            MemoryManager::Mem(vec) => vec.as_ptr(),
            MemoryManager::Mmap(mmapfile) => mmapfile.mmap.as_ptr(),
            MemoryManager::MmapMut(mmapfile) => mmapfile.mmap.as_ptr(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            MemoryManager::Mem(vec) => vec.as_slice(),
            MemoryManager::Mmap(mmapfile) => &mmapfile.mmap[..],
            MemoryManager::MmapMut(mmapfile) => &mmapfile.mmap[..mmapfile.len()],
        }
    }

    /// Copies `bytes` to `pos`. Panics if the range exceeds the buffer.
    pub fn write_bytes(&mut self, pos: usize, bytes: &[u8]) -> io::Result<()> {
        let dst = match self {
            MemoryManager::Mem(vec) => &mut vec[pos..pos + bytes.len()],
            MemoryManager::Mmap(_) => return Err(read_only()),
            MemoryManager::MmapMut(mmapfile) => &mut mmapfile.mmap[pos..pos + bytes.len()],
        };
        dst.copy_from_slice(bytes);
        Ok(())
    }

    pub fn write_u64(&mut self, pos: usize, value: u64) -> io::Result<()> {
        self.write_bytes(pos, &value.to_le_bytes())
    }

    pub fn read_u64(&self, pos: usize) -> u64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.as_bytes()[pos..pos + 8]);
        u64::from_le_bytes(raw)
    }

    pub fn flush(&self) -> io::Result<()> {
        match self {
            MemoryManager::MmapMut(mmapfile) => mmapfile.mmap.flush(),
            _ => Ok(()),
        }
    }
}

fn read_only() -> io::Error {
    io::Error::new(io::ErrorKind::PermissionDenied, "read-only memory map")
}

#[cfg(test)]
mod tests {
    use tempfile::NamedTempFile;

    use super::*;
    use std::io::Write;

    #[test]
    fn test_mem_len() {
        let mm = MemoryManager::Mem(vec![1, 2, 3, 4, 5]);
        assert_eq!(mm.len(), 5);
    }

    #[test]
    fn test_mem_shrink_expand() {
        let mut mm = MemoryManager::Mem(vec![1, 2, 3, 4, 5, 6]);
        mm.resize(3).unwrap();
        assert_eq!(mm.as_bytes(), [1, 2, 3]);
        mm.resize(6).unwrap();
        assert_eq!(mm.as_bytes(), [1, 2, 3, 0, 0, 0]);
        mm.resize(0).unwrap();
        assert!(mm.is_empty());
    }

    #[test]
    fn test_mem_u64() {
        let mut mm = MemoryManager::new_mem(17);
        mm.write_u64(1, 0xdead_beef).unwrap();
        assert_eq!(mm.read_u64(1), 0xdead_beef);
        assert_eq!(mm.as_bytes()[0], 0);
    }

    #[test]
    fn test_temp_shrink_expand() {
        let mut mm = MemoryManager::new_temp(6).unwrap();
        mm.write_bytes(0, &[1, 2, 3, 4, 5, 6]).unwrap();
        mm.resize(3).unwrap();
        assert_eq!(mm.as_bytes(), [1, 2, 3]);
        mm.resize(6).unwrap();
        assert_eq!(mm.as_bytes(), [1, 2, 3, 0, 0, 0]);
        mm.resize(0).unwrap();
        assert_eq!(mm.len(), 0);
        mm.resize(3).unwrap();
        assert_eq!(mm.as_bytes(), [0, 0, 0]);
    }

    #[test]
    fn test_mmap_read_only() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&7u64.to_le_bytes()).unwrap();
        let path = file.into_temp_path();
        let mut mm = MemoryManager::new_mmap(&path).unwrap();
        assert_eq!(mm.len(), 8);
        assert_eq!(mm.read_u64(0), 7);
        assert!(mm.write_u64(0, 1).is_err());
        assert!(mm.resize(16).is_err());
    }

    #[test]
    fn test_mmap_mut() {
        let path = NamedTempFile::new().unwrap().into_temp_path();
        let mut mm = MemoryManager::new_mmap_mut(&path, 16).unwrap();
        assert_eq!(mm.as_bytes(), &[0; 16]);
        mm.write_u64(8, 42).unwrap();
        mm.flush().unwrap();
        drop(mm);
        let mm = MemoryManager::new_mmap(&path).unwrap();
        assert_eq!(mm.read_u64(8), 42);
    }
}
