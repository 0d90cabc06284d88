use log::debug;
use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::Path;

use massbus_utils::read_le::read_up_to;

use super::storage_interface::*;

/// A disk pack stored as a flat file of sectors, block 0 first.
pub struct DiskImage {
    file: Option<File>,
    read_only: bool,
    sector_size: usize,
}

impl DiskImage {
    pub fn new() -> Self {
        DiskImage {
            file: None,
            read_only: false,
            sector_size: 512,
        }
    }

    fn file(&mut self) -> io::Result<&mut File> {
        self.file.as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "disk image not open"))
    }

    fn seek_to(&mut self, lba: u32) -> io::Result<&mut File> {
        let offset = lba as u64 * self.sector_size as u64;
        let file = self.file()?;
        file.seek(SeekFrom::Start(offset))?;
        Ok(file)
    }
}

impl Default for DiskImage {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskStorage for DiskImage {
    fn open(&mut self, path: &Path, read_only: bool, _share: ShareMode) -> io::Result<()> {
        let (file, read_only) = open_image(path, read_only)?;
        debug!("Opened disk image '{}'{}.", path.display(),
               if read_only { " read only" } else { "" });
        self.file = Some(file);
        self.read_only = read_only;
        Ok(())
    }

    fn close(&mut self) {
        if let Some(file) = self.file.take() {
            if !self.read_only {
                // Nothing useful to do with a failure at this point.
                let _ = file.sync_all();
            }
        }
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn set_sector_size(&mut self, bytes: usize) {
        self.sector_size = bytes;
    }

    /// Sectors past the end of the file read as zeros.
    fn read_sector(&mut self, lba: u32, buf: &mut [u8]) -> io::Result<()> {
        let size = self.sector_size;
        let file = self.seek_to(lba)?;
        let buf = &mut buf[..size];
        let n = read_up_to(file, buf)?;
        buf[n..].fill(0);
        Ok(())
    }

    fn write_sector(&mut self, lba: u32, buf: &[u8]) -> io::Result<()> {
        if self.read_only {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "disk image is read only"));
        }
        let size = self.sector_size;
        let file = self.seek_to(lba)?;
        file.write_all(&buf[..size])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_read_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pack.dsk");
        let mut disk = DiskImage::new();
        disk.open(&path, false, ShareMode::Exclusive).unwrap();
        assert!(!disk.is_read_only());
        disk.set_sector_size(1024);

        // Unwritten sectors read as zero.
        let mut buf = vec![0xAA; 1024];
        disk.read_sector(7, &mut buf).unwrap();
        assert!(buf.iter().all(|b| *b == 0));

        let data: Vec<u8> = (0..1024).map(|i| i as u8).collect();
        disk.write_sector(3, &data).unwrap();
        disk.read_sector(3, &mut buf).unwrap();
        assert_eq!(buf, data);
        disk.close();
        assert_eq!(fs::metadata(&path).unwrap().len(), 4 * 1024);
    }

    #[test]
    fn test_read_only_file_forces_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ro.dsk");
        fs::write(&path, vec![1u8; 512]).unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_readonly(true);
        fs::set_permissions(&path, perms).unwrap();

        let mut disk = DiskImage::new();
        disk.open(&path, false, ShareMode::Shared).unwrap();
        assert!(disk.is_read_only());
        assert!(disk.write_sector(0, &[0; 512]).is_err());
        let mut buf = [0u8; 512];
        disk.read_sector(0, &mut buf).unwrap();
        assert!(buf.iter().all(|b| *b == 1));
    }

    #[test]
    fn test_not_open() {
        let mut disk = DiskImage::new();
        let mut buf = [0u8; 512];
        assert_eq!(disk.read_sector(0, &mut buf).unwrap_err().kind(), io::ErrorKind::NotConnected);
    }

    #[test]
    fn test_directory_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DiskImage::new().open(dir.path(), false, ShareMode::Exclusive).is_err());
    }
}
