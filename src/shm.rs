use memmap2::MmapMut;
use std::fs::File;
use std::io::{self, Seek, SeekFrom};
use std::os::fd::{AsFd, BorrowedFd};

#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    #[error("gamma ramp size must be positive")]
    EmptyRamp,
    #[error("failed to create anonymous file for gamma table: {0}")]
    Create(#[source] io::Error),
    #[error("failed to mmap gamma table: {0}")]
    Map(#[source] io::Error),
    #[error("failed to rewind gamma table: {0}")]
    Rewind(#[source] io::Error),
}

/// Gamma table living in an unlinked file so the compositor can read it
/// through the descriptor.
///
/// Holds three planes (R, G, B) of `ramp_size` native-endian `u16` samples.
/// Dropping it unmaps the region and closes the descriptor.
pub struct RampBuffer {
    // field order: unmap before the file is closed
    map: MmapMut,
    file: File,
    ramp_size: usize,
}

impl RampBuffer {
    pub fn allocate(ramp_size: usize) -> Result<Self, BufferError> {
        if ramp_size == 0 {
            return Err(BufferError::EmptyRamp);
        }
        let bytes = ramp_size * 3 * std::mem::size_of::<u16>();
        let file = tempfile::tempfile().map_err(BufferError::Create)?;
        file.set_len(bytes as u64).map_err(BufferError::Create)?;
        // SAFETY: the file is private to this process (unlinked) and is only
        // resized here, before mapping.
        let map = unsafe { MmapMut::map_mut(&file) }.map_err(BufferError::Map)?;
        Ok(Self {
            map,
            file,
            ramp_size,
        })
    }

    pub fn ramp_size(&self) -> usize {
        self.ramp_size
    }

    #[cfg(test)]
    pub fn len_bytes(&self) -> usize {
        self.map.len()
    }

    #[cfg(test)]
    pub fn samples(&self) -> &[u16] {
        bytemuck::cast_slice::<u8, u16>(&self.map)
    }

    pub fn samples_mut(&mut self) -> &mut [u16] {
        bytemuck::cast_slice_mut::<u8, u16>(&mut self.map)
    }

    /// Seeks the descriptor back to the start so the reader sees the whole table.
    pub fn rewind(&mut self) -> Result<(), BufferError> {
        self.file
            .seek(SeekFrom::Start(0))
            .map(|_| ())
            .map_err(BufferError::Rewind)
    }
}

impl AsFd for RampBuffer {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn allocates_three_planes_of_u16() {
        let buffer = RampBuffer::allocate(256).unwrap();
        assert_eq!(buffer.ramp_size(), 256);
        assert_eq!(buffer.len_bytes(), 256 * 3 * 2);
        assert_eq!(buffer.samples().len(), 256 * 3);
        assert!(buffer.samples().iter().all(|&s| s == 0));
    }

    #[test]
    fn zero_ramp_is_rejected() {
        assert!(matches!(RampBuffer::allocate(0), Err(BufferError::EmptyRamp)));
    }

    #[test]
    fn descriptor_reads_back_mapped_samples_after_rewind() {
        let mut buffer = RampBuffer::allocate(4).unwrap();
        buffer.samples_mut().copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
        buffer.rewind().unwrap();

        let mut file = buffer.file.try_clone().unwrap();
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes.as_slice(), bytemuck::cast_slice::<u16, u8>(buffer.samples()));

        // reading moved the shared offset; rewind puts it back
        buffer.rewind().unwrap();
        assert_eq!(file.stream_position().unwrap(), 0);
    }
}
