//! RIFF/WAVE μ-law container I/O.
//!
//! Writing always emits the fixed 58-byte header this stack's output format
//! commits to (format tag 7, mono, 8kHz, 8-bit, with a `fact` chunk) and
//! patches the three length fields at finalization once the final size is
//! known. Reading is more careful: real WAV files carry a variable-length
//! `fmt ` chunk and optional chunks before `data`, so the reader walks chunk
//! headers to find it rather than assuming any fixed offset.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{Error, Result};

/// Byte length of the header this stack writes.
pub const HEADER_LEN: u64 = 58;

const RIFF_SIZE_OFFSET: u64 = 4;
const SAMPLE_COUNT_OFFSET: u64 = 46;
const DATA_SIZE_OFFSET: u64 = 54;

/// Writes a μ-law WAV file with placeholder length fields, to be patched by
/// [`WavWriter::finalize`] once the stream ends.
pub struct WavWriter {
    file: File,
    data_len: u64,
}

impl WavWriter {
    /// Creates `path`, truncating any existing file, and writes the 58-byte
    /// header with placeholder lengths.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let mut file = File::create(path)?;
        file.write_all(b"RIFF")?;
        file.write_all(&0u32.to_le_bytes())?; // riff size, patched
        file.write_all(b"WAVE")?;
        file.write_all(b"fmt ")?;
        file.write_all(&18u32.to_le_bytes())?;
        file.write_all(&7u16.to_le_bytes())?; // format tag: mu-law
        file.write_all(&1u16.to_le_bytes())?; // channels
        file.write_all(&8000u32.to_le_bytes())?; // sample rate
        file.write_all(&8000u32.to_le_bytes())?; // byte rate (8000 * 1 * 8 / 8)
        file.write_all(&1u16.to_le_bytes())?; // block align
        file.write_all(&8u16.to_le_bytes())?; // bits per sample
        file.write_all(&0u16.to_le_bytes())?; // cbSize
        file.write_all(b"fact")?;
        file.write_all(&4u32.to_le_bytes())?;
        file.write_all(&0u32.to_le_bytes())?; // sample count, patched
        file.write_all(b"data")?;
        file.write_all(&0u32.to_le_bytes())?; // data size, patched
        debug_assert_eq!(file.stream_position()?, HEADER_LEN);
        Ok(Self { file, data_len: 0 })
    }

    /// Appends payload bytes to the data region and flushes.
    pub fn append(&mut self, payload: &[u8]) -> Result<()> {
        self.file.write_all(payload)?;
        self.file.flush()?;
        self.data_len += payload.len() as u64;
        Ok(())
    }

    /// Bytes appended to the data region so far.
    pub fn data_len(&self) -> u64 {
        self.data_len
    }

    /// Total file size once finalized (header plus data).
    pub fn file_len(&self) -> u64 {
        HEADER_LEN + self.data_len
    }

    /// Patches the three length fields in place: RIFF size at offset 4,
    /// sample count at offset 46, data size at offset 54.
    pub fn finalize(mut self) -> Result<()> {
        let riff_size = (HEADER_LEN + self.data_len - 8) as u32;
        let sample_count = self.data_len as u32;
        let data_size = self.data_len as u32;

        self.file.seek(SeekFrom::Start(RIFF_SIZE_OFFSET))?;
        self.file.write_all(&riff_size.to_le_bytes())?;
        self.file.seek(SeekFrom::Start(SAMPLE_COUNT_OFFSET))?;
        self.file.write_all(&sample_count.to_le_bytes())?;
        self.file.seek(SeekFrom::Start(DATA_SIZE_OFFSET))?;
        self.file.write_all(&data_size.to_le_bytes())?;
        self.file.flush()?;
        Ok(())
    }
}

/// Reads a μ-law WAV file's data region in fixed-size chunks, locating the
/// `data` chunk by walking RIFF chunk headers instead of assuming a fixed
/// header length.
pub struct WavReader {
    file: File,
    remaining: u64,
}

impl WavReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut file = File::open(path)?;

        let mut riff_tag = [0u8; 4];
        file.read_exact(&mut riff_tag)?;
        let mut _riff_size = [0u8; 4];
        file.read_exact(&mut _riff_size)?;
        let mut wave_tag = [0u8; 4];
        file.read_exact(&mut wave_tag)?;
        if &riff_tag != b"RIFF" || &wave_tag != b"WAVE" {
            return Err(Error::NotRiffWave);
        }

        loop {
            let mut chunk_id = [0u8; 4];
            let mut chunk_size_buf = [0u8; 4];
            if file.read_exact(&mut chunk_id).is_err() {
                return Err(Error::MissingDataChunk);
            }
            file.read_exact(&mut chunk_size_buf)
                .map_err(|_| Error::TruncatedChunkHeader)?;
            let chunk_size = u32::from_le_bytes(chunk_size_buf) as u64;

            if &chunk_id == b"data" {
                return Ok(Self { file, remaining: chunk_size });
            }

            let padded = chunk_size + (chunk_size & 1);
            file.seek(SeekFrom::Current(padded as i64))?;
        }
    }

    /// Reads up to `buf.len()` bytes of the data region into `buf`, returning
    /// the number of bytes actually read (0 once the data chunk is
    /// exhausted).
    pub fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        let want = (buf.len() as u64).min(self.remaining) as usize;
        if want == 0 {
            return Ok(0);
        }
        self.file.read_exact(&mut buf[..want])?;
        self.remaining -= want as u64;
        Ok(want)
    }

    /// Bytes left unread in the data chunk.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_header_is_58_bytes_before_finalize() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let writer = WavWriter::create(&path).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), HEADER_LEN);
        drop(writer);
    }

    #[test]
    fn finalize_patches_lengths_for_1600_byte_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let mut writer = WavWriter::create(&path).unwrap();
        for _ in 0..10 {
            writer.append(&[0xFFu8; 160]).unwrap();
        }
        assert_eq!(writer.data_len(), 1600);
        writer.finalize().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 58 + 1600);
        let riff_size = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        let sample_count = u32::from_le_bytes(bytes[46..50].try_into().unwrap());
        let data_size = u32::from_le_bytes(bytes[54..58].try_into().unwrap());
        assert_eq!(riff_size, 1650);
        assert_eq!(sample_count, 1600);
        assert_eq!(data_size, 1600);
    }

    #[test]
    fn reader_finds_data_chunk_past_the_header_this_writer_emits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roundtrip.wav");
        let mut writer = WavWriter::create(&path).unwrap();
        let payload = [0xAAu8; 480];
        writer.append(&payload).unwrap();
        writer.finalize().unwrap();

        let mut reader = WavReader::open(&path).unwrap();
        assert_eq!(reader.remaining(), 480);
        let mut buf = [0u8; 160];
        let n1 = reader.read_chunk(&mut buf).unwrap();
        assert_eq!(n1, 160);
        assert_eq!(buf, [0xAAu8; 160]);
        let n2 = reader.read_chunk(&mut buf).unwrap();
        assert_eq!(n2, 160);
        let n3 = reader.read_chunk(&mut buf).unwrap();
        assert_eq!(n3, 160);
        let n4 = reader.read_chunk(&mut buf).unwrap();
        assert_eq!(n4, 0);
    }

    #[test]
    fn reader_rejects_non_riff_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.wav");
        std::fs::write(&path, b"not a wav file at all").unwrap();
        assert!(WavReader::open(&path).is_err());
    }

    #[test]
    fn reader_skips_extra_chunks_before_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("extra_chunks.wav");
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(b"WAVE");
        // An odd-sized LIST chunk to exercise the padding-to-even skip.
        bytes.extend_from_slice(b"LIST");
        bytes.extend_from_slice(&3u32.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 3]);
        bytes.push(0); // pad byte
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&4u32.to_le_bytes());
        bytes.extend_from_slice(&[1, 2, 3, 4]);
        std::fs::write(&path, &bytes).unwrap();

        let mut reader = WavReader::open(&path).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(reader.read_chunk(&mut buf).unwrap(), 4);
        assert_eq!(buf, [1, 2, 3, 4]);
    }
}
