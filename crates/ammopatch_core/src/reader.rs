use std::io::{self, Read, Seek, SeekFrom};

/// Cursor over plugin bytes. Every multi-byte value in a plugin is little-endian.
pub struct LittleEndianReader<R> {
    inner: R,
}

macro_rules! le_reader {
    ($name:ident, $ty:ty) => {
        pub fn $name(&mut self) -> io::Result<$ty> {
            self.read_array().map(<$ty>::from_le_bytes)
        }
    };
}

impl<R: Read + Seek> LittleEndianReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    fn read_array<const N: usize>(&mut self) -> io::Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }

    le_reader!(read_u16, u16);
    le_reader!(read_u32, u32);
    le_reader!(read_i32, i32);

    pub fn read_signature(&mut self) -> io::Result<[u8; 4]> {
        self.read_array()
    }

    pub fn read_bytes(&mut self, n: usize) -> io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(n);
        let got = (&mut self.inner).take(n as u64).read_to_end(&mut out)?;
        if got < n {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("wanted {n} bytes, only {got} left"),
            ));
        }
        Ok(out)
    }

    pub fn skip(&mut self, n: u64) -> io::Result<()> {
        let offset = i64::try_from(n)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "skip too large"))?;
        self.inner.seek(SeekFrom::Current(offset)).map(drop)
    }

    pub fn position(&mut self) -> io::Result<u64> {
        self.inner.stream_position()
    }

    pub fn at_end(&mut self) -> io::Result<bool> {
        let here = self.position()?;
        let end = self.inner.seek(SeekFrom::End(0))?;
        self.inner.seek(SeekFrom::Start(here))?;
        Ok(here >= end)
    }
}

/// Decodes a zero-terminated string held in a subrecord payload. Bytes after
/// the first null are ignored.
pub fn zstring(bytes: &[u8]) -> io::Result<String> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8(bytes[..end].to_vec()).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn reads_little_endian_values_in_order() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"TES4");
        bytes.extend_from_slice(&0x0200u32.to_le_bytes());
        bytes.extend_from_slice(&7u16.to_le_bytes());
        bytes.extend_from_slice(&(-3i32).to_le_bytes());

        let mut r = LittleEndianReader::new(Cursor::new(bytes));
        assert_eq!(&r.read_signature().unwrap(), b"TES4");
        assert_eq!(r.read_u32().unwrap(), 0x0200);
        assert_eq!(r.read_u16().unwrap(), 7);
        assert_eq!(r.read_i32().unwrap(), -3);
        assert!(r.at_end().unwrap());
    }

    #[test]
    fn short_payload_is_an_eof_error() {
        let mut r = LittleEndianReader::new(Cursor::new(vec![1u8, 2, 3]));
        let err = r.read_bytes(8).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn zstring_stops_at_first_null() {
        assert_eq!(zstring(b"Fallout4.esm\0junk").unwrap(), "Fallout4.esm");
        assert_eq!(zstring(b"NoTerminator").unwrap(), "NoTerminator");
    }
}
