use crate::cursor::{Cursor, Writer};
use crate::error::{Error, Result};

/// A tagged chunk: the building block of every pack stream.
///
/// Layout (little-endian):
///
/// ```text
/// tag[4] | main_len:u32 | main
///        | multi_count:u32 | { len:u32 | record } * multi_count
///        | sub_count:u32   | chunk * sub_count
/// ```
///
/// How `main_data` and `multi_data` are interpreted depends only on `tag`.
/// Chunks with tags nobody interprets are carried along untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chunk {
    pub tag: [u8; 4],
    pub main_data: Vec<u8>,
    pub multi_data: Vec<Vec<u8>>,
    pub subchunks: Vec<Chunk>,
}

impl Chunk {
    pub fn new(tag: [u8; 4]) -> Self {
        Self {
            tag,
            ..Self::default()
        }
    }

    pub fn with_main(tag: [u8; 4], main_data: Vec<u8>) -> Self {
        Self {
            tag,
            main_data,
            ..Self::default()
        }
    }

    /// Parse exactly one chunk spanning all of `data`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut c = Cursor::new(data);
        let chunk = Self::read(&mut c)?;
        if !c.is_empty() {
            return Err(Error::TrailingData {
                offset: c.position(),
                extra: c.remaining(),
            });
        }
        Ok(chunk)
    }

    /// Read one chunk at the cursor, recursively.
    pub fn read(c: &mut Cursor<'_>) -> Result<Self> {
        let tag = c.read_tag()?;
        let main_data = c.read_sized()?.to_vec();
        let multi_data = c.read_counted(4, |c| Ok(c.read_sized()?.to_vec()))?;
        // Smallest possible subchunk: tag + three zero counts.
        let subchunks = c.read_counted(16, Self::read)?;
        Ok(Self {
            tag,
            main_data,
            multi_data,
            subchunks,
        })
    }

    /// Serialize this chunk; the exact inverse of `parse`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(self.encoded_len());
        self.write(&mut w);
        w.into_bytes()
    }

    pub fn write(&self, w: &mut Writer) {
        w.write_tag(&self.tag);
        w.write_sized(&self.main_data);
        w.write_u32(self.multi_data.len() as u32);
        for record in &self.multi_data {
            w.write_sized(record);
        }
        w.write_u32(self.subchunks.len() as u32);
        for sub in &self.subchunks {
            sub.write(w);
        }
    }

    /// Size of the serialized form in bytes.
    pub fn encoded_len(&self) -> usize {
        16 + self.main_data.len()
            + self.multi_data.iter().map(|r| 4 + r.len()).sum::<usize>()
            + self.subchunks.iter().map(Chunk::encoded_len).sum::<usize>()
    }

    /// Tag as a string (for display).
    pub fn tag_str(&self) -> &str {
        std::str::from_utf8(&self.tag).unwrap_or("????")
    }

    /// First direct subchunk with the given tag.
    pub fn find_subchunk(&self, tag: &[u8; 4]) -> Option<&Chunk> {
        self.subchunks.iter().find(|c| &c.tag == tag)
    }

    pub fn find_subchunk_mut(&mut self, tag: &[u8; 4]) -> Option<&mut Chunk> {
        self.subchunks.iter_mut().find(|c| &c.tag == tag)
    }

    /// Fail with `UnexpectedTag` unless this chunk carries `expected`.
    pub fn expect_tag(&self, expected: &[u8; 4]) -> Result<()> {
        if &self.tag != expected {
            return Err(Error::UnexpectedTag {
                expected: *expected,
                found: self.tag,
            });
        }
        Ok(())
    }

    /// The leading u32 of `main_data`, used by texture chunks as their id.
    pub fn leading_u32(&self) -> Option<u32> {
        let bytes = self.main_data.get(..4)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Overwrite the leading u32 of `main_data`. No-op on chunks shorter than 4 bytes.
    pub fn set_leading_u32(&mut self, value: u32) {
        if let Some(bytes) = self.main_data.get_mut(..4) {
            bytes.copy_from_slice(&value.to_le_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Chunk {
        let mut leaf = Chunk::with_main(*b"LEAF", vec![1, 2, 3]);
        leaf.multi_data = vec![vec![], vec![9; 5]];
        let mut root = Chunk::new(*b"ROOT");
        root.subchunks.push(leaf);
        root.subchunks.push(Chunk::new(*b"\x01\x02??"));
        root
    }

    #[test]
    fn serialize_parse_is_byte_identical() {
        let bytes = sample().to_bytes();
        let parsed = Chunk::parse(&bytes).unwrap();
        assert_eq!(parsed, sample());
        assert_eq!(parsed.to_bytes(), bytes);
        assert_eq!(bytes.len(), sample().encoded_len());
    }

    #[test]
    fn unknown_tags_are_preserved() {
        let parsed = Chunk::parse(&sample().to_bytes()).unwrap();
        assert_eq!(parsed.subchunks[1].tag, *b"\x01\x02??");
        assert_eq!(parsed.subchunks[1].tag_str(), "\u{1}\u{2}??");
    }

    #[test]
    fn truncated_input_fails() {
        let bytes = sample().to_bytes();
        for cut in [0, 3, 7, bytes.len() - 1] {
            assert!(matches!(
                Chunk::parse(&bytes[..cut]),
                Err(Error::UnexpectedEof { .. })
            ));
        }
    }

    #[test]
    fn oversized_length_fails() {
        let mut bytes = Chunk::with_main(*b"ABCD", vec![0; 4]).to_bytes();
        bytes[4] = 0xFF;
        assert!(Chunk::parse(&bytes).is_err());
    }

    #[test]
    fn trailing_bytes_fail() {
        let mut bytes = sample().to_bytes();
        bytes.push(0);
        assert!(matches!(
            Chunk::parse(&bytes),
            Err(Error::TrailingData { extra: 1, .. })
        ));
    }

    #[test]
    fn leading_id_roundtrip() {
        let mut c = Chunk::with_main(*b"RGBA", vec![7, 0, 0, 0, 0xAA]);
        assert_eq!(c.leading_u32(), Some(7));
        c.set_leading_u32(0x0102_0304);
        assert_eq!(c.main_data, vec![4, 3, 2, 1, 0xAA]);
        assert_eq!(Chunk::new(*b"NONE").leading_u32(), None);
    }
}
