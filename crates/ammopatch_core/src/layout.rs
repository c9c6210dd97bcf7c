use std::io;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ByteRange {
    pub start: usize,
    pub end: usize,
}

impl ByteRange {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SectionId {
    Header,
    /// A top-level group, labelled with the record signature it holds.
    Group([u8; 4]),
}

impl SectionId {
    pub fn label(&self) -> String {
        match self {
            Self::Header => "TES4".to_string(),
            Self::Group(label) => format!("GRUP:{}", String::from_utf8_lossy(label)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SectionLayout {
    pub id: SectionId,
    pub range: ByteRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileLayout {
    pub file_len: usize,
    pub sections: Vec<SectionLayout>,
}

impl FileLayout {
    /// Sections must open with the header at byte 0, abut one another and
    /// end exactly at `file_len`. No section may be empty.
    pub fn validate(&self) -> io::Result<()> {
        match self.sections.first() {
            None => return Err(broken("no sections recorded".to_string())),
            Some(first) if first.id != SectionId::Header || first.range.start != 0 => {
                return Err(broken(format!(
                    "{} at byte {} where the header should be",
                    first.id.label(),
                    first.range.start
                )));
            }
            Some(_) => {}
        }

        let covered = self.sections.iter().try_fold(0usize, |cursor, s| {
            if s.range.start != cursor {
                return Err(broken(format!(
                    "{} starts at {} but previous section ended at {}",
                    s.id.label(),
                    s.range.start,
                    cursor
                )));
            }
            if s.range.end < s.range.start || s.range.is_empty() {
                return Err(broken(format!(
                    "{} has no bytes ({}..{})",
                    s.id.label(),
                    s.range.start,
                    s.range.end
                )));
            }
            Ok(s.range.end)
        })?;

        if covered != self.file_len {
            return Err(broken(format!(
                "sections cover {covered} of {} bytes",
                self.file_len
            )));
        }
        Ok(())
    }
}

fn broken(detail: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("bad file layout: {detail}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(id: SectionId, start: usize, end: usize) -> SectionLayout {
        SectionLayout {
            id,
            range: ByteRange { start, end },
        }
    }

    #[test]
    fn contiguous_layout_validates() {
        let layout = FileLayout {
            file_len: 100,
            sections: vec![
                section(SectionId::Header, 0, 60),
                section(SectionId::Group(*b"WEAP"), 60, 100),
            ],
        };
        layout.validate().unwrap();
    }

    #[test]
    fn gap_between_sections_is_rejected() {
        let layout = FileLayout {
            file_len: 100,
            sections: vec![
                section(SectionId::Header, 0, 60),
                section(SectionId::Group(*b"WEAP"), 64, 100),
            ],
        };
        let err = layout.validate().unwrap_err();
        assert!(err.to_string().contains("GRUP:WEAP"));
    }

    #[test]
    fn layout_must_open_with_the_header() {
        let layout = FileLayout {
            file_len: 40,
            sections: vec![section(SectionId::Group(*b"WEAP"), 0, 40)],
        };
        let err = layout.validate().unwrap_err();
        assert!(err.to_string().contains("where the header should be"));
    }

    #[test]
    fn short_coverage_is_rejected() {
        let layout = FileLayout {
            file_len: 100,
            sections: vec![section(SectionId::Header, 0, 60)],
        };
        assert!(layout.validate().is_err());
    }
}
