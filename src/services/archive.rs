//! Zip archives of retrieved objects.
//!
//! Entries are written uncompressed and streamed chunk by chunk, so an
//! object is never held in memory as a whole.

use crate::{errors::FileHubResult, models::file::FileMetadata, store::StoredObject};
use async_zip::{Compression, ZipEntryBuilder, tokio::write::ZipFileWriter};
use futures::{StreamExt, io::AsyncWriteExt as _};
use std::collections::HashSet;
use tokio::io::{AsyncWrite, AsyncWriteExt as _};
use tracing::debug;

/// Write one `Stored` entry per object into `dest`, named after the decoded
/// `File-Name` tag.
///
/// With `leave_open` the destination is flushed but not shut down, which
/// lets an in-memory buffer be read back right away.
pub async fn build_zip<W>(
    dest: &mut W,
    objects: Vec<StoredObject>,
    leave_open: bool,
) -> FileHubResult<()>
where
    W: AsyncWrite + Unpin,
{
    let mut names = EntryNames::default();
    let mut writer = ZipFileWriter::with_tokio(&mut *dest);

    for object in objects {
        let meta = FileMetadata::from_tags(&object.key, &object.metadata)?;
        let name = names.claim(&meta.file_name);
        debug!(key = %object.key, entry = %name, "adding archive entry");

        let builder = ZipEntryBuilder::new(name.into(), Compression::Stored);
        let mut entry = writer.write_entry_stream(builder).await?;
        let mut body = object.body;
        while let Some(chunk) = body.next().await {
            entry.write_all(&chunk?).await?;
        }
        entry.close().await?;
    }

    writer.close().await?;
    dest.flush().await?;
    if !leave_open {
        dest.shutdown().await?;
    }
    Ok(())
}

/// Hands out unique entry names: the second `a.txt` becomes `a (1).txt`.
#[derive(Debug, Default)]
pub struct EntryNames {
    taken: HashSet<String>,
}

impl EntryNames {
    pub fn claim(&mut self, name: &str) -> String {
        if self.taken.insert(name.to_string()) {
            return name.to_string();
        }

        let (stem, ext) = match name.rfind('.') {
            Some(dot) if dot > 0 => name.split_at(dot),
            _ => (name, ""),
        };
        let mut n = 1usize;
        loop {
            let candidate = format!("{stem} ({n}){ext}");
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{models::file::FileMetadata, store::ByteStream};
    use bytes::Bytes;
    use chrono::Utc;
    use futures::stream;
    use std::io::{Cursor, Read};
    use uuid::Uuid;

    fn object(name: &str, chunks: &[&'static [u8]]) -> StoredObject {
        let meta = FileMetadata {
            owner_id: Uuid::new_v4(),
            group_id: Uuid::new_v4(),
            file_id: Uuid::new_v4(),
            file_name: name.into(),
            content_type: "application/octet-stream".into(),
        };
        let len = chunks.iter().map(|c| c.len() as u64).sum();
        let body: ByteStream = stream::iter(
            chunks
                .iter()
                .map(|c| Ok(Bytes::from_static(*c)))
                .collect::<Vec<_>>(),
        )
        .boxed();
        StoredObject {
            key: format!("{}/{}/{}", meta.owner_id, meta.group_id, meta.file_id),
            content_type: meta.content_type.clone(),
            content_length: len,
            last_modified: Utc::now(),
            metadata: meta.to_tags(),
            body,
        }
    }

    #[test]
    fn duplicate_names_get_numbered() {
        let mut names = EntryNames::default();
        assert_eq!(names.claim("a.txt"), "a.txt");
        assert_eq!(names.claim("a.txt"), "a (1).txt");
        assert_eq!(names.claim("a.txt"), "a (2).txt");
        assert_eq!(names.claim("README"), "README");
        assert_eq!(names.claim("README"), "README (1)");
        assert_eq!(names.claim(".env"), ".env");
        assert_eq!(names.claim(".env"), ".env (1)");
    }

    #[test]
    fn literal_name_matching_a_suffix_is_skipped() {
        let mut names = EntryNames::default();
        assert_eq!(names.claim("a (1).txt"), "a (1).txt");
        assert_eq!(names.claim("a.txt"), "a.txt");
        assert_eq!(names.claim("a.txt"), "a (2).txt");
    }

    #[tokio::test]
    async fn archive_has_one_stored_entry_per_object() {
        let objects = vec![
            object("report.pdf", &[b"%PDF-".as_slice(), b"1.7 body".as_slice()]),
            object("фото.jpg", &[b"\xff\xd8\xff".as_slice()]),
            object("report.pdf", &[]),
        ];
        let expected: Vec<(String, u64)> = vec![
            ("report.pdf".into(), 13),
            ("фото.jpg".into(), 3),
            ("report (1).pdf".into(), 0),
        ];

        let mut buf = Cursor::new(Vec::new());
        build_zip(&mut buf, objects, true).await.unwrap();

        let mut archive = zip::ZipArchive::new(Cursor::new(buf.into_inner())).unwrap();
        assert_eq!(archive.len(), expected.len());
        for (name, len) in expected {
            let mut entry = archive.by_name(&name).unwrap();
            assert_eq!(entry.compression(), zip::CompressionMethod::Stored);
            assert_eq!(entry.size(), len);
            let mut data = Vec::new();
            entry.read_to_end(&mut data).unwrap();
            assert_eq!(data.len() as u64, len);
        }
    }
}
