use std::collections::HashMap;
use std::io::{Cursor, Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use super::error::{DecodeError, EncodeError};

/// Name of the archive entry holding tree height and image dimensions.
pub const META_FILE: &str = "_meta";

/// Compression containers an archive can be written to or read from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArchiveMode {
	/// A tar stream wrapped in gzip.
	Gzip,
	/// A plain zip file.
	Zip,
}

impl ArchiveMode {
	/// Resolves an archive mode from its configuration name.
	pub fn from_name(name: &str) -> Result<ArchiveMode, EncodeError> {
		match name {
			"gzip" => Ok(ArchiveMode::Gzip),
			"zip" => Ok(ArchiveMode::Zip),
			_ => Err(EncodeError::UnknownArchiveFormat(name.to_owned())),
		}
	}

	/// Identifies the container of a byte stream by its magic bytes.
	pub fn probe(bytes: &[u8]) -> Option<ArchiveMode> {
		if bytes.starts_with(&[0x1f, 0x8b]) {
			Some(ArchiveMode::Gzip)
		} else if bytes.starts_with(b"PK\x03\x04") {
			Some(ArchiveMode::Zip)
		} else {
			None
		}
	}
}

/// Writes named entries into an in-memory archive of either mode.
///
/// The backing buffer only becomes a valid archive once [`finish`]
/// has flushed the container's trailing records; a writer that is
/// dropped instead produces nothing.
///
/// [`finish`]: ArchiveWriter::finish
pub struct ArchiveWriter {
	inner: WriterInner,
}

enum WriterInner {
	Gzip(tar::Builder<GzEncoder<Vec<u8>>>),
	Zip(zip::ZipWriter<Cursor<Vec<u8>>>),
}

impl ArchiveWriter {
	pub fn new(mode: ArchiveMode) -> ArchiveWriter {
		let inner = match mode {
			ArchiveMode::Gzip => {
				// Chain the tar builder through the gzip encoder
				let encoder = GzEncoder::new(Vec::new(), Compression::default());
				WriterInner::Gzip(tar::Builder::new(encoder))
			}
			ArchiveMode::Zip => WriterInner::Zip(zip::ZipWriter::new(Cursor::new(Vec::new()))),
		};
		ArchiveWriter { inner }
	}

	/// Adds a file entry with the given contents to the archive.
	pub fn write_file(&mut self, name: &str, contents: &[u8]) -> Result<(), EncodeError> {
		match &mut self.inner {
			WriterInner::Gzip(builder) => {
				let mut header = tar::Header::new_gnu();
				header.set_size(contents.len() as u64);
				header.set_mode(0o544);
				if name.is_empty() {
					// A root leaf lives at the empty path, which set_path
					// would reject; the zeroed GNU header already carries
					// an empty name
					header.set_cksum();
					builder.append(&header, contents)?;
				} else {
					builder.append_data(&mut header, name, contents)?;
				}
				Ok(())
			}
			WriterInner::Zip(writer) => {
				// Pin the timestamp so identical encodes are byte-identical
				let options = zip::write::FileOptions::default()
					.last_modified_time(zip::DateTime::default())
					.unix_permissions(0o544);
				writer.start_file(name, options)?;
				writer.write_all(contents)?;
				Ok(())
			}
		}
	}

	/// Flushes all entries and returns the finished archive bytes.
	pub fn finish(self) -> Result<Vec<u8>, EncodeError> {
		match self.inner {
			WriterInner::Gzip(builder) => {
				let encoder = builder.into_inner()?;
				Ok(encoder.finish()?)
			}
			WriterInner::Zip(mut writer) => {
				let cursor = writer.finish()?;
				Ok(cursor.into_inner())
			}
		}
	}
}

/// Read access to every entry of an archive, cached in memory.
///
/// Symbolic references need name-addressable random access, so the
/// whole archive is read up front.
pub struct ArchiveReader {
	files: HashMap<String, Vec<u8>>,
}

impl ArchiveReader {
	/// Opens an archive from raw bytes, inferring the container from
	/// its magic bytes.
	pub fn open(bytes: &[u8]) -> Result<ArchiveReader, DecodeError> {
		match ArchiveMode::probe(bytes) {
			Some(ArchiveMode::Gzip) => ArchiveReader::open_gzip(bytes),
			Some(ArchiveMode::Zip) => ArchiveReader::open_zip(bytes),
			None => Err(DecodeError::UnknownArchiveType),
		}
	}

	fn open_gzip(bytes: &[u8]) -> Result<ArchiveReader, DecodeError> {
		let mut archive = tar::Archive::new(GzDecoder::new(bytes));
		let mut files = HashMap::new();
		for entry in archive.entries()? {
			let mut entry = entry?;
			if entry.header().entry_type().is_dir() {
				continue;
			}
			let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
			let mut contents = Vec::new();
			entry.read_to_end(&mut contents)?;
			files.insert(name, contents);
		}
		Ok(ArchiveReader { files })
	}

	fn open_zip(bytes: &[u8]) -> Result<ArchiveReader, DecodeError> {
		let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
		let mut files = HashMap::new();
		for index in 0..archive.len() {
			let mut file = archive.by_index(index)?;
			if file.is_dir() {
				continue;
			}
			let mut contents = Vec::with_capacity(file.size() as usize);
			file.read_to_end(&mut contents)?;
			files.insert(file.name().to_owned(), contents);
		}
		Ok(ArchiveReader { files })
	}

	/// Looks up the contents of the named entry.
	pub fn entry(&self, name: &str) -> Option<&[u8]> {
		self.files.get(name).map(Vec::as_slice)
	}

	/// Iterates over all `(name, contents)` pairs in the archive.
	pub fn entries(&self) -> impl Iterator<Item = (&str, &[u8])> {
		self.files.iter().map(|(name, contents)| (name.as_str(), contents.as_slice()))
	}

	pub fn len(&self) -> usize {
		self.files.len()
	}

	pub fn is_empty(&self) -> bool {
		self.files.is_empty()
	}
}
