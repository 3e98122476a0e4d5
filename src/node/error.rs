use thiserror::Error;

/// Reason why two rasters couldn't be compared.
#[derive(Debug, Error)]
pub enum CompareError {
	/// The rasters' dimensions do not match; there is no meaningful
	/// pixel-by-pixel correspondence between them.
	#[error("bounds for image A ({left:?}) and image B ({right:?}) do not match")]
	BoundsMismatch { left: (u32, u32), right: (u32, u32) },
}

/// Reason why a raster couldn't be scaled.
#[derive(Debug, Error)]
pub enum ScaleError {
	/// The configured interpolator name matches no known algorithm.
	#[error("interpolator name not found: {0:?}")]
	UnknownInterpolator(String),
}

/// Reason why a region couldn't be partitioned into a quadtree.
#[derive(Debug, Error)]
pub enum PartitionError {
	/// The leaf predicate or deduplication probe failed to compare rasters.
	#[error("comparison failed in node {id:?}: {source}")]
	Compare {
		id: String,
		source: CompareError,
	},
	/// An interpolator could not be resolved.
	#[error(transparent)]
	Scale(#[from] ScaleError),
}

/// Reason why a quadtree couldn't be encoded into an archive.
#[derive(Debug, Error)]
pub enum EncodeError {
	/// The configured archive format name matches no known container.
	#[error("no archive container found for format {0:?}")]
	UnknownArchiveFormat(String),
	/// A leaf's canonical block could not be encoded as JPEG.
	#[error("JPEG encoding failed for leaf {path:?}: {source}")]
	Jpeg {
		path: String,
		source: image::ImageError,
	},
	/// The tree has not been partitioned yet, so there is nothing to encode.
	#[error("quadtree has not been partitioned")]
	NotPartitioned,
	/// The archive container could not be written.
	#[error(transparent)]
	Io(#[from] std::io::Error),
	/// The zip container could not be written.
	#[error(transparent)]
	Zip(#[from] zip::result::ZipError),
}

/// Reason why an archive couldn't be decoded back into an image.
#[derive(Debug, Error)]
pub enum DecodeError {
	/// The input's magic bytes identify neither a gzip nor a zip stream.
	#[error("input is not a known archive type")]
	UnknownArchiveType,
	/// The archive carries no metadata entry.
	#[error("archive contains no metadata entry")]
	MissingMetadata,
	/// The metadata entry did not parse into exactly three integers.
	#[error("metadata entry is malformed: {0}")]
	MalformedMetadata(String),
	/// An entry path requires more tree levels than the recorded height.
	#[error("path {path:?} exceeds the recorded tree height of {height}")]
	PathTooDeep { path: String, height: usize },
	/// An entry path contains a component that is not a quadrant digit.
	#[error("path {path:?} contains invalid child digit {digit:?}")]
	InvalidChildDigit { path: String, digit: String },
	/// A symbolic reference names an entry that is not in the archive.
	#[error("symbolic reference target {0:?} does not exist")]
	MissingReferenceTarget(String),
	/// An entry's bytes are neither an image payload nor valid UTF-8.
	#[error("entry {path:?} is neither an image nor a valid reference")]
	MalformedReference { path: String },
	/// A leaf payload could not be decoded as an image.
	#[error("payload of entry {path:?} could not be decoded: {source}")]
	Payload {
		path: String,
		source: image::ImageError,
	},
	/// An interpolator could not be resolved.
	#[error(transparent)]
	Scale(#[from] ScaleError),
	/// The archive container could not be read.
	#[error(transparent)]
	Io(#[from] std::io::Error),
	/// The zip container could not be read.
	#[error(transparent)]
	Zip(#[from] zip::result::ZipError),
}
