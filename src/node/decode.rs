use std::sync::OnceLock;

use image::{imageops, RgbaImage};

use super::archive::ArchiveReader;
use super::error::DecodeError;
use super::pixel::scale::{scale, Interpolator};
use super::pixel::Region;
use super::{LeafView, CHILD_COUNT};

/// Shared context of one decode run.
pub(crate) struct DecodeContext<'a> {
	pub reader: &'a ArchiveReader,
	pub upsampler: Interpolator,
	/// Tree height recorded in the archive metadata.
	pub height: usize,
}

/// Node of the tree rebuilt while decoding an archive.
///
/// Interior nodes are materialised on first visit; when entries are
/// decoded in parallel, racing visitors agree on a single creation
/// through the once-initialised child list. A node reached at the end
/// of an entry path additionally holds that leaf's reconstruction.
#[derive(Debug)]
pub struct DecodeNode {
	pub id: String,
	pub region: Region,
	children: OnceLock<Vec<DecodeNode>>,
	reconstruction: OnceLock<RgbaImage>,
}

impl DecodeNode {
	pub(crate) fn new(id: String, region: Region) -> DecodeNode {
		DecodeNode {
			id,
			region,
			children: OnceLock::new(),
			reconstruction: OnceLock::new(),
		}
	}

	/// Walks `path` digit by digit below this node and reconstructs the
	/// leaf pixels from `contents` at the end of the walk.
	///
	/// `entry` is the full entry name, kept for error context; `path` is
	/// the part still to walk.
	pub(crate) fn decode_entry(
		&self,
		entry: &str,
		path: &str,
		contents: &[u8],
		remaining_height: usize,
		context: &DecodeContext<'_>,
	) -> Result<(), DecodeError> {
		// An empty remainder means this node is the entry's leaf
		if path.is_empty() {
			let block = decode_payload(entry, contents, context.reader)?;
			let reconstruction =
				scale(&block, self.region.width(), self.region.height(), context.upsampler);
			// Duplicate entries for one path keep the first reconstruction
			let _ = self.reconstruction.set(reconstruction);
			return Ok(());
		}

		if remaining_height == 0 {
			return Err(DecodeError::PathTooDeep {
				path: entry.to_owned(),
				height: context.height,
			});
		}

		let children = self.children.get_or_init(|| {
			(0..CHILD_COUNT)
				.map(|index| {
					DecodeNode::new(format!("{}{}", self.id, index), self.region.quadrant(index))
				})
				.collect()
		});

		let (digit, rest) = match path.split_once('/') {
			Some((digit, rest)) => (digit, rest),
			None => (path, ""),
		};
		let index = match digit {
			"0" => 0,
			"1" => 1,
			"2" => 2,
			"3" => 3,
			_ => {
				return Err(DecodeError::InvalidChildDigit {
					path: entry.to_owned(),
					digit: digit.to_owned(),
				})
			}
		};

		children[index].decode_entry(entry, rest, contents, remaining_height - 1, context)
	}

	/// Draws every reconstructed leaf of this subtree onto `output`,
	/// clipped to the output dimensions.
	pub(crate) fn composite_into(&self, output: &mut RgbaImage) {
		if let Some(reconstruction) = self.reconstruction.get() {
			imageops::replace(
				output,
				reconstruction,
				self.region.min_x as i64,
				self.region.min_y as i64,
			);
		}
		if let Some(children) = self.children.get() {
			for child in children {
				child.composite_into(output);
			}
		}
	}

	/// Collects visualization views of the reconstructed leaves.
	pub fn leaf_views(&self) -> Vec<LeafView<'_>> {
		let mut views = Vec::new();
		if let Some(reconstruction) = self.reconstruction.get() {
			views.push(LeafView {
				region: self.region,
				reconstruction,
				group: None,
				can_be_skipped: false,
			});
		}
		if let Some(children) = self.children.get() {
			for child in children {
				views.extend(child.leaf_views());
			}
		}
		views
	}
}

/// Turns an entry's bytes into a block raster.
///
/// Payload bytes whose magic bytes identify a known image type decode
/// directly. Anything else is interpreted as a UTF-8 path naming another
/// entry — a symbolic reference — which is followed exactly one level.
fn decode_payload(
	entry: &str,
	contents: &[u8],
	reader: &ArchiveReader,
) -> Result<RgbaImage, DecodeError> {
	let payload = if image::guess_format(contents).is_ok() {
		contents
	} else {
		let target = std::str::from_utf8(contents)
			.map_err(|_| DecodeError::MalformedReference { path: entry.to_owned() })?;
		reader
			.entry(target)
			.ok_or_else(|| DecodeError::MissingReferenceTarget(target.to_owned()))?
	};

	// A reference chained onto another reference fails to decode here
	let decoded = image::load_from_memory(payload)
		.map_err(|source| DecodeError::Payload { path: entry.to_owned(), source })?;
	Ok(decoded.to_rgba8())
}
