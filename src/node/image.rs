use std::collections::HashMap;
use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{imageops, DynamicImage, RgbaImage};
use log::{debug, info};
use rayon::prelude::*;

use super::archive::{ArchiveMode, ArchiveReader, ArchiveWriter, META_FILE};
use super::catalogue::BlockCatalogue;
use super::decode::{DecodeContext, DecodeNode};
use super::error::{DecodeError, EncodeError, PartitionError};
use super::pixel::scale::{fill_space, Interpolator};
use super::pixel::Region;
use super::visualize;
use super::{QuadtreeNode, BLOCK_SIZE};

use crate::config::Config;

/// A raster together with its quadtree representation.
///
/// Holds the original image, its padded square copy, the block
/// catalogue shared by all partition tasks, and — once [`partition`]
/// has run — the root of the quadtree.
///
/// [`partition`]: QuadtreeImage::partition
pub struct QuadtreeImage {
	/// Original image.
	base: RgbaImage,
	/// Original image extended to a padded square.
	padded: RgbaImage,
	/// Bounds of the original image within the padded square.
	image_bounds: Region,
	/// Root of the quadtree; present after partitioning.
	root: Option<QuadtreeNode>,
	/// All canonical blocks produced so far.
	catalogue: BlockCatalogue,
	config: Config,
}

impl QuadtreeImage {
	/// Wraps an image, padding it out to the smallest power-of-two
	/// multiple of the block size that covers both dimensions.
	pub fn new(base: RgbaImage, config: Config) -> QuadtreeImage {
		let padded = pad(&base);
		let image_bounds = Region::of_image(&base);
		QuadtreeImage {
			base,
			padded,
			image_bounds,
			root: None,
			catalogue: BlockCatalogue::new(),
			config,
		}
	}

	/// Recursively splits the padded raster into the quadtree.
	pub fn partition(&mut self) -> Result<(), PartitionError> {
		let region = Region::of_image(&self.padded);
		let mut root = QuadtreeNode::new(
			String::new(),
			self.padded.clone(),
			region,
			self.image_bounds,
			&self.catalogue,
			&self.config,
		)?;
		root.partition(self.image_bounds, &self.catalogue, &self.config)?;

		info!(
			"partitioned {}x{} image (padded to {}x{}) into {} leaves ({} canonical blocks)",
			self.base.width(),
			self.base.height(),
			self.padded.width(),
			self.padded.height(),
			root.leaves().len(),
			self.catalogue.len(),
		);
		self.root = Some(root);
		Ok(())
	}

	/// Encodes the partitioned quadtree into an in-memory archive.
	///
	/// Walks the tree depth first, writing one entry per leaf: the
	/// JPEG-encoded canonical block for the first leaf carrying it and
	/// a symbolic reference for every later one. The metadata entry is
	/// appended last.
	pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
		let root = self.root.as_ref().ok_or(EncodeError::NotPartitioned)?;
		let mode = ArchiveMode::from_name(&self.config.encoding.archive_format)?;
		let mut writer = ArchiveWriter::new(mode);

		// Map each emitted canonical block to the first path that wrote it
		let mut emitted: HashMap<usize, String> = HashMap::new();
		let mut references = 0usize;
		self.encode_node(root, &mut writer, &mut emitted, &mut references)?;

		debug!(
			"emitted {} blocks and {} symbolic references",
			emitted.len(),
			references,
		);

		let meta = format!(
			"{}\n{}\n{}",
			self.height(),
			self.base.width(),
			self.base.height(),
		);
		writer.write_file(META_FILE, meta.as_bytes())?;
		writer.finish()
	}

	fn encode_node(
		&self,
		node: &QuadtreeNode,
		writer: &mut ArchiveWriter,
		emitted: &mut HashMap<usize, String>,
		references: &mut usize,
	) -> Result<(), EncodeError> {
		let skip = self.config.encoding.skip_out_of_bounds_blocks.enable && node.can_be_skipped;
		if node.is_leaf && !skip {
			let path = node.archive_path();
			if let Some(target) = emitted.get(&node.canonical_index()) {
				// This exact block was already written; point at it instead
				writer.write_file(&path, target.as_bytes())?;
				*references += 1;
			} else {
				let payload = encode_jpeg(node.canonical(), &path)?;
				writer.write_file(&path, &payload)?;
				emitted.insert(node.canonical_index(), path);
			}
		} else {
			for child in &node.children {
				self.encode_node(child, writer, emitted, references)?;
			}
		}
		Ok(())
	}

	/// Decodes an archive back into an image.
	///
	/// The container is inferred from the archive's magic bytes, all
	/// entries are cached, and each non-metadata entry reconstructs one
	/// leaf of a freshly synthesised tree. The leaves are then
	/// composited into an output raster of the recorded dimensions.
	pub fn decode(bytes: &[u8], config: &Config) -> Result<DecodeOutcome, DecodeError> {
		let reader = ArchiveReader::open(bytes)?;

		let meta = reader.entry(META_FILE).ok_or(DecodeError::MissingMetadata)?;
		let (height, width, image_height) = parse_meta(meta)?;

		let padded_edge = padded_edge(width, image_height);
		let root = DecodeNode::new(String::new(), Region::new(0, 0, padded_edge, padded_edge));
		let context = DecodeContext {
			reader: &reader,
			upsampler: Interpolator::from_name(&config.quadtree.upsampling_interpolator)?,
			height,
		};

		let entries: Vec<(&str, &[u8])> = reader
			.entries()
			.filter(|(name, _)| *name != META_FILE)
			.collect();
		info!(
			"decoding {} archive entries (tree height {}, padded edge {})",
			entries.len(),
			height,
			padded_edge,
		);

		let decode_one = |(name, contents): &(&str, &[u8])| -> Result<(), DecodeError> {
			root.decode_entry(name, name, contents, height, &context)
		};
		if config.decoding.parallelism {
			entries.par_iter().try_for_each(decode_one)?;
		} else {
			entries.iter().try_for_each(decode_one)?;
		}

		let mut image = RgbaImage::new(width, image_height);
		root.composite_into(&mut image);
		Ok(DecodeOutcome { image, root })
	}

	/// How high the tree needs to be for its deepest possible leaves to
	/// reach block size.
	pub fn height(&self) -> usize {
		(self.padded.width() / BLOCK_SIZE).trailing_zeros() as usize
	}

	pub fn padded(&self) -> &RgbaImage {
		&self.padded
	}

	/// Renders the image as encoded in the quadtree.
	///
	/// Returns `None` before partitioning. If `padded` is true the
	/// padding area around the original image is included as well.
	pub fn block_image(&self, padded: bool) -> Option<RgbaImage> {
		let root = self.root.as_ref()?;
		Some(visualize::block_image(
			&root.leaf_views(),
			self.output_bounds(padded),
			padded,
		))
	}

	/// Renders the bounding boxes of the quadtree leaves.
	///
	/// Returns `None` before partitioning. With `grouped` set, leaves
	/// sharing one canonical block are filled in a shared color.
	pub fn box_image(&self, padded: bool, grouped: bool) -> Option<RgbaImage> {
		let root = self.root.as_ref()?;
		Some(visualize::box_image(
			&root.leaf_views(),
			self.output_bounds(padded),
			padded,
			grouped,
		))
	}

	fn output_bounds(&self, padded: bool) -> Region {
		if padded {
			Region::of_image(&self.padded)
		} else {
			self.image_bounds
		}
	}
}

/// Result of decoding an archive: the output raster and the rebuilt
/// tree (kept for visualization).
pub struct DecodeOutcome {
	pub image: RgbaImage,
	pub root: DecodeNode,
}

impl DecodeOutcome {
	/// Renders the image as reconstructed from the archive.
	///
	/// If `padded` is true the padding area around the original image
	/// is included as well.
	pub fn block_image(&self, padded: bool) -> RgbaImage {
		visualize::block_image(&self.root.leaf_views(), self.output_bounds(padded), padded)
	}

	/// Renders the bounding boxes of the reconstructed leaves.
	///
	/// With `grouped` set, leaves known to share one canonical block
	/// are filled in a shared color; the archive records no block
	/// identities, so reconstructed leaves draw as plain outlines.
	pub fn box_image(&self, padded: bool, grouped: bool) -> RgbaImage {
		visualize::box_image(&self.root.leaf_views(), self.output_bounds(padded), padded, grouped)
	}

	fn output_bounds(&self, padded: bool) -> Region {
		if padded {
			self.root.region
		} else {
			Region::of_image(&self.image)
		}
	}
}

/// The padded square edge for an image of the given dimensions: the
/// smallest power-of-two multiple of the block size covering both.
fn padded_edge(width: u32, height: u32) -> u32 {
	let longer = width.max(height);
	let mut edge = BLOCK_SIZE;
	while edge < longer {
		edge *= 2;
	}
	edge
}

/// Copies an image into its padded square, filling the padding area by
/// extruding the outermost content pixels.
fn pad(base: &RgbaImage) -> RgbaImage {
	let edge = padded_edge(base.width(), base.height());
	let mut padded = RgbaImage::new(edge, edge);
	imageops::replace(&mut padded, base, 0, 0);
	fill_space(&mut padded, Region::of_image(base));
	padded
}

/// JPEG-encodes a canonical block with default options.
///
/// JPEG carries no alpha channel, so the block's RGB view is encoded.
fn encode_jpeg(block: &RgbaImage, path: &str) -> Result<Vec<u8>, EncodeError> {
	let rgb = DynamicImage::ImageRgba8(block.clone()).to_rgb8();
	let mut bytes = Vec::new();
	JpegEncoder::new(&mut Cursor::new(&mut bytes))
		.encode_image(&rgb)
		.map_err(|source| EncodeError::Jpeg { path: path.to_owned(), source })?;
	Ok(bytes)
}

/// Parses the metadata entry: tree height, original width and original
/// height as three decimal integers separated by single newlines.
fn parse_meta(contents: &[u8]) -> Result<(usize, u32, u32), DecodeError> {
	let text = std::str::from_utf8(contents)
		.map_err(|_| DecodeError::MalformedMetadata("metadata is not UTF-8".to_owned()))?;
	let lines: Vec<&str> = text.split('\n').collect();
	if lines.len() != 3 {
		return Err(DecodeError::MalformedMetadata(format!(
			"expected three newline-separated values, found {}",
			lines.len(),
		)));
	}
	let height = lines[0]
		.parse::<usize>()
		.map_err(|_| DecodeError::MalformedMetadata(format!("invalid tree height {:?}", lines[0])))?;
	let width = lines[1]
		.parse::<u32>()
		.map_err(|_| DecodeError::MalformedMetadata(format!("invalid width {:?}", lines[1])))?;
	let image_height = lines[2]
		.parse::<u32>()
		.map_err(|_| DecodeError::MalformedMetadata(format!("invalid height {:?}", lines[2])))?;
	Ok((height, width, image_height))
}
