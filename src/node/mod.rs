pub mod catalogue;
pub mod error;
pub mod pixel;

use std::sync::Arc;

// `::image` disambiguates the crate from the `image` submodule below
use ::image::{imageops, RgbaImage};
use rayon::prelude::*;

use self::catalogue::BlockCatalogue;
use self::error::PartitionError;
use self::pixel::scale::{scale, Interpolator};
use self::pixel::Region;

use crate::config::Config;

/// Edge length of a canonical block in pixels, matching a JPEG MCU.
pub const BLOCK_SIZE: u32 = 8;

/// Fan-out of the quadtree; always four quadrants per subdivision.
pub const CHILD_COUNT: usize = 4;

/// Node in a quadtree covering one square region of a padded raster.
///
/// Either a leaf holding a canonical block (branchless node) or an
/// internal node with exactly [`CHILD_COUNT`] children, one per
/// quadrant. The canonical block is the region downsampled to
/// [`BLOCK_SIZE`]; its upsampled reconstruction decides during
/// construction whether the region needs further subdivision.
#[derive(Debug)]
pub struct QuadtreeNode {
	/// Path from the root as quadrant digits `0`-`3`; empty at the root.
	pub id: String,
	/// Square of the padded raster covered by this node.
	pub region: Region,
	/// The pixels of `region`, copied out of the padded raster.
	base: RgbaImage,
	/// The canonical block; shared with the catalogue, and with other
	/// nodes when deduplication adopted an existing entry.
	canonical: Arc<RgbaImage>,
	/// Slot of the canonical block in the shared catalogue.
	canonical_index: usize,
	/// The canonical block scaled back up to the size of `region`.
	reconstruction: RgbaImage,
	/// Does this node hold a block rather than children?
	pub is_leaf: bool,
	/// May this node be omitted from the archive entirely?
	pub can_be_skipped: bool,
	/// Child nodes in quadrant-digit order; empty for leaves.
	pub children: Vec<QuadtreeNode>,
}

/// Borrowed view of one leaf, as needed by encoding and visualization.
pub struct LeafView<'a> {
	pub region: Region,
	pub reconstruction: &'a RgbaImage,
	/// Catalogue slot of the leaf's canonical block, where one exists.
	pub group: Option<usize>,
	pub can_be_skipped: bool,
}

impl QuadtreeNode {
	/// Builds a fully populated node covering `region`.
	///
	/// Construction downsamples `base` to the canonical block (adopting
	/// a sufficiently similar catalogue entry instead when deduplication
	/// is enabled), upsamples it back into the reconstruction, and then
	/// settles the leaf question: regions outside `image_bounds` are
	/// skippable leaves, regions at block size are forced leaves, and
	/// all others are leaves exactly when the reconstruction is similar
	/// enough to `base`.
	pub(crate) fn new(
		id: String,
		base: RgbaImage,
		region: Region,
		image_bounds: Region,
		catalogue: &BlockCatalogue,
		config: &Config,
	) -> Result<QuadtreeNode, PartitionError> {
		let downsampler = Interpolator::from_name(&config.quadtree.downsampling_interpolator)?;
		let upsampler = Interpolator::from_name(&config.quadtree.upsampling_interpolator)?;

		let downsampled = scale(&base, BLOCK_SIZE, BLOCK_SIZE, downsampler);

		let (canonical, canonical_index) = if config.encoding.deduplicate_blocks.enable {
			deduplicate(&id, downsampled, catalogue, config)?
		} else {
			let block = Arc::new(downsampled);
			let index = catalogue.append(Arc::clone(&block));
			(block, index)
		};

		let reconstruction = scale(&canonical, region.width(), region.height(), upsampler);

		let (is_leaf, can_be_skipped) = if !region.intersects(image_bounds) {
			// Blocks fully in the padding need neither subdivision nor encoding
			(true, true)
		} else if region.width() <= BLOCK_SIZE {
			(true, false)
		} else {
			let similarity =
				pixel::compare_pixels_weighted(&reconstruction, &base, region, image_bounds)
					.map_err(|source| PartitionError::Compare { id: id.clone(), source })?;
			(similarity > config.quadtree.similarity_cutoff, false)
		};

		Ok(QuadtreeNode {
			id,
			region,
			base,
			canonical,
			canonical_index,
			reconstruction,
			is_leaf,
			can_be_skipped,
			children: Vec::new(),
		})
	}

	/// Splits this node into its four quadrant children and recurses,
	/// unless it was already settled as a leaf.
	///
	/// With `Encoding.Parallelism` enabled every child subtree is built
	/// on its own task; siblings only share the block catalogue.
	pub(crate) fn partition(
		&mut self,
		image_bounds: Region,
		catalogue: &BlockCatalogue,
		config: &Config,
	) -> Result<(), PartitionError> {
		if self.is_leaf {
			return Ok(());
		}

		let results: Vec<Result<QuadtreeNode, PartitionError>> = {
			let build = |index: usize| -> Result<QuadtreeNode, PartitionError> {
				let quadrant = self.region.quadrant(index);
				let child_base = imageops::crop_imm(
					&self.base,
					quadrant.min_x - self.region.min_x,
					quadrant.min_y - self.region.min_y,
					quadrant.width(),
					quadrant.height(),
				).to_image();
				let mut child = QuadtreeNode::new(
					format!("{}{}", self.id, index),
					child_base,
					quadrant,
					image_bounds,
					catalogue,
					config,
				)?;
				child.partition(image_bounds, catalogue, config)?;
				Ok(child)
			};

			if config.encoding.parallelism {
				(0..CHILD_COUNT).into_par_iter().map(build).collect()
			} else {
				(0..CHILD_COUNT).map(build).collect()
			}
		};

		self.children = results.into_iter().collect::<Result<Vec<_>, _>>()?;
		Ok(())
	}

	/// The archive entry name of this node: its id digits separated
	/// by slashes (empty for the root).
	pub fn archive_path(&self) -> String {
		self.id
			.chars()
			.map(|digit| digit.to_string())
			.collect::<Vec<_>>()
			.join("/")
	}

	pub(crate) fn canonical(&self) -> &Arc<RgbaImage> {
		&self.canonical
	}

	pub(crate) fn canonical_index(&self) -> usize {
		self.canonical_index
	}

	/// Collects the leaves of this subtree in depth-first quadrant order.
	pub fn leaves(&self) -> Vec<&QuadtreeNode> {
		if self.children.is_empty() {
			vec![self]
		} else {
			self.children.iter().flat_map(QuadtreeNode::leaves).collect()
		}
	}

	/// Collects visualization views of the leaves of this subtree.
	pub fn leaf_views(&self) -> Vec<LeafView<'_>> {
		self.leaves()
			.into_iter()
			.map(|leaf| LeafView {
				region: leaf.region,
				reconstruction: &leaf.reconstruction,
				group: Some(leaf.canonical_index),
				can_be_skipped: leaf.can_be_skipped,
			})
			.collect()
	}
}

/// Probes the catalogue for a block similar enough to stand in for the
/// freshly downsampled `candidate`.
///
/// The best match at or above `MinimalSimilarity` is adopted as a shared
/// block; otherwise the candidate itself is published to the catalogue.
fn deduplicate(
	id: &str,
	candidate: RgbaImage,
	catalogue: &BlockCatalogue,
	config: &Config,
) -> Result<(Arc<RgbaImage>, usize), PartitionError> {
	let block_bounds = Region::of_image(&candidate);
	let mut best: Option<(f64, usize, Arc<RgbaImage>)> = None;

	for (index, other) in catalogue.snapshot().into_iter().enumerate() {
		let similarity =
			pixel::compare_pixels_weighted(&candidate, &other, block_bounds, block_bounds)
				.map_err(|source| PartitionError::Compare { id: id.to_owned(), source })?;
		if best.as_ref().map(|(s, _, _)| similarity > *s).unwrap_or(true) {
			best = Some((similarity, index, other));
		}
	}

	if let Some((similarity, index, block)) = best {
		if similarity >= config.encoding.deduplicate_blocks.minimal_similarity {
			return Ok((block, index));
		}
	}

	let block = Arc::new(candidate);
	let index = catalogue.append(Arc::clone(&block));
	Ok((block, index))
}

pub mod archive;
pub mod decode;
pub mod image;
pub mod visualize;

pub use self::image::QuadtreeImage;

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::Config;
	use ::image::Rgba;

	fn test_config(cutoff: f64) -> Config {
		let mut config = Config::default();
		config.quadtree.similarity_cutoff = cutoff;
		config
	}

	fn solid(edge: u32, value: u8) -> RgbaImage {
		RgbaImage::from_pixel(edge, edge, Rgba([value, value, value, 255]))
	}

	#[test]
	fn uniform_regions_become_leaves() {
		let catalogue = BlockCatalogue::new();
		let config = test_config(0.9);
		let base = solid(16, 120);
		let bounds = Region::of_image(&base);
		let node = QuadtreeNode::new(String::new(), base, bounds, bounds, &catalogue, &config)
			.unwrap();
		assert!(node.is_leaf);
		assert!(!node.can_be_skipped);
	}

	#[test]
	fn out_of_bounds_regions_are_skippable_leaves() {
		let catalogue = BlockCatalogue::new();
		let config = test_config(0.9);
		let base = solid(8, 120);
		let region = Region::new(24, 0, 32, 8);
		let image_bounds = Region::new(0, 0, 24, 8);
		let node = QuadtreeNode::new("1".to_owned(), base, region, image_bounds, &catalogue, &config)
			.unwrap();
		assert!(node.is_leaf);
		assert!(node.can_be_skipped);
	}

	#[test]
	fn block_sized_regions_never_subdivide() {
		let catalogue = BlockCatalogue::new();
		// A cutoff above 1 would otherwise force subdivision forever
		let config = test_config(1.5);
		let mut base = solid(8, 0);
		for (index, pixel) in base.pixels_mut().enumerate() {
			*pixel = Rgba([index as u8, 255 - index as u8, index as u8, 255]);
		}
		let bounds = Region::new(0, 0, 8, 8);
		let node = QuadtreeNode::new("00".to_owned(), base, bounds, bounds, &catalogue, &config)
			.unwrap();
		assert!(node.is_leaf);
		assert!(!node.can_be_skipped);
	}

	#[test]
	fn partition_tiles_the_region_exactly() {
		let catalogue = BlockCatalogue::new();
		let config = test_config(2.0); // unreachable cutoff: subdivide to block size
		let mut base = RgbaImage::new(32, 32);
		for (index, pixel) in base.pixels_mut().enumerate() {
			*pixel = Rgba([(index % 251) as u8, (index % 83) as u8, (index % 13) as u8, 255]);
		}
		let bounds = Region::of_image(&base);
		let mut root =
			QuadtreeNode::new(String::new(), base, bounds, bounds, &catalogue, &config).unwrap();
		root.partition(bounds, &catalogue, &config).unwrap();

		let leaves = root.leaves();
		let area: u64 = leaves
			.iter()
			.map(|leaf| leaf.region.width() as u64 * leaf.region.height() as u64)
			.sum();
		assert_eq!(area, 32 * 32);
		for (i, a) in leaves.iter().enumerate() {
			assert_eq!(a.region.width(), a.region.height());
			assert!(a.region.width() >= BLOCK_SIZE);
			assert!((a.region.width() / BLOCK_SIZE).is_power_of_two());
			for b in leaves.iter().skip(i + 1) {
				assert!(!a.region.intersects(b.region));
			}
		}
	}

	#[test]
	fn identical_quadrants_share_a_catalogue_block() {
		let catalogue = BlockCatalogue::new();
		let mut config = test_config(2.0); // subdivide once, then block-size leaves
		config.encoding.deduplicate_blocks.enable = true;
		config.encoding.deduplicate_blocks.minimal_similarity = 0.95;

		let base = solid(16, 77);
		let bounds = Region::of_image(&base);
		let mut root =
			QuadtreeNode::new(String::new(), base, bounds, bounds, &catalogue, &config).unwrap();
		root.partition(bounds, &catalogue, &config).unwrap();

		// Root published the first block; all four children adopted it
		assert_eq!(catalogue.len(), 1);
		for child in &root.children {
			assert_eq!(child.canonical_index(), 0);
			assert!(Arc::ptr_eq(child.canonical(), root.canonical()));
		}
	}
}
