use std::sync::Arc;

use image::RgbaImage;
use parking_lot::RwLock;

/// Shared list of every canonical block seen so far during an encode.
///
/// The list only ever grows; published blocks are never mutated,
/// removed or reordered, so the index handed out by [`append`] stays
/// valid for the lifetime of the catalogue. Many partition tasks may
/// read concurrently while appends are serialised.
///
/// [`append`]: BlockCatalogue::append
#[derive(Debug, Default)]
pub struct BlockCatalogue {
	blocks: RwLock<Vec<Arc<RgbaImage>>>,
}

impl BlockCatalogue {
	pub fn new() -> BlockCatalogue {
		BlockCatalogue::default()
	}

	/// Publishes a block and returns its stable index.
	pub fn append(&self, block: Arc<RgbaImage>) -> usize {
		let mut blocks = self.blocks.write();
		blocks.push(block);
		blocks.len() - 1
	}

	/// Returns a self-consistent view of all blocks published so far.
	///
	/// The view does not observe appends that happen after it is taken.
	pub fn snapshot(&self) -> Vec<Arc<RgbaImage>> {
		self.blocks.read().clone()
	}

	pub fn len(&self) -> usize {
		self.blocks.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}
