pub mod scale;

use image::{Rgba, RgbaImage};

use super::error::CompareError;

/// Perceptual weight of the red channel during pixel comparison.
const WEIGHT_RED: f64 = 0.2989;
/// Perceptual weight of the green channel during pixel comparison.
const WEIGHT_GREEN: f64 = 0.5870;
/// Perceptual weight of the blue channel during pixel comparison.
const WEIGHT_BLUE: f64 = 0.1140;

/// Base tolerance for a channel match, in 16-bit channel space.
///
/// The effective tolerance of a channel is `CHANNEL_TOLERANCE` scaled
/// by that channel's weight.
const CHANNEL_TOLERANCE: f64 = 1000.0;

/// An axis-aligned rectangle over raster coordinates.
///
/// The rectangle is half-open: it covers `min_x <= x < max_x` and
/// `min_y <= y < max_y`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
	pub min_x: u32,
	pub min_y: u32,
	pub max_x: u32,
	pub max_y: u32,
}

impl Region {
	pub fn new(min_x: u32, min_y: u32, max_x: u32, max_y: u32) -> Region {
		Region { min_x, min_y, max_x, max_y }
	}

	/// Builds the region covering a whole raster, anchored at the origin.
	pub fn of_image(img: &RgbaImage) -> Region {
		Region::new(0, 0, img.width(), img.height())
	}

	pub fn width(&self) -> u32 {
		self.max_x - self.min_x
	}

	pub fn height(&self) -> u32 {
		self.max_y - self.min_y
	}

	/// Whether the point `(x, y)` lies inside the region.
	pub fn contains(&self, x: u32, y: u32) -> bool {
		x >= self.min_x && x < self.max_x && y >= self.min_y && y < self.max_y
	}

	/// Whether this region and `other` share at least one pixel.
	pub fn intersects(&self, other: Region) -> bool {
		self.min_x < other.max_x && self.max_x > other.min_x &&
			self.min_y < other.max_y && self.max_y > other.min_y
	}

	/// Returns the quadrant of this region selected by a child digit.
	///
	/// Bit 0 of `index` selects the right half, bit 1 the bottom half,
	/// so the digits 0 to 3 name the top-left, top-right, bottom-left
	/// and bottom-right quadrants in that order.
	pub fn quadrant(&self, index: usize) -> Region {
		let half_width = self.width() / 2;
		let half_height = self.height() / 2;
		let (min_x, max_x) = if index & 1 == 0 {
			(self.min_x, self.min_x + half_width)
		} else {
			(self.min_x + half_width, self.max_x)
		};
		let (min_y, max_y) = if index & 2 == 0 {
			(self.min_y, self.min_y + half_height)
		} else {
			(self.min_y + half_height, self.max_y)
		};
		Region::new(min_x, min_y, max_x, max_y)
	}
}

/// Compares two equally-bounded rasters pixel by pixel, weighting each
/// color channel by how strongly it contributes to perceived luminance.
///
/// Both rasters are interpreted as covering `bounds`; positions outside
/// `clip` carry no signal (they are padding) and are skipped. Each channel
/// of the remaining pixels matches when the channel values, taken in
/// 16-bit channel space, are at most `1000` times the channel weight
/// apart. The result ranges from 0 (nothing matches) to 1 (identical
/// rasters). A region that lies entirely outside `clip` compares as 1.
///
/// Will return an `Err` if the raster dimensions disagree with each other
/// or with `bounds`.
pub fn compare_pixels_weighted(
	image_a: &RgbaImage,
	image_b: &RgbaImage,
	bounds: Region,
	clip: Region,
) -> Result<f64, CompareError> {
	if image_a.dimensions() != image_b.dimensions() ||
		image_a.dimensions() != (bounds.width(), bounds.height()) {
		return Err(CompareError::BoundsMismatch {
			left: image_a.dimensions(),
			right: image_b.dimensions(),
		});
	}

	let mut matches = 0.0;
	let mut skipped = 0u64;

	for y in bounds.min_y..bounds.max_y {
		for x in bounds.min_x..bounds.max_x {
			// The padding is of no interest
			if !clip.contains(x, y) {
				skipped += 1;
				continue;
			}

			let a = image_a.get_pixel(x - bounds.min_x, y - bounds.min_y);
			let b = image_b.get_pixel(x - bounds.min_x, y - bounds.min_y);

			if channel_matches(a.0[0], b.0[0], WEIGHT_RED) {
				matches += WEIGHT_RED;
			}
			if channel_matches(a.0[1], b.0[1], WEIGHT_GREEN) {
				matches += WEIGHT_GREEN;
			}
			if channel_matches(a.0[2], b.0[2], WEIGHT_BLUE) {
				matches += WEIGHT_BLUE;
			}
		}
	}

	// A block with no pixels inside the clip needs no further refinement
	let total = bounds.width() as u64 * bounds.height() as u64;
	let relevant = total - skipped;
	if relevant == 0 {
		return Ok(1.0);
	}

	let weight_total = WEIGHT_RED + WEIGHT_GREEN + WEIGHT_BLUE;
	Ok((matches / (relevant as f64 * weight_total)).min(1.0))
}

/// Whether two 8-bit channel values, widened to 16-bit channel space,
/// lie within the weighted tolerance of each other.
fn channel_matches(a: u8, b: u8, weight: f64) -> bool {
	let a = a as f64 * 257.0;
	let b = b as f64 * 257.0;
	(a - b).abs() <= CHANNEL_TOLERANCE * weight
}

/// Draws a horizontal line onto a raster.
pub fn horizontal_line(img: &mut RgbaImage, x_start: u32, x_end: u32, y: u32, color: Rgba<u8>) {
	if y >= img.height() {
		return;
	}
	for x in x_start..=x_end.min(img.width().saturating_sub(1)) {
		img.put_pixel(x, y, color);
	}
}

/// Draws a vertical line onto a raster.
pub fn vertical_line(img: &mut RgbaImage, y_start: u32, y_end: u32, x: u32, color: Rgba<u8>) {
	if x >= img.width() {
		return;
	}
	for y in y_start..=y_end.min(img.height().saturating_sub(1)) {
		img.put_pixel(x, y, color);
	}
}

/// Draws the outline of a region onto a raster, optionally filling its
/// interior first.
pub fn rectangle(img: &mut RgbaImage, region: Region, color: Rgba<u8>, fill: Option<Rgba<u8>>) {
	if region.width() == 0 || region.height() == 0 {
		return;
	}
	if let Some(fill) = fill {
		for y in region.min_y..region.max_y.min(img.height()) {
			for x in region.min_x..region.max_x.min(img.width()) {
				img.put_pixel(x, y, fill);
			}
		}
	}
	horizontal_line(img, region.min_x, region.max_x - 1, region.min_y, color);
	horizontal_line(img, region.min_x, region.max_x - 1, region.max_y - 1, color);
	vertical_line(img, region.min_y, region.max_y - 1, region.min_x, color);
	vertical_line(img, region.min_y, region.max_y - 1, region.max_x - 1, color);
}
