use image::imageops::{self, FilterType};
use image::RgbaImage;

use super::Region;
use crate::node::error::ScaleError;

/// Interpolation algorithms accepted for scaling block images.
///
/// The names mirror the configuration file values. `ApproxBiLinear`
/// and `BiLinear` resolve to the same triangle filter; the approximate
/// variant is kept as an accepted name so existing configurations keep
/// working.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interpolator {
	NearestNeighbor,
	ApproxBiLinear,
	BiLinear,
	CatmullRom,
}

impl Interpolator {
	/// Resolves an interpolator from its configuration name.
	pub fn from_name(name: &str) -> Result<Interpolator, ScaleError> {
		match name {
			"NearestNeighbor" => Ok(Interpolator::NearestNeighbor),
			"ApproxBiLinear" => Ok(Interpolator::ApproxBiLinear),
			"BiLinear" => Ok(Interpolator::BiLinear),
			"CatmullRom" => Ok(Interpolator::CatmullRom),
			_ => Err(ScaleError::UnknownInterpolator(name.to_owned())),
		}
	}

	fn filter(self) -> FilterType {
		match self {
			Interpolator::NearestNeighbor => FilterType::Nearest,
			Interpolator::ApproxBiLinear | Interpolator::BiLinear => FilterType::Triangle,
			Interpolator::CatmullRom => FilterType::CatmullRom,
		}
	}
}

/// Scales a raster to the given dimensions into a newly allocated raster.
pub fn scale(img: &RgbaImage, width: u32, height: u32, interpolator: Interpolator) -> RgbaImage {
	imageops::resize(img, width, height, interpolator.filter())
}

/// One edge or corner extrusion step of `fill_space`.
struct FillOperation {
	/// Does this edge/corner need to be filled towards the raster boundary?
	should_fill: bool,
	/// Strip or pixel of `content` to be used as the filling.
	copy: Region,
	/// Area between `content` and the raster boundary to fill.
	target: Region,
}

/// Fills everything in `img` outside `content` by stretching the outermost
/// rows, columns and corner pixels of `content` out to the raster boundary.
///
/// Edges are filled first (right, top, left, bottom), then the corner
/// quadrants (top-right, top-left, bottom-left, bottom-right), each from
/// the single corner pixel of `content`. Blocks straddling the content
/// boundary therefore never see a hard discontinuity.
pub fn fill_space(img: &mut RgbaImage, content: Region) {
	let bounds = Region::of_image(img);

	let fill_right = content.max_x < bounds.max_x;
	let fill_top = content.min_y > bounds.min_y;
	let fill_left = content.min_x > bounds.min_x;
	let fill_bottom = content.max_y < bounds.max_y;

	let operations = [
		// Right edge
		FillOperation {
			should_fill: fill_right,
			copy: Region::new(content.max_x - 1, content.min_y, content.max_x, content.max_y),
			target: Region::new(content.max_x, content.min_y, bounds.max_x, content.max_y),
		},
		// Top edge
		FillOperation {
			should_fill: fill_top,
			copy: Region::new(content.min_x, content.min_y, content.max_x, content.min_y + 1),
			target: Region::new(content.min_x, bounds.min_y, content.max_x, content.min_y),
		},
		// Left edge
		FillOperation {
			should_fill: fill_left,
			copy: Region::new(content.min_x, content.min_y, content.min_x + 1, content.max_y),
			target: Region::new(bounds.min_x, content.min_y, content.min_x, content.max_y),
		},
		// Bottom edge
		FillOperation {
			should_fill: fill_bottom,
			copy: Region::new(content.min_x, content.max_y - 1, content.max_x, content.max_y),
			target: Region::new(content.min_x, content.max_y, content.max_x, bounds.max_y),
		},
		// Top-right corner
		FillOperation {
			should_fill: fill_right && fill_top,
			copy: Region::new(content.max_x - 1, content.min_y, content.max_x, content.min_y + 1),
			target: Region::new(content.max_x, bounds.min_y, bounds.max_x, content.min_y),
		},
		// Top-left corner
		FillOperation {
			should_fill: fill_left && fill_top,
			copy: Region::new(content.min_x, content.min_y, content.min_x + 1, content.min_y + 1),
			target: Region::new(bounds.min_x, bounds.min_y, content.min_x, content.min_y),
		},
		// Bottom-left corner
		FillOperation {
			should_fill: fill_left && fill_bottom,
			copy: Region::new(content.min_x, content.max_y - 1, content.min_x + 1, content.max_y),
			target: Region::new(bounds.min_x, content.max_y, content.min_x, bounds.max_y),
		},
		// Bottom-right corner
		FillOperation {
			should_fill: fill_right && fill_bottom,
			copy: Region::new(content.max_x - 1, content.max_y - 1, content.max_x, content.max_y),
			target: Region::new(content.max_x, content.max_y, bounds.max_x, bounds.max_y),
		},
	];

	for operation in operations {
		if !operation.should_fill {
			continue;
		}
		// Take the edge strip or corner pixel out of the content
		let strip = imageops::crop_imm(
			img,
			operation.copy.min_x,
			operation.copy.min_y,
			operation.copy.width(),
			operation.copy.height(),
		).to_image();
		// Stretch it towards the raster boundary
		let scaled = scale(
			&strip,
			operation.target.width(),
			operation.target.height(),
			Interpolator::NearestNeighbor,
		);
		imageops::replace(img, &scaled, operation.target.min_x as i64, operation.target.min_y as i64);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use image::Rgba;

	#[test]
	fn unknown_interpolator_names_are_rejected() {
		assert!(matches!(
			Interpolator::from_name("Lanczos"),
			Err(ScaleError::UnknownInterpolator(name)) if name == "Lanczos"
		));
		assert!(Interpolator::from_name("CatmullRom").is_ok());
	}

	#[test]
	fn scaling_changes_dimensions() {
		let img = RgbaImage::from_pixel(16, 16, Rgba([9, 9, 9, 255]));
		let scaled = scale(&img, 8, 8, Interpolator::BiLinear);
		assert_eq!(scaled.dimensions(), (8, 8));
	}

	#[test]
	fn fill_space_extrudes_edges_and_corner() {
		// 2x2 content in the top-left of a 4x4 raster
		let mut img = RgbaImage::new(4, 4);
		img.put_pixel(0, 0, Rgba([10, 0, 0, 255]));
		img.put_pixel(1, 0, Rgba([20, 0, 0, 255]));
		img.put_pixel(0, 1, Rgba([30, 0, 0, 255]));
		img.put_pixel(1, 1, Rgba([40, 0, 0, 255]));
		fill_space(&mut img, Region::new(0, 0, 2, 2));

		// Right edge extrudes the rightmost column
		assert_eq!(img.get_pixel(2, 0), &Rgba([20, 0, 0, 255]));
		assert_eq!(img.get_pixel(3, 1), &Rgba([40, 0, 0, 255]));
		// Bottom edge extrudes the bottom row
		assert_eq!(img.get_pixel(0, 3), &Rgba([30, 0, 0, 255]));
		assert_eq!(img.get_pixel(1, 2), &Rgba([40, 0, 0, 255]));
		// Bottom-right quadrant extrudes the corner pixel
		assert_eq!(img.get_pixel(3, 3), &Rgba([40, 0, 0, 255]));
	}

	#[test]
	fn fill_space_leaves_full_rasters_alone() {
		let img = RgbaImage::from_pixel(4, 4, Rgba([7, 7, 7, 255]));
		let mut filled = img.clone();
		fill_space(&mut filled, Region::of_image(&img));
		assert_eq!(img, filled);
	}
}
