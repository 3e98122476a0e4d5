use std::collections::HashMap;

use image::{imageops, Rgba, RgbaImage};

use super::pixel::{self, Region};
use super::LeafView;

/// Angle in degrees between consecutive group hues; spreads any number
/// of groups roughly evenly around the color wheel.
const GOLDEN_ANGLE: f64 = 137.508;

/// Renders the image encoded in a set of leaves.
///
/// Leaf reconstructions are drawn at their regions into a raster of
/// the size of `bounds`. Skippable leaves are only drawn when
/// `include_skippable` is set (the padded rendering).
pub fn block_image(leaves: &[LeafView<'_>], bounds: Region, include_skippable: bool) -> RgbaImage {
	let mut output = RgbaImage::new(bounds.width(), bounds.height());
	for leaf in leaves {
		if leaf.can_be_skipped && !include_skippable {
			continue;
		}
		imageops::replace(
			&mut output,
			leaf.reconstruction,
			leaf.region.min_x as i64,
			leaf.region.min_y as i64,
		);
	}
	output
}

/// Renders the bounding boxes of a set of leaves on top of their block
/// image.
///
/// With `grouped` set, leaves sharing a canonical block are filled in a
/// color unique to that block, and leaves whose block is used only once
/// are filled black; otherwise boxes are drawn as plain outlines.
pub fn box_image(
	leaves: &[LeafView<'_>],
	bounds: Region,
	include_skippable: bool,
	grouped: bool,
) -> RgbaImage {
	let mut output = block_image(leaves, bounds, include_skippable);
	let outline = Rgba([255, 0, 0, 255]);
	let group_colors = if grouped { group_colors(leaves) } else { HashMap::new() };

	for leaf in leaves {
		if leaf.can_be_skipped && !include_skippable {
			continue;
		}
		let fill = leaf.group.and_then(|group| group_colors.get(&group).copied());
		pixel::rectangle(&mut output, leaf.region, outline, fill);
	}
	output
}

/// Assigns a fill color to every catalogue group used by the leaves.
///
/// Groups used more than once walk the color wheel in golden-angle
/// steps, so related leaves are recognisable at a glance; single-use
/// groups all map to black.
fn group_colors(leaves: &[LeafView<'_>]) -> HashMap<usize, Rgba<u8>> {
	let mut counts: HashMap<usize, usize> = HashMap::new();
	for leaf in leaves {
		if let Some(group) = leaf.group {
			*counts.entry(group).or_insert(0) += 1;
		}
	}

	let mut shared: Vec<usize> = counts
		.iter()
		.filter(|(_, count)| **count > 1)
		.map(|(group, _)| *group)
		.collect();
	shared.sort_unstable();

	let mut colors = HashMap::new();
	for (position, group) in shared.iter().enumerate() {
		let hue = (position as f64 * GOLDEN_ANGLE) % 360.0;
		colors.insert(*group, hsv_to_rgba(hue, 0.8, 0.9));
	}
	for (group, count) in counts {
		if count == 1 {
			colors.insert(group, Rgba([0, 0, 0, 255]));
		}
	}
	colors
}

/// Converts a hue (degrees), saturation and value triple to RGBA.
fn hsv_to_rgba(hue: f64, saturation: f64, value: f64) -> Rgba<u8> {
	let chroma = value * saturation;
	let side = hue / 60.0;
	let x = chroma * (1.0 - (side % 2.0 - 1.0).abs());
	let (r, g, b) = match side as u32 {
		0 => (chroma, x, 0.0),
		1 => (x, chroma, 0.0),
		2 => (0.0, chroma, x),
		3 => (0.0, x, chroma),
		4 => (x, 0.0, chroma),
		_ => (chroma, 0.0, x),
	};
	let offset = value - chroma;
	Rgba([
		((r + offset) * 255.0).round() as u8,
		((g + offset) * 255.0).round() as u8,
		((b + offset) * 255.0).round() as u8,
		255,
	])
}
