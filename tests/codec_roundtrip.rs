use image::{Rgba, RgbaImage};

use quadtree_block::config::Config;
use quadtree_block::node::archive::{ArchiveMode, ArchiveReader, ArchiveWriter, META_FILE};
use quadtree_block::node::error::DecodeError;
use quadtree_block::QuadtreeImage;

/// Deterministic pseudo-random byte stream for high-detail test images.
fn noise(seed: u32) -> impl FnMut() -> u8 {
	let mut state = seed;
	move || {
		state = state.wrapping_mul(1103515245).wrapping_add(12345);
		(state >> 16) as u8
	}
}

fn noise_image(width: u32, height: u32, seed: u32) -> RgbaImage {
	let mut next = noise(seed);
	let mut img = RgbaImage::new(width, height);
	for pixel in img.pixels_mut() {
		*pixel = Rgba([next(), next(), next(), 255]);
	}
	img
}

fn encode(source: RgbaImage, config: &Config) -> Vec<u8> {
	let mut quadtree = QuadtreeImage::new(source, config.clone());
	quadtree.partition().unwrap();
	quadtree.encode().unwrap()
}

#[test]
fn solid_color_images_collapse_to_a_single_entry() {
	// A 16x16 solid raster passes the leaf predicate at the root
	let source = RgbaImage::from_pixel(16, 16, Rgba([200, 50, 50, 255]));
	let mut config = Config::default();
	config.quadtree.similarity_cutoff = 0.9;

	let archive = encode(source, &config);
	let reader = ArchiveReader::open(&archive).unwrap();
	assert_eq!(reader.len(), 2);
	assert_eq!(reader.entry(META_FILE), Some(&b"1\n16\n16"[..]));
	assert!(reader.entry("").is_some());

	// The decoded raster is uniform up to JPEG noise
	let outcome = QuadtreeImage::decode(&archive, &config).unwrap();
	assert_eq!(outcome.image.dimensions(), (16, 16));
	for pixel in outcome.image.pixels() {
		assert!((pixel.0[0] as i16 - 200).abs() < 16);
		assert!((pixel.0[1] as i16 - 50).abs() < 16);
		assert!((pixel.0[2] as i16 - 50).abs() < 16);
	}
}

#[test]
fn block_sized_images_cannot_subdivide() {
	// Every pixel distinct: the predicate would reject the root, but
	// an 8x8 region is already at block size
	let source = noise_image(8, 8, 99);
	let config = Config::default();

	let archive = encode(source, &config);
	let reader = ArchiveReader::open(&archive).unwrap();
	assert_eq!(reader.len(), 2);
	assert!(reader.entry("").is_some());
	assert_eq!(reader.entry(META_FILE), Some(&b"0\n8\n8"[..]));
}

#[test]
fn out_of_bounds_blocks_are_skipped_when_enabled() {
	let source = noise_image(24, 8, 7);
	let mut config = Config::default();
	config.encoding.skip_out_of_bounds_blocks.enable = true;

	let archive = encode(source.clone(), &config);
	let reader = ArchiveReader::open(&archive).unwrap();
	assert_eq!(reader.entry(META_FILE), Some(&b"2\n24\n8"[..]));
	for (name, _) in reader.entries() {
		if name == META_FILE {
			continue;
		}
		// The bottom-left and bottom-right padding quadrants are absent
		assert!(!name.starts_with('2') && !name.starts_with('3'), "unexpected entry {name:?}");
		// As are the padding children of the top-right quadrant
		assert!(!name.starts_with("1/1") && !name.starts_with("1/2") && !name.starts_with("1/3"));
	}

	// Without skipping, the padding leaves are present
	config.encoding.skip_out_of_bounds_blocks.enable = false;
	let unskipped = encode(source, &config);
	let unskipped_reader = ArchiveReader::open(&unskipped).unwrap();
	assert!(unskipped_reader.len() > reader.len());
	assert!(unskipped_reader.entry("2").is_some());
	assert!(unskipped_reader.entry("3").is_some());

	// Both variants restore the original dimensions
	for archive in [&archive, &unskipped] {
		let outcome = QuadtreeImage::decode(archive, &config).unwrap();
		assert_eq!(outcome.image.dimensions(), (24, 8));
	}
}

#[test]
fn identical_quadrants_deduplicate_into_a_reference() {
	// Top-left and bottom-right quadrants byte-identical, the other two
	// strongly different
	let quadrant = noise_image(8, 8, 1);
	let mut source = RgbaImage::new(16, 16);
	let mut other = noise(42);
	for y in 0..16 {
		for x in 0..16 {
			let pixel = if (x < 8 && y < 8) || (x >= 8 && y >= 8) {
				*quadrant.get_pixel(x % 8, y % 8)
			} else {
				Rgba([other(), other(), other(), 255])
			};
			source.put_pixel(x, y, pixel);
		}
	}

	let mut config = Config::default();
	config.encoding.deduplicate_blocks.enable = true;
	config.encoding.deduplicate_blocks.minimal_similarity = 0.95;

	let archive = encode(source, &config);
	let reader = ArchiveReader::open(&archive).unwrap();

	// The first identical quadrant carries the JPEG payload, the second
	// only a reference to it
	let first = reader.entry("0").unwrap();
	let second = reader.entry("3").unwrap();
	assert!(first.starts_with(&[0xff, 0xd8]), "leaf 0 should be a JPEG payload");
	assert_eq!(second, b"0");

	// Both leaves decode to bit-identical pixels
	let outcome = QuadtreeImage::decode(&archive, &config).unwrap();
	for y in 0..8 {
		for x in 0..8 {
			assert_eq!(outcome.image.get_pixel(x, y), outcome.image.get_pixel(x + 8, y + 8));
		}
	}
}

#[test]
fn serial_encodes_are_byte_identical() {
	for format in ["gzip", "zip"] {
		let mut config = Config::default();
		config.encoding.archive_format = format.to_owned();
		config.encoding.parallelism = false;

		let first = encode(noise_image(20, 30, 5), &config);
		let second = encode(noise_image(20, 30, 5), &config);
		assert_eq!(first, second, "{format} encode is not deterministic");
	}
}

#[test]
fn decoding_restores_the_original_dimensions() {
	let config = Config::default();
	for (width, height) in [(17, 13), (8, 8), (64, 5), (1, 1)] {
		let archive = encode(noise_image(width, height, width * 31 + height), &config);
		let outcome = QuadtreeImage::decode(&archive, &config).unwrap();
		assert_eq!(outcome.image.dimensions(), (width, height));
	}
}

#[test]
fn parallel_runs_agree_with_serial_runs() {
	let source = noise_image(32, 32, 11);

	let mut serial_config = Config::default();
	serial_config.encoding.parallelism = false;
	let serial = encode(source.clone(), &serial_config);

	let mut parallel_config = Config::default();
	parallel_config.encoding.parallelism = true;
	parallel_config.decoding.parallelism = true;
	let parallel = encode(source, &parallel_config);

	// Without deduplication the leaf payloads are schedule-independent
	// and the serial emission walk fixes the entry order
	assert_eq!(serial, parallel);

	let serial_outcome = QuadtreeImage::decode(&serial, &serial_config).unwrap();
	let parallel_outcome = QuadtreeImage::decode(&parallel, &parallel_config).unwrap();
	assert_eq!(serial_outcome.image, parallel_outcome.image);
}

#[test]
fn truncated_metadata_fails_decoding() {
	let mut writer = ArchiveWriter::new(ArchiveMode::Gzip);
	writer.write_file(META_FILE, b"1\n16").unwrap();
	let archive = writer.finish().unwrap();

	assert!(matches!(
		QuadtreeImage::decode(&archive, &Config::default()),
		Err(DecodeError::MalformedMetadata(_))
	));
}

#[test]
fn missing_metadata_fails_decoding() {
	let mut writer = ArchiveWriter::new(ArchiveMode::Zip);
	writer.write_file("0", b"not relevant").unwrap();
	let archive = writer.finish().unwrap();

	assert!(matches!(
		QuadtreeImage::decode(&archive, &Config::default()),
		Err(DecodeError::MissingMetadata)
	));
}

#[test]
fn invalid_child_digits_fail_decoding() {
	let mut writer = ArchiveWriter::new(ArchiveMode::Gzip);
	writer.write_file("0/4/1", b"payload").unwrap();
	writer.write_file(META_FILE, b"3\n64\n64").unwrap();
	let archive = writer.finish().unwrap();

	assert!(matches!(
		QuadtreeImage::decode(&archive, &Config::default()),
		Err(DecodeError::InvalidChildDigit { digit, .. }) if digit == "4"
	));
}

#[test]
fn gzip_and_zip_round_trip_the_same_pixels() {
	let source = noise_image(24, 24, 3);
	let mut gzip_config = Config::default();
	gzip_config.encoding.archive_format = "gzip".to_owned();
	let mut zip_config = Config::default();
	zip_config.encoding.archive_format = "zip".to_owned();

	let gzip_archive = encode(source.clone(), &gzip_config);
	let zip_archive = encode(source, &zip_config);
	assert_eq!(ArchiveMode::probe(&gzip_archive), Some(ArchiveMode::Gzip));
	assert_eq!(ArchiveMode::probe(&zip_archive), Some(ArchiveMode::Zip));

	let from_gzip = QuadtreeImage::decode(&gzip_archive, &gzip_config).unwrap();
	let from_zip = QuadtreeImage::decode(&zip_archive, &zip_config).unwrap();
	assert_eq!(from_gzip.image, from_zip.image);
}
