use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::{arg, Command};
use image::RgbaImage;
use log::info;

use quadtree_block::config::Config;
use quadtree_block::node::archive::ArchiveMode;
use quadtree_block::node::image::DecodeOutcome;
use quadtree_block::QuadtreeImage;

/// Helper function for `main`.
fn error_exit(msg: &str, code: i32) -> ! {
	eprintln!("{}", msg);
	std::process::exit(code)
}

/// `clap`-based CLI for converting images to and from quadtree archives.
///
/// The direction of the conversion is inferred from the input file's
/// magic bytes: known image formats are encoded, known archive formats
/// are decoded.
///
/// May exit process with status code if there are errors:
///
/// 2: invalid arguments or configuration
///
/// 3: file I/O issues
///
/// 4: invalid image or archive data
///
/// 5: encoding or decoding failed
fn main() {
	env_logger::init();

	let matches = Command::new("quadtree_block")
		.version("0.1.0")
		.about("Converts images to and from a quadtree-of-JPEG-blocks compression format.")
		.arg(arg!(--input <PATH> "Image to encode or archive to decode").required(true))
		.arg(arg!(--output <PATH> "Path to write the result to").required(true))
		.arg(arg!(--config <PATH> "Path to read the program config from").required(true))
		.arg(arg!(--analyticsDir <DIR> "Directory to write analytics to"))
		.get_matches();

	let input_path = matches.get_one::<String>("input").unwrap();
	let output_path = matches.get_one::<String>("output").unwrap();
	let config_path = matches.get_one::<String>("config").unwrap();
	let analytics_dir = matches.get_one::<String>("analyticsDir");

	let config = match Config::from_path(config_path) {
		Ok(config) => config,
		Err(e) => error_exit(&format!("Could not load config: {}", e), 2),
	};
	if let Err(e) = config.validate() {
		error_exit(&format!("Invalid config: {}", e), 2);
	}

	let input = match fs::read(input_path) {
		Ok(input) => input,
		Err(_) => error_exit("File not found or could not be read", 3),
	};

	if image::guess_format(&input).is_ok() {
		info!("encoding image file {}", input_path);
		let source = match image::load_from_memory(&input) {
			Ok(source) => source.to_rgba8(),
			Err(_) => error_exit("Invalid image data", 4),
		};

		let mut quadtree = QuadtreeImage::new(source, config.clone());
		if let Err(e) = quadtree.partition() {
			error_exit(&format!("Partitioning failed: {}", e), 5);
		}
		let encoded = match quadtree.encode() {
			Ok(encoded) => encoded,
			Err(e) => error_exit(&format!("Encoding failed: {}", e), 5),
		};
		if fs::write(output_path, &encoded).is_err() {
			error_exit("Could not write to output file", 3);
		}
		info!("wrote {} archive bytes to {}", encoded.len(), output_path);
		println!("Encoded {} as a quadtree image and wrote it to {}", input_path, output_path);

		if config.visualization.enable {
			if let Some(dir) = analytics_dir {
				let files = encode_analytics(&quadtree, input_path, &input, output_path, &encoded);
				write_analytics(dir, files);
			}
		}
	} else if ArchiveMode::probe(&input).is_some() {
		info!("decoding quadtree file {}", input_path);
		let outcome = match QuadtreeImage::decode(&input, &config) {
			Ok(outcome) => outcome,
			Err(e) => error_exit(&format!("Decoding failed: {}", e), 4),
		};
		let decoded = match png_bytes(&outcome.image) {
			Ok(decoded) => decoded,
			Err(e) => error_exit(&format!("Could not render output: {}", e), 5),
		};
		if fs::write(output_path, &decoded).is_err() {
			error_exit("Could not write to output file", 3);
		}
		info!("wrote {} output bytes to {}", decoded.len(), output_path);
		println!("Decoded {} and wrote it to {}", input_path, output_path);

		if config.visualization.enable {
			if let Some(dir) = analytics_dir {
				let files = decode_analytics(&outcome, input_path, &input, output_path, &decoded);
				write_analytics(dir, files);
			}
		}
	} else {
		error_exit("Input file is neither a known image nor a known archive", 2);
	}
}

/// Encodes a raster as PNG bytes.
fn png_bytes(img: &RgbaImage) -> Result<Vec<u8>, image::ImageError> {
	let mut bytes = Vec::new();
	img.write_to(&mut Cursor::new(&mut bytes), image::ImageOutputFormat::Png)?;
	Ok(bytes)
}

/// Collects the analytics renderings of an encode run.
fn encode_analytics(
	quadtree: &QuadtreeImage,
	input_path: &str,
	input: &[u8],
	output_path: &str,
	output: &[u8],
) -> Vec<(String, Vec<u8>)> {
	let mut files = Vec::new();
	let renderings = [
		("encodedBlockVisualization.png", quadtree.block_image(false)),
		("encodedBlockVisualizationPadded.png", quadtree.block_image(true)),
		("encodedBoxVisualization.png", quadtree.box_image(false, false)),
		("encodedBoxVisualizationPadded.png", quadtree.box_image(true, false)),
		("encodedBoxGroupVisualization.png", quadtree.box_image(false, true)),
		("encodedBoxGroupVisualizationPadded.png", quadtree.box_image(true, true)),
	];
	for (name, rendering) in renderings {
		if let Some(rendering) = rendering {
			match png_bytes(&rendering) {
				Ok(bytes) => files.push((name.to_owned(), bytes)),
				Err(e) => error_exit(&format!("Could not render analytics: {}", e), 5),
			}
		}
	}
	files.push((copy_name("input", input_path), input.to_vec()));
	files.push((copy_name("output", output_path), output.to_vec()));
	files
}

/// Collects the analytics renderings of a decode run.
fn decode_analytics(
	outcome: &DecodeOutcome,
	input_path: &str,
	input: &[u8],
	output_path: &str,
	output: &[u8],
) -> Vec<(String, Vec<u8>)> {
	let mut files = Vec::new();
	let renderings = [
		("decodedBlockVisualization.png", outcome.block_image(false)),
		("decodedBlockVisualizationPadded.png", outcome.block_image(true)),
		("decodedBoxVisualization.png", outcome.box_image(false, false)),
		("decodedBoxVisualizationPadded.png", outcome.box_image(true, false)),
		("decodedBoxGroupVisualization.png", outcome.box_image(false, true)),
		("decodedBoxGroupVisualizationPadded.png", outcome.box_image(true, true)),
	];
	for (name, rendering) in renderings {
		match png_bytes(&rendering) {
			Ok(bytes) => files.push((name.to_owned(), bytes)),
			Err(e) => error_exit(&format!("Could not render analytics: {}", e), 5),
		}
	}
	files.push((copy_name("input", input_path), input.to_vec()));
	files.push((copy_name("output", output_path), output.to_vec()));
	files
}

/// Names an input/output copy after the original file's extension.
fn copy_name(stem: &str, original: &str) -> String {
	match Path::new(original).extension() {
		Some(extension) => format!("{}.{}", stem, extension.to_string_lossy()),
		None => stem.to_owned(),
	}
}

/// Writes analytics files into a fresh timestamped subdirectory of
/// `analytics_dir`.
fn write_analytics(analytics_dir: &str, files: Vec<(String, Vec<u8>)>) {
	if files.is_empty() {
		return;
	}

	let timestamp = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|elapsed| elapsed.as_secs())
		.unwrap_or(0);

	// Append a counter if a directory for this timestamp already exists
	let mut current_dir = Path::new(analytics_dir).join(timestamp.to_string());
	let mut attempt = 0;
	while current_dir.exists() {
		current_dir = Path::new(analytics_dir).join(format!("{}_{}", timestamp, attempt));
		attempt += 1;
	}

	if fs::create_dir_all(&current_dir).is_err() {
		error_exit("Could not create analytics directory", 3);
	}
	for (name, contents) in files {
		if fs::write(current_dir.join(&name), contents).is_err() {
			error_exit("Could not write analytics file", 3);
		}
	}
	println!("Wrote analytics files to {}", current_dir.display());
}
