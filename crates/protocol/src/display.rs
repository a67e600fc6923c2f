//! 5x5 display glyphs and animations.
//!
//! The display takes a string of five rows of five brightness digits joined
//! by colons, e.g. `"09090:90909:99099:09090:00900"`. Row 0 is the top of
//! the display, digit 0 is off and 9 is full brightness.

use std::fmt;

/// Rows and columns on the hub display.
pub const GRID: usize = 5;

/// Highest brightness a pixel can hold.
pub const MAX_BRIGHTNESS: u8 = 9;

/// One 5x5 brightness image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Glyph {
	pixels: [[u8; GRID]; GRID],
}

impl Glyph {
	/// Blank glyph.
	pub const fn new() -> Glyph {
		Glyph { pixels: [[0; GRID]; GRID] }
	}

	/// Every pixel at full brightness.
	pub const FULL: Glyph = Glyph { pixels: [[9; GRID]; GRID] };

	pub const SMILEY: Glyph = Glyph {
		pixels: [
			[0, 9, 0, 9, 0],
			[9, 0, 0, 0, 9],
			[0, 0, 0, 0, 0],
			[0, 9, 9, 9, 0],
			[0, 0, 0, 0, 0],
		],
	};

	pub const SAD: Glyph = Glyph {
		pixels: [
			[0, 9, 0, 9, 0],
			[9, 0, 0, 0, 9],
			[0, 9, 0, 9, 0],
			[9, 0, 0, 0, 9],
			[0, 0, 0, 0, 0],
		],
	};

	pub const HEART: Glyph = Glyph {
		pixels: [
			[0, 9, 0, 9, 0],
			[9, 0, 9, 0, 9],
			[9, 9, 0, 9, 9],
			[0, 9, 0, 9, 0],
			[0, 0, 9, 0, 0],
		],
	};

	pub const BROKEN_HEART: Glyph = Glyph {
		pixels: [
			[0, 9, 0, 9, 0],
			[9, 0, 9, 0, 9],
			[9, 9, 0, 9, 0],
			[0, 9, 0, 9, 0],
			[0, 0, 9, 0, 0],
		],
	};

	pub const STAR: Glyph = Glyph {
		pixels: [
			[0, 0, 9, 0, 0],
			[0, 9, 9, 9, 0],
			[9, 0, 0, 0, 9],
			[0, 9, 9, 9, 0],
			[0, 0, 9, 0, 0],
		],
	};

	pub const CHECK: Glyph = Glyph {
		pixels: [
			[0, 0, 0, 0, 9],
			[0, 0, 0, 9, 9],
			[0, 0, 9, 0, 0],
			[9, 9, 0, 0, 0],
			[9, 0, 0, 0, 0],
		],
	};

	pub const CROSS: Glyph = Glyph {
		pixels: [
			[9, 0, 0, 0, 9],
			[0, 9, 0, 9, 0],
			[0, 0, 9, 0, 0],
			[0, 9, 0, 9, 0],
			[9, 0, 0, 0, 9],
		],
	};

	pub const ARROW_LEFT: Glyph = Glyph {
		pixels: [
			[0, 0, 0, 0, 9],
			[0, 0, 0, 9, 9],
			[0, 0, 9, 9, 9],
			[0, 0, 0, 9, 9],
			[0, 0, 0, 0, 9],
		],
	};

	pub const ARROW_RIGHT: Glyph = Glyph {
		pixels: [
			[9, 0, 0, 0, 0],
			[9, 9, 0, 0, 0],
			[9, 9, 9, 0, 0],
			[9, 9, 0, 0, 0],
			[9, 0, 0, 0, 0],
		],
	};

	pub const ARROW_UP: Glyph = Glyph {
		pixels: [
			[0, 0, 9, 0, 0],
			[0, 9, 9, 9, 0],
			[9, 0, 0, 0, 9],
			[0, 0, 9, 0, 0],
			[0, 0, 9, 0, 0],
		],
	};

	pub const ARROW_DOWN: Glyph = Glyph {
		pixels: [
			[0, 0, 9, 0, 0],
			[0, 0, 9, 0, 0],
			[9, 0, 0, 0, 9],
			[0, 9, 9, 9, 0],
			[0, 0, 9, 0, 0],
		],
	};

	/// Returns a copy with one pixel set. Coordinates outside the grid are
	/// ignored; brightness saturates at [`MAX_BRIGHTNESS`].
	pub fn with_pixel(mut self, x: usize, y: usize, brightness: u8) -> Glyph {
		if x < GRID && y < GRID {
			self.pixels[y][x] = brightness.min(MAX_BRIGHTNESS);
		}
		self
	}

	/// Brightness at a pixel, 0 outside the grid.
	pub fn pixel(&self, x: usize, y: usize) -> u8 {
		if x < GRID && y < GRID { self.pixels[y][x] } else { 0 }
	}

	/// Wire encoding: five rows of five digits joined by `:`.
	pub fn encode(&self) -> String {
		let mut out = String::with_capacity(GRID * GRID + GRID - 1);
		for (y, row) in self.pixels.iter().enumerate() {
			if y > 0 {
				out.push(':');
			}
			for &px in row {
				out.push(char::from(b'0' + px));
			}
		}
		out
	}

	/// Parses the wire encoding. `None` unless the text is exactly five
	/// colon-separated rows of five digits.
	pub fn parse(text: &str) -> Option<Glyph> {
		let mut pixels = [[0u8; GRID]; GRID];
		let mut rows = 0;
		for (y, row) in text.split(':').enumerate() {
			if y >= GRID || row.len() != GRID {
				return None;
			}
			for (x, ch) in row.chars().enumerate() {
				pixels[y][x] = ch.to_digit(10)? as u8;
			}
			rows += 1;
		}
		(rows == GRID).then_some(Glyph { pixels })
	}
}

impl fmt::Display for Glyph {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.encode())
	}
}

/// Ordered list of glyph frames for `scratch.display_animation`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Animation {
	frames: Vec<Glyph>,
}

impl Animation {
	pub fn new() -> Animation {
		Animation::default()
	}

	pub fn from_frames(frames: impl IntoIterator<Item = Glyph>) -> Animation {
		Animation { frames: frames.into_iter().collect() }
	}

	/// Appends a frame, returning the animation for chaining.
	pub fn with_frame(mut self, frame: Glyph) -> Animation {
		self.frames.push(frame);
		self
	}

	pub fn push(&mut self, frame: Glyph) {
		self.frames.push(frame);
	}

	pub fn frames(&self) -> &[Glyph] {
		&self.frames
	}

	pub fn is_empty(&self) -> bool {
		self.frames.is_empty()
	}

	/// Frames in wire encoding, ready for the `frames` parameter.
	pub fn encode_frames(&self) -> Vec<String> {
		self.frames.iter().map(Glyph::encode).collect()
	}

	/// Smiley closing and reopening its mouth.
	pub fn blink() -> Animation {
		const MOUTH_DOT: Glyph = Glyph {
			pixels: [
				[0, 9, 0, 9, 0],
				[9, 0, 0, 0, 9],
				[0, 0, 0, 0, 0],
				[0, 0, 9, 0, 0],
				[0, 0, 0, 0, 0],
			],
		};
		const MOUTH_SPLIT: Glyph = Glyph {
			pixels: [
				[0, 9, 0, 9, 0],
				[9, 0, 0, 0, 9],
				[0, 0, 0, 0, 0],
				[0, 9, 0, 9, 0],
				[0, 0, 0, 0, 0],
			],
		};
		Animation::from_frames([
			Glyph::SMILEY,
			Glyph::SMILEY,
			MOUTH_DOT,
			MOUTH_SPLIT,
			Glyph::SMILEY,
			Glyph::SMILEY,
		])
	}

	/// Heart pulsing from full size down to a dot and back.
	pub fn heartbeat() -> Animation {
		const SMALL_HEART: Glyph = Glyph {
			pixels: [
				[0, 0, 0, 0, 0],
				[0, 9, 9, 9, 0],
				[0, 9, 9, 9, 0],
				[0, 0, 0, 0, 0],
				[0, 0, 0, 0, 0],
			],
		};
		const DOT: Glyph = Glyph {
			pixels: [
				[0, 0, 0, 0, 0],
				[0, 0, 0, 0, 0],
				[0, 0, 9, 0, 0],
				[0, 0, 0, 0, 0],
				[0, 0, 0, 0, 0],
			],
		};
		Animation::from_frames([
			Glyph::HEART,
			SMALL_HEART,
			DOT,
			SMALL_HEART,
			Glyph::HEART,
			Glyph::new(),
		])
	}
}
