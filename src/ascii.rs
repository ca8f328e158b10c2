use image::GrayImage;

const SIMPLE_RAMP: &str = "@%#*+=-:. ";
const COMPLEX_RAMP: &str =
    "$@B%8&WM#*oahkbdpqwmZO0QLCJUYXzcvunxrjft/\\|()1{}[]?-_+~<>i!lI;:,\"^`'. ";

pub const DEFAULT_COLUMNS: u32 = 150;

#[derive(Debug, Clone, Copy, PartialEq, Eq, poise::ChoiceParameter)]
pub enum AsciiMode {
    Simple,
    Complex,
}

impl AsciiMode {
    fn ramp(self) -> Vec<char> {
        match self {
            AsciiMode::Simple => SIMPLE_RAMP.chars().collect(),
            AsciiMode::Complex => COMPLEX_RAMP.chars().collect(),
        }
    }
}

/// Decode `bytes` and render it as ASCII art, `num_cols` characters wide.
pub fn image_to_ascii(bytes: &[u8], mode: AsciiMode, num_cols: u32) -> anyhow::Result<String> {
    let gray = image::load_from_memory(bytes)?.to_luma8();
    Ok(render_gray(&gray, mode, num_cols))
}

fn render_gray(image: &GrayImage, mode: AsciiMode, num_cols: u32) -> String {
    let ramp = mode.ramp();
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return String::new();
    }

    let mut num_cols = num_cols.max(1);
    let mut cell_width = width as f64 / num_cols as f64;
    let mut cell_height = 2.0 * cell_width;
    let mut num_rows = (height as f64 / cell_height) as u32;
    if num_cols > width || num_rows > height {
        cell_width = 6.0;
        cell_height = 12.0;
        num_cols = (width as f64 / cell_width) as u32;
        num_rows = (height as f64 / cell_height) as u32;
    }

    let mut rows = Vec::with_capacity(num_rows as usize);
    for i in 0..num_rows {
        let y0 = (i as f64 * cell_height) as u32;
        let y1 = (((i + 1) as f64 * cell_height) as u32).min(height);
        let mut row = String::with_capacity(num_cols as usize);
        for j in 0..num_cols {
            let x0 = (j as f64 * cell_width) as u32;
            let x1 = (((j + 1) as f64 * cell_width) as u32).min(width);
            let mean = cell_mean(image, x0, x1, y0, y1);
            let index = ((mean * ramp.len() as f64 / 255.0) as usize).min(ramp.len() - 1);
            row.push(ramp[index]);
        }
        rows.push(row);
    }
    rows.join("\n")
}

fn cell_mean(image: &GrayImage, x0: u32, x1: u32, y0: u32, y1: u32) -> f64 {
    let mut sum = 0u64;
    let mut count = 0u64;
    for y in y0..y1 {
        for x in x0..x1 {
            sum += image.get_pixel(x, y)[0] as u64;
            count += 1;
        }
    }
    if count == 0 {
        0.0
    } else {
        sum as f64 / count as f64
    }
}
