/// Audit overlays: mark the executed coordinate on a copy of the capture.
///
/// Each marker is a filled disc with a caption such as `(640, 360)`; drags
/// get two markers captioned `P1 (...)` and `P2 (...)`. The overlays are
/// diagnostic only and never read back by the loop.
use std::path::{Path, PathBuf};

use crate::errors::{PilotError, PilotResult};

const MARK_RADIUS: i64 = 10;
const MARK_COLOUR: [u8; 4] = [255, 40, 40, 230];
const LABEL_PREFIX: &str = "screen_label";

/// File name for the overlay of a given (0-based) iteration.
pub fn label_path(dir: &Path, iteration: u32) -> PathBuf {
    dir.join(format!("{LABEL_PREFIX}{}.png", iteration + 1))
}

/// Remove overlays left behind by a previous run. Returns how many were deleted.
pub fn clear_labels(dir: &Path) -> PilotResult<usize> {
    if !dir.exists() {
        return Ok(0);
    }
    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_label = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with(LABEL_PREFIX) && n.ends_with(".png"))
            .unwrap_or(false);
        if is_label {
            std::fs::remove_file(&path)?;
            removed += 1;
        }
    }
    tracing::debug!(dir = %dir.display(), removed, "cleared audit overlays");
    Ok(removed)
}

/// Draw markers for `points` (image pixels) on `src_bytes` and save the
/// result as PNG at `output_path`.
///
/// Points outside the image are skipped. Returns `false` when nothing was
/// inside the image and no file was written.
pub fn mark_coordinates(
    src_bytes: &[u8],
    points: &[(i64, i64)],
    output_path: &Path,
) -> PilotResult<bool> {
    let img = image::load_from_memory(src_bytes)
        .map_err(|e| PilotError::Capture(format!("overlay load: {e}")))?;
    let mut canvas = img.to_rgba8();
    let (w, h) = canvas.dimensions();

    let visible: Vec<(i64, i64)> = points
        .iter()
        .copied()
        .filter(|&(x, y)| x >= 0 && y >= 0 && x < w as i64 && y < h as i64)
        .collect();
    if visible.is_empty() {
        return Ok(false);
    }

    let label_scale: u32 = if w > 1600 { 3 } else { 2 };
    for (i, &(x, y)) in visible.iter().enumerate() {
        draw_disc(&mut canvas, x, y, MARK_RADIUS, MARK_COLOUR);

        let caption = if visible.len() == 1 {
            format!("({x}, {y})")
        } else {
            format!("P{} ({x}, {y})", i + 1)
        };
        let offset = i as i64 * 40;
        let label_h = (5 * label_scale + 4 * label_scale) as i64;
        draw_label_bg(
            &mut canvas,
            (x - 30 + offset).max(0),
            (y - MARK_RADIUS - label_h).max(0),
            &caption,
            MARK_COLOUR,
            label_scale,
        );
    }

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    image::DynamicImage::ImageRgba8(canvas).save_with_format(output_path, image::ImageFormat::Png)?;
    tracing::debug!(path = %output_path.display(), points = visible.len(), "audit overlay saved");
    Ok(true)
}

// ── Drawing primitives ──────────────────────────────────────────────────────

fn draw_disc(canvas: &mut image::RgbaImage, cx: i64, cy: i64, r: i64, col: [u8; 4]) {
    let (w, h) = canvas.dimensions();
    for dy in -r..=r {
        for dx in -r..=r {
            if dx * dx + dy * dy > r * r {
                continue;
            }
            let (x, y) = (cx + dx, cy + dy);
            if x >= 0 && y >= 0 && x < w as i64 && y < h as i64 {
                set_pixel(canvas, x as u32, y as u32, col);
            }
        }
    }
}

fn draw_label_bg(
    canvas: &mut image::RgbaImage,
    x: i64,
    y: i64,
    text: &str,
    col: [u8; 4],
    scale: u32,
) {
    let (w, h) = canvas.dimensions();
    let char_w = 5 * scale + scale;
    let char_h = 5 * scale;
    let pad = 2 * scale;
    let label_w = text.chars().count() as u32 * char_w + pad * 2;
    let label_h = char_h + pad * 2;
    let (x, y) = (x as u32, y as u32);

    for dy in 0..label_h {
        for dx in 0..label_w {
            let px = x + dx;
            let py = y + dy;
            if px < w && py < h {
                let p = canvas.get_pixel_mut(px, py);
                p[0] = (p[0] as f32 * 0.2) as u8;
                p[1] = (p[1] as f32 * 0.2) as u8;
                p[2] = (p[2] as f32 * 0.2) as u8;
                p[3] = 255;
            }
        }
    }

    for (i, c) in text.to_uppercase().chars().enumerate() {
        let gx = x + pad + i as u32 * char_w;
        if gx + 5 * scale >= w {
            break;
        }
        draw_mini_glyph(canvas, c, gx, y + pad, col, scale);
    }
}

fn draw_mini_glyph(canvas: &mut image::RgbaImage, c: char, px: u32, py: u32, col: [u8; 4], scale: u32) {
    let glyph = match c {
        '0'..='9' => DIGITS[(c as u8 - b'0') as usize],
        'P' => [0b11110, 0b10001, 0b11110, 0b10000, 0b10000],
        '(' => [0b00010, 0b00100, 0b00100, 0b00100, 0b00010],
        ')' => [0b01000, 0b00100, 0b00100, 0b00100, 0b01000],
        ',' => [0b00000, 0b00000, 0b00000, 0b00100, 0b01000],
        '-' => [0b00000, 0b00000, 0b01110, 0b00000, 0b00000],
        _ => return,
    };
    let (w, h) = canvas.dimensions();
    for (row, &bits) in glyph.iter().enumerate() {
        for bit in 0..5u32 {
            if (bits >> (4 - bit)) & 1 == 0 {
                continue;
            }
            for sy in 0..scale {
                for sx in 0..scale {
                    let x = px + bit * scale + sx;
                    let y = py + row as u32 * scale + sy;
                    if x < w && y < h {
                        set_pixel(canvas, x, y, col);
                    }
                }
            }
        }
    }
}

fn set_pixel(canvas: &mut image::RgbaImage, x: u32, y: u32, col: [u8; 4]) {
    let p = canvas.get_pixel_mut(x, y);
    let a = col[3] as f32 / 255.0;
    p[0] = (p[0] as f32 * (1.0 - a) + col[0] as f32 * a).round() as u8;
    p[1] = (p[1] as f32 * (1.0 - a) + col[1] as f32 * a).round() as u8;
    p[2] = (p[2] as f32 * (1.0 - a) + col[2] as f32 * a).round() as u8;
    p[3] = 255;
}

/// 5×5 bitmap digits.
const DIGITS: [[u8; 5]; 10] = [
    [0b01110, 0b10001, 0b10001, 0b10001, 0b01110], // 0
    [0b00100, 0b01100, 0b00100, 0b00100, 0b01110], // 1
    [0b01110, 0b10001, 0b00110, 0b01000, 0b11111], // 2
    [0b11110, 0b00001, 0b00110, 0b00001, 0b11110], // 3
    [0b00110, 0b01010, 0b10010, 0b11111, 0b00010], // 4
    [0b11111, 0b10000, 0b11110, 0b00001, 0b11110], // 5
    [0b01110, 0b10000, 0b11110, 0b10001, 0b01110], // 6
    [0b11111, 0b00001, 0b00010, 0b00100, 0b00100], // 7
    [0b01110, 0b10001, 0b01110, 0b10001, 0b01110], // 8
    [0b01110, 0b10001, 0b01111, 0b00001, 0b01110], // 9
];

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_png(w: u32, h: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(w, h, image::Rgba([255, 255, 255, 255]));
        let mut out = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn marker_is_drawn_at_point() {
        let dir = tempfile::tempdir().unwrap();
        let out = label_path(dir.path(), 0);
        assert!(out.ends_with("screen_label1.png"));

        let written = mark_coordinates(&blank_png(200, 100), &[(100, 60)], &out).unwrap();
        assert!(written);

        let marked = image::open(&out).unwrap().to_rgba8();
        let centre = marked.get_pixel(100, 60);
        assert!(centre[0] > 200 && centre[1] < 100, "centre not red: {centre:?}");
        let corner = marked.get_pixel(199, 99);
        assert_eq!(corner.0, [255, 255, 255, 255]);
    }

    #[test]
    fn points_outside_image_write_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let out = label_path(dir.path(), 4);
        let written = mark_coordinates(&blank_png(50, 50), &[(80, 10), (-1, 3)], &out).unwrap();
        assert!(!written);
        assert!(!out.exists());
    }

    #[test]
    fn clear_labels_only_removes_overlays() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("screen_label1.png"), b"x").unwrap();
        std::fs::write(dir.path().join("screen_label12.png"), b"x").unwrap();
        std::fs::write(dir.path().join("screen.png"), b"x").unwrap();

        assert_eq!(clear_labels(dir.path()).unwrap(), 2);
        assert!(dir.path().join("screen.png").exists());
        assert_eq!(clear_labels(&dir.path().join("missing")).unwrap(), 0);
    }
}
