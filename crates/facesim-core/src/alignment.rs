//! Face alignment via 4-DOF similarity transform.
//!
//! Aligns detected faces to a canonical crop using the five InsightFace
//! reference landmarks (defined for 112×112, rescaled to the target size)
//! and least-squares estimation.

/// ArcFace reference landmarks for a 112×112 output.
const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

const REFERENCE_SIZE: f32 = 112.0;

/// Reference landmarks rescaled to an arbitrary output crop.
fn reference_landmarks(out_width: usize, out_height: usize) -> [(f32, f32); 5] {
    let sx = out_width as f32 / REFERENCE_SIZE;
    let sy = out_height as f32 / REFERENCE_SIZE;
    REFERENCE_LANDMARKS_112.map(|(x, y)| (x * sx, y * sy))
}

/// Estimate a 2×3 similarity transform (4-DOF: scale, rotation, translation)
/// from `src` landmarks to `dst` landmarks using least-squares.
///
/// Closed form on centred point sets:
/// a = Σ(s·d) / Σ|s|², b = Σ(s×d) / Σ|s|², t = mean(d) - R·mean(s).
///
/// Returns [a, -b, tx, b, a, ty] representing the matrix:
/// ```text
/// | a  -b  tx |
/// | b   a  ty |
/// ```
fn estimate_similarity_transform(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> [f32; 6] {
    let n = src.len() as f32;
    let mean = |pts: &[(f32, f32); 5]| {
        let (sx, sy) = pts.iter().fold((0.0, 0.0), |(ax, ay), &(x, y)| (ax + x, ay + y));
        (sx / n, sy / n)
    };
    let (msx, msy) = mean(src);
    let (mdx, mdy) = mean(dst);

    let mut dot = 0.0f32;
    let mut cross = 0.0f32;
    let mut src_var = 0.0f32;
    for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()) {
        let (sx, sy) = (sx - msx, sy - msy);
        let (dx, dy) = (dx - mdx, dy - mdy);
        dot += sx * dx + sy * dy;
        cross += sx * dy - sy * dx;
        src_var += sx * sx + sy * sy;
    }

    // Degenerate landmarks (all coincident): fall back to a pure translation
    let (a, b) = if src_var > 1e-12 {
        (dot / src_var, cross / src_var)
    } else {
        (1.0, 0.0)
    };
    let tx = mdx - (a * msx - b * msy);
    let ty = mdy - (b * msx + a * msy);

    [a, -b, tx, b, a, ty]
}

/// Apply a 2×3 affine warp to produce an `out_width × out_height` image.
///
/// `frame` holds `channels` interleaved bytes per pixel. Uses bilinear
/// interpolation. Out-of-bounds pixels are filled with 0 (black).
fn warp_affine(
    frame: &[u8],
    src_width: usize,
    src_height: usize,
    channels: usize,
    matrix: &[f32; 6],
    out_width: usize,
    out_height: usize,
) -> Vec<u8> {
    let (a, _neg_b, tx) = (matrix[0], matrix[1], matrix[2]);
    let (b, _a2, ty) = (matrix[3], matrix[4], matrix[5]);

    let mut output = vec![0u8; out_width * out_height * channels];

    // Invert the 2x2 part: M = [[a, -b], [b, a]], det = a^2 + b^2
    let det = a * a + b * b;
    if det.abs() < 1e-12 || frame.len() < src_width * src_height * channels {
        return output;
    }
    let inv_det = 1.0 / det;
    let ia = a * inv_det;
    let ib = b * inv_det;

    for oy in 0..out_height {
        for ox in 0..out_width {
            // Map output pixel back to source: src = M_inv * (dst - t)
            let dx = ox as f32 - tx;
            let dy = oy as f32 - ty;
            let sx = ia * dx + ib * dy;
            let sy = -ib * dx + ia * dy;

            let x0 = sx.floor() as i32;
            let y0 = sy.floor() as i32;
            let x1 = x0 + 1;
            let y1 = y0 + 1;
            let fx = sx - x0 as f32;
            let fy = sy - y0 as f32;

            for c in 0..channels {
                let sample = |x: i32, y: i32| -> f32 {
                    if x >= 0 && x < src_width as i32 && y >= 0 && y < src_height as i32 {
                        frame[(y as usize * src_width + x as usize) * channels + c] as f32
                    } else {
                        0.0
                    }
                };

                let val = sample(x0, y0) * (1.0 - fx) * (1.0 - fy)
                    + sample(x1, y0) * fx * (1.0 - fy)
                    + sample(x0, y1) * (1.0 - fx) * fy
                    + sample(x1, y1) * fx * fy;

                output[(oy * out_width + ox) * channels + c] = val.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    output
}

/// Align a detected face to a canonical crop of the given size.
///
/// Takes an interleaved image (`channels` bytes per pixel) and five detected
/// facial landmarks, computes the similarity transform to the reference
/// positions scaled to `out_width × out_height`, and warps the face region
/// into an aligned crop with the same channel count.
pub fn align_face(
    frame: &[u8],
    width: u32,
    height: u32,
    channels: usize,
    landmarks: &[(f32, f32); 5],
    out_width: usize,
    out_height: usize,
) -> Vec<u8> {
    let reference = reference_landmarks(out_width, out_height);
    let matrix = estimate_similarity_transform(landmarks, &reference);
    warp_affine(
        frame,
        width as usize,
        height as usize,
        channels,
        &matrix,
        out_width,
        out_height,
    )
}
