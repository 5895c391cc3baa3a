use crate::config::Number;
use wide::f32x8;

/// Squared Euclidean distance between `a` and `b` using SIMD lanes of eight.
/// Returns `None` when the lengths differ.
pub fn l2_distance_squared(a: &[Number], b: &[Number]) -> Option<Number> {
    if a.len() != b.len() {
        tracing::debug!("Vector length mismatch: {} vs {}", a.len(), b.len());
        return None;
    }

    let mut acc = f32x8::splat(0.0);

    let len = a.len();
    let simd_len = len - (len % 8);

    for i in (0..simd_len).step_by(8) {
        let va = f32x8::new([
            a[i],
            a[i + 1],
            a[i + 2],
            a[i + 3],
            a[i + 4],
            a[i + 5],
            a[i + 6],
            a[i + 7],
        ]);
        let vb = f32x8::new([
            b[i],
            b[i + 1],
            b[i + 2],
            b[i + 3],
            b[i + 4],
            b[i + 5],
            b[i + 6],
            b[i + 7],
        ]);
        let diff = va - vb;
        acc += diff * diff;
    }

    let mut sum = acc.reduce_add();

    // Handle remaining elements
    for i in simd_len..len {
        let diff = a[i] - b[i];
        sum += diff * diff;
    }

    Some(sum)
}

/// Component-wise mean of equally sized chunk vectors.
pub fn average_vectors(chunks: &[Vec<Number>]) -> Option<Vec<Number>> {
    let first = chunks.first()?;
    let dim = first.len();
    if chunks.iter().any(|c| c.len() != dim) {
        return None;
    }
    if chunks.len() == 1 {
        return Some(first.clone());
    }

    let mut mean = vec![0.0; dim];
    for chunk in chunks {
        for (m, &x) in mean.iter_mut().zip(chunk.iter()) {
            *m += x;
        }
    }
    let n = chunks.len() as Number;
    for m in mean.iter_mut() {
        *m /= n;
    }
    Some(mean)
}

pub fn is_zero_vector(vector: &[Number]) -> bool {
    vector.iter().all(|x| x.abs() < crate::config::EPSILON)
}
