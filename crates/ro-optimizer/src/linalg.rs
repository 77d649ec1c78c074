//! Small dense vector/matrix helpers for the step rules.

pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub(crate) fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

pub(crate) fn sub(a: &[f64], b: &[f64]) -> Vec<f64> {
    a.iter().zip(b).map(|(x, y)| x - y).collect()
}

/// `a + scale * b`
pub(crate) fn add_scaled(a: &[f64], scale: f64, b: &[f64]) -> Vec<f64> {
    a.iter().zip(b).map(|(x, y)| x + scale * y).collect()
}

pub(crate) fn scale(a: &[f64], factor: f64) -> Vec<f64> {
    a.iter().map(|x| x * factor).collect()
}

pub(crate) fn all_finite(a: &[f64]) -> bool {
    a.iter().all(|x| x.is_finite())
}

/// Dense row-major square matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct SquareMatrix {
    n: usize,
    data: Vec<f64>,
}

impl SquareMatrix {
    pub fn identity(n: usize) -> Self {
        let mut data = vec![0.0; n * n];
        for i in 0..n {
            data[i * n + i] = 1.0;
        }
        Self { n, data }
    }

    pub fn dim(&self) -> usize {
        self.n
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.n + col]
    }

    pub fn mul_vec(&self, v: &[f64]) -> Vec<f64> {
        (0..self.n)
            .map(|row| dot(&self.data[row * self.n..(row + 1) * self.n], v))
            .collect()
    }

    /// BFGS inverse update `H = (I - ρ s yᵀ) H (I - ρ y sᵀ) + ρ s sᵀ`, `ρ = 1 / yᵀs`.
    ///
    /// Expanded so no temporary n×n products are formed:
    /// `H - ρ (s (Hy)ᵀ + (Hy) sᵀ) + (ρ² yᵀHy + ρ) s sᵀ` (H symmetric).
    pub(crate) fn bfgs_inverse_update(&mut self, s: &[f64], y: &[f64]) {
        let rho = 1.0 / dot(y, s);
        let hy = self.mul_vec(y);
        let yhy = dot(y, &hy);
        let ss_coeff = rho * rho * yhy + rho;
        let n = self.n;
        for i in 0..n {
            for j in 0..n {
                self.data[i * n + j] +=
                    -rho * (s[i] * hy[j] + hy[i] * s[j]) + ss_coeff * s[i] * s[j];
            }
        }
    }
}
