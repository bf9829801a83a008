//! Small dense linear-algebra and series helpers shared by the forecasters.
//!
//! Systems here are at most a dozen columns wide, so plain Gaussian elimination
//! on the normal equations is accurate enough and keeps the crate dependency-light.

pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Unbiased sample variance; zero for fewer than two samples.
pub fn variance(xs: &[f64]) -> f64 {
    let n = xs.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(xs);
    xs.iter().map(|x| (x - m) * (x - m)).sum::<f64>() / (n - 1) as f64
}

/// Log returns of a strictly positive series. Non-positive pairs are skipped.
pub fn log_returns(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .filter(|w| w[0] > f64::EPSILON && w[1] > f64::EPSILON)
        .map(|w| (w[1] / w[0]).ln())
        .collect()
}

pub fn ewma(xs: &[f64], alpha: f64) -> f64 {
    let a = alpha.clamp(0.0, 1.0);
    let mut it = xs.iter();
    let Some(first) = it.next() else {
        return 0.0;
    };
    it.fold(*first, |acc, x| (1.0 - a) * acc + a * x)
}

/// Lag-1 autocorrelation coefficient.
pub fn autocorrelation(xs: &[f64]) -> f64 {
    if xs.len() < 3 {
        return 0.0;
    }
    let m = mean(xs);
    let mut num = 0.0;
    let mut den = 0.0;
    for i in 0..xs.len() {
        let d = xs[i] - m;
        den += d * d;
        if i > 0 {
            num += d * (xs[i - 1] - m);
        }
    }
    if den <= 1e-18 {
        0.0
    } else {
        num / den
    }
}

/// Solve `a · x = b` with partial pivoting. `None` when the system is singular.
pub fn solve_linear(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    if a.len() != n || a.iter().any(|row| row.len() != n) {
        return None;
    }
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| {
            a[i][col]
                .abs()
                .partial_cmp(&a[j][col].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        let pivot_row = a[col].clone();
        let pivot_b = b[col];
        for row in (col + 1)..n {
            let factor = a[row][col] / pivot_row[col];
            if factor == 0.0 {
                continue;
            }
            for (cell, p) in a[row].iter_mut().zip(&pivot_row).skip(col) {
                *cell -= factor * p;
            }
            b[row] -= factor * pivot_b;
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = ((row + 1)..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    x.iter().all(|v| v.is_finite()).then_some(x)
}

/// Ridge regression via the normal equations. The first column is treated as the
/// intercept and left unpenalized when `penalize_intercept` is false.
pub fn ridge_fit(
    rows: &[Vec<f64>],
    y: &[f64],
    lambda: f64,
    penalize_intercept: bool,
) -> Option<Vec<f64>> {
    let p = rows.first()?.len();
    if p == 0 || rows.len() != y.len() {
        return None;
    }
    let mut xtx = vec![vec![0.0; p]; p];
    let mut xty = vec![0.0; p];
    for (row, target) in rows.iter().zip(y) {
        if row.len() != p {
            return None;
        }
        for i in 0..p {
            xty[i] += row[i] * target;
            for j in 0..p {
                xtx[i][j] += row[i] * row[j];
            }
        }
    }
    let lambda = lambda.max(0.0);
    for (i, diag) in xtx.iter_mut().enumerate() {
        if i == 0 && !penalize_intercept {
            diag[i] += 1e-10;
        } else {
            diag[i] += lambda.max(1e-10);
        }
    }
    solve_linear(xtx, xty)
}

pub fn ols_fit(rows: &[Vec<f64>], y: &[f64]) -> Option<Vec<f64>> {
    ridge_fit(rows, y, 0.0, false)
}

pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Mean squared residual of a fitted linear model, with a degrees-of-freedom correction.
pub fn residual_variance(rows: &[Vec<f64>], y: &[f64], beta: &[f64]) -> f64 {
    let n = y.len();
    if n == 0 {
        return 0.0;
    }
    let sse: f64 = rows
        .iter()
        .zip(y)
        .map(|(row, target)| {
            let e = target - dot(row, beta);
            e * e
        })
        .sum();
    let dof = n.saturating_sub(beta.len()).max(1);
    sse / dof as f64
}
